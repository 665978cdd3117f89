//! # Rendering System
//!
//! Device abstraction, render resources and the frame driver.
//!
//! ## Architecture
//!
//! - **RenderDevice**: the GPU collaborator contract; [`HeadlessDevice`] records commands in memory
//! - **Primitives**: cameras and chunked meshes
//! - **Resources**: materials and their passes
//! - **RenderTarget / Look**: where and how scenes are drawn
//! - **RenderSystem**: owns all of the above and runs frames
//!
//! Scenes themselves live in [`crate::scene`].

pub mod backend;
pub mod buffer;
pub mod flags;
pub mod headless;
pub mod primitives;
pub mod resources;
pub mod system;
pub mod target;

pub use backend::{
    BoundState, BufferHandle, BufferUsage, DeviceCapabilities, DeviceEvent, DrawIndirectCommand,
    FramebufferHandle, QueryHandle, RenderDevice,
};
pub use buffer::GpuBuffer;
pub use flags::{ClearFlags, RenderFlags};
pub use headless::{DeviceCommand, HeadlessDevice};
pub use primitives::{Camera, CameraId, ChunkHandle, Mesh, MeshChunk, MeshId, MeshRegistry};
pub use resources::materials::{
    AlphaMode, Material, MaterialId, MaterialPass, MaterialRegistry, PolygonMode, ProgramId,
};
pub use system::{FrameListener, RenderStats, RenderSystem, SceneId, TargetId, SCREEN_PRIORITY};
pub use target::{Look, RenderTarget, TargetHook, TargetState};

use thiserror::Error;

/// Errors raised by the render core
///
/// # Design Philosophy
/// Handle lookups that fail surface as [`RenderError::InvalidHandle`] from the
/// call that received the handle. Device-side failures are reported by the
/// device and logged where the frame can continue without them.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    ///
    /// Occurs when the render system or a scene cannot be created from its
    /// configuration.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// Resource creation or management failed
    ///
    /// Occurs when GPU resources (buffers, queries) cannot be created or
    /// resized.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    ///
    /// Wraps errors of a concrete device implementation in a generic form.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// The device lacks a feature the configuration requires
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A scene, camera, target, node, material or mesh handle did not resolve
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A target already holds a look for this camera at this priority
    #[error("A look with priority {priority} already exists for this camera")]
    DuplicateLook {
        /// Conflicting priority
        priority: i32,
    },
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
