//! # Scene Render
//!
//! Per-frame 3D scene rendering core: a node hierarchy with change
//! invalidation, material-grouped render nodes, frustum and occlusion culling,
//! distance sorting and three batching strategies (naive, CPU instancing and
//! indirect multi-draw), driven by a render system that walks prioritised
//! render targets and their looks once per frame.
//!
//! ## Features
//!
//! - **Minimal recomputation**: bounds, distances and invocation records are
//!   rebuilt only for nodes, meshes or cameras that changed
//! - **Pluggable device**: everything GPU-facing goes through [`render::RenderDevice`];
//!   [`render::HeadlessDevice`] records commands for tests and tools
//! - **Typed handles**: scenes, cameras, targets and nodes are generational slotmap keys
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_render::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     let mut system = RenderSystem::new(RenderSystemConfig::default(), HeadlessDevice::new())?;
//!
//!     let material = system
//!         .materials_mut()
//!         .register(Material::with_pass(MaterialPass::new(ProgramId(1))));
//!     let mesh = system.meshes_mut().create_mesh("cube");
//!     let chunk = system
//!         .meshes_mut()
//!         .get_mut(mesh)
//!         .and_then(|mesh| {
//!             mesh.add_chunk(MeshChunk::new(
//!                 8,
//!                 36,
//!                 BoundingVolume::from_min_max(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)),
//!             ))
//!         })
//!         .expect("cube chunk has geometry");
//!
//!     let scene = system.create_scene()?;
//!     let node = system.add_node(scene, SceneNode::new(), None)?;
//!     system.touch_material(scene, node, chunk, material, 1)?;
//!
//!     let camera = system.create_camera(Camera::perspective(Vec3::new(0.0, 2.0, 6.0), 60.0, 16.0 / 9.0, 0.1, 100.0));
//!     let screen = system.screen();
//!     system.attach_look(screen, Look::new(camera, scene).with_flags(RenderFlags::DEFAULT | RenderFlags::FRUSTUM_CULLING))?;
//!
//!     struct OneFrame;
//!     impl FrameListener<HeadlessDevice> for OneFrame {
//!         fn post_frame(&mut self, _system: &mut RenderSystem<HeadlessDevice>) -> bool {
//!             false
//!         }
//!     }
//!     system.run(&mut OneFrame)?;
//!     assert_eq!(system.stats().batches, 1);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core configuration
pub mod core;
pub mod config;

pub mod foundation;
pub mod render;
pub mod scene;

pub use render::{RenderError, RenderResult};

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        core::{Config, EngineConfig, RenderSystemConfig, SceneConfig, ScreenConfig},
        foundation::{
            math::{Mat4, Quat, Transform, Vec3},
            time::{FramePacer, Timer},
        },
        render::{
            Camera, CameraId, ChunkHandle, DeviceEvent, FrameListener, HeadlessDevice, Look, Material,
            MaterialId, MaterialPass, MeshChunk, ProgramId, RenderDevice, RenderError, RenderFlags,
            RenderResult, RenderSystem, SceneId, TargetId,
        },
        scene::{BoundingVolume, NodeId, Scene, SceneNode, SceneObserver},
    };
}
