//! Device abstraction for the scene renderer
//!
//! Scenes and the render system drive a [`RenderDevice`] and never touch a
//! graphics API directly. Everything the renderer needs from the device is
//! expressed here: buffers, material pass state, chunk binding, draw calls,
//! occlusion queries, framebuffers and frame presentation.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat3, Mat4};
use crate::render::flags::{ClearFlags, RenderFlags};
use crate::render::primitives::{MeshChunk, MeshId};
use crate::render::resources::materials::{Material, MaterialPass};
use crate::render::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a GPU buffer owned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a hardware occlusion query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// Handle to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

impl FramebufferHandle {
    /// The default framebuffer presented by `swap_buffers`
    pub const SCREEN: Self = Self(0);
}

bitflags! {
    /// Optional hardware features reported by a device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceCapabilities: u32 {
        /// Hardware occlusion queries
        const OCCLUSION_QUERY = 1;
        /// Per-instance vertex attributes
        const INSTANCED_ARRAYS = 1 << 1;
        /// Bindless texture handles
        const BINDLESS_TEXTURE = 1 << 2;
        /// Indirect multi-draw
        const MULTI_DRAW_INDIRECT = 1 << 3;
        /// Draw id and base instance visible to shaders
        const SHADER_DRAW_PARAMETERS = 1 << 4;

        /// Everything GPU multi-draw batching depends on
        const MULTIRENDER = Self::BINDLESS_TEXTURE.bits()
            | Self::MULTI_DRAW_INDIRECT.bits()
            | Self::SHADER_DRAW_PARAMETERS.bits();
    }
}

/// Intended use of a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Per-instance world matrices for CPU instancing
    InstanceAttributes,
    /// Shader storage holding invocation records
    InvocationRecords,
}

/// Resource counts bound while applying a material pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundState {
    /// Texture units bound
    pub texture_units: u32,
    /// Uniform blocks bound
    pub uniform_blocks: u32,
}

/// One indexed draw of an indirect multi-draw
///
/// Matches the indirect command layout graphics APIs consume.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    /// Indices to draw
    pub index_count: u32,
    /// Instances to draw
    pub instance_count: u32,
    /// First index in the mesh index buffer
    pub first_index: u32,
    /// Value added to each index
    pub base_vertex: i32,
    /// First instance; selects the invocation record for this draw
    pub base_instance: u32,
}

/// Input or window event pumped once per frame
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The user asked to close the application
    Quit,
    /// The output surface changed size
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
    /// A key was pressed
    KeyDown(u32),
    /// A key was released
    KeyUp(u32),
}

/// Graphics device consumed by scenes and the render system
///
/// Implementations translate these calls into a concrete graphics API. The
/// renderer assumes calls are ordered: state set before a draw applies to
/// that draw.
pub trait RenderDevice {
    /// Optional features available on this device
    fn capabilities(&self) -> DeviceCapabilities;

    /// Allocate a buffer of `size` bytes
    fn create_buffer(&mut self, usage: BufferUsage, size: usize) -> BackendResult<BufferHandle>;

    /// Write `data` at byte `offset`; the range must fit the buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> BackendResult<()>;

    /// Resize a buffer, preserving its existing contents
    ///
    /// On failure the buffer keeps its previous size and contents.
    fn resize_buffer(&mut self, buffer: BufferHandle, new_size: usize) -> BackendResult<()>;

    /// Release a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Bind the program and state of a material pass
    fn apply_pass(&mut self, material: &Material, pass: &MaterialPass) -> BoundState;

    /// Upload per-node world and normal matrices
    fn set_node_matrices(&mut self, model: &Mat4, normal: &Mat3);

    /// Bind the vertex and index data of a chunk
    fn bind_chunk(&mut self, chunk: &MeshChunk);

    /// Draw the bound chunk `instances` times
    fn draw(&mut self, chunk: &MeshChunk, instances: u32);

    /// Draw the bound chunk once per world matrix stored in `instances`
    fn draw_instanced_buffer(&mut self, chunk: &MeshChunk, instances: BufferHandle, count: u32);

    /// Issue an indirect multi-draw over one mesh, reading invocation records from `records`
    fn multi_draw(&mut self, mesh: MeshId, records: BufferHandle, commands: &[DrawIndirectCommand]);

    /// Toggle occluded-proxy state: front faces culled instead of back faces, no depth writes
    fn set_proxy_state(&mut self, enabled: bool);

    /// Create an occlusion query
    fn create_query(&mut self) -> BackendResult<QueryHandle>;

    /// Start counting samples for a query
    fn begin_query(&mut self, query: QueryHandle);

    /// Stop counting samples for a query
    fn end_query(&mut self, query: QueryHandle);

    /// Non-blocking poll: `Some(true)` when samples passed, `None` while pending
    fn poll_query(&mut self, query: QueryHandle) -> Option<bool>;

    /// Release an occlusion query
    fn destroy_query(&mut self, query: QueryHandle);

    /// Make a framebuffer current and set the viewport to its size
    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32);

    /// Restrict output to the listed framebuffer layers; empty means all layers
    fn select_layers(&mut self, layers: &[u32]);

    /// Apply depth test and output write masks from look flags
    fn set_output_state(&mut self, flags: RenderFlags);

    /// Clear framebuffer attachments
    fn clear(&mut self, mask: ClearFlags, color: [f32; 4]);

    /// Pop one pending input or window event
    fn poll_event(&mut self) -> Option<DeviceEvent>;

    /// Present the frame
    fn swap_buffers(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multirender_requires_all_features() {
        let partial = DeviceCapabilities::BINDLESS_TEXTURE | DeviceCapabilities::MULTI_DRAW_INDIRECT;
        assert!(!partial.contains(DeviceCapabilities::MULTIRENDER));
        assert!(DeviceCapabilities::all().contains(DeviceCapabilities::MULTIRENDER));
    }

    #[test]
    fn test_indirect_command_layout() {
        assert_eq!(std::mem::size_of::<DrawIndirectCommand>(), 20);
    }
}
