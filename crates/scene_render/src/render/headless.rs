//! Headless render device
//!
//! Records every call as a [`DeviceCommand`] instead of talking to a GPU.
//! Used by tests and by tools that only need to exercise scene traversal.
//! Occlusion query results and buffer growth failures can be scripted.

use std::collections::{HashMap, VecDeque};

use crate::foundation::math::{Mat3, Mat4};
use crate::render::backend::{
    BackendResult, BoundState, BufferHandle, BufferUsage, DeviceCapabilities, DeviceEvent,
    DrawIndirectCommand, FramebufferHandle, QueryHandle, RenderDevice,
};
use crate::render::flags::{ClearFlags, RenderFlags};
use crate::render::primitives::{ChunkHandle, MeshChunk, MeshId};
use crate::render::resources::materials::{Material, MaterialId, MaterialPass};
use crate::render::RenderError;

/// A recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// A material pass was applied
    ApplyPass(MaterialId),
    /// Node matrices were uploaded
    SetNodeMatrices(Mat4),
    /// A chunk was bound
    BindChunk(ChunkHandle),
    /// Plain or instanced draw
    Draw {
        /// Chunk drawn
        chunk: ChunkHandle,
        /// Instance count
        instances: u32,
    },
    /// Draw fed by an instance matrix buffer
    DrawInstancedBuffer {
        /// Chunk drawn
        chunk: ChunkHandle,
        /// Buffer holding world matrices
        buffer: BufferHandle,
        /// Number of matrices consumed
        count: u32,
    },
    /// Indirect multi-draw
    MultiDraw {
        /// Mesh whose buffers were used
        mesh: MeshId,
        /// Invocation record buffer
        records: BufferHandle,
        /// Draw commands
        commands: Vec<DrawIndirectCommand>,
    },
    /// Proxy state toggled
    ProxyState(bool),
    /// Query started
    BeginQuery(QueryHandle),
    /// Query ended
    EndQuery(QueryHandle),
    /// Framebuffer bound
    BindFramebuffer(FramebufferHandle),
    /// Layers selected
    SelectLayers(Vec<u32>),
    /// Output state applied
    OutputState(RenderFlags),
    /// Attachments cleared
    Clear(ClearFlags),
    /// Frame presented
    SwapBuffers,
}

#[derive(Debug, Default)]
struct QueryState {
    issued: bool,
    result: Option<bool>,
}

/// Render device that records commands in memory
#[derive(Debug)]
pub struct HeadlessDevice {
    capabilities: DeviceCapabilities,
    commands: Vec<DeviceCommand>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    queries: HashMap<QueryHandle, QueryState>,
    default_query_result: Option<bool>,
    events: VecDeque<DeviceEvent>,
    fail_buffer_growth: bool,
    next_handle: u64,
    frames_presented: u64,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Create a device reporting every optional feature
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::all())
    }

    /// Create a device reporting only `capabilities`
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            commands: Vec::new(),
            buffers: HashMap::new(),
            queries: HashMap::new(),
            default_query_result: Some(true),
            events: VecDeque::new(),
            fail_buffer_growth: false,
            next_handle: 1,
            frames_presented: 0,
        }
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Result reported by issued queries without an explicit result; `None` keeps them pending
    pub fn set_default_query_result(&mut self, result: Option<bool>) {
        self.default_query_result = result;
    }

    /// Script the result of one query
    pub fn set_query_result(&mut self, query: QueryHandle, visible: bool) {
        if let Some(state) = self.queries.get_mut(&query) {
            state.result = Some(visible);
        }
    }

    /// Make every subsequent buffer resize fail
    pub fn fail_buffer_growth(&mut self, fail: bool) {
        self.fail_buffer_growth = fail;
    }

    /// Queue an event for `poll_event`
    pub fn push_event(&mut self, event: DeviceEvent) {
        self.events.push_back(event);
    }

    /// Commands recorded so far
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drain the recorded commands
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of recorded draw calls of any kind
    pub fn draw_call_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    DeviceCommand::Draw { .. }
                        | DeviceCommand::DrawInstancedBuffer { .. }
                        | DeviceCommand::MultiDraw { .. }
                )
            })
            .count()
    }

    /// Contents of a live buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Number of live buffers
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live queries
    pub fn live_query_count(&self) -> usize {
        self.queries.len()
    }

    /// Frames presented through `swap_buffers`
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl RenderDevice for HeadlessDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, _usage: BufferUsage, size: usize) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next_handle());
        self.buffers.insert(handle, vec![0; size]);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> BackendResult<()> {
        let storage = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RenderError::InvalidHandle(format!("buffer {buffer:?}")))?;
        let end = offset + data.len();
        if end > storage.len() {
            return Err(RenderError::ResourceCreationFailed(format!(
                "write of {} bytes at {} overflows buffer {:?} ({} bytes)",
                data.len(),
                offset,
                buffer,
                storage.len()
            )));
        }
        storage[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn resize_buffer(&mut self, buffer: BufferHandle, new_size: usize) -> BackendResult<()> {
        if self.fail_buffer_growth {
            return Err(RenderError::ResourceCreationFailed(format!(
                "resize of buffer {buffer:?} to {new_size} bytes refused"
            )));
        }
        let storage = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RenderError::InvalidHandle(format!("buffer {buffer:?}")))?;
        storage.resize(new_size, 0);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn apply_pass(&mut self, material: &Material, pass: &MaterialPass) -> BoundState {
        self.commands.push(DeviceCommand::ApplyPass(material.id));
        BoundState {
            texture_units: pass.texture_units(),
            uniform_blocks: pass.uniform_blocks(),
        }
    }

    fn set_node_matrices(&mut self, model: &Mat4, _normal: &Mat3) {
        self.commands.push(DeviceCommand::SetNodeMatrices(*model));
    }

    fn bind_chunk(&mut self, chunk: &MeshChunk) {
        self.commands.push(DeviceCommand::BindChunk(chunk.handle()));
    }

    fn draw(&mut self, chunk: &MeshChunk, instances: u32) {
        self.commands.push(DeviceCommand::Draw {
            chunk: chunk.handle(),
            instances,
        });
    }

    fn draw_instanced_buffer(&mut self, chunk: &MeshChunk, instances: BufferHandle, count: u32) {
        self.commands.push(DeviceCommand::DrawInstancedBuffer {
            chunk: chunk.handle(),
            buffer: instances,
            count,
        });
    }

    fn multi_draw(&mut self, mesh: MeshId, records: BufferHandle, commands: &[DrawIndirectCommand]) {
        self.commands.push(DeviceCommand::MultiDraw {
            mesh,
            records,
            commands: commands.to_vec(),
        });
    }

    fn set_proxy_state(&mut self, enabled: bool) {
        self.commands.push(DeviceCommand::ProxyState(enabled));
    }

    fn create_query(&mut self) -> BackendResult<QueryHandle> {
        if !self.capabilities.contains(DeviceCapabilities::OCCLUSION_QUERY) {
            return Err(RenderError::UnsupportedFeature("occlusion queries".to_string()));
        }
        let handle = QueryHandle(self.next_handle());
        self.queries.insert(handle, QueryState::default());
        Ok(handle)
    }

    fn begin_query(&mut self, query: QueryHandle) {
        self.commands.push(DeviceCommand::BeginQuery(query));
    }

    fn end_query(&mut self, query: QueryHandle) {
        if let Some(state) = self.queries.get_mut(&query) {
            state.issued = true;
        }
        self.commands.push(DeviceCommand::EndQuery(query));
    }

    fn poll_query(&mut self, query: QueryHandle) -> Option<bool> {
        let state = self.queries.get(&query)?;
        if !state.issued {
            return None;
        }
        state.result.or(self.default_query_result)
    }

    fn destroy_query(&mut self, query: QueryHandle) {
        self.queries.remove(&query);
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle, _width: u32, _height: u32) {
        self.commands.push(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn select_layers(&mut self, layers: &[u32]) {
        self.commands.push(DeviceCommand::SelectLayers(layers.to_vec()));
    }

    fn set_output_state(&mut self, flags: RenderFlags) {
        self.commands.push(DeviceCommand::OutputState(flags));
    }

    fn clear(&mut self, mask: ClearFlags, _color: [f32; 4]) {
        self.commands.push(DeviceCommand::Clear(mask));
    }

    fn poll_event(&mut self) -> Option<DeviceEvent> {
        self.events.pop_front()
    }

    fn swap_buffers(&mut self) {
        self.frames_presented += 1;
        self.commands.push(DeviceCommand::SwapBuffers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pending_until_issued() {
        let mut device = HeadlessDevice::new();
        let query = device.create_query().unwrap();
        assert_eq!(device.poll_query(query), None);

        device.begin_query(query);
        device.end_query(query);
        assert_eq!(device.poll_query(query), Some(true));

        device.set_query_result(query, false);
        assert_eq!(device.poll_query(query), Some(false));
    }

    #[test]
    fn test_queries_need_capability() {
        let mut device = HeadlessDevice::with_capabilities(DeviceCapabilities::empty());
        assert!(matches!(device.create_query(), Err(RenderError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_write_out_of_range_rejected() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(BufferUsage::InstanceAttributes, 4).unwrap();
        assert!(device.write_buffer(buffer, 2, &[0; 4]).is_err());
        assert!(device.write_buffer(buffer, 0, &[1; 4]).is_ok());
    }

    #[test]
    fn test_events_pop_in_order() {
        let mut device = HeadlessDevice::new();
        device.push_event(DeviceEvent::KeyDown(1));
        device.push_event(DeviceEvent::Quit);
        assert_eq!(device.poll_event(), Some(DeviceEvent::KeyDown(1)));
        assert_eq!(device.poll_event(), Some(DeviceEvent::Quit));
        assert_eq!(device.poll_event(), None);
    }
}
