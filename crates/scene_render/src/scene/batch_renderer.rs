//! Batch emission for sorted render stages
//!
//! Turns a stage of [`StageEntry`] values into device draw calls using one of
//! three strategies:
//!
//! - **Naive**: one draw per entry, instanced when the entry asks for more
//!   than one instance.
//! - **Instancing**: runs of entries sharing material and chunk are merged;
//!   their world matrices go to the scene's instance buffer and the run is
//!   drawn with one instanced call. The end of a run is a batch crop.
//! - **MultiRender**: entries become indirect draw commands pointing at their
//!   invocation records. Commands are flushed whenever program, sidedness,
//!   polygon mode or mesh changes. Each record describes a single instance,
//!   so entries with more than one instance are drawn directly.
//!
//! With `OCCLUSION_QUERY` both batching strategies fall back to naive draws,
//! since every query has to bracket the draw of its own node.

use crate::foundation::collections::SlotMap;
use crate::foundation::math::utils;
use crate::render::backend::{DrawIndirectCommand, RenderDevice};
use crate::render::buffer::GpuBuffer;
use crate::render::flags::RenderFlags;
use crate::render::primitives::{CameraId, ChunkHandle, MeshChunk, MeshId, MeshRegistry};
use crate::render::resources::materials::{MaterialId, MaterialRegistry, PolygonMode, ProgramId};
use crate::render::{RenderError, RenderResult};
use crate::scene::invocation::InvocationBuffer;
use crate::scene::observer::{DrawEvent, SceneObserver};
use crate::scene::render_queue::StageEntry;
use crate::scene::render_unit::{RenderNode, RenderNodeId};
use crate::scene::scene_graph::SceneGraph;
use crate::scene::scene_renderer::SceneStats;

/// How a stage is turned into draw calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// One draw per entry
    Naive,
    /// Merge runs of equal material and chunk into instanced draws
    Instancing,
    /// Indirect multi-draw over invocation records
    MultiRender,
}

impl BatchStrategy {
    /// Strategy for a scene with multirender `enabled`, rendering with `flags`
    pub fn select(multirender: bool, flags: RenderFlags) -> Self {
        if flags.contains(RenderFlags::OCCLUSION_QUERY) {
            Self::Naive
        } else if multirender {
            Self::MultiRender
        } else if flags.contains(RenderFlags::INSTANCING) {
            Self::Instancing
        } else {
            Self::Naive
        }
    }
}

/// State shared by consecutive indirect draw commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MultiDrawKey {
    program: Option<ProgramId>,
    double_sided: bool,
    polygon_mode: PolygonMode,
    mesh: MeshId,
}

/// Emits draw calls for the stages of one look
pub(crate) struct BatchEmitter<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub observer: &'a mut dyn SceneObserver,
    pub graph: &'a SceneGraph,
    pub render_nodes: &'a mut SlotMap<RenderNodeId, RenderNode>,
    pub materials: &'a MaterialRegistry,
    pub meshes: &'a MeshRegistry,
    pub camera_id: CameraId,
    pub pass: u16,
    pub flags: RenderFlags,
    pub stats: &'a mut SceneStats,
    pub instance_buffer: &'a mut GpuBuffer,
    pub instance_scratch: &'a mut Vec<[[f32; 4]; 4]>,
    pub records: Option<&'a InvocationBuffer>,
    pub current_material: Option<MaterialId>,
    pub bound_chunk: Option<ChunkHandle>,
}

impl<'a> BatchEmitter<'a> {
    /// Draw every entry of a stage
    pub fn emit(&mut self, strategy: BatchStrategy, entries: &[StageEntry]) -> RenderResult<()> {
        match strategy {
            BatchStrategy::Naive => self.emit_naive(entries),
            BatchStrategy::Instancing => self.emit_instanced(entries),
            BatchStrategy::MultiRender => self.emit_multirender(entries),
        }
    }

    fn emit_naive(&mut self, entries: &[StageEntry]) -> RenderResult<()> {
        for entry in entries {
            self.draw_single(entry)?;
        }
        Ok(())
    }

    fn emit_instanced(&mut self, entries: &[StageEntry]) -> RenderResult<()> {
        let mut start = 0;
        while start < entries.len() {
            let first = &entries[start];
            if first.proxy || first.instances > 1 {
                self.draw_single(first)?;
                start += 1;
                continue;
            }

            let mut end = start + 1;
            while end < entries.len() && mergeable(first, &entries[end]) {
                end += 1;
            }
            self.flush_instanced(&entries[start..end])?;
            self.stats.batch_crops += 1;
            start = end;
        }
        Ok(())
    }

    fn emit_multirender(&mut self, entries: &[StageEntry]) -> RenderResult<()> {
        let Some(records) = self.records else {
            log::warn!("Multirender requested without invocation records, drawing per node");
            return self.emit_naive(entries);
        };

        let materials = self.materials;
        let meshes = self.meshes;
        let mut commands: Vec<DrawIndirectCommand> = Vec::new();
        let mut batch_key: Option<MultiDrawKey> = None;

        for entry in entries {
            if entry.proxy || entry.instances > 1 {
                self.flush_multi_draw(records, batch_key, &mut commands);
                batch_key = None;
                self.draw_single(entry)?;
                continue;
            }

            let pass = materials
                .get(entry.material)
                .and_then(|material| material.drawable_pass(self.pass))
                .ok_or_else(|| missing_pass(entry.material, self.pass))?;
            let chunk = meshes
                .chunk(entry.chunk)
                .ok_or_else(|| RenderError::InvalidHandle(format!("chunk {:?}", entry.chunk)))?;

            let key = MultiDrawKey {
                program: pass.program(),
                double_sided: pass.double_sided(),
                polygon_mode: pass.polygon_mode(),
                mesh: entry.chunk.mesh,
            };
            if batch_key != Some(key) {
                self.flush_multi_draw(records, batch_key, &mut commands);
                self.apply_material(entry.material)?;
                batch_key = Some(key);
            }

            let render_node = self
                .render_nodes
                .get(entry.render_node)
                .ok_or_else(|| RenderError::InvalidHandle(format!("render node {:?}", entry.render_node)))?;
            let Some(record) = render_node.invocation else {
                log::warn!("Render node {:?} has no invocation record, skipped", entry.render_node);
                continue;
            };

            let draw = DrawEvent {
                node: render_node.node,
                chunk: entry.chunk,
                material: entry.material,
                instances: 1,
            };
            if !self.observer.begin_draw_batch(&draw) {
                continue;
            }

            commands.push(DrawIndirectCommand {
                index_count: chunk.elements_count(),
                instance_count: 1,
                first_index: chunk.first_index(),
                base_vertex: chunk.base_vertex(),
                base_instance: record as u32,
            });
            self.count_geometry(chunk, 1);
        }

        self.flush_multi_draw(records, batch_key, &mut commands);
        Ok(())
    }

    fn flush_multi_draw(
        &mut self,
        records: &InvocationBuffer,
        key: Option<MultiDrawKey>,
        commands: &mut Vec<DrawIndirectCommand>,
    ) {
        let Some(key) = key else {
            return;
        };
        if commands.is_empty() {
            return;
        }

        self.device.multi_draw(key.mesh, records.buffer().handle(), commands);
        self.stats.batches_called += 1;
        self.stats.batch_crops += 1;
        self.stats.multi_draw_commands += commands.len();
        commands.clear();
    }

    /// One instanced draw for a run of mergeable entries
    fn flush_instanced(&mut self, batch: &[StageEntry]) -> RenderResult<()> {
        let Some(first) = batch.first() else {
            return Ok(());
        };
        self.apply_material(first.material)?;
        let chunk = self.bind_chunk(first.chunk)?;

        let graph = self.graph;
        self.instance_scratch.clear();
        let mut first_node = None;
        for entry in batch {
            let render_node = self
                .render_nodes
                .get(entry.render_node)
                .ok_or_else(|| RenderError::InvalidHandle(format!("render node {:?}", entry.render_node)))?;
            let node = graph
                .get(render_node.node)
                .ok_or_else(|| RenderError::InvalidHandle(format!("scene node {:?}", render_node.node)))?;
            first_node.get_or_insert(render_node.node);
            self.instance_scratch.push(utils::to_columns(node.world_matrix()));
        }

        let count = self.instance_scratch.len() as u32;
        if let Some(node) = first_node {
            let draw = DrawEvent {
                node,
                chunk: first.chunk,
                material: first.material,
                instances: count,
            };
            if !self.observer.begin_draw_batch(&draw) {
                return Ok(());
            }
        }

        let bytes: &[u8] = bytemuck::cast_slice(self.instance_scratch.as_slice());
        if let Err(e) = self.instance_buffer.sub_write(&mut *self.device, 0, bytes) {
            log::warn!("Instance buffer update failed, skipping batch of {}: {}", count, e);
            return Ok(());
        }

        self.device
            .draw_instanced_buffer(chunk, self.instance_buffer.handle(), count);
        self.stats.instanced_nodes += count as usize;
        self.stats.batches_called += 1;
        self.count_geometry(chunk, count);
        Ok(())
    }

    /// Immediate draw of one entry, bracketed by its occlusion query
    fn draw_single(&mut self, entry: &StageEntry) -> RenderResult<()> {
        self.apply_material(entry.material)?;
        let chunk = self.bind_chunk(entry.chunk)?;

        let graph = self.graph;
        let render_node = self
            .render_nodes
            .get_mut(entry.render_node)
            .ok_or_else(|| RenderError::InvalidHandle(format!("render node {:?}", entry.render_node)))?;
        let node = graph
            .get(render_node.node)
            .ok_or_else(|| RenderError::InvalidHandle(format!("scene node {:?}", render_node.node)))?;

        self.device.set_node_matrices(node.world_matrix(), node.normal_matrix());

        let draw = DrawEvent {
            node: render_node.node,
            chunk: entry.chunk,
            material: entry.material,
            instances: entry.instances,
        };
        if !self.observer.begin_draw_batch(&draw) {
            return Ok(());
        }

        // A query whose result is still in flight is not restarted
        let query = if self.flags.contains(RenderFlags::OCCLUSION_QUERY) {
            render_node
                .query_index(self.camera_id)
                .filter(|&index| !render_node.queries[index].pending)
        } else {
            None
        };

        if entry.proxy {
            self.device.set_proxy_state(true);
        }
        if let Some(index) = query {
            self.device.begin_query(render_node.queries[index].handle);
        }

        self.device.draw(chunk, entry.instances);

        if let Some(index) = query {
            self.device.end_query(render_node.queries[index].handle);
            render_node.queries[index].pending = true;
            self.stats.queries_issued += 1;
        }
        if entry.proxy {
            self.device.set_proxy_state(false);
        }

        self.stats.batches_called += 1;
        self.count_geometry(chunk, entry.instances);
        Ok(())
    }

    fn apply_material(&mut self, id: MaterialId) -> RenderResult<()> {
        if self.current_material == Some(id) {
            return Ok(());
        }

        let material = self
            .materials
            .get(id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("material {id:?}")))?;
        let pass = material
            .drawable_pass(self.pass)
            .ok_or_else(|| missing_pass(id, self.pass))?;

        let bound = self.device.apply_pass(material, pass);
        self.stats.material_blocks += 1;
        self.stats.texture_units_bound += bound.texture_units as usize;
        self.stats.block_units_bound += bound.uniform_blocks as usize;
        self.current_material = Some(id);
        Ok(())
    }

    fn bind_chunk(&mut self, handle: ChunkHandle) -> RenderResult<&'a MeshChunk> {
        let meshes = self.meshes;
        let chunk = meshes
            .chunk(handle)
            .ok_or_else(|| RenderError::InvalidHandle(format!("chunk {handle:?}")))?;
        if self.bound_chunk != Some(handle) {
            self.device.bind_chunk(chunk);
            self.bound_chunk = Some(handle);
        }
        Ok(chunk)
    }

    fn count_geometry(&mut self, chunk: &MeshChunk, instances: u32) {
        self.stats.triangles += chunk.triangles_count() as usize * instances as usize;
        self.stats.vertices += chunk.vertices_count() as usize * instances as usize;
    }
}

fn mergeable(first: &StageEntry, next: &StageEntry) -> bool {
    !next.proxy && next.instances <= 1 && next.chunk == first.chunk && next.material == first.material
}

fn missing_pass(material: MaterialId, pass: u16) -> RenderError {
    RenderError::InvalidHandle(format!("material {material:?} has no drawable pass {pass}"))
}
