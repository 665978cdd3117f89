//! Per-look scene render
//!
//! [`Scene::render`] runs one look of a scene:
//! 1. Refresh the camera and update the node hierarchy
//! 2. Build the opaque and blended stages from the material units, updating
//!    cached bounds, distances and invocation records only where something
//!    changed, and culling each candidate
//! 3. Sort the stages and emit them with the scene's batch strategy
//! 4. Clear the invalidated flags of nodes rebuilt during this render

use crate::render::backend::RenderDevice;
use crate::render::flags::RenderFlags;
use crate::render::primitives::{Camera, CameraId, MeshRegistry};
use crate::render::resources::materials::MaterialRegistry;
use crate::render::{RenderError, RenderResult};
use crate::scene::batch_renderer::{BatchEmitter, BatchStrategy};
use crate::scene::culling::{self, CullContext, Visibility};
use crate::scene::invocation::InvocationRecord;
use crate::scene::render_queue::{Stage, StageEntry};
use crate::scene::scene_manager::Scene;

/// Counters gathered during one scene render
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneStats {
    /// Triangles drawn
    pub triangles: usize,
    /// Vertices drawn
    pub vertices: usize,
    /// Scene nodes visited by the hierarchy update
    pub nodes_total: usize,
    /// Render nodes that were candidates for a requested stage
    pub batches_total: usize,
    /// Draw calls issued
    pub batches_called: usize,
    /// Batches closed by the instancing or multi-draw emitters
    pub batch_crops: usize,
    /// Render nodes drawn through instanced batches
    pub instanced_nodes: usize,
    /// Indirect commands submitted
    pub multi_draw_commands: usize,
    /// Material passes applied
    pub material_blocks: usize,
    /// Material units with a drawable pass for the look
    pub materials_passed: usize,
    /// Texture units bound by material passes
    pub texture_units_bound: usize,
    /// Uniform blocks bound by material passes
    pub block_units_bound: usize,
    /// World-space bounds recomputed
    pub bounds_recomputed: usize,
    /// Camera distances recomputed
    pub distances_recomputed: usize,
    /// Invocation records uploaded
    pub records_uploaded: usize,
    /// Render nodes rejected by culling
    pub nodes_culled: usize,
    /// Occlusion queries created
    pub queries_created: usize,
    /// Occlusion queries issued around draws
    pub queries_issued: usize,
}

/// Shared resources a scene renders with
pub struct FrameResources<'a> {
    /// Device receiving draw calls
    pub device: &'a mut dyn RenderDevice,
    /// Materials referenced by render nodes
    pub materials: &'a MaterialRegistry,
    /// Meshes referenced by render nodes
    pub meshes: &'a MeshRegistry,
}

impl Scene {
    /// Render this scene through `camera` with material pass `pass`
    ///
    /// The camera is refreshed first; its invalidated flag is left for the
    /// caller to clear once every look using it this frame has rendered.
    pub fn render(
        &mut self,
        resources: &mut FrameResources<'_>,
        camera_id: CameraId,
        camera: &mut Camera,
        pass: u16,
        flags: RenderFlags,
    ) -> RenderResult<&SceneStats> {
        self.stats = SceneStats::default();
        camera.refresh_view_projection();
        let camera: &Camera = camera;

        if !self.observer.begin_scene_render(camera) {
            log::trace!("Scene render skipped by observer");
            return Ok(&self.stats);
        }

        self.stats.nodes_total = self.graph.update(&mut self.invalidated);

        let result = self
            .build_queue(resources, camera_id, camera, pass, flags)
            .and_then(|()| self.emit_stages(resources, camera_id, camera, pass, flags));

        self.queue.clear();
        self.graph.validate(&mut self.invalidated);
        result?;

        self.observer.end_scene_render(camera);
        log::trace!(
            "Scene rendered: {} batches, {} triangles, {} culled",
            self.stats.batches_called,
            self.stats.triangles,
            self.stats.nodes_culled
        );
        Ok(&self.stats)
    }

    fn build_queue(
        &mut self,
        resources: &mut FrameResources<'_>,
        camera_id: CameraId,
        camera: &Camera,
        pass: u16,
        flags: RenderFlags,
    ) -> RenderResult<()> {
        let Self {
            graph,
            units,
            render_nodes,
            queue,
            invocations,
            observer,
            stats,
            ..
        } = self;
        let device = &mut *resources.device;
        let ctx = CullContext {
            flags,
            camera_id,
            camera,
        };

        for unit in units.iter() {
            let material = resources
                .materials
                .get(unit.material())
                .ok_or_else(|| RenderError::InvalidHandle(format!("material {:?}", unit.material())))?;
            let drawable = material.drawable_pass(pass);
            let mut unit_passed = false;

            for &id in unit.nodes() {
                let Some(render_node) = render_nodes.get_mut(id) else {
                    continue;
                };
                let Some(scene_node) = graph.get(render_node.node) else {
                    continue;
                };
                let mesh = resources
                    .meshes
                    .get(render_node.chunk.mesh)
                    .ok_or_else(|| RenderError::InvalidHandle(format!("mesh {:?}", render_node.chunk.mesh)))?;
                let chunk = mesh
                    .chunk(render_node.chunk.index)
                    .ok_or_else(|| RenderError::InvalidHandle(format!("chunk {:?}", render_node.chunk)))?;

                let node_changed = scene_node.is_invalidated() || mesh.is_invalidated();

                if node_changed {
                    render_node.bounds = chunk.bounds().transformed(scene_node.world_matrix());
                    render_node.distances.clear();
                    stats.bounds_recomputed += 1;
                }

                let cached = if camera.is_invalidated() {
                    None
                } else {
                    render_node.distance_for(camera_id)
                };
                let distance = match cached {
                    Some(distance) => distance,
                    None => {
                        let distance = camera.distance_to(&render_node.bounds.center());
                        render_node.set_distance(camera_id, distance);
                        stats.distances_recomputed += 1;
                        distance
                    }
                };

                // The record holds one view-projection, so a second camera rewrites it
                let record_stale =
                    node_changed || camera.is_invalidated() || render_node.record_camera != Some(camera_id);
                if record_stale {
                    if let (Some(records), Some(slot)) = (invocations.as_mut(), render_node.invocation) {
                        let record = InvocationRecord::new(
                            scene_node.world_matrix(),
                            scene_node.normal_matrix(),
                            camera.view_projection(),
                            unit.material(),
                        );
                        match records.write(device, slot, &record) {
                            Ok(()) => {
                                render_node.record_camera = Some(camera_id);
                                stats.records_uploaded += 1;
                            }
                            Err(e) => {
                                render_node.record_camera = None;
                                log::warn!("Invocation record {} not updated: {}", slot, e);
                            }
                        }
                    }
                }

                let Some(pass_state) = drawable else {
                    continue;
                };
                if !scene_node.enabled || !scene_node.renderable {
                    continue;
                }
                unit_passed = true;

                let stage = if pass_state.is_blended() {
                    Stage::Transparent
                } else {
                    Stage::Opaque
                };
                let requested = match stage {
                    Stage::Opaque => flags.contains(RenderFlags::OPAQUE),
                    Stage::Transparent => flags.contains(RenderFlags::TRANSPARENT),
                };
                if !requested {
                    continue;
                }
                stats.batches_total += 1;

                let node_id = render_node.node;
                let visibility =
                    culling::check_visibility(&ctx, device, observer.as_mut(), render_node, chunk, stats);
                let (draw_chunk, proxy) = match visibility {
                    Visibility::Rejected => {
                        stats.nodes_culled += 1;
                        continue;
                    }
                    Visibility::Occluded => (render_node.proxy_chunk.unwrap_or(render_node.chunk), true),
                    Visibility::Visible => {
                        if let Some(scene_node) = graph.get_mut(node_id) {
                            scene_node.set_visible(true);
                        }
                        (render_node.chunk, false)
                    }
                };

                queue.push(
                    stage,
                    StageEntry {
                        render_node: id,
                        material: unit.material(),
                        chunk: draw_chunk,
                        distance,
                        instances: render_node.instances,
                        proxy,
                    },
                );
            }

            if unit_passed {
                stats.materials_passed += 1;
            }
        }
        Ok(())
    }

    fn emit_stages(
        &mut self,
        resources: &mut FrameResources<'_>,
        camera_id: CameraId,
        camera: &Camera,
        pass: u16,
        flags: RenderFlags,
    ) -> RenderResult<()> {
        let strategy = BatchStrategy::select(self.config.multirender, flags);
        self.queue.sort(flags);

        let Self {
            graph,
            render_nodes,
            queue,
            invocations,
            observer,
            stats,
            instance_buffer,
            instance_scratch,
            ..
        } = self;

        let mut emitter = BatchEmitter {
            device: &mut *resources.device,
            observer: observer.as_mut(),
            graph: &*graph,
            render_nodes,
            materials: resources.materials,
            meshes: resources.meshes,
            camera_id,
            pass,
            flags,
            stats,
            instance_buffer,
            instance_scratch,
            records: invocations.as_ref(),
            current_material: None,
            bound_chunk: None,
        };

        if flags.contains(RenderFlags::OPAQUE) {
            emitter.observer.begin_opaque_stage_render(camera);
            emitter.emit(strategy, queue.opaque())?;
        }
        if flags.contains(RenderFlags::TRANSPARENT) {
            emitter.observer.begin_blending_stage_render(camera);
            emitter.emit(strategy, queue.transparent())?;
        }
        Ok(())
    }
}
