//! # Render System
//!
//! Owns everything a frame needs: the device, material and mesh registries,
//! cameras, scenes and render targets. [`RenderSystem::run_frame`] drives
//! one frame:
//!
//! 1. `pre_frame` on the listener
//! 2. Every enabled target in ascending priority: pre-update hook, bind and
//!    clear its framebuffer, render its looks, post-update hook
//! 3. Clear camera and mesh invalidation flags
//! 4. `post_frame`, then at most one pending device event
//! 5. Present and tick the frame timer
//! 6. Sleep out the frame budget when `engine.target_fps` is set
//!
//! The screen target is created with the system and carries the highest
//! priority, so offscreen targets render before it.

use crate::core::{RenderSystemConfig, SceneConfig};
use crate::foundation::collections::{new_key_type, SlotMap};
use crate::foundation::time::{FramePacer, Timer};
use crate::render::backend::{DeviceEvent, FramebufferHandle, RenderDevice};
use crate::render::primitives::{Camera, CameraId, ChunkHandle, MeshRegistry};
use crate::render::resources::materials::{MaterialId, MaterialRegistry};
use crate::render::target::{Look, RenderTarget, TargetState};
use crate::render::{RenderError, RenderResult};
use crate::scene::{FrameResources, NodeId, RenderNodeId, Scene, SceneNode, SceneStats};

new_key_type! {
    /// Identifier of a scene owned by a [`RenderSystem`]
    pub struct SceneId;

    /// Identifier of a render target owned by a [`RenderSystem`]
    pub struct TargetId;
}

/// Priority of the screen target
pub const SCREEN_PRIORITY: i32 = 0x0FFF_FFFF;

/// Per-frame callbacks
///
/// Returning `false` from `pre_frame`, `post_frame` or `process_event` stops
/// the loop once the current frame is presented.
pub trait FrameListener<D: RenderDevice> {
    /// Called before any target renders
    fn pre_frame(&mut self, _system: &mut RenderSystem<D>) -> bool {
        true
    }

    /// Called after every target rendered, before invalidation flags are cleared
    fn post_render(&mut self, _system: &mut RenderSystem<D>) {}

    /// Called after the frame rendered
    fn post_frame(&mut self, _system: &mut RenderSystem<D>) -> bool {
        true
    }

    /// Called with the device event polled this frame
    fn process_event(&mut self, _system: &mut RenderSystem<D>, event: &DeviceEvent) -> bool {
        !matches!(event, DeviceEvent::Quit)
    }
}

/// Frame timing and per-frame draw counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    /// Frames completed
    pub frames: u64,
    /// Duration of the last frame in milliseconds, pacing included
    pub last_frame_ms: f32,
    /// Time the last frame slept to hold the target frame rate, in milliseconds
    pub idle_ms: f32,
    /// Running average frame duration in milliseconds
    pub average_frame_ms: f32,
    /// Shortest frame in milliseconds
    pub best_frame_ms: f32,
    /// Longest frame in milliseconds
    pub worst_frame_ms: f32,
    /// Frames per second derived from the last frame
    pub fps: f32,
    /// Triangles drawn last frame
    pub triangles: usize,
    /// Vertices drawn last frame
    pub vertices: usize,
    /// Draw calls issued last frame
    pub batches: usize,
    /// Material passes applied last frame
    pub materials: usize,
    /// Texture units bound last frame
    pub texture_units: usize,
    /// Uniform blocks bound last frame
    pub block_units: usize,
    /// Render nodes culled last frame
    pub nodes_culled: usize,
    /// Average triangles per draw call last frame
    pub triangles_per_batch: f32,
    /// Targets rendered last frame
    pub render_targets: usize,
}

impl RenderStats {
    fn begin_frame(&mut self) {
        self.triangles = 0;
        self.vertices = 0;
        self.batches = 0;
        self.materials = 0;
        self.texture_units = 0;
        self.block_units = 0;
        self.nodes_culled = 0;
        self.render_targets = 0;
    }

    fn accumulate(&mut self, scene: &SceneStats) {
        self.triangles += scene.triangles;
        self.vertices += scene.vertices;
        self.batches += scene.batches_called;
        self.materials += scene.material_blocks;
        self.texture_units += scene.texture_units_bound;
        self.block_units += scene.block_units_bound;
        self.nodes_culled += scene.nodes_culled;
    }

    fn end_frame(&mut self, frame_ms: f32, idle_ms: f32) {
        self.frames += 1;
        self.last_frame_ms = frame_ms;
        self.idle_ms = idle_ms;
        if self.frames == 1 {
            self.average_frame_ms = frame_ms;
            self.best_frame_ms = frame_ms;
            self.worst_frame_ms = frame_ms;
        } else {
            self.average_frame_ms += (frame_ms - self.average_frame_ms) / self.frames as f32;
            self.best_frame_ms = self.best_frame_ms.min(frame_ms);
            self.worst_frame_ms = self.worst_frame_ms.max(frame_ms);
        }
        self.fps = if frame_ms > 0.0 { 1000.0 / frame_ms } else { 0.0 };
        self.triangles_per_batch = if self.batches > 0 {
            self.triangles as f32 / self.batches as f32
        } else {
            0.0
        };
    }
}

/// Frame driver owning devices, registries, cameras, scenes and targets
pub struct RenderSystem<D: RenderDevice> {
    config: RenderSystemConfig,
    device: D,
    materials: MaterialRegistry,
    meshes: MeshRegistry,
    cameras: SlotMap<CameraId, Camera>,
    scenes: SlotMap<SceneId, Scene>,
    targets: SlotMap<TargetId, RenderTarget>,
    target_order: Vec<TargetId>,
    screen: TargetId,
    stats: RenderStats,
    timer: Timer,
    pacer: FramePacer,
    running: bool,
    active: bool,
}

impl<D: RenderDevice> RenderSystem<D> {
    /// Create a render system with its screen target
    pub fn new(config: RenderSystemConfig, device: D) -> RenderResult<Self> {
        config
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let mut screen_target = RenderTarget::new(
            FramebufferHandle::SCREEN,
            config.screen.width,
            config.screen.height,
            SCREEN_PRIORITY,
        );
        screen_target.set_clear(screen_target.clear_mask(), config.screen.clear_color);

        let mut targets = SlotMap::with_key();
        let screen = targets.insert(screen_target);

        log::info!(
            "Render system created ({}x{}, target fps: {:?}, capabilities: {:?})",
            config.screen.width,
            config.screen.height,
            config.engine.target_fps,
            device.capabilities()
        );
        let pacer = FramePacer::new(config.engine.target_fps);

        Ok(Self {
            config,
            device,
            materials: MaterialRegistry::new(),
            meshes: MeshRegistry::new(),
            cameras: SlotMap::with_key(),
            scenes: SlotMap::with_key(),
            targets,
            target_order: vec![screen],
            screen,
            stats: RenderStats::default(),
            timer: Timer::new(),
            pacer,
            running: true,
            active: true,
        })
    }

    /// System configuration
    pub fn config(&self) -> &RenderSystemConfig {
        &self.config
    }

    /// Render device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable render device
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Material registry
    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// Mutable material registry
    pub fn materials_mut(&mut self) -> &mut MaterialRegistry {
        &mut self.materials
    }

    /// Mesh registry
    pub fn meshes(&self) -> &MeshRegistry {
        &self.meshes
    }

    /// Mutable mesh registry
    pub fn meshes_mut(&mut self) -> &mut MeshRegistry {
        &mut self.meshes
    }

    /// Statistics of the last frame
    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Frame timer
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    // Cameras

    /// Add a camera
    pub fn create_camera(&mut self, camera: Camera) -> CameraId {
        self.cameras.insert(camera)
    }

    /// Camera by id
    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id)
    }

    /// Mutable camera by id
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(id)
    }

    /// Remove a camera and every look through it
    pub fn remove_camera(&mut self, id: CameraId) -> Option<Camera> {
        let camera = self.cameras.remove(id)?;
        let detached: usize = self
            .targets
            .values_mut()
            .map(|target| target.detach_camera(id))
            .sum();
        log::debug!("Removed camera {:?} and {} looks", id, detached);
        Some(camera)
    }

    // Scenes

    /// Create a scene with the system's default scene configuration
    pub fn create_scene(&mut self) -> RenderResult<SceneId> {
        let config = self.config.scene.clone();
        self.create_scene_with(config)
    }

    /// Create a scene with its own configuration
    pub fn create_scene_with(&mut self, config: SceneConfig) -> RenderResult<SceneId> {
        let scene = Scene::new(config, &mut self.device)?;
        Ok(self.scenes.insert(scene))
    }

    /// Scene by id
    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    /// Mutable scene by id
    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.get_mut(id)
    }

    /// Remove a scene, its looks and its GPU resources
    pub fn remove_scene(&mut self, id: SceneId) -> RenderResult<()> {
        let scene = self
            .scenes
            .remove(id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("scene {id:?}")))?;
        for target in self.targets.values_mut() {
            target.detach_scene(id);
        }
        scene.release(&mut self.device);
        log::debug!("Removed scene {:?}", id);
        Ok(())
    }

    /// Add a node to a scene
    pub fn add_node(&mut self, scene: SceneId, node: SceneNode, parent: Option<NodeId>) -> RenderResult<NodeId> {
        self.scene_entry(scene)?.add_node(node, parent)
    }

    /// Remove a node and its render nodes from a scene
    pub fn remove_node(&mut self, scene: SceneId, node: NodeId) -> RenderResult<SceneNode> {
        let scene = self
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RenderError::InvalidHandle(format!("scene {scene:?}")))?;
        scene.remove_node(&mut self.device, node)
    }

    /// Draw `chunk` on `node` of `scene` with `material`
    pub fn touch_material(
        &mut self,
        scene: SceneId,
        node: NodeId,
        chunk: ChunkHandle,
        material: MaterialId,
        instances: u32,
    ) -> RenderResult<RenderNodeId> {
        if self.materials.get(material).is_none() {
            return Err(RenderError::InvalidHandle(format!("material {material:?}")));
        }
        let scene = self
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RenderError::InvalidHandle(format!("scene {scene:?}")))?;
        scene.touch_material(&mut self.device, &self.meshes, node, chunk, material, instances)
    }

    /// Set the chunk drawn for an occluded render node of `scene`
    pub fn set_proxy_chunk(
        &mut self,
        scene: SceneId,
        render_node: RenderNodeId,
        proxy: Option<ChunkHandle>,
    ) -> RenderResult<()> {
        let scene = self
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RenderError::InvalidHandle(format!("scene {scene:?}")))?;
        scene.set_proxy_chunk(&self.meshes, render_node, proxy)
    }

    fn scene_entry(&mut self, id: SceneId) -> RenderResult<&mut Scene> {
        self.scenes
            .get_mut(id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("scene {id:?}")))
    }

    // Targets

    /// Add an offscreen target
    pub fn create_target(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32, priority: i32) -> TargetId {
        let id = self
            .targets
            .insert(RenderTarget::new(framebuffer, width, height, priority));
        let targets = &self.targets;
        let position = self.target_order.partition_point(|other| {
            targets
                .get(*other)
                .is_some_and(|target| target.priority() <= priority)
        });
        self.target_order.insert(position, id);
        id
    }

    /// Remove an offscreen target; the screen target cannot be removed
    pub fn remove_target(&mut self, id: TargetId) -> RenderResult<RenderTarget> {
        if id == self.screen {
            return Err(RenderError::InvalidHandle("the screen target cannot be removed".to_string()));
        }
        let target = self
            .targets
            .remove(id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("target {id:?}")))?;
        self.target_order.retain(|&other| other != id);
        Ok(target)
    }

    /// Target by id
    pub fn target(&self, id: TargetId) -> Option<&RenderTarget> {
        self.targets.get(id)
    }

    /// Mutable target by id
    pub fn target_mut(&mut self, id: TargetId) -> Option<&mut RenderTarget> {
        self.targets.get_mut(id)
    }

    /// Screen target id
    pub fn screen(&self) -> TargetId {
        self.screen
    }

    /// Screen target
    pub fn screen_target(&self) -> Option<&RenderTarget> {
        self.targets.get(self.screen)
    }

    /// Mutable screen target
    pub fn screen_target_mut(&mut self) -> Option<&mut RenderTarget> {
        self.targets.get_mut(self.screen)
    }

    /// Targets in render order
    pub fn target_order(&self) -> &[TargetId] {
        &self.target_order
    }

    /// Attach a look to a target after checking its camera and scene exist
    pub fn attach_look(&mut self, target: TargetId, look: Look) -> RenderResult<()> {
        if !self.cameras.contains_key(look.camera) {
            return Err(RenderError::InvalidHandle(format!("camera {:?}", look.camera)));
        }
        if !self.scenes.contains_key(look.scene) {
            return Err(RenderError::InvalidHandle(format!("scene {:?}", look.scene)));
        }
        self.targets
            .get_mut(target)
            .ok_or_else(|| RenderError::InvalidHandle(format!("target {target:?}")))?
            .attach_look(look)
    }

    // Loop control

    /// Stop the loop at the next frame boundary
    pub fn stop(&mut self) {
        log::info!("Render loop stop requested");
        self.running = false;
    }

    /// Whether the loop keeps running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Skip scene rendering while still pumping events and presenting
    pub fn suspend(&mut self) {
        self.active = false;
    }

    /// Render scenes again after [`RenderSystem::suspend`]
    pub fn resume(&mut self) {
        self.active = true;
    }

    /// Whether scenes are rendered
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Run frames until a listener callback or [`RenderSystem::stop`] ends the loop
    pub fn run<L: FrameListener<D>>(&mut self, listener: &mut L) -> RenderResult<()> {
        log::info!("Starting render loop...");
        while self.run_frame(listener)? {}
        log::info!(
            "Render loop finished after {} frames (avg {:.2} ms)",
            self.stats.frames,
            self.stats.average_frame_ms
        );
        Ok(())
    }

    /// Run one frame; returns whether the loop should continue
    pub fn run_frame<L: FrameListener<D>>(&mut self, listener: &mut L) -> RenderResult<bool> {
        if !self.running {
            return Ok(false);
        }
        self.pacer.begin_frame();

        if !listener.pre_frame(self) {
            self.running = false;
            return Ok(false);
        }

        self.stats.begin_frame();
        if self.active {
            self.stats.render_targets = self.render_targets()?;
            listener.post_render(self);

            for camera in self.cameras.values_mut() {
                camera.validate();
            }
            self.meshes.validate_all();
        }

        if !listener.post_frame(self) {
            self.running = false;
        }

        if let Some(event) = self.device.poll_event() {
            if let DeviceEvent::Resized { width, height } = event {
                if let Some(screen) = self.targets.get_mut(self.screen) {
                    screen.resize(width, height);
                }
            }
            if !listener.process_event(self, &event) {
                self.running = false;
            }
        }

        self.device.swap_buffers();
        self.timer.tick();
        let idle = self.pacer.finish_frame();
        self.stats
            .end_frame(self.pacer.elapsed().as_secs_f32() * 1000.0, idle.as_secs_f32() * 1000.0);
        log::trace!(
            "Frame {}: {} batches, {} triangles",
            self.timer.frame_count(),
            self.stats.batches,
            self.stats.triangles
        );
        Ok(self.running)
    }

    fn render_targets(&mut self) -> RenderResult<usize> {
        let Self {
            device,
            materials,
            meshes,
            cameras,
            scenes,
            targets,
            target_order,
            stats,
            ..
        } = self;

        let mut rendered = 0;
        for &target_id in target_order.iter() {
            let Some(target) = targets.get_mut(target_id) else {
                continue;
            };
            if !target.is_enabled() {
                continue;
            }

            target.state = TargetState::PreUpdate;
            let proceed = target.pre_update.as_mut().map_or(true, |hook| hook(target_id));
            if !proceed {
                target.state = TargetState::Enabled;
                continue;
            }

            target.state = TargetState::Updating;
            device.bind_framebuffer(target.framebuffer(), target.width(), target.height());
            if !target.clear_mask().is_empty() {
                device.clear(target.clear_mask(), target.clear_color());
            }

            let mut failure = None;
            for look in target.looks() {
                let (Some(scene), Some(camera)) = (scenes.get_mut(look.scene), cameras.get_mut(look.camera)) else {
                    log::warn!("Look on target {:?} references a removed camera or scene", target_id);
                    continue;
                };

                device.select_layers(&look.layers);
                device.set_output_state(look.flags);
                let clear = look.flags.clear_flags();
                if !clear.is_empty() {
                    device.clear(clear, target.clear_color());
                }

                let mut resources = FrameResources {
                    device: &mut *device,
                    materials: &*materials,
                    meshes: &*meshes,
                };
                match scene.render(&mut resources, look.camera, camera, look.pass, look.flags) {
                    Ok(scene_stats) => stats.accumulate(scene_stats),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                target.state = TargetState::Enabled;
                log::error!("Scene render failed on target {:?}: {}", target_id, e);
                return Err(e);
            }

            target.state = TargetState::PostUpdate;
            if let Some(hook) = target.post_update.as_mut() {
                hook(target_id);
            }
            target.state = TargetState::Enabled;
            rendered += 1;
        }
        Ok(rendered)
    }

    /// Release every scene and hand back the device
    pub fn shutdown(mut self) -> D {
        let scenes: Vec<SceneId> = self.scenes.keys().collect();
        for id in scenes {
            if let Some(scene) = self.scenes.remove(id) {
                scene.release(&mut self.device);
            }
        }
        log::info!("Render system shut down");
        self.device
    }
}
