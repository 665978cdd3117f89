//! Headless orbit demo
//!
//! A sun with orbiting planets and moons, plus a ring of asteroids drawn
//! through CPU instancing. The main camera circles the system while a
//! top-down minimap target renders first with occlusion culling.
//!
//! Usage: `orbit_demo [config.toml|config.ron] [frames]`

use rand::prelude::*;
use scene_render::core::ConfigError;
use scene_render::foundation::logging;
use scene_render::foundation::math::{Quat, Transform, Vec3};
use scene_render::prelude::*;
use scene_render::render::primitives::MeshRegistry;
use scene_render::render::{AlphaMode, FramebufferHandle};
use scene_render::scene::CullEvent;
use std::cell::Cell;
use std::rc::Rc;

const DEFAULT_FRAMES: u64 = 600;
const ASTEROID_COUNT: usize = 400;
const ASTEROID_RING_INNER: f32 = 18.0;
const ASTEROID_RING_OUTER: f32 = 24.0;
const CAMERA_DISTANCE: f32 = 40.0;
const CAMERA_ORBIT_SPEED: f32 = 0.2;
const FIXED_STEP: f32 = 1.0 / 60.0;
const STATS_INTERVAL: u64 = 120;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid argument: {0}")]
    Args(String),

    #[error("Mesh '{0}' has no drawable chunk")]
    EmptyMesh(&'static str),
}

/// A body circling its parent node
struct Orbiter {
    node: NodeId,
    radius: f32,
    speed: f32,
    phase: f32,
    spin: f32,
}

/// Counts frustum rejections of the main look
#[derive(Default)]
struct CullCounter {
    rejected: Cell<usize>,
}

struct CullLogger {
    counter: Rc<CullCounter>,
}

impl SceneObserver for CullLogger {
    fn node_out_of_frustum(&mut self, _event: &CullEvent<'_>) {
        self.counter.rejected.set(self.counter.rejected.get() + 1);
    }
}

struct OrbitDemo {
    scene: SceneId,
    camera: CameraId,
    orbiters: Vec<Orbiter>,
    frames_left: u64,
    culled: Rc<CullCounter>,
}

impl OrbitDemo {
    fn advance(&self, system: &mut RenderSystem<HeadlessDevice>) {
        let time = system.timer().frame_count() as f32 * FIXED_STEP;

        if let Some(scene) = system.scene_mut(self.scene) {
            for orbiter in &self.orbiters {
                let angle = orbiter.phase + time * orbiter.speed;
                if let Some(node) = scene.node_mut(orbiter.node) {
                    node.set_position(Vec3::new(angle.cos() * orbiter.radius, 0.0, angle.sin() * orbiter.radius));
                    node.set_rotation(Quat::from_axis_angle(&Vec3::y_axis(), time * orbiter.spin));
                }
            }
        }

        if let Some(camera) = system.camera_mut(self.camera) {
            let angle = time * CAMERA_ORBIT_SPEED;
            camera.set_position(Vec3::new(
                angle.cos() * CAMERA_DISTANCE,
                CAMERA_DISTANCE * 0.4,
                angle.sin() * CAMERA_DISTANCE,
            ));
        }
    }
}

impl FrameListener<HeadlessDevice> for OrbitDemo {
    fn pre_frame(&mut self, system: &mut RenderSystem<HeadlessDevice>) -> bool {
        self.advance(system);
        true
    }

    fn post_frame(&mut self, system: &mut RenderSystem<HeadlessDevice>) -> bool {
        let stats = system.stats();
        if system.timer().frame_count() % STATS_INTERVAL == 0 {
            log::info!(
                "frame {}: {} batches, {} triangles ({:.1}/batch), {} culled by frustum",
                system.timer().frame_count(),
                stats.batches,
                stats.triangles,
                stats.triangles_per_batch,
                self.culled.rejected.get()
            );
        }
        self.frames_left = self.frames_left.saturating_sub(1);
        self.frames_left > 0
    }
}

fn cube(meshes: &mut MeshRegistry, name: &'static str, half: f32) -> Result<ChunkHandle, DemoError> {
    let id = meshes.create_mesh(name);
    let bounds = BoundingVolume::from_min_max(Vec3::new(-half, -half, -half), Vec3::new(half, half, half));
    meshes
        .get_mut(id)
        .and_then(|mesh| mesh.add_chunk(MeshChunk::new(24, 36, bounds)))
        .ok_or(DemoError::EmptyMesh(name))
}

fn sphere(meshes: &mut MeshRegistry, name: &'static str, radius: f32) -> Result<(ChunkHandle, ChunkHandle), DemoError> {
    let id = meshes.create_mesh(name);
    let bounds = BoundingVolume::from_min_max(Vec3::new(-radius, -radius, -radius), Vec3::new(radius, radius, radius));
    let mesh = meshes.get_mut(id).ok_or(DemoError::EmptyMesh(name))?;
    // full sphere followed by its bounding box as occlusion proxy
    let body = mesh
        .add_chunk(MeshChunk::new(482, 2880, bounds))
        .ok_or(DemoError::EmptyMesh(name))?;
    let proxy = mesh
        .add_chunk(MeshChunk::new(8, 36, bounds).with_range(2880, 482))
        .ok_or(DemoError::EmptyMesh(name))?;
    Ok((body, proxy))
}

fn build(system: &mut RenderSystem<HeadlessDevice>, frames: u64) -> Result<OrbitDemo, DemoError> {
    let (sun_chunk, sun_proxy) = sphere(system.meshes_mut(), "sun", 4.0)?;
    let (planet_chunk, planet_proxy) = sphere(system.meshes_mut(), "planet", 1.0)?;
    let rock_chunk = cube(system.meshes_mut(), "rock", 0.3)?;

    let materials = system.materials_mut();
    let sun_material = materials.register(
        Material::with_pass(MaterialPass::new(ProgramId(1)).with_bindings(1, 1)).with_name("sun"),
    );
    let planet_material = materials.register(
        Material::with_pass(MaterialPass::new(ProgramId(2)).with_bindings(3, 2)).with_name("planet"),
    );
    let rock_material = materials.register(
        Material::with_pass(MaterialPass::new(ProgramId(2)).with_bindings(1, 2)).with_name("rock"),
    );
    let atmosphere = materials.register(
        Material::with_pass(
            MaterialPass::new(ProgramId(3)).with_alpha_mode(AlphaMode::Blend),
        )
        .with_name("atmosphere"),
    );

    let scene = system.create_scene()?;
    let sun = system.add_node(scene, SceneNode::new(), None)?;
    let sun_node = system.touch_material(scene, sun, sun_chunk, sun_material, 1)?;
    let corona = system.add_node(
        scene,
        SceneNode::with_transform(Transform {
            scale: Vec3::new(1.2, 1.2, 1.2),
            ..Transform::identity()
        }),
        Some(sun),
    )?;
    system.touch_material(scene, corona, sun_chunk, atmosphere, 1)?;

    let mut orbiters = Vec::new();
    let mut rng = thread_rng();
    let mut proxies = vec![(sun_node, sun_proxy)];

    for (index, radius) in [8.0_f32, 12.0, 30.0].into_iter().enumerate() {
        let planet = system.add_node(scene, SceneNode::new(), Some(sun))?;
        let render_node = system.touch_material(scene, planet, planet_chunk, planet_material, 1)?;
        proxies.push((render_node, planet_proxy));
        orbiters.push(Orbiter {
            node: planet,
            radius,
            speed: 1.5 / (index as f32 + 1.0),
            phase: rng.gen_range(0.0..std::f32::consts::TAU),
            spin: 1.0,
        });

        let moon = system.add_node(
            scene,
            SceneNode::with_transform(Transform {
                scale: Vec3::new(0.3, 0.3, 0.3),
                ..Transform::identity()
            }),
            Some(planet),
        )?;
        system.touch_material(scene, moon, planet_chunk, rock_material, 1)?;
        orbiters.push(Orbiter {
            node: moon,
            radius: 2.0,
            speed: 3.0,
            phase: 0.0,
            spin: 0.0,
        });
    }

    for _ in 0..ASTEROID_COUNT {
        let asteroid = system.add_node(scene, SceneNode::new(), Some(sun))?;
        system.touch_material(scene, asteroid, rock_chunk, rock_material, 1)?;
        orbiters.push(Orbiter {
            node: asteroid,
            radius: rng.gen_range(ASTEROID_RING_INNER..ASTEROID_RING_OUTER),
            speed: rng.gen_range(0.05..0.15),
            phase: rng.gen_range(0.0..std::f32::consts::TAU),
            spin: rng.gen_range(-2.0..2.0),
        });
    }

    let culled = Rc::new(CullCounter::default());
    system
        .scene_mut(scene)
        .ok_or_else(|| DemoError::Args("scene vanished during setup".to_string()))?
        .set_observer(Box::new(CullLogger {
            counter: Rc::clone(&culled),
        }));
    for (render_node, proxy) in proxies {
        system.set_proxy_chunk(scene, render_node, Some(proxy))?;
    }

    let (width, height) = (system.config().screen.width, system.config().screen.height);
    let camera = system.create_camera(Camera::perspective(
        Vec3::new(CAMERA_DISTANCE, CAMERA_DISTANCE * 0.4, 0.0),
        60.0,
        width as f32 / height as f32,
        0.1,
        200.0,
    ));
    let screen = system.screen();
    system.attach_look(
        screen,
        Look::new(camera, scene).with_flags(
            RenderFlags::DEFAULT
                | RenderFlags::FRUSTUM_CULLING
                | RenderFlags::INSTANCING
                | RenderFlags::SORT_TRANSPARENT_TO_NEAR,
        ),
    )?;

    let overhead = system.create_camera(Camera::perspective(Vec3::new(0.0, 60.0, 0.1), 60.0, 1.0, 1.0, 200.0));
    let minimap = system.create_target(FramebufferHandle(1), 256, 256, 0);
    system.attach_look(
        minimap,
        Look::new(overhead, scene).with_flags(
            (RenderFlags::DEFAULT - RenderFlags::TRANSPARENT) | RenderFlags::OCCLUSION_QUERY,
        ),
    )?;

    Ok(OrbitDemo {
        scene,
        camera,
        orbiters,
        frames_left: frames,
        culled,
    })
}

fn parse_args() -> Result<(RenderSystemConfig, u64), DemoError> {
    let mut config = RenderSystemConfig::default();
    let mut frames = DEFAULT_FRAMES;

    for arg in std::env::args().skip(1) {
        if arg.ends_with(".toml") || arg.ends_with(".ron") {
            config = RenderSystemConfig::load_from_file(&arg)?;
        } else {
            frames = arg
                .parse()
                .map_err(|_| DemoError::Args(format!("expected a config path or frame count, got '{arg}'")))?;
        }
    }
    config.validate()?;
    Ok((config, frames))
}

fn main() -> Result<(), DemoError> {
    let (config, frames) = parse_args()?;

    logging::init_with_level(&config.engine.log_level);

    log::info!("Starting orbit demo for {} frames", frames);

    let mut system = RenderSystem::new(config, HeadlessDevice::new())?;
    let mut demo = build(&mut system, frames)?;
    log::info!("Scene ready: {} orbiting bodies", demo.orbiters.len());

    system.run(&mut demo)?;

    let stats = system.stats();
    log::info!(
        "Finished {} frames: avg {:.3} ms, best {:.3} ms, worst {:.3} ms, last frame {} batches",
        stats.frames,
        stats.average_frame_ms,
        stats.best_frame_ms,
        stats.worst_frame_ms,
        stats.batches
    );

    let device = system.shutdown();
    log::info!("Presented {} frames", device.frames_presented());
    Ok(())
}
