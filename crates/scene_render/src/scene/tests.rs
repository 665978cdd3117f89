//! End-to-end scene render tests against the headless device

use std::cell::Cell;
use std::rc::Rc;

use approx::assert_relative_eq;

use crate::core::SceneConfig;
use crate::foundation::collections::SlotMap;
use crate::foundation::math::{Quat, Transform, Vec3};
use crate::render::flags::RenderFlags;
use crate::render::headless::{DeviceCommand, HeadlessDevice};
use crate::render::primitives::{Camera, CameraId, ChunkHandle, MeshChunk, MeshRegistry};
use crate::render::resources::materials::{
    AlphaMode, Material, MaterialId, MaterialPass, MaterialRegistry, ProgramId,
};
use crate::scene::{
    BoundingVolume, CullEvent, FrameResources, InvocationBuffer, InvocationRecord, NodeId,
    RenderNodeId, Scene, SceneNode, SceneObserver, SceneStats, OCCLUSION_RECHECK_INTERVAL,
};

struct Fixture {
    device: HeadlessDevice,
    materials: MaterialRegistry,
    meshes: MeshRegistry,
    cameras: SlotMap<CameraId, Camera>,
    camera: CameraId,
    scene: Scene,
    chunks: Vec<ChunkHandle>,
    opaque: MaterialId,
    blended: MaterialId,
}

impl Fixture {
    fn new(config: SceneConfig) -> Self {
        let mut device = HeadlessDevice::new();
        let scene = Scene::new(config, &mut device).unwrap();

        let mut meshes = MeshRegistry::new();
        let mesh = meshes.create_mesh("cube");
        let cube = BoundingVolume::from_min_max(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(0.5, 0.5, 0.5));
        let mesh = meshes.get_mut(mesh).unwrap();
        let chunks = vec![
            mesh.add_chunk(MeshChunk::new(24, 36, cube)).unwrap(),
            mesh.add_chunk(MeshChunk::new(8, 12, cube).with_range(36, 24)).unwrap(),
        ];

        let mut materials = MaterialRegistry::new();
        let opaque = materials.register(Material::with_pass(MaterialPass::new(ProgramId(1)).with_bindings(2, 1)));
        let blended = materials.register(Material::with_pass(
            MaterialPass::new(ProgramId(2)).with_alpha_mode(AlphaMode::Blend),
        ));

        let mut cameras = SlotMap::with_key();
        let camera = cameras.insert(Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0));

        Self {
            device,
            materials,
            meshes,
            cameras,
            camera,
            scene,
            chunks,
            opaque,
            blended,
        }
    }

    fn add(&mut self, position: Vec3, chunk: usize, material: MaterialId) -> (NodeId, RenderNodeId) {
        let node = self
            .scene
            .add_node(SceneNode::with_transform(Transform::from_position(position)), None)
            .unwrap();
        let render_node = self
            .scene
            .touch_material(&mut self.device, &self.meshes, node, self.chunks[chunk], material, 1)
            .unwrap();
        (node, render_node)
    }

    /// One look followed by the frame-end invalidation reset
    fn render(&mut self, flags: RenderFlags) -> SceneStats {
        let stats = self.render_look(self.camera, flags);
        self.end_frame();
        stats
    }

    /// One look through `camera`, leaving invalidation flags for [`Fixture::end_frame`]
    fn render_look(&mut self, camera_id: CameraId, flags: RenderFlags) -> SceneStats {
        let camera = &mut self.cameras[camera_id];
        let mut resources = FrameResources {
            device: &mut self.device,
            materials: &self.materials,
            meshes: &self.meshes,
        };
        self.scene
            .render(&mut resources, camera_id, camera, 0, flags)
            .unwrap()
            .clone()
    }

    fn end_frame(&mut self) {
        for (_, camera) in &mut self.cameras {
            camera.validate();
        }
        self.meshes.validate_all();
    }

    fn draws(&mut self) -> Vec<DeviceCommand> {
        self.device
            .take_commands()
            .into_iter()
            .filter(|command| {
                matches!(
                    command,
                    DeviceCommand::Draw { .. }
                        | DeviceCommand::DrawInstancedBuffer { .. }
                        | DeviceCommand::MultiDraw { .. }
                )
            })
            .collect()
    }
}

fn row_of_three(fixture: &mut Fixture) -> Vec<(NodeId, RenderNodeId)> {
    let material = fixture.opaque;
    [-2.0, 0.0, 2.0]
        .into_iter()
        .map(|x| fixture.add(Vec3::new(x, 0.0, 0.0), 0, material))
        .collect()
}

#[derive(Default)]
struct Counters {
    in_frustum: Cell<usize>,
    out_of_frustum: Cell<usize>,
    ended: Cell<usize>,
}

struct CountingObserver {
    counters: Rc<Counters>,
    accept_scene: bool,
    custom_visible: bool,
}

impl SceneObserver for CountingObserver {
    fn begin_scene_render(&mut self, _camera: &Camera) -> bool {
        self.accept_scene
    }

    fn end_scene_render(&mut self, _camera: &Camera) {
        self.counters.ended.set(self.counters.ended.get() + 1);
    }

    fn node_in_frustum(&mut self, _event: &CullEvent<'_>) {
        self.counters.in_frustum.set(self.counters.in_frustum.get() + 1);
    }

    fn node_out_of_frustum(&mut self, _event: &CullEvent<'_>) {
        self.counters.out_of_frustum.set(self.counters.out_of_frustum.get() + 1);
    }

    fn custom_visibility_check(&mut self, _event: &CullEvent<'_>) -> bool {
        self.custom_visible
    }
}

#[test]
fn test_static_scene_recomputes_nothing_on_second_frame() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let nodes = row_of_three(&mut fixture);
    let flags = RenderFlags::DEFAULT | RenderFlags::INSTANCING | RenderFlags::FRUSTUM_CULLING;

    let first = fixture.render(flags);
    assert_eq!(first.bounds_recomputed, 3);
    assert_eq!(first.distances_recomputed, 3);
    assert_eq!(fixture.draws().len(), 1);

    let camera = fixture.camera;
    let cached: Vec<_> = nodes
        .iter()
        .map(|&(_, id)| {
            let render_node = fixture.scene.render_node(id).unwrap();
            (render_node.distance_for(camera).unwrap().to_bits(), render_node.bounds().center())
        })
        .collect();

    let second = fixture.render(flags);
    assert_eq!(second.bounds_recomputed, 0);
    assert_eq!(second.distances_recomputed, 0);
    assert_eq!(second.batches_called, 1);
    assert_eq!(second.instanced_nodes, 3);
    assert_eq!(second.triangles, 36);

    let draws = fixture.draws();
    assert_eq!(draws.len(), 1);
    assert!(matches!(draws[0], DeviceCommand::DrawInstancedBuffer { count: 3, .. }));

    for (&(_, id), before) in nodes.iter().zip(&cached) {
        let render_node = fixture.scene.render_node(id).unwrap();
        assert_eq!(render_node.distance_for(camera).unwrap().to_bits(), before.0);
        assert_eq!(render_node.bounds().center(), before.1);
    }
}

#[test]
fn test_two_cameras_share_a_static_scene_without_recomputing() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let nodes = row_of_three(&mut fixture);
    let main = fixture.camera;
    let side = fixture
        .cameras
        .insert(Camera::perspective(Vec3::new(10.0, 0.0, 0.0), 60.0, 1.0, 0.1, 100.0));

    let first_main = fixture.render_look(main, RenderFlags::DEFAULT);
    let first_side = fixture.render_look(side, RenderFlags::DEFAULT);
    fixture.end_frame();
    assert_eq!(first_main.distances_recomputed, 3);
    assert_eq!(first_side.distances_recomputed, 3);

    for _ in 0..2 {
        let main_stats = fixture.render_look(main, RenderFlags::DEFAULT);
        let side_stats = fixture.render_look(side, RenderFlags::DEFAULT);
        fixture.end_frame();
        assert_eq!(main_stats.distances_recomputed, 0);
        assert_eq!(side_stats.distances_recomputed, 0);
        assert_eq!(main_stats.bounds_recomputed + side_stats.bounds_recomputed, 0);
    }

    // moving one node refreshes it for both cameras in the same frame
    let (moved, moved_id) = nodes[0];
    fixture.scene.node_mut(moved).unwrap().set_position(Vec3::new(0.0, 0.0, -5.0));
    let main_stats = fixture.render_look(main, RenderFlags::DEFAULT);
    let side_stats = fixture.render_look(side, RenderFlags::DEFAULT);
    fixture.end_frame();
    assert_eq!(main_stats.distances_recomputed, 1);
    assert_eq!(side_stats.distances_recomputed, 1);

    let render_node = fixture.scene.render_node(moved_id).unwrap();
    assert_relative_eq!(render_node.distance_for(main).unwrap(), 15.0, epsilon = 1e-4);
    assert_relative_eq!(
        render_node.distance_for(side).unwrap(),
        (10.0_f32 * 10.0 + 5.0 * 5.0).sqrt(),
        epsilon = 1e-4
    );
}

#[test]
fn test_sheared_child_partly_in_view_is_not_culled() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let parent = fixture
        .scene
        .add_node(
            SceneNode::with_transform(Transform {
                position: Vec3::new(-12.0, 0.0, 0.0),
                scale: Vec3::new(10.0, 1.0, 1.0),
                ..Transform::identity()
            }),
            None,
        )
        .unwrap();
    let child = fixture
        .scene
        .add_node(
            SceneNode::with_transform(Transform::from_position_rotation(
                Vec3::zeros(),
                Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_4),
            )),
            Some(parent),
        )
        .unwrap();
    let (chunk, material) = (fixture.chunks[0], fixture.opaque);
    fixture
        .scene
        .touch_material(&mut fixture.device, &fixture.meshes, child, chunk, material, 1)
        .unwrap();

    let stats = fixture.render(RenderFlags::DEFAULT | RenderFlags::FRUSTUM_CULLING);
    assert_eq!(stats.nodes_culled, 0);
    assert_eq!(stats.batches_called, 1);
    assert!(fixture.scene.node(child).unwrap().is_visible());
}

#[test]
fn test_naive_draws_each_node() {
    let mut fixture = Fixture::new(SceneConfig::default());
    row_of_three(&mut fixture);

    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.batches_called, 3);
    assert_eq!(stats.batches_total, 3);
    assert_eq!(stats.materials_passed, 1);
    // the material is applied once and stays bound
    assert_eq!(stats.material_blocks, 1);
    assert_eq!(stats.texture_units_bound, 2);
    assert_eq!(fixture.draws().len(), 3);
}

#[test]
fn test_moved_node_alone_is_recomputed() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let nodes = row_of_three(&mut fixture);
    fixture.render(RenderFlags::DEFAULT);

    let before: Vec<_> = nodes
        .iter()
        .map(|&(_, id)| fixture.scene.render_node(id).unwrap().clone())
        .collect();

    let camera = fixture.camera;
    let (moved, _) = nodes[1];
    fixture.scene.node_mut(moved).unwrap().set_position(Vec3::new(0.0, 0.0, -5.0));
    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.bounds_recomputed, 1);
    assert_eq!(stats.distances_recomputed, 1);

    for (index, &(_, id)) in nodes.iter().enumerate() {
        let render_node = fixture.scene.render_node(id).unwrap();
        if index == 1 {
            assert_relative_eq!(render_node.distance_for(camera).unwrap(), 15.0, epsilon = 1e-4);
            assert_ne!(render_node.bounds().center(), before[index].bounds().center());
        } else {
            assert_eq!(render_node.distance_for(camera), before[index].distance_for(camera));
            assert_eq!(render_node.bounds().center(), before[index].bounds().center());
        }
    }
}

#[test]
fn test_camera_change_refreshes_distances() {
    let mut fixture = Fixture::new(SceneConfig::default());
    row_of_three(&mut fixture);
    fixture.render(RenderFlags::DEFAULT);

    fixture.cameras[fixture.camera].set_position(Vec3::new(0.0, 0.0, 20.0));
    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.bounds_recomputed, 0);
    assert_eq!(stats.distances_recomputed, 3);
}

#[test]
fn test_first_occlusion_query_counts_as_visible() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let (node, id) = fixture.add(Vec3::zeros(), 0, fixture.opaque);

    let stats = fixture.render(RenderFlags::DEFAULT | RenderFlags::OCCLUSION_QUERY);
    assert_eq!(stats.queries_created, 1);
    assert_eq!(stats.queries_issued, 1);
    assert!(fixture.scene.node(node).unwrap().is_visible());

    let render_node = fixture.scene.render_node(id).unwrap();
    assert_eq!(render_node.queries().len(), 1);
    let query = render_node.query_for(fixture.camera).unwrap();
    assert!(query.pending);

    let commands = fixture.device.take_commands();
    assert!(commands.contains(&DeviceCommand::BeginQuery(query.handle)));
    assert!(commands.contains(&DeviceCommand::Draw {
        chunk: fixture.chunks[0],
        instances: 1,
    }));
    assert!(!commands.iter().any(|command| matches!(command, DeviceCommand::ProxyState(_))));
}

#[test]
fn test_queries_are_kept_per_camera() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let (_, id) = fixture.add(Vec3::zeros(), 0, fixture.opaque);
    let flags = RenderFlags::DEFAULT | RenderFlags::OCCLUSION_QUERY;
    fixture.render(flags);

    let main = fixture.camera;
    fixture.camera = fixture
        .cameras
        .insert(Camera::perspective(Vec3::new(10.0, 0.0, 0.0), 60.0, 1.0, 0.1, 100.0));
    let stats = fixture.render(flags);

    assert_eq!(stats.queries_created, 1);
    let render_node = fixture.scene.render_node(id).unwrap();
    assert_eq!(render_node.queries().len(), 2);
    assert!(render_node.query_for(main).is_some());
    assert_eq!(render_node.distances().len(), 2);
    assert!(render_node.distance_for(main).is_some());
}

#[test]
fn test_occlusion_culling_rejects_hidden_node() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let (node, id) = fixture.add(Vec3::zeros(), 0, fixture.opaque);
    let flags = RenderFlags::DEFAULT | RenderFlags::OCCLUSION_QUERY | RenderFlags::OCCLUSION_CULLING;

    fixture.render(flags);
    fixture.draws();
    let handle = fixture.scene.render_node(id).unwrap().queries()[0].handle;
    fixture.device.set_query_result(handle, false);

    let stats = fixture.render(flags);
    assert_eq!(stats.nodes_culled, 1);
    assert!(fixture.draws().is_empty());
    assert!(!fixture.scene.node(node).unwrap().is_visible());
}

#[test]
fn test_occlusion_culled_node_is_requeried_and_recovers() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let (node, id) = fixture.add(Vec3::zeros(), 0, fixture.opaque);
    let flags = RenderFlags::DEFAULT | RenderFlags::OCCLUSION_QUERY | RenderFlags::OCCLUSION_CULLING;

    fixture.render(flags);
    fixture.draws();
    let handle = fixture.scene.render_node(id).unwrap().queries()[0].handle;
    fixture.device.set_query_result(handle, false);

    for _ in 1..OCCLUSION_RECHECK_INTERVAL {
        let stats = fixture.render(flags);
        assert_eq!(stats.nodes_culled, 1);
        assert!(fixture.draws().is_empty());
    }

    let stats = fixture.render(flags);
    assert_eq!(stats.nodes_culled, 0);
    assert_eq!(stats.queries_issued, 1);
    assert!(!fixture.scene.node(node).unwrap().is_visible());
    let commands = fixture.device.take_commands();
    assert!(commands.contains(&DeviceCommand::ProxyState(true)));
    assert!(commands.contains(&DeviceCommand::BeginQuery(handle)));

    // the occluder moved away
    fixture.device.set_query_result(handle, true);
    let stats = fixture.render(flags);
    assert_eq!(stats.nodes_culled, 0);
    assert!(fixture.scene.node(node).unwrap().is_visible());
    let commands = fixture.device.take_commands();
    assert!(!commands.contains(&DeviceCommand::ProxyState(true)));
}

#[test]
fn test_occluded_node_draws_proxy() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let (node, id) = fixture.add(Vec3::zeros(), 0, fixture.opaque);
    let proxy = fixture.chunks[1];
    fixture.scene.set_proxy_chunk(&fixture.meshes, id, Some(proxy)).unwrap();
    let flags = RenderFlags::DEFAULT | RenderFlags::OCCLUSION_QUERY;

    fixture.render(flags);
    fixture.device.take_commands();
    let handle = fixture.scene.render_node(id).unwrap().queries()[0].handle;
    fixture.device.set_query_result(handle, false);

    let stats = fixture.render(flags);
    assert_eq!(stats.nodes_culled, 0);
    assert_eq!(stats.queries_issued, 1);
    assert!(!fixture.scene.node(node).unwrap().is_visible());

    let commands = fixture.device.take_commands();
    let start = commands
        .iter()
        .position(|command| *command == DeviceCommand::ProxyState(true))
        .unwrap();
    assert_eq!(
        &commands[start..],
        &[
            DeviceCommand::ProxyState(true),
            DeviceCommand::BeginQuery(handle),
            DeviceCommand::Draw { chunk: proxy, instances: 1 },
            DeviceCommand::EndQuery(handle),
            DeviceCommand::ProxyState(false),
        ]
    );
}

#[test]
fn test_pending_query_is_not_reissued() {
    let mut fixture = Fixture::new(SceneConfig::default());
    fixture.add(Vec3::zeros(), 0, fixture.opaque);
    fixture.device.set_default_query_result(None);
    let flags = RenderFlags::DEFAULT | RenderFlags::OCCLUSION_QUERY;

    assert_eq!(fixture.render(flags).queries_issued, 1);
    let stats = fixture.render(flags);
    assert_eq!(stats.queries_issued, 0);
    assert_eq!(stats.batches_called, 1);
}

#[test]
fn test_instancing_batches_stay_contiguous() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let material = fixture.opaque;
    for (index, x) in [-3.0, -1.0, 1.0, 3.0].into_iter().enumerate() {
        fixture.add(Vec3::new(x, 0.0, 0.0), index % 2, material);
    }

    let stats = fixture.render(RenderFlags::DEFAULT | RenderFlags::INSTANCING);
    assert_eq!(stats.batch_crops, 2);
    assert_eq!(stats.batches_called, 2);

    let counts: Vec<_> = fixture
        .draws()
        .into_iter()
        .map(|command| match command {
            DeviceCommand::DrawInstancedBuffer { chunk, count, .. } => (chunk.index, count),
            other => panic!("unexpected draw {other:?}"),
        })
        .collect();
    assert_eq!(counts, vec![(0, 2), (1, 2)]);
}

#[test]
fn test_instance_buffer_growth_failure_skips_batch() {
    let config = SceneConfig {
        initial_instance_capacity: 1,
        ..SceneConfig::default()
    };
    let mut fixture = Fixture::new(config);
    row_of_three(&mut fixture);
    fixture.device.fail_buffer_growth(true);

    let stats = fixture.render(RenderFlags::DEFAULT | RenderFlags::INSTANCING);
    assert_eq!(stats.batches_called, 0);
    assert!(fixture.draws().is_empty());

    fixture.device.fail_buffer_growth(false);
    let stats = fixture.render(RenderFlags::DEFAULT | RenderFlags::INSTANCING);
    assert_eq!(stats.instanced_nodes, 3);
}

#[test]
fn test_sort_orders_mirror_each_other() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let material = fixture.opaque;
    for z in [-3.0, 0.0, -6.0] {
        fixture.add(Vec3::new(0.0, 0.0, z), 0, material);
    }

    let order = |fixture: &mut Fixture, flags: RenderFlags| -> Vec<f32> {
        fixture.render(RenderFlags::DEFAULT | flags);
        fixture
            .device
            .take_commands()
            .into_iter()
            .filter_map(|command| match command {
                DeviceCommand::SetNodeMatrices(model) => Some(model[(2, 3)]),
                _ => None,
            })
            .collect()
    };

    let to_near = order(&mut fixture, RenderFlags::SORT_OPAQUE_TO_NEAR);
    let from_near = order(&mut fixture, RenderFlags::SORT_OPAQUE_FROM_NEAR);
    assert_eq!(to_near, vec![-6.0, -3.0, 0.0]);
    let mut reversed = to_near.clone();
    reversed.reverse();
    assert_eq!(reversed, from_near);
}

#[test]
fn test_blended_nodes_follow_transparent_flag() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let (opaque, blended) = (fixture.opaque, fixture.blended);
    fixture.add(Vec3::new(-1.0, 0.0, 0.0), 0, blended);
    fixture.add(Vec3::new(1.0, 0.0, 0.0), 0, opaque);

    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.batches_called, 2);
    let applied: Vec<_> = fixture
        .device
        .take_commands()
        .into_iter()
        .filter_map(|command| match command {
            DeviceCommand::ApplyPass(material) => Some(material),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![opaque, blended]);

    let stats = fixture.render(RenderFlags::DEFAULT - RenderFlags::TRANSPARENT);
    assert_eq!(stats.batches_called, 1);
    assert_eq!(stats.batches_total, 1);
}

#[test]
fn test_missing_pass_skips_nodes() {
    let mut fixture = Fixture::new(SceneConfig::default());
    row_of_three(&mut fixture);

    let camera = &mut fixture.cameras[fixture.camera];
    let mut resources = FrameResources {
        device: &mut fixture.device,
        materials: &fixture.materials,
        meshes: &fixture.meshes,
    };
    let stats = fixture
        .scene
        .render(&mut resources, fixture.camera, camera, 3, RenderFlags::DEFAULT)
        .unwrap();
    assert_eq!(stats.batches_called, 0);
    assert_eq!(stats.materials_passed, 0);
    // caches are still refreshed for later passes
    assert_eq!(stats.bounds_recomputed, 3);
}

#[test]
fn test_disabled_nodes_are_not_drawn() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let nodes = row_of_three(&mut fixture);
    fixture.scene.node_mut(nodes[0].0).unwrap().enabled = false;

    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.batches_called, 2);
}

#[test]
fn test_frustum_culling_rejects_nodes_behind_camera() {
    let mut fixture = Fixture::new(SceneConfig::default());
    row_of_three(&mut fixture);
    let material = fixture.opaque;
    let (behind, _) = fixture.add(Vec3::new(0.0, 0.0, 40.0), 0, material);

    let counters = Rc::new(Counters::default());
    fixture.scene.set_observer(Box::new(CountingObserver {
        counters: Rc::clone(&counters),
        accept_scene: true,
        custom_visible: true,
    }));

    let stats = fixture.render(RenderFlags::DEFAULT | RenderFlags::FRUSTUM_CULLING);
    assert_eq!(stats.nodes_culled, 1);
    assert_eq!(stats.batches_called, 3);
    assert_eq!(counters.in_frustum.get(), 3);
    assert_eq!(counters.out_of_frustum.get(), 1);
    assert_eq!(counters.ended.get(), 1);
    assert!(!fixture.scene.node(behind).unwrap().is_visible());
}

#[test]
fn test_custom_visibility_check_replaces_frustum_test() {
    let mut fixture = Fixture::new(SceneConfig::default());
    row_of_three(&mut fixture);

    let counters = Rc::new(Counters::default());
    fixture.scene.set_observer(Box::new(CountingObserver {
        counters: Rc::clone(&counters),
        accept_scene: true,
        custom_visible: false,
    }));

    let flags = RenderFlags::DEFAULT | RenderFlags::FRUSTUM_CULLING | RenderFlags::CUSTOM_VISIBILITY_CHECK;
    let stats = fixture.render(flags);
    assert_eq!(stats.nodes_culled, 3);
    assert_eq!(counters.out_of_frustum.get(), 3);
    assert!(fixture.draws().is_empty());
}

#[test]
fn test_observer_can_skip_scene() {
    let mut fixture = Fixture::new(SceneConfig::default());
    row_of_three(&mut fixture);

    let counters = Rc::new(Counters::default());
    fixture.scene.set_observer(Box::new(CountingObserver {
        counters: Rc::clone(&counters),
        accept_scene: false,
        custom_visible: true,
    }));

    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats, SceneStats::default());
    assert_eq!(counters.ended.get(), 0);
    assert!(fixture.draws().is_empty());
}

#[test]
fn test_multirender_commands_point_at_records() {
    let mut fixture = Fixture::new(SceneConfig::default().with_multirender(true));
    let nodes = row_of_three(&mut fixture);

    let stats = fixture.render(RenderFlags::DEFAULT | RenderFlags::INSTANCING);
    assert_eq!(stats.records_uploaded, 3);
    assert_eq!(stats.multi_draw_commands, 3);
    assert_eq!(stats.batches_called, 1);

    let records = fixture.scene.invocations.as_ref().unwrap().buffer().handle();
    let draws = fixture.draws();
    assert_eq!(draws.len(), 1);
    let DeviceCommand::MultiDraw { records: buffer, commands, .. } = &draws[0] else {
        panic!("expected a multi-draw, got {:?}", draws[0]);
    };
    assert_eq!(*buffer, records);

    let contents = fixture.device.buffer_contents(records).unwrap();
    for (command, &(_, id)) in commands.iter().zip(&nodes) {
        let slot = fixture.scene.render_node(id).unwrap().invocation_index().unwrap();
        assert_eq!(command.base_instance as usize, slot);
        assert_eq!(command.index_count, 36);

        let offset = slot * InvocationBuffer::RECORD_SIZE;
        let record: InvocationRecord =
            bytemuck::pod_read_unaligned(&contents[offset..offset + InvocationBuffer::RECORD_SIZE]);
        assert!(record.is_used());
    }

    // static frame: records are left alone
    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.records_uploaded, 0);
}

#[test]
fn test_multirender_draws_instanced_nodes_directly() {
    let mut fixture = Fixture::new(SceneConfig::default().with_multirender(true));
    let material = fixture.opaque;
    let chunk = fixture.chunks[0];
    fixture.add(Vec3::new(-1.0, 0.0, 0.0), 0, material);
    let crowd = fixture.scene.add_node(SceneNode::new(), None).unwrap();
    fixture
        .scene
        .touch_material(&mut fixture.device, &fixture.meshes, crowd, chunk, material, 3)
        .unwrap();
    fixture.add(Vec3::new(1.0, 0.0, 0.0), 0, material);

    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.multi_draw_commands, 2);
    assert_eq!(stats.triangles, 12 * 5);

    let draws = fixture.draws();
    assert!(draws.contains(&DeviceCommand::Draw { chunk, instances: 3 }));
    for draw in &draws {
        if let DeviceCommand::MultiDraw { commands, .. } = draw {
            assert!(commands.iter().all(|command| command.instance_count == 1));
        }
    }
}

#[test]
fn test_multirender_flushes_on_program_change() {
    let mut fixture = Fixture::new(SceneConfig::default().with_multirender(true));
    let second = fixture
        .materials
        .register(Material::with_pass(MaterialPass::new(ProgramId(7))));
    let material = fixture.opaque;
    fixture.add(Vec3::new(-1.0, 0.0, 0.0), 0, material);
    fixture.add(Vec3::new(1.0, 0.0, 0.0), 1, material);
    fixture.add(Vec3::new(0.0, 1.0, 0.0), 0, second);

    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.batches_called, 2);
    assert_eq!(stats.multi_draw_commands, 3);
}

#[test]
fn test_reassigned_nodes_stay_in_one_unit() {
    let mut fixture = Fixture::new(SceneConfig::default());
    let nodes = row_of_three(&mut fixture);
    let blended = fixture.blended;
    let chunk = fixture.chunks[0];

    for &(node, _) in nodes.iter().take(2) {
        fixture
            .scene
            .touch_material(&mut fixture.device, &fixture.meshes, node, chunk, blended, 1)
            .unwrap();
    }

    for &(_, id) in &nodes {
        let owners = fixture.scene.units().iter().filter(|unit| unit.contains(id)).count();
        assert_eq!(owners, 1);
    }
    assert_eq!(fixture.scene.unit_for(blended).unwrap().len(), 2);

    let stats = fixture.render(RenderFlags::DEFAULT);
    assert_eq!(stats.batches_called, 3);
    assert_eq!(stats.materials_passed, 2);
}
