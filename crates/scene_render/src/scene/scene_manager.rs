//! Scene - node graph plus material-grouped render bookkeeping
//!
//! A [`Scene`] owns:
//! 1. The node hierarchy ([`SceneGraph`]) and the set of nodes invalidated during a render
//! 2. Render nodes binding scene nodes to (chunk, material) pairs
//! 3. One [`MaterialRenderUnit`] per material in use, created lazily and dropped when empty
//! 4. The GPU buffers batching draws with: the instance matrix buffer and,
//!    with multirender, the invocation record buffer
//!
//! Graph mutation happens between renders; [`Scene::render`] lives in
//! `scene_renderer`.

use crate::core::SceneConfig;
use crate::foundation::collections::SlotMap;
use crate::render::backend::{BufferUsage, DeviceCapabilities, RenderDevice};
use crate::render::buffer::GpuBuffer;
use crate::render::primitives::{ChunkHandle, MeshRegistry};
use crate::render::resources::materials::MaterialId;
use crate::render::{RenderError, RenderResult};
use crate::scene::invocation::InvocationBuffer;
use crate::scene::observer::SceneObserver;
use crate::scene::render_queue::RenderQueue;
use crate::scene::render_unit::{MaterialRenderUnit, RenderNode, RenderNodeId};
use crate::scene::scene_graph::{NodeId, SceneGraph, SceneNode};
use crate::scene::scene_renderer::SceneStats;

const MATRIX_SIZE: usize = std::mem::size_of::<[[f32; 4]; 4]>();

/// A renderable scene
pub struct Scene {
    pub(crate) config: SceneConfig,
    pub(crate) graph: SceneGraph,
    pub(crate) units: Vec<MaterialRenderUnit>,
    pub(crate) render_nodes: SlotMap<RenderNodeId, RenderNode>,
    pub(crate) queue: RenderQueue,
    pub(crate) invalidated: Vec<NodeId>,
    pub(crate) instance_buffer: GpuBuffer,
    pub(crate) instance_scratch: Vec<[[f32; 4]; 4]>,
    pub(crate) invocations: Option<InvocationBuffer>,
    pub(crate) observer: Box<dyn SceneObserver>,
    pub(crate) stats: SceneStats,
}

impl Scene {
    /// Create a scene and its GPU buffers
    ///
    /// Fails with [`RenderError::UnsupportedFeature`] when multirender is
    /// configured and the device lacks any feature it depends on.
    pub fn new(config: SceneConfig, device: &mut dyn RenderDevice) -> RenderResult<Self> {
        config
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        if config.multirender {
            let missing = DeviceCapabilities::MULTIRENDER.difference(device.capabilities());
            if !missing.is_empty() {
                log::error!("Multirender scene requested but device lacks {:?}", missing);
                return Err(RenderError::UnsupportedFeature(format!(
                    "multirender requires {missing:?}"
                )));
            }
        }

        let instance_buffer = GpuBuffer::allocate(
            device,
            BufferUsage::InstanceAttributes,
            config.initial_instance_capacity * MATRIX_SIZE,
            config.growth_factor,
        )?;

        let invocations = if config.multirender {
            match InvocationBuffer::new(device, config.initial_record_capacity, config.growth_factor) {
                Ok(records) => Some(records),
                Err(e) => {
                    instance_buffer.release(device);
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created scene (multirender: {}, instance capacity: {})",
            config.multirender,
            config.initial_instance_capacity
        );

        Ok(Self {
            config,
            graph: SceneGraph::new(),
            units: Vec::new(),
            render_nodes: SlotMap::with_key(),
            queue: RenderQueue::new(),
            invalidated: Vec::new(),
            instance_buffer,
            instance_scratch: Vec::new(),
            invocations,
            observer: Box::new(()),
            stats: SceneStats::default(),
        })
    }

    /// Scene configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Whether draws go through invocation records and indirect multi-draw
    pub fn is_multirender(&self) -> bool {
        self.invocations.is_some()
    }

    /// Node hierarchy
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Root node id
    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    /// Attach a node under `parent`, or under the root
    pub fn add_node(&mut self, node: SceneNode, parent: Option<NodeId>) -> RenderResult<NodeId> {
        self.graph.add(node, parent)
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.graph.get(id)
    }

    /// Mutable node by id
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.graph.get_mut(id)
    }

    /// Remove a node with its render nodes; children move to its parent
    pub fn remove_node(&mut self, device: &mut dyn RenderDevice, id: NodeId) -> RenderResult<SceneNode> {
        let node = self
            .graph
            .remove(id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("scene node {id:?}")))?;

        let attached: Vec<RenderNodeId> = self
            .render_nodes
            .iter()
            .filter(|(_, render_node)| render_node.node == id)
            .map(|(render_id, _)| render_id)
            .collect();
        for render_id in attached {
            self.release_render_node(device, render_id);
        }
        Ok(node)
    }

    /// Draw `chunk` on `node` with `material`
    ///
    /// Creates the render node for the (node, chunk) pair on first use.
    /// Touching an existing pair updates its instance count and moves it to
    /// the unit of `material`. Either way the node is flagged so bounds and
    /// invocation records are rebuilt on the next render.
    pub fn touch_material(
        &mut self,
        device: &mut dyn RenderDevice,
        meshes: &MeshRegistry,
        node: NodeId,
        chunk: ChunkHandle,
        material: MaterialId,
        instances: u32,
    ) -> RenderResult<RenderNodeId> {
        if !self.graph.contains(node) {
            return Err(RenderError::InvalidHandle(format!("scene node {node:?}")));
        }
        let local_bounds = *meshes
            .chunk(chunk)
            .ok_or_else(|| RenderError::InvalidHandle(format!("chunk {chunk:?}")))?
            .bounds();

        let existing = self
            .render_nodes
            .iter()
            .find(|(_, render_node)| render_node.node == node && render_node.chunk == chunk)
            .map(|(id, _)| id);

        let id = match existing {
            Some(id) => {
                self.unlink(id);
                if let Some(render_node) = self.render_nodes.get_mut(id) {
                    render_node.material = material;
                    render_node.instances = instances.max(1);
                }
                id
            }
            None => {
                let id = self
                    .render_nodes
                    .insert(RenderNode::new(node, chunk, material, instances, local_bounds));
                if let Some(records) = self.invocations.as_mut() {
                    let slot = records.acquire(id);
                    self.render_nodes[id].invocation = Some(slot);
                }
                log::debug!("Render node {:?}: node {:?}, chunk {:?}, material {:?}", id, node, chunk, material);
                id
            }
        };

        if let Some(scene_node) = self.graph.get_mut(node) {
            scene_node.force_recalc();
        }
        self.link(id, material, chunk);
        Ok(id)
    }

    /// Remove one render node
    pub fn detach_render_node(&mut self, device: &mut dyn RenderDevice, id: RenderNodeId) -> RenderResult<()> {
        if !self.render_nodes.contains_key(id) {
            return Err(RenderError::InvalidHandle(format!("render node {id:?}")));
        }
        self.release_render_node(device, id);
        Ok(())
    }

    /// Set the chunk drawn in place of a render node while it is occluded
    pub fn set_proxy_chunk(
        &mut self,
        meshes: &MeshRegistry,
        id: RenderNodeId,
        proxy: Option<ChunkHandle>,
    ) -> RenderResult<()> {
        if let Some(chunk) = proxy {
            if meshes.chunk(chunk).is_none() {
                return Err(RenderError::InvalidHandle(format!("chunk {chunk:?}")));
            }
        }
        let render_node = self
            .render_nodes
            .get_mut(id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("render node {id:?}")))?;
        render_node.proxy_chunk = proxy;
        Ok(())
    }

    /// Render node by id
    pub fn render_node(&self, id: RenderNodeId) -> Option<&RenderNode> {
        self.render_nodes.get(id)
    }

    /// All render nodes
    pub fn render_nodes(&self) -> impl Iterator<Item = (RenderNodeId, &RenderNode)> {
        self.render_nodes.iter()
    }

    /// Number of render nodes
    pub fn render_node_count(&self) -> usize {
        self.render_nodes.len()
    }

    /// Material units in creation order
    pub fn units(&self) -> &[MaterialRenderUnit] {
        &self.units
    }

    /// Unit of `material`, if any render node uses it
    pub fn unit_for(&self, material: MaterialId) -> Option<&MaterialRenderUnit> {
        self.units.iter().find(|unit| unit.material() == material)
    }

    /// Install the observer notified during renders
    pub fn set_observer(&mut self, observer: Box<dyn SceneObserver>) {
        self.observer = observer;
    }

    /// Statistics of the last render
    pub fn stats(&self) -> &SceneStats {
        &self.stats
    }

    /// Release every GPU resource the scene owns
    pub fn release(mut self, device: &mut dyn RenderDevice) {
        for (_, render_node) in self.render_nodes.drain() {
            for query in &render_node.queries {
                device.destroy_query(query.handle);
            }
        }
        self.instance_buffer.release(device);
        if let Some(records) = self.invocations {
            records.release_all(device);
        }
    }

    fn link(&mut self, id: RenderNodeId, material: MaterialId, chunk: ChunkHandle) {
        let unit_index = match self.units.iter().position(|unit| unit.material() == material) {
            Some(index) => index,
            None => {
                log::debug!("Created render unit for material {:?}", material);
                self.units.push(MaterialRenderUnit::new(material));
                self.units.len() - 1
            }
        };

        let render_nodes = &self.render_nodes;
        self.units[unit_index].insert_grouped(id, chunk, |other| {
            render_nodes.get(other).map(|render_node| render_node.chunk)
        });
    }

    fn unlink(&mut self, id: RenderNodeId) {
        if let Some(unit) = self.units.iter_mut().find(|unit| unit.contains(id)) {
            unit.remove(id);
        }
        self.units.retain(|unit| !unit.is_empty());
    }

    fn release_render_node(&mut self, device: &mut dyn RenderDevice, id: RenderNodeId) {
        self.unlink(id);
        let Some(render_node) = self.render_nodes.remove(id) else {
            return;
        };
        for query in &render_node.queries {
            device.destroy_query(query.handle);
        }
        if let (Some(records), Some(slot)) = (self.invocations.as_mut(), render_node.invocation) {
            records.release(device, slot);
        }
    }
}
