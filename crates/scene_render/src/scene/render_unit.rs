//! Render nodes and material render units
//!
//! A [`RenderNode`] binds one scene node to one mesh chunk drawn with one
//! material, and caches what culling and sorting need: world bounds, one
//! distance and one occlusion query per camera that has viewed it. Render nodes sharing a material live in that material's
//! [`MaterialRenderUnit`], grouped so equal chunks sit next to each other.

use crate::foundation::collections::new_key_type;
use crate::render::backend::QueryHandle;
use crate::render::primitives::{CameraId, ChunkHandle};
use crate::render::resources::materials::MaterialId;
use crate::scene::bounds::BoundingVolume;
use crate::scene::scene_graph::NodeId;

new_key_type! {
    /// Identifier of a render node within a scene
    pub struct RenderNodeId;
}

/// Occlusion query state of one render node for one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcclusionQuery {
    /// Camera the query measures from
    pub camera: CameraId,
    /// Device query
    pub handle: QueryHandle,
    /// Last result read back; `None` until one arrives
    pub last_result: Option<bool>,
    /// Whether a result is still in flight
    pub pending: bool,
    /// Consecutive looks the node was culled by this query's result
    pub culled_looks: u32,
}

impl OcclusionQuery {
    fn new(camera: CameraId, handle: QueryHandle) -> Self {
        Self {
            camera,
            handle,
            last_result: None,
            pending: false,
            culled_looks: 0,
        }
    }

    /// Whether the node counts as visible: no result yet means visible
    pub fn passed(&self) -> bool {
        self.last_result.unwrap_or(true)
    }
}

/// Cached distance from one camera to a render node's bounds center
///
/// Entries are dropped when the node moves and replaced when their camera
/// is invalidated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraDistance {
    /// Camera the distance was measured from
    pub camera: CameraId,
    /// Distance to the world bounds center
    pub distance: f32,
}

/// One (scene node, chunk, material) triple
#[derive(Debug, Clone)]
pub struct RenderNode {
    pub(crate) node: NodeId,
    pub(crate) chunk: ChunkHandle,
    pub(crate) proxy_chunk: Option<ChunkHandle>,
    pub(crate) material: MaterialId,
    pub(crate) instances: u32,
    pub(crate) bounds: BoundingVolume,
    pub(crate) distances: Vec<CameraDistance>,
    pub(crate) queries: Vec<OcclusionQuery>,
    pub(crate) invocation: Option<usize>,
    /// Camera whose view-projection the invocation record holds
    pub(crate) record_camera: Option<CameraId>,
}

impl RenderNode {
    pub(crate) fn new(node: NodeId, chunk: ChunkHandle, material: MaterialId, instances: u32, bounds: BoundingVolume) -> Self {
        Self {
            node,
            chunk,
            proxy_chunk: None,
            material,
            instances: instances.max(1),
            bounds,
            distances: Vec::new(),
            queries: Vec::new(),
            invocation: None,
            record_camera: None,
        }
    }

    /// Scene node drawn
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Chunk drawn
    pub fn chunk(&self) -> ChunkHandle {
        self.chunk
    }

    /// Cheap stand-in drawn while the node is occluded
    pub fn proxy_chunk(&self) -> Option<ChunkHandle> {
        self.proxy_chunk
    }

    /// Material the node is drawn with
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Instance count
    pub fn instances(&self) -> u32 {
        self.instances
    }

    /// World-space bounds
    pub fn bounds(&self) -> &BoundingVolume {
        &self.bounds
    }

    /// Distance cached for `camera`, if it has one
    pub fn distance_for(&self, camera: CameraId) -> Option<f32> {
        self.distances
            .iter()
            .find(|cached| cached.camera == camera)
            .map(|cached| cached.distance)
    }

    /// Cached distances, one per camera
    pub fn distances(&self) -> &[CameraDistance] {
        &self.distances
    }

    /// Invocation record slot, when the scene uses multirender
    pub fn invocation_index(&self) -> Option<usize> {
        self.invocation
    }

    /// Occlusion queries, one per camera that rendered this node
    pub fn queries(&self) -> &[OcclusionQuery] {
        &self.queries
    }

    /// Query state for `camera`
    pub fn query_for(&self, camera: CameraId) -> Option<&OcclusionQuery> {
        self.queries.iter().find(|query| query.camera == camera)
    }

    pub(crate) fn query_index(&self, camera: CameraId) -> Option<usize> {
        self.queries.iter().position(|query| query.camera == camera)
    }

    pub(crate) fn set_distance(&mut self, camera: CameraId, distance: f32) {
        match self.distances.iter_mut().find(|cached| cached.camera == camera) {
            Some(cached) => cached.distance = distance,
            None => self.distances.push(CameraDistance { camera, distance }),
        }
    }

    pub(crate) fn add_query(&mut self, camera: CameraId, handle: QueryHandle) -> usize {
        self.queries.push(OcclusionQuery::new(camera, handle));
        self.queries.len() - 1
    }
}

/// All render nodes drawn with one material
#[derive(Debug, Clone)]
pub struct MaterialRenderUnit {
    material: MaterialId,
    nodes: Vec<RenderNodeId>,
}

impl MaterialRenderUnit {
    /// Empty unit for `material`
    pub fn new(material: MaterialId) -> Self {
        Self {
            material,
            nodes: Vec::new(),
        }
    }

    /// Material of this unit
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Render nodes in draw order
    pub fn nodes(&self) -> &[RenderNodeId] {
        &self.nodes
    }

    /// Number of render nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the unit has no render nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` belongs to this unit
    pub fn contains(&self, id: RenderNodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Insert `id` right after the last node drawing `chunk`, or at the end
    pub(crate) fn insert_grouped(
        &mut self,
        id: RenderNodeId,
        chunk: ChunkHandle,
        chunk_of: impl Fn(RenderNodeId) -> Option<ChunkHandle>,
    ) {
        match self.nodes.iter().rposition(|&other| chunk_of(other) == Some(chunk)) {
            Some(position) => self.nodes.insert(position + 1, id),
            None => self.nodes.push(id),
        }
    }

    pub(crate) fn remove(&mut self, id: RenderNodeId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|&other| other != id);
        self.nodes.len() != before
    }
}
