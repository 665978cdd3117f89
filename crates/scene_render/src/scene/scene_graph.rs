//! Scene node hierarchy
//!
//! Nodes form a tree under a non-renderable root. Each node caches its
//! local, world and normal matrices. Moving a node only flags it for
//! recalculation; the per-render depth-first update rebuilds the matrices,
//! pushes the flag down to children and records which nodes changed this
//! frame in the scene's invalidated set.

use crate::foundation::collections::{new_key_type, SlotMap};
use crate::foundation::math::{utils, Mat3, Mat4, Point3, Quat, Transform, Vec3};
use crate::render::{RenderError, RenderResult};

new_key_type! {
    /// Identifier of a node in a scene graph
    pub struct NodeId;
}

/// A node of the scene hierarchy
#[derive(Debug, Clone)]
pub struct SceneNode {
    transform: Transform,
    local: Mat4,
    world: Mat4,
    normal: Mat3,

    parent: Option<NodeId>,
    children: Vec<NodeId>,

    /// Disabled nodes keep updating but are never drawn
    pub enabled: bool,
    /// Whether render nodes may draw this node at all
    pub renderable: bool,
    visible: bool,
    invalidated: bool,
    recalc: bool,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneNode {
    /// Enabled, renderable node at the origin
    pub fn new() -> Self {
        Self::with_transform(Transform::identity())
    }

    /// Enabled, renderable node with `transform`
    pub fn with_transform(transform: Transform) -> Self {
        Self {
            transform,
            local: Mat4::identity(),
            world: Mat4::identity(),
            normal: Mat3::identity(),
            parent: None,
            children: Vec::new(),
            enabled: true,
            renderable: true,
            visible: false,
            invalidated: false,
            recalc: true,
        }
    }

    /// Local transform
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Replace the local transform
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.recalc = true;
    }

    /// Set position relative to the parent
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.recalc = true;
    }

    /// Translate relative to the parent
    pub fn move_by(&mut self, delta: Vec3) {
        self.transform.position += delta;
        self.recalc = true;
    }

    /// Set rotation relative to the parent
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
        self.recalc = true;
    }

    /// Apply `rotation` after the current rotation
    pub fn rotate(&mut self, rotation: Quat) {
        self.transform.rotation = rotation * self.transform.rotation;
        self.recalc = true;
    }

    /// Set scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.recalc = true;
    }

    /// Local matrix as of the last update
    pub fn local_matrix(&self) -> &Mat4 {
        &self.local
    }

    /// World matrix as of the last update
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    /// Normal matrix as of the last update
    pub fn normal_matrix(&self) -> &Mat3 {
        &self.normal
    }

    /// World-space origin of the node
    pub fn world_position(&self) -> Point3 {
        self.world.transform_point(&Point3::origin())
    }

    /// Parent node; `None` only for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether any render node of this node passed culling in the last render
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the world matrix changed during the current render
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Whether the matrices will be rebuilt on the next update
    pub fn needs_recalc(&self) -> bool {
        self.recalc
    }

    /// Force a matrix rebuild on the next update
    pub fn force_recalc(&mut self) {
        self.recalc = true;
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Rebuild matrices if flagged; returns whether they changed
    fn update(&mut self, parent_world: Option<&Mat4>) -> bool {
        self.visible = false;
        if !self.recalc {
            return false;
        }

        self.local = self.transform.to_matrix();
        self.world = match parent_world {
            Some(parent) => parent * self.local,
            None => self.local,
        };
        self.normal = utils::normal_matrix(&self.world);

        self.recalc = false;
        self.invalidated = true;
        true
    }
}

/// Tree of scene nodes
#[derive(Debug)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, SceneNode>,
    root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Graph holding only the root node
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let mut root = SceneNode::new();
        root.renderable = false;
        let root = nodes.insert(root);
        Self { nodes, root }
    }

    /// Root node id
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Attach `node` under `parent`, or under the root when `None`
    pub fn add(&mut self, mut node: SceneNode, parent: Option<NodeId>) -> RenderResult<NodeId> {
        let parent = parent.unwrap_or(self.root);
        if !self.nodes.contains_key(parent) {
            return Err(RenderError::InvalidHandle(format!("parent node {parent:?}")));
        }

        node.parent = Some(parent);
        node.children.clear();
        node.recalc = true;
        let id = self.nodes.insert(node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
        }
        Ok(id)
    }

    /// Detach and return a node
    ///
    /// Its children are re-parented to its parent and recalculated on the
    /// next update. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> Option<SceneNode> {
        if id == self.root {
            return None;
        }

        let node = self.nodes.remove(id)?;
        let parent = node.parent.unwrap_or(self.root);

        for &child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = Some(parent);
                child_node.recalc = true;
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|&c| c != id);
            parent_node.children.extend_from_slice(&node.children);
        }
        Some(node)
    }

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Mutable node by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    /// Whether `id` is a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is always present
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first update from the root
    ///
    /// Rebuilds flagged nodes, propagates the flag to children of rebuilt
    /// nodes and appends rebuilt nodes to `invalidated`. Returns the number
    /// of nodes visited.
    pub(crate) fn update(&mut self, invalidated: &mut Vec<NodeId>) -> usize {
        Self::update_recursive(&mut self.nodes, self.root, None, invalidated)
    }

    fn update_recursive(
        nodes: &mut SlotMap<NodeId, SceneNode>,
        id: NodeId,
        parent_world: Option<Mat4>,
        invalidated: &mut Vec<NodeId>,
    ) -> usize {
        let Some(node) = nodes.get_mut(id) else {
            return 0;
        };
        let rebuilt = node.update(parent_world.as_ref());
        if rebuilt {
            invalidated.push(id);
        }
        let world = node.world;
        let children = node.children.clone();

        let mut visited = 1;
        for child in children {
            if rebuilt {
                if let Some(child_node) = nodes.get_mut(child) {
                    child_node.recalc = true;
                }
            }
            visited += Self::update_recursive(nodes, child, Some(world), invalidated);
        }
        visited
    }

    /// Clear the invalidated flag of every node in `invalidated` and empty it
    pub(crate) fn validate(&mut self, invalidated: &mut Vec<NodeId>) {
        for id in invalidated.drain(..) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.invalidated = false;
            }
        }
    }
}
