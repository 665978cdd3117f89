//! Scene render observer hooks
//!
//! A [`SceneObserver`] is notified at fixed points of every scene render and
//! may veto the whole render, veto single draws, or replace the built-in
//! frustum test. Every method has a default, so observers only implement
//! the hooks they care about. `()` is the no-op observer.

use crate::render::primitives::{Camera, ChunkHandle};
use crate::render::resources::materials::MaterialId;
use crate::scene::bounds::BoundingVolume;
use crate::scene::scene_graph::NodeId;

/// Render node under visibility test
#[derive(Debug, Clone, Copy)]
pub struct CullEvent<'a> {
    /// Scene node
    pub node: NodeId,
    /// Chunk drawn
    pub chunk: ChunkHandle,
    /// Material drawn with
    pub material: MaterialId,
    /// World-space bounds
    pub bounds: &'a BoundingVolume,
    /// Camera rendering the scene
    pub camera: &'a Camera,
}

/// Draw about to be issued for a render node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawEvent {
    /// Scene node
    pub node: NodeId,
    /// Chunk drawn
    pub chunk: ChunkHandle,
    /// Material drawn with
    pub material: MaterialId,
    /// Instance count
    pub instances: u32,
}

/// Callbacks invoked while a scene renders
pub trait SceneObserver {
    /// Before anything else; returning false skips the render
    fn begin_scene_render(&mut self, _camera: &Camera) -> bool {
        true
    }

    /// After both stages were drawn
    fn end_scene_render(&mut self, _camera: &Camera) {}

    /// Before the opaque stage
    fn begin_opaque_stage_render(&mut self, _camera: &Camera) {}

    /// Before the blended stage
    fn begin_blending_stage_render(&mut self, _camera: &Camera) {}

    /// Before each draw; returning false skips it
    fn begin_draw_batch(&mut self, _draw: &DrawEvent) -> bool {
        true
    }

    /// A render node passed the frustum test
    fn node_in_frustum(&mut self, _event: &CullEvent<'_>) {}

    /// A render node failed the frustum test
    fn node_out_of_frustum(&mut self, _event: &CullEvent<'_>) {}

    /// Replacement frustum test used with `CUSTOM_VISIBILITY_CHECK`
    fn custom_visibility_check(&mut self, _event: &CullEvent<'_>) -> bool {
        true
    }
}

impl SceneObserver for () {}
