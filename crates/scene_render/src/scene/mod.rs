//! Scene management and per-look rendering
//!
//! A [`Scene`] owns a node hierarchy and the render nodes that attach mesh
//! chunks and materials to it. Rendering a scene through a camera builds a
//! render queue, culls it, sorts it and emits it with one of the batch
//! strategies.
//!
//! ## Architecture
//!
//! ```text
//! SceneGraph (transforms, invalidation)
//!      ↓
//! MaterialRenderUnit / RenderNode (cached bounds, distances, queries)
//!      ↓
//! RenderQueue (opaque and blended stages)
//!      ↓
//! BatchEmitter (naive, instancing, multirender)
//! ```

pub mod bounds;
pub mod scene_graph;
pub mod render_unit;
pub mod invocation;
pub mod render_queue;
pub mod observer;
pub mod culling;
mod batch_renderer;
mod scene_manager;
mod scene_renderer;

#[cfg(test)]
mod tests;

pub use batch_renderer::BatchStrategy;
pub use bounds::{BoundingVolume, Frustum, Plane, AABB};
pub use culling::{Visibility, OCCLUSION_RECHECK_INTERVAL};
pub use invocation::{InvocationBuffer, InvocationRecord};
pub use observer::{CullEvent, DrawEvent, SceneObserver};
pub use render_queue::{RenderQueue, SortOrder, Stage, StageEntry};
pub use render_unit::{CameraDistance, MaterialRenderUnit, OcclusionQuery, RenderNode, RenderNodeId};
pub use scene_graph::{NodeId, SceneGraph, SceneNode};
pub use scene_manager::Scene;
pub use scene_renderer::{FrameResources, SceneStats};
