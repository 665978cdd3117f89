//! Per-node visibility decision
//!
//! Runs the occlusion check and then the frustum check for one render node
//! against the look's camera. Occlusion results are polled, never waited on,
//! so they lag one frame behind the draw that produced them.
//!
//! Under `OCCLUSION_CULLING` a hidden node issues no draw and therefore no
//! new query. With `OCCLUSION_QUERY` also set, every
//! [`OCCLUSION_RECHECK_INTERVAL`]th culled look draws the node's proxy
//! instead, so the node becomes visible again once its occluder moves away.

use crate::render::backend::RenderDevice;
use crate::render::flags::RenderFlags;
use crate::render::primitives::{Camera, CameraId, MeshChunk};
use crate::scene::observer::{CullEvent, SceneObserver};
use crate::scene::render_unit::RenderNode;
use crate::scene::scene_renderer::SceneStats;

/// Culled looks after which an occlusion-culled node is queried again
pub const OCCLUSION_RECHECK_INTERVAL: u32 = 8;

/// Outcome of the visibility checks for one render node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Drawn with full geometry
    Visible,
    /// Last query saw no samples; drawn through the proxy chunk
    Occluded,
    /// Not drawn this look
    Rejected,
}

/// Camera and flags of the look being rendered
pub(crate) struct CullContext<'a> {
    pub flags: RenderFlags,
    pub camera_id: CameraId,
    pub camera: &'a Camera,
}

/// Decide how `render_node` takes part in the current look
pub(crate) fn check_visibility(
    ctx: &CullContext<'_>,
    device: &mut dyn RenderDevice,
    observer: &mut dyn SceneObserver,
    render_node: &mut RenderNode,
    chunk: &MeshChunk,
    stats: &mut SceneStats,
) -> Visibility {
    let mut occluded = false;
    if ctx.flags.wants_occlusion() && !occlusion_passed(ctx, device, render_node, stats) {
        if ctx.flags.contains(RenderFlags::OCCLUSION_CULLING) && !recheck_due(ctx, render_node) {
            return Visibility::Rejected;
        }
        occluded = true;
    }

    if ctx.flags.contains(RenderFlags::FRUSTUM_CULLING) && chunk.frustum_test() {
        let event = CullEvent {
            node: render_node.node,
            chunk: render_node.chunk,
            material: render_node.material,
            bounds: &render_node.bounds,
            camera: ctx.camera,
        };
        let inside = if ctx.flags.contains(RenderFlags::CUSTOM_VISIBILITY_CHECK) {
            observer.custom_visibility_check(&event)
        } else {
            ctx.camera.test_volume(&render_node.bounds)
        };

        if !inside {
            observer.node_out_of_frustum(&event);
            return Visibility::Rejected;
        }
        observer.node_in_frustum(&event);
    }

    if occluded {
        Visibility::Occluded
    } else {
        Visibility::Visible
    }
}

/// Find or create the query for the look's camera and read its last result
fn occlusion_passed(
    ctx: &CullContext<'_>,
    device: &mut dyn RenderDevice,
    render_node: &mut RenderNode,
    stats: &mut SceneStats,
) -> bool {
    let index = match render_node.query_index(ctx.camera_id) {
        Some(index) => index,
        None => match device.create_query() {
            Ok(handle) => {
                stats.queries_created += 1;
                log::trace!("Created occlusion query {:?} for camera {:?}", handle, ctx.camera_id);
                render_node.add_query(ctx.camera_id, handle)
            }
            Err(e) => {
                log::warn!("Occlusion query unavailable, treating node as visible: {}", e);
                return true;
            }
        },
    };
    let query = &mut render_node.queries[index];

    if ctx.flags.contains(RenderFlags::OCCLUSION_QUERY) && query.pending {
        if let Some(result) = device.poll_query(query.handle) {
            query.last_result = Some(result);
            query.pending = false;
        }
    }
    if query.passed() {
        query.culled_looks = 0;
    }
    query.passed()
}

/// Count one more culled look; true when the proxy should be drawn to re-query
fn recheck_due(ctx: &CullContext<'_>, render_node: &mut RenderNode) -> bool {
    if !ctx.flags.contains(RenderFlags::OCCLUSION_QUERY) {
        return false;
    }
    let Some(index) = render_node.query_index(ctx.camera_id) else {
        return false;
    };
    let query = &mut render_node.queries[index];
    query.culled_looks += 1;
    if query.culled_looks < OCCLUSION_RECHECK_INTERVAL {
        return false;
    }
    query.culled_looks = 0;
    !query.pending
}
