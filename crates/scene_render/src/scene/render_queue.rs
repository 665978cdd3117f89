//! Render queue for one look
//!
//! Render nodes that pass culling are appended to the opaque or the blended
//! stage in material-unit order. Each stage is then optionally sorted by
//! camera distance with a stable sort, so entries at equal distance keep the
//! order the material units produced.

use crate::render::flags::RenderFlags;
use crate::render::primitives::ChunkHandle;
use crate::render::resources::materials::MaterialId;
use crate::scene::render_unit::RenderNodeId;

/// Stage a node is drawn in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Drawn first, without blending
    Opaque,
    /// Drawn after the opaque stage with blending
    Transparent,
}

/// Distance ordering of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Farthest first
    ToNear,
    /// Nearest first
    FromNear,
}

/// One render node queued for drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageEntry {
    /// Render node drawn
    pub render_node: RenderNodeId,
    /// Material applied
    pub material: MaterialId,
    /// Geometry drawn: the node chunk, or its proxy when occluded
    pub chunk: ChunkHandle,
    /// Camera distance at queue time
    pub distance: f32,
    /// Instance count
    pub instances: u32,
    /// Whether the entry draws an occluded node's proxy
    pub proxy: bool,
}

/// Opaque and blended stages of a look
#[derive(Debug, Default)]
pub struct RenderQueue {
    opaque: Vec<StageEntry>,
    transparent: Vec<StageEntry>,
}

impl RenderQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to `stage`
    pub fn push(&mut self, stage: Stage, entry: StageEntry) {
        match stage {
            Stage::Opaque => self.opaque.push(entry),
            Stage::Transparent => self.transparent.push(entry),
        }
    }

    /// Opaque stage entries
    pub fn opaque(&self) -> &[StageEntry] {
        &self.opaque
    }

    /// Blended stage entries
    pub fn transparent(&self) -> &[StageEntry] {
        &self.transparent
    }

    /// Entries of `stage`
    pub fn stage(&self, stage: Stage) -> &[StageEntry] {
        match stage {
            Stage::Opaque => &self.opaque,
            Stage::Transparent => &self.transparent,
        }
    }

    /// Total queued entries
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty both stages, keeping their allocations
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    /// Sort each stage as requested by `flags`
    ///
    /// `TO_NEAR` wins when both orders are requested for a stage.
    pub fn sort(&mut self, flags: RenderFlags) {
        if let Some(order) = sort_order(flags, RenderFlags::SORT_OPAQUE_TO_NEAR, RenderFlags::SORT_OPAQUE_FROM_NEAR) {
            sort_stage(&mut self.opaque, order);
        }
        if let Some(order) = sort_order(
            flags,
            RenderFlags::SORT_TRANSPARENT_TO_NEAR,
            RenderFlags::SORT_TRANSPARENT_FROM_NEAR,
        ) {
            sort_stage(&mut self.transparent, order);
        }
    }
}

fn sort_order(flags: RenderFlags, to_near: RenderFlags, from_near: RenderFlags) -> Option<SortOrder> {
    if flags.contains(to_near) {
        Some(SortOrder::ToNear)
    } else if flags.contains(from_near) {
        Some(SortOrder::FromNear)
    } else {
        None
    }
}

/// Stable sort of `entries` by distance
///
/// Uses the IEEE total order, so a NaN distance sorts as farthest instead of
/// breaking the comparator.
pub fn sort_stage(entries: &mut [StageEntry], order: SortOrder) {
    match order {
        SortOrder::ToNear => entries.sort_by(|a, b| b.distance.total_cmp(&a.distance)),
        SortOrder::FromNear => entries.sort_by(|a, b| a.distance.total_cmp(&b.distance)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::render::primitives::MeshId;

    fn entries(distances: &[f32]) -> (SlotMap<RenderNodeId, ()>, Vec<StageEntry>) {
        let mut ids = SlotMap::with_key();
        let entries = distances
            .iter()
            .map(|&distance| StageEntry {
                render_node: ids.insert(()),
                material: MaterialId(1),
                chunk: ChunkHandle { mesh: MeshId(1), index: 0 },
                distance,
                instances: 1,
                proxy: false,
            })
            .collect();
        (ids, entries)
    }

    #[test]
    fn test_to_near_sorts_descending() {
        let (_ids, mut stage) = entries(&[1.0, 5.0, 3.0]);
        sort_stage(&mut stage, SortOrder::ToNear);
        let distances: Vec<f32> = stage.iter().map(|e| e.distance).collect();
        assert_eq!(distances, vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_nan_distance_sorts_as_farthest() {
        let (_ids, mut stage) = entries(&[2.0, f32::NAN, 1.0, 3.0]);
        sort_stage(&mut stage, SortOrder::FromNear);
        let distances: Vec<f32> = stage.iter().map(|e| e.distance).collect();
        assert_eq!(&distances[..3], &[1.0, 2.0, 3.0]);
        assert!(distances[3].is_nan());

        sort_stage(&mut stage, SortOrder::ToNear);
        assert!(stage[0].distance.is_nan());
        assert_eq!(stage[3].distance, 1.0);
    }

    #[test]
    fn test_sort_is_stable_for_equal_distances() {
        let (_ids, stage) = entries(&[2.0, 1.0, 2.0, 1.0]);
        let original: Vec<RenderNodeId> = stage.iter().map(|e| e.render_node).collect();

        let mut sorted = stage.clone();
        sort_stage(&mut sorted, SortOrder::FromNear);
        let order: Vec<RenderNodeId> = sorted.iter().map(|e| e.render_node).collect();
        assert_eq!(order, vec![original[1], original[3], original[0], original[2]]);
    }

    #[test]
    fn test_queue_sort_uses_stage_flags() {
        let (_ids, stage) = entries(&[1.0, 3.0, 2.0]);
        let mut queue = RenderQueue::new();
        for entry in &stage {
            queue.push(Stage::Opaque, *entry);
            queue.push(Stage::Transparent, *entry);
        }

        queue.sort(RenderFlags::SORT_OPAQUE_FROM_NEAR);
        let opaque: Vec<f32> = queue.opaque().iter().map(|e| e.distance).collect();
        let transparent: Vec<f32> = queue.transparent().iter().map(|e| e.distance).collect();
        assert_eq!(opaque, vec![1.0, 2.0, 3.0]);
        assert_eq!(transparent, vec![1.0, 3.0, 2.0]);

        queue.clear();
        assert!(queue.is_empty());
    }
}
