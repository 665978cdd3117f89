//! Invocation records for GPU multi-draw
//!
//! With multirender each render node owns a slot in a device-side array of
//! [`InvocationRecord`]s. An indirect draw command selects its record through
//! its base instance, so shaders can fetch per-node matrices and material
//! index without per-object state changes. Slots are recycled through a free
//! list, and a record is rewritten and pushed as soon as its node changes.

use bytemuck::{Pod, Zeroable};

use crate::foundation::collections::FreeList;
use crate::foundation::math::{utils, Mat3, Mat4};
use crate::render::backend::{BackendResult, BufferUsage, RenderDevice};
use crate::render::buffer::GpuBuffer;
use crate::render::resources::materials::MaterialId;
use crate::scene::render_unit::RenderNodeId;

const RECORD_USED: u32 = 1;

/// Per-node data read by shaders during a multi-draw
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InvocationRecord {
    /// World matrix, column-major
    pub model: [[f32; 4]; 4],
    /// Normal matrix padded to 4x4
    pub normal: [[f32; 4]; 4],
    /// Camera view-projection times world
    pub mvp: [[f32; 4]; 4],
    /// Index of the material parameters
    pub material_index: u32,
    /// Bit 0 set while the slot is owned by a render node
    pub flags: u32,
    _padding: [u32; 2],
}

impl InvocationRecord {
    /// Record for a node with world matrix `model`
    pub fn new(model: &Mat4, normal: &Mat3, view_projection: &Mat4, material: MaterialId) -> Self {
        Self {
            model: utils::to_columns(model),
            normal: utils::mat3_to_padded_columns(normal),
            mvp: utils::to_columns(&(view_projection * model)),
            material_index: material.0,
            flags: RECORD_USED,
            _padding: [0; 2],
        }
    }

    /// A released slot
    pub fn unused() -> Self {
        Self::zeroed()
    }

    /// Whether the slot is owned by a render node
    pub fn is_used(&self) -> bool {
        self.flags & RECORD_USED != 0
    }
}

/// Device array of invocation records with slot recycling
#[derive(Debug)]
pub struct InvocationBuffer {
    buffer: GpuBuffer,
    slots: FreeList<RenderNodeId>,
}

impl InvocationBuffer {
    /// Record size in bytes
    pub const RECORD_SIZE: usize = std::mem::size_of::<InvocationRecord>();

    /// Allocate room for `capacity` records
    pub fn new(device: &mut dyn RenderDevice, capacity: usize, growth_factor: f32) -> BackendResult<Self> {
        Ok(Self {
            buffer: GpuBuffer::allocate(
                device,
                BufferUsage::InvocationRecords,
                capacity * Self::RECORD_SIZE,
                growth_factor,
            )?,
            slots: FreeList::new(),
        })
    }

    /// Claim a slot for `owner`, reusing a released one first
    pub fn acquire(&mut self, owner: RenderNodeId) -> usize {
        self.slots.insert(owner)
    }

    /// Release a slot and mark its record unused on the device
    pub fn release(&mut self, device: &mut dyn RenderDevice, index: usize) {
        if self.slots.remove(index).is_none() {
            return;
        }
        if let Err(e) = self.write(device, index, &InvocationRecord::unused()) {
            log::warn!("Failed to clear invocation record {}: {}", index, e);
        }
    }

    /// Upload one record, growing the buffer when `index` lies past its end
    pub fn write(&mut self, device: &mut dyn RenderDevice, index: usize, record: &InvocationRecord) -> BackendResult<()> {
        self.buffer
            .sub_write(device, index * Self::RECORD_SIZE, bytemuck::bytes_of(record))
    }

    /// Owner of a slot
    pub fn owner(&self, index: usize) -> Option<RenderNodeId> {
        self.slots.get(index).copied()
    }

    /// Slots in use
    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    /// Underlying device buffer
    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    /// Release the device buffer
    pub fn release_all(self, device: &mut dyn RenderDevice) {
        self.buffer.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::foundation::math::Vec3;
    use crate::render::headless::HeadlessDevice;

    #[test]
    fn test_record_layout() {
        assert_eq!(InvocationBuffer::RECORD_SIZE, 208);
        assert!(!InvocationRecord::unused().is_used());
    }

    #[test]
    fn test_record_mvp_combines_camera_and_model() {
        let model = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let view_projection = Mat4::new_scaling(2.0);
        let record = InvocationRecord::new(&model, &Mat3::identity(), &view_projection, MaterialId(7));

        assert!(record.is_used());
        assert_eq!(record.material_index, 7);
        assert_eq!(record.mvp[3][0], 2.0);
        assert_eq!(record.model[3][2], 3.0);
    }

    #[test]
    fn test_released_slot_reused_and_cleared() {
        let mut device = HeadlessDevice::new();
        let mut owners: SlotMap<RenderNodeId, ()> = SlotMap::with_key();
        let mut records = InvocationBuffer::new(&mut device, 1, 2.0).unwrap();

        let a = records.acquire(owners.insert(()));
        let b = records.acquire(owners.insert(()));
        let record = InvocationRecord::new(&Mat4::identity(), &Mat3::identity(), &Mat4::identity(), MaterialId(1));
        records.write(&mut device, a, &record).unwrap();
        records.write(&mut device, b, &record).unwrap();

        records.release(&mut device, a);
        let contents = device.buffer_contents(records.buffer().handle()).unwrap();
        let cleared: InvocationRecord = bytemuck::pod_read_unaligned(&contents[..InvocationBuffer::RECORD_SIZE]);
        assert!(!cleared.is_used());

        let c = records.acquire(owners.insert(()));
        assert_eq!(c, a);
        assert_eq!(records.live_count(), 2);
    }
}
