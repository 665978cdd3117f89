//! Growable device buffer

use crate::render::backend::{BackendResult, BufferHandle, BufferUsage, RenderDevice};

/// A device buffer that grows geometrically on demand
///
/// Growth goes through [`RenderDevice::resize_buffer`], which keeps existing
/// contents. A failed growth leaves the buffer untouched.
#[derive(Debug)]
pub struct GpuBuffer {
    handle: BufferHandle,
    usage: BufferUsage,
    capacity: usize,
    growth_factor: f32,
}

impl GpuBuffer {
    /// Allocate a buffer of `capacity` bytes
    pub fn allocate(
        device: &mut dyn RenderDevice,
        usage: BufferUsage,
        capacity: usize,
        growth_factor: f32,
    ) -> BackendResult<Self> {
        let handle = device.create_buffer(usage, capacity)?;
        log::debug!("Allocated {:?} buffer {:?} ({} bytes)", usage, handle, capacity);
        Ok(Self {
            handle,
            usage,
            capacity,
            growth_factor,
        })
    }

    /// Device handle
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Current capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow the buffer by `delta` bytes
    pub fn extend(&mut self, device: &mut dyn RenderDevice, delta: usize) -> BackendResult<()> {
        let new_capacity = self.capacity + delta;
        device.resize_buffer(self.handle, new_capacity)?;
        log::debug!(
            "Grew {:?} buffer {:?}: {} -> {} bytes",
            self.usage, self.handle, self.capacity, new_capacity
        );
        self.capacity = new_capacity;
        Ok(())
    }

    /// Make room for at least `required` bytes, growing by the growth factor
    pub fn reserve(&mut self, device: &mut dyn RenderDevice, required: usize) -> BackendResult<()> {
        if required <= self.capacity {
            return Ok(());
        }

        let mut new_capacity = self.capacity.max(1);
        while new_capacity < required {
            let grown = (new_capacity as f32 * self.growth_factor).ceil() as usize;
            new_capacity = grown.max(new_capacity + 1);
        }
        self.extend(device, new_capacity - self.capacity)
    }

    /// Write `data` at `offset`, growing first when the range does not fit
    pub fn sub_write(&mut self, device: &mut dyn RenderDevice, offset: usize, data: &[u8]) -> BackendResult<()> {
        self.reserve(device, offset + data.len())?;
        device.write_buffer(self.handle, offset, data)
    }

    /// Release the device buffer
    pub fn release(self, device: &mut dyn RenderDevice) {
        device.destroy_buffer(self.handle);
    }
}
