//! GPU buffer management backed by gpu-allocator.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::{CommandPool, one_time_submit};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What a buffer is used for; determines usage flags and memory placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer, device local, filled through a staging copy.
    Vertex,
    /// Index buffer, device local, filled through a staging copy.
    Index,
    /// Uniform buffer, host visible, rewritten every frame.
    Uniform,
    /// Staging buffer, host visible transfer source.
    Staging,
}

impl BufferUsage {
    fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            Self::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            Self::Index => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            Self::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    fn memory_location(self) -> MemoryLocation {
        match self {
            Self::Vertex | Self::Index => MemoryLocation::GpuOnly,
            Self::Uniform | Self::Staging => MemoryLocation::CpuToGpu,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex buffer",
            Self::Index => "index buffer",
            Self::Uniform => "uniform buffer",
            Self::Staging => "staging buffer",
        }
    }
}

/// RAII wrapper around a Vulkan buffer and its allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates an unfilled buffer of the given size.
    ///
    /// # Errors
    ///
    /// Rejects zero-sized buffers; otherwise propagates Vulkan and allocator
    /// errors.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: u64) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "cannot create zero-sized {}",
                usage.name()
            )));
        }

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: create_info is fully initialized above.
        let buffer = unsafe { device.handle().create_buffer(&create_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        // SAFETY: the allocation was just made against this buffer's
        // requirements and is unbound.
        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} ({} bytes)", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer and fills it with `data`.
    ///
    /// Only valid for host-visible usages (uniform and staging).
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as u64)?;
        buffer.upload(data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer and fills it through a staging copy.
    ///
    /// Blocks until the transfer has completed, so the staging buffer can be
    /// released on return.
    pub fn device_local_with_data(
        device: Arc<Device>,
        usage: BufferUsage,
        data: &[u8],
        pool: &CommandPool,
    ) -> RhiResult<Self> {
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device.clone(), usage, data.len() as u64)?;

        one_time_submit(&device, pool, |device, cmd| {
            let region = vk::BufferCopy::default().size(data.len() as u64);
            // SAFETY: both buffers are live and sized for the region.
            unsafe {
                device.cmd_copy_buffer(cmd, staging.handle(), buffer.handle(), &[region]);
            }
        })?;

        Ok(buffer)
    }

    /// Writes `data` into a mapped, host-visible buffer.
    ///
    /// # Errors
    ///
    /// Fails when the buffer is not host visible or `data` does not fit.
    pub fn upload(&self, data: &[u8]) -> RhiResult<()> {
        if data.len() as u64 > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "write of {} bytes exceeds {} of {} bytes",
                data.len(),
                self.usage.name(),
                self.size
            )));
        }

        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("buffer allocation already freed".into()))?;

        let mapped = allocation.mapped_ptr().ok_or_else(|| {
            RhiError::InvalidHandle(format!("{} is not host visible", self.usage.name()))
        })?;

        // SAFETY: the mapping covers the whole allocation and data fits per
        // the bounds check above.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped.as_ptr().cast::<u8>(),
                data.len(),
            );
        }

        Ok(())
    }

    /// Returns the raw buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().free(allocation)
        {
            error!("Failed to free {} allocation: {e}", self.usage.name());
        }
        // SAFETY: destroyed exactly once, after its memory is released.
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert_eq!(
            BufferUsage::Uniform.to_vk_usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_memory_locations() {
        assert_eq!(
            BufferUsage::Vertex.memory_location(),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            BufferUsage::Index.memory_location(),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            BufferUsage::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Staging.memory_location(),
            MemoryLocation::CpuToGpu
        );
    }
}
