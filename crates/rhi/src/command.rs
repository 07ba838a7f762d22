//! Command pool management and one-shot command submission.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// RAII wrapper around a command pool on the graphics queue family.
///
/// Created with `RESET_COMMAND_BUFFER` so individual buffers can be
/// re-recorded after swapchain recreation.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Creates a command pool for the graphics queue family.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics_family.unwrap_or(0);

        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        // SAFETY: create_info is fully initialized above.
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        debug!("Command pool created (family {graphics_family})");

        Ok(Self { device, pool })
    }

    /// Returns the raw command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: the pool is live and owned by this wrapper.
        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(buffers)
    }

    /// Returns command buffers to the pool.
    ///
    /// The caller must ensure none of them are pending execution.
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        // SAFETY: the buffers were allocated from this pool and the caller
        // guarantees they are not in flight.
        unsafe {
            self.device.handle().free_command_buffers(self.pool, buffers);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: destroying the pool frees its remaining command buffers;
        // callers wait for device idle before dropping.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool destroyed");
    }
}

/// Records and submits a one-shot command buffer on the graphics queue,
/// blocking until it has executed.
///
/// Used for staging copies and image layout transitions during setup.
pub fn one_time_submit<F>(device: &Device, pool: &CommandPool, record: F) -> RhiResult<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let buffers = pool.allocate_command_buffers(1)?;
    let cmd = buffers[0];

    let begin_info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    // SAFETY: cmd was just allocated and is recorded, submitted, and freed
    // exactly once; queue_wait_idle guarantees execution has finished before
    // the buffer is returned to the pool.
    unsafe {
        device.handle().begin_command_buffer(cmd, &begin_info)?;
        record(device.handle(), cmd);
        device.handle().end_command_buffer(cmd)?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        device
            .handle()
            .queue_submit(device.graphics_queue(), &[submit_info], vk::Fence::null())?;
        device.handle().queue_wait_idle(device.graphics_queue())?;
    }

    pool.free_command_buffers(&buffers);
    Ok(())
}
