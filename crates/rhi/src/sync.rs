//! Synchronization primitives: semaphores and fences.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// RAII wrapper around a binary semaphore for GPU-GPU synchronization.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        // SAFETY: create_info is fully initialized above.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the raw semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once after device idle.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// RAII wrapper around a fence for CPU-GPU synchronization.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally in the signaled state.
    ///
    /// Frame slot fences start signaled so the first wait on each slot does
    /// not deadlock.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        // SAFETY: create_info is fully initialized above.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    /// Returns the raw fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or the timeout (in nanoseconds)
    /// elapses.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        // SAFETY: the fence is live and owned by this wrapper.
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)?;
        }
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: the fence is live and not in use by a pending submission.
        unsafe {
            self.device.handle().reset_fences(&[self.fence])?;
        }
        Ok(())
    }

    /// Returns whether the fence is currently signaled.
    pub fn is_signaled(&self) -> bool {
        // SAFETY: the fence is live and owned by this wrapper.
        matches!(unsafe { self.device.handle().get_fence_status(self.fence) }, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once after device idle.
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_sync_primitives_are_send_sync() {
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
