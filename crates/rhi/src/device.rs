//! Logical device creation and queue management.

use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Device extensions required by the renderer.
pub const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// RAII wrapper around a Vulkan logical device.
///
/// Owns the device, its queues, and a gpu-allocator instance. Shared as
/// `Arc<Device>` by every resource wrapper so the device is guaranteed to
/// outlive everything created from it.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    limits: vk::PhysicalDeviceLimits,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates a logical device for the selected physical device.
    ///
    /// Enables the swapchain extension and sampler anisotropy, and retrieves
    /// one queue per distinct family (graphics and present may share one).
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator setup fails.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = info
            .queue_families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_ptrs: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        // SAFETY: info.device came from select_physical_device on this
        // instance; create_info references live arrays for the call.
        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };

        let graphics_family = info.queue_families.graphics_family.unwrap_or(0);
        let present_family = info.queue_families.present_family.unwrap_or(graphics_family);

        // SAFETY: both families were requested in queue_infos.
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!(
            "Logical device created (graphics family {}, present family {})",
            graphics_family, present_family
        );

        Ok(Arc::new(Self {
            device,
            physical_device: info.device,
            limits: info.properties.limits,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families: info.queue_families,
        }))
    }

    /// Returns the raw device handle wrapper.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device this device was created from.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the physical device limits.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Returns the graphics queue.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices used at creation.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Locks and returns the GPU memory allocator.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().expect("allocator mutex poisoned")
    }

    /// Blocks until the device has finished all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: device is live; this is an unconditional global barrier.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // The renderer waits for device idle before releasing anything, so
        // no submitted work can be outstanding here.
        // SAFETY: the allocator must release its memory blocks before the
        // device is destroyed; both happen exactly once here.
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        debug!("Logical device destroyed");
    }
}

// The raw handles are plain pointers; access to the allocator is guarded by
// the internal mutex and queue submission is externally synchronized.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_device_is_send_sync() {
        assert_send_sync::<Device>();
    }

    #[test]
    fn test_required_extensions_include_swapchain() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }
}
