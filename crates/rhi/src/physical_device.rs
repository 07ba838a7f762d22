//! Physical device selection.
//!
//! Enumerates GPUs, filters out devices that cannot present a textured quad
//! to the given surface, and picks the highest scoring remaining device.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info};

use crate::device::DEVICE_EXTENSIONS;
use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Queue family indices required for rendering and presentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    /// Queue family that supports graphics commands.
    pub graphics_family: Option<u32>,
    /// Queue family that can present to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Returns true when every required family was found.
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, for queue creation.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::new();
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// A selected physical device together with its cached properties.
pub struct PhysicalDeviceInfo {
    /// The physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, type, limits).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Queue families found for this device.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as reported by the driver.
    pub fn device_name(&self) -> String {
        // SAFETY: device_name is a null-terminated array filled by the driver.
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned()
        }
    }

    /// Returns a human readable device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the best physical device that can render to `surface`.
///
/// A device is suitable when it has graphics and present queue families,
/// supports the swapchain extension with at least one surface format and
/// present mode, and supports sampler anisotropy.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    // SAFETY: instance is a live handle owned by the caller.
    let devices = unsafe { instance.enumerate_physical_devices()? };
    if devices.is_empty() {
        return Err(RhiError::NoSuitableGpu);
    }

    let mut best: Option<(u64, PhysicalDeviceInfo)> = None;

    for device in devices {
        // SAFETY: device handles come from the enumeration above.
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };

        let queue_families = find_queue_families(instance, device, surface, surface_loader)?;

        let info = PhysicalDeviceInfo {
            device,
            properties,
            features,
            queue_families,
        };

        if !is_device_suitable(instance, &info, surface, surface_loader)? {
            debug!("Rejected device: {}", info.device_name());
            continue;
        }

        let score = rate_device(&info);
        debug!("Candidate device: {} (score {})", info.device_name(), score);

        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((score, info));
        }
    }

    let (_, info) = best.ok_or(RhiError::NoSuitableGpu)?;
    info!(
        "Selected GPU: {} ({})",
        info.device_name(),
        info.device_type_name()
    );
    Ok(info)
}

/// Finds graphics and present queue families for a device.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<QueueFamilyIndices> {
    // SAFETY: device and surface are live handles from the caller.
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let index = i as u32;

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(index);
        }

        if indices.present_family.is_none() {
            // SAFETY: index is a valid family index for this device.
            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)?
            };
            if present_support {
                indices.present_family = Some(index);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

fn is_device_suitable(
    instance: &ash::Instance,
    info: &PhysicalDeviceInfo,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<bool> {
    if !info.queue_families.is_complete() {
        return Ok(false);
    }

    if !supports_required_extensions(instance, info.device)? {
        return Ok(false);
    }

    // The swapchain extension alone is not enough: the surface must expose
    // at least one format and one present mode.
    let support = SwapchainSupportDetails::query(info.device, surface, surface_loader)?;
    if !support.is_adequate() {
        return Ok(false);
    }

    if info.features.sampler_anisotropy == vk::FALSE {
        return Ok(false);
    }

    Ok(true)
}

fn supports_required_extensions(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> RhiResult<bool> {
    // SAFETY: device is a live handle from enumeration.
    let available = unsafe { instance.enumerate_device_extension_properties(device)? };

    for required in DEVICE_EXTENSIONS {
        let found = available.iter().any(|ext| {
            // SAFETY: extension_name is a null-terminated array from the driver.
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == required
        });
        if !found {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Scores a device so that discrete GPUs win over integrated ones.
fn rate_device(info: &PhysicalDeviceInfo) -> u64 {
    let type_score: u64 = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        _ => 10,
    };

    type_score + u64::from(info.properties.limits.max_image_dimension2_d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_indices() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_complete_indices() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert!(indices.is_complete());
    }

    #[test]
    fn test_unique_families_deduplicates_shared_queue() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![2]);
    }

    #[test]
    fn test_unique_families_keeps_distinct_queues() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }
}
