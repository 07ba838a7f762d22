//! Swapchain creation, presentation, and recreation.
//!
//! # Overview
//!
//! The [`Swapchain`] owns the `VkSwapchainKHR`, its images, and one image
//! view per image. Acquire and present surface their stale results
//! (`ERROR_OUT_OF_DATE_KHR` / suboptimal) to the caller instead of treating
//! them as hard errors, because the presentation loop reacts to them by
//! recreating the swapchain.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiResult;

/// Surface capabilities, formats, and present modes for a device/surface pair.
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image counts, extent bounds, transforms).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries support details for the given device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: both handles are live and owned by the caller.
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true when the surface exposes at least one format and mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// RAII wrapper around a Vulkan swapchain and its image views.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a swapchain for the given surface at the given extent.
    ///
    /// The requested extent is only honored when the surface leaves the
    /// extent up to the swapchain; otherwise the surface's current extent
    /// wins.
    pub fn new(
        instance: &ash::Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device.handle());

        let (swapchain, images, image_views, format, extent) = Self::create_internal(
            &device,
            &swapchain_loader,
            surface,
            surface_loader,
            width,
            height,
            vk::SwapchainKHR::null(),
        )?;

        info!(
            "Swapchain created: {} images, {:?}, {}x{}",
            images.len(),
            format,
            extent.width,
            extent.height
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn create_internal(
        device: &Arc<Device>,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<(
        vk::SwapchainKHR,
        Vec<vk::Image>,
        Vec<vk::ImageView>,
        vk::Format,
        vk::Extent2D,
    )> {
        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        let families = device.queue_families();
        let family_indices = [
            families.graphics_family.unwrap_or(0),
            families.present_family.unwrap_or(0),
        ];
        let concurrent = family_indices[0] != family_indices[1];

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if concurrent {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        // SAFETY: surface and old_swapchain are live (or null) handles;
        // create_info references live arrays for the call.
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        let image_views = create_image_views(device, &images, surface_format.format)?;

        Ok((swapchain, images, image_views, surface_format.format, extent))
    }

    /// Recreates the swapchain at a new extent, chaining the old swapchain.
    ///
    /// Waits for the device to go idle first. The caller is responsible for
    /// destroying framebuffers and other objects that reference the old
    /// image views before calling this.
    pub fn recreate(
        &mut self,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        self.device.wait_idle()?;

        let (swapchain, images, image_views, format, extent) = Self::create_internal(
            &self.device,
            &self.swapchain_loader,
            surface,
            surface_loader,
            width,
            height,
            self.swapchain,
        )?;

        self.destroy_image_views();
        // SAFETY: the old swapchain was handed to create_internal as
        // old_swapchain and is retired; nothing references it after the
        // device idle above.
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }

        self.swapchain = swapchain;
        self.images = images;
        self.image_views = image_views;
        self.format = format;
        self.extent = extent;

        debug!(
            "Swapchain recreated: {} images, {}x{}",
            self.images.len(),
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Acquires the next presentable image.
    ///
    /// `semaphore` is signaled when the image is actually ready for
    /// rendering. Returns the image index and whether the swapchain is
    /// suboptimal for the surface. Stale swapchains surface as
    /// `Err(vk::Result::ERROR_OUT_OF_DATE_KHR)`.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        // SAFETY: swapchain and semaphore are live handles owned by us and
        // the caller respectively.
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents a rendered image, waiting on `wait_semaphore`.
    ///
    /// Returns whether the swapchain is suboptimal. Stale swapchains surface
    /// as `Err(vk::Result::ERROR_OUT_OF_DATE_KHR)`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: all handles are live; present_info references stack arrays
        // valid for the duration of the call.
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Returns the number of swapchain images.
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image view for the given image index.
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Returns the swapchain image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn destroy_image_views(&mut self) {
        // SAFETY: the views were created by us and nothing references them
        // after the device idle performed by callers.
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.handle().destroy_image_view(view, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        // SAFETY: the swapchain is destroyed exactly once; Device outlives
        // this wrapper via the Arc.
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        debug!("Swapchain destroyed");
    }
}

/// Picks B8G8R8A8_SRGB with sRGB nonlinear color space when available.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let Some(format) = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    }) {
        return *format;
    }

    if let Some(format) = formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
    {
        warn!("Preferred sRGB format unavailable, falling back to UNORM");
        return *format;
    }

    warn!("No preferred surface format available, using first reported");
    formats[0]
}

/// Picks MAILBOX when available, otherwise the always-supported FIFO.
fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Resolves the swapchain extent from surface capabilities.
///
/// When the surface reports `u32::MAX` the window manager lets the
/// swapchain pick, so the requested size is clamped to the allowed range.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Requests one image over the minimum, clamped to the surface maximum.
///
/// A `max_image_count` of zero means no maximum.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

fn create_image_views(
    device: &Arc<Device>,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        // SAFETY: image belongs to the swapchain being constructed.
        let view = unsafe { device.handle().create_image_view(&create_info, None)? };
        views.push(view);
    }

    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_preferred_srgb_format_selected() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_unorm_fallback_when_srgb_missing() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_first_format_used_as_last_resort() {
        let formats = [format(
            vk::Format::R16G16B16A16_SFLOAT,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_mailbox_preferred_over_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_fifo_fallback() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_uses_surface_current_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 768);
    }

    #[test]
    fn test_extent_clamped_when_window_manager_defers() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 640);
        assert_eq!(extent.height, 480);
    }

    #[test]
    fn test_recreation_extent_is_deterministic() {
        // Recreating at the same requested size must resolve the same extent.
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let first = choose_extent(&capabilities, 800, 600);
        let second = choose_extent(&capabilities, 800, 600);
        assert_eq!((first.width, first.height), (second.width, second.height));
        assert_eq!((first.width, first.height), (800, 600));
    }

    #[test]
    fn test_image_count_one_over_minimum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }

    #[test]
    fn test_image_count_clamped_to_maximum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }

    #[test]
    fn test_image_count_unbounded_maximum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 4,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 5);
    }
}
