//! Sampled 2D textures uploaded through a staging buffer.
//!
//! # Overview
//!
//! [`Texture::from_rgba8`] takes decoded RGBA8 pixels and produces a
//! device-local image ready for sampling: the pixels go into a staging
//! buffer, the image is transitioned to `TRANSFER_DST_OPTIMAL`, the copy is
//! recorded, and a final barrier moves it to `SHADER_READ_ONLY_OPTIMAL`.
//! The whole upload runs on a one-shot command buffer and blocks until done.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandPool, one_time_submit};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// RAII wrapper around a sampled 2D image, its view, and its sampler.
pub struct Texture {
    device: Arc<Device>,
    image: vk::Image,
    allocation: Option<Allocation>,
    view: vk::ImageView,
    sampler: vk::Sampler,
    width: u32,
    height: u32,
}

impl Texture {
    /// Creates a sampled texture from tightly packed RGBA8 pixel data.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::TextureError`] when the pixel slice does not
    /// match `width * height * 4` bytes; otherwise propagates Vulkan and
    /// allocator errors.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::TextureError(format!(
                "pixel data is {} bytes, expected {expected} for {width}x{height} RGBA8",
                pixels.len()
            )));
        }

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        let format = vk::Format::R8G8B8A8_SRGB;
        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: image_info is fully initialized above.
        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        // SAFETY: the allocation was made for this image and is unbound.
        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        one_time_submit(&device, pool, |raw, cmd| {
            transition_layout(
                raw,
                cmd,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(extent);

            // SAFETY: staging outlives the blocking submit; the image was
            // just transitioned to TRANSFER_DST_OPTIMAL.
            unsafe {
                raw.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            transition_layout(
                raw,
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        // SAFETY: the image is live and bound to memory.
        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(device.limits().max_sampler_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS);

        // SAFETY: sampler_info is fully initialized above.
        let sampler = unsafe { device.handle().create_sampler(&sampler_info, None)? };

        debug!("Texture created: {width}x{height} {format:?}");

        Ok(Self {
            device,
            image,
            allocation: Some(allocation),
            view,
            sampler,
            width,
            height,
        })
    }

    /// Returns the shader-readable image view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the sampler.
    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Returns the texture width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the texture height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        // SAFETY: sampler and view are destroyed before the image, the image
        // before its memory is released; all exactly once after device idle.
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
            self.device.handle().destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().free(allocation)
        {
            error!("Failed to free texture allocation: {e}");
        }
        // SAFETY: see above.
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        debug!("Texture destroyed");
    }
}

/// Records an image layout transition for the upload path.
fn transition_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::SHADER_READ,
        ),
        _ => (
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        ),
    };

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    // SAFETY: cmd is in the recording state and image is live.
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}
