//! Descriptor set layouts, pools, and update helpers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// RAII wrapper around a descriptor set layout.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from the given bindings.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        // SAFETY: bindings live for the duration of the call.
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        Ok(Self { device, layout })
    }

    /// Returns the raw layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once; the device outlives this wrapper.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// RAII wrapper around a descriptor pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Creates a descriptor pool with the given capacity.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        // SAFETY: pool_sizes lives for the duration of the call.
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        debug!("Descriptor pool created (max {max_sets} sets)");

        Ok(Self { device, pool })
    }

    /// Allocates one descriptor set per layout handle given.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        // SAFETY: pool and layouts are live handles.
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Returns every set allocated from this pool back to it.
    ///
    /// The caller must ensure none of the sets are referenced by pending
    /// command buffers.
    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: caller guarantees no set from this pool is in flight.
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // SAFETY: destroying the pool frees its sets; callers wait for device
        // idle before dropping.
        unsafe {
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Applies descriptor writes immediately.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet<'_>]) {
    // SAFETY: writes reference live buffer/image infos supplied by the caller.
    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

/// Builders for common descriptor set layout bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    /// A single uniform buffer binding.
    pub fn uniform_buffer(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)
    }

    /// A single combined image sampler binding.
    pub fn combined_image_sampler(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_combined_image_sampler_binding() {
        let binding =
            DescriptorBindingBuilder::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 1);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
