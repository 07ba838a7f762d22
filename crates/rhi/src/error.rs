//! Error types for the rendering hardware interface.

use thiserror::Error;

/// Errors that can occur in the RHI layer.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A raw Vulkan call returned an error code.
    #[error("Vulkan API error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// The Vulkan loader could not be initialized.
    #[error("Failed to load Vulkan library: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU memory allocation failed.
    #[error("GPU memory allocation failed: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No physical device satisfied the requirements.
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader module loading or creation failed.
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation or query failed.
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain creation or recreation failed.
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline construction was invalid or failed.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Texture creation from pixel data failed.
    #[error("Texture error: {0}")]
    TextureError(String),

    /// A handle or argument was invalid for the requested operation.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = Result<T, RhiError>;
