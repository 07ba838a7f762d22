//! Rendering hardware interface built on Vulkan.
//!
//! This crate wraps the raw Vulkan API (via ash) in RAII types:
//! - Instance and device setup with optional validation layers
//! - Swapchain creation, presentation, and recreation
//! - Render pass, framebuffer, and graphics pipeline objects
//! - Buffers, textures, and descriptor sets backed by gpu-allocator
//! - Synchronization primitives (semaphores and fences)

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash's vk module so downstream crates don't need a direct ash dep
pub use ash::vk;
