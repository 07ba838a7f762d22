//! Frame presentation and rendering for the spinning-quad demo.
//!
//! This crate owns the presentation loop:
//! - [`FrameScheduler`] drives the per-frame wait/acquire/submit/present
//!   sequence over an abstract [`FrameBackend`]
//! - [`Renderer`] wires the scheduler to the real Vulkan device, swapchain,
//!   and prerecorded command buffers

pub mod frame;
pub mod quad;
pub mod renderer;
pub mod scheduler;
pub mod ubo;

pub use renderer::Renderer;
pub use scheduler::{AcquireOutcome, FrameBackend, FrameOutcome, FrameScheduler, PresentOutcome};

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
