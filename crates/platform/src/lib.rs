//! Platform layer for the spinning-quad demo.
//!
//! This crate wraps winit window management and Vulkan surface creation:
//! - Window creation and resize tracking
//! - RAII Vulkan surface
//! - Required-extension enumeration for the current platform

mod window;

pub use window::{get_required_extensions, poll_nonzero_extent, Surface, Window};

// Re-export winit types callers need for the event loop
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
