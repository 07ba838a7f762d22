//! Window management using winit.
//!
//! This module provides window creation and Vulkan surface creation.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use spinquad_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// Owns a `vk::SurfaceKHR` handle and destroys it when dropped. The surface
/// loader is stored internally to perform cleanup and support queries.
///
/// # Ownership
/// The caller must ensure the Vulkan instance outlives this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Get the raw Vulkan surface handle.
    ///
    /// Valid only as long as this `Surface` instance exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get a reference to the surface loader.
    ///
    /// Used for querying surface capabilities, formats, and present modes.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by ash_window::create_surface and the
        // loader comes from the same instance. This is the only destroy site.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A window wrapper providing access to the underlying winit window
/// and raw handles for Vulkan surface creation.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Create a new window with the given dimensions and title.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
            width,
            height,
        })
    }

    /// Get a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Get the last resize-reported width of the window.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the last resize-reported height of the window.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Update the stored dimensions (call this when handling resize events).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Query the live framebuffer extent from the windowing system.
    ///
    /// Either dimension may be zero while the window is minimized.
    pub fn framebuffer_extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Get the Vulkan instance extensions required to present to this window.
    pub fn required_extensions(&self) -> Result<Vec<*const std::ffi::c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;
        get_required_extensions(display_handle.as_raw())
    }

    /// Create a Vulkan surface for this window.
    ///
    /// Returns a RAII [`Surface`] that destroys the surface when dropped.
    ///
    /// # Errors
    /// Fails if the raw window/display handles are unavailable or Vulkan
    /// surface creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: Entry and instance are valid references provided by the caller.
        // The raw handles come from a live winit window. The surface is destroyed
        // exactly once, in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

/// Get the required Vulkan instance extensions for surface creation on the
/// current platform.
///
/// The returned pointers reference static strings owned by the Vulkan loader
/// and stay valid for the lifetime of the program.
pub fn get_required_extensions(
    display_handle: raw_window_handle::RawDisplayHandle,
) -> Result<Vec<*const std::ffi::c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Vulkan(format!("Failed to enumerate required extensions: {}", e)))?;

    tracing::debug!(
        "Required Vulkan extensions for surface: {:?}",
        extensions
            .iter()
            // SAFETY: ash_window returns valid, null-terminated C strings
            // pointing to static loader data.
            .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}

/// Poll a framebuffer-extent source until both dimensions are positive.
///
/// While a window is minimized the reported extent has a zero dimension and
/// no swapchain or framebuffer may be created at it. Swapchain recreation
/// calls this with the live window query to hold off until the window is
/// restored.
pub fn poll_nonzero_extent<F>(mut query: F) -> (u32, u32)
where
    F: FnMut() -> (u32, u32),
{
    loop {
        let (width, height) = query();
        if width > 0 && height > 0 {
            return (width, height);
        }
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_returns_immediately_on_positive_extent() {
        let mut calls = 0;
        let extent = poll_nonzero_extent(|| {
            calls += 1;
            (800, 600)
        });
        assert_eq!(extent, (800, 600));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_poll_blocks_while_extent_degenerate() {
        // Scripted window: minimized for three polls, then restored.
        let script = [(0, 0), (0, 600), (800, 0), (800, 600)];
        let mut i = 0;
        let extent = poll_nonzero_extent(|| {
            let e = script[i];
            i += 1;
            e
        });
        assert_eq!(extent, (800, 600));
        assert_eq!(i, script.len());
    }
}
