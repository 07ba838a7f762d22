//! Per-frame-slot synchronization objects.

use std::sync::Arc;

use spinquad_rhi::RhiResult;
use spinquad_rhi::device::Device;
use spinquad_rhi::sync::{Fence, Semaphore};
use tracing::debug;

/// Synchronization objects for one frame slot.
///
/// The fence starts signaled so the first wait on the slot returns
/// immediately.
pub struct FrameSlot {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSlot {
    fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Semaphore signaled when the acquired image is ready for rendering.
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Semaphore signaled when rendering to the image has finished.
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Fence signaled when this slot's submission has retired.
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

/// Fixed ring of frame slots.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
}

impl FrameRing {
    /// Creates `count` frame slots.
    pub fn new(device: &Arc<Device>, count: usize) -> RhiResult<Self> {
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            slots.push(FrameSlot::new(device.clone())?);
        }
        debug!("Frame ring created with {count} slots");
        Ok(Self { slots })
    }

    /// Returns the slot at `index`.
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true when the ring has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
