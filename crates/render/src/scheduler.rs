//! Frame scheduling over an abstract device backend.
//!
//! # Overview
//!
//! [`FrameScheduler`] owns the presentation loop's bookkeeping: which frame
//! slot is current, which slot's fence guards each swapchain image, and
//! whether the swapchain must be rebuilt before the next frame. The actual
//! device work goes through the [`FrameBackend`] trait so the sequencing
//! rules can be tested against a mock device without a GPU.
//!
//! One call to [`FrameScheduler::drive`] performs one loop iteration:
//!
//! 1. Wait on the current slot's fence (previous use of the slot retired).
//! 2. Acquire an image; a stale surface marks a rebuild, skips the rest,
//!    and still advances the slot index.
//! 3. If another slot's submission still targets the acquired image, wait
//!    on that slot's fence too. At most one writer per image.
//! 4. Reset the slot fence, then submit and present.
//! 5. A stale present is deferred: the rebuild happens before the next
//!    iteration, not now.
//! 6. Advance the slot index modulo the slot count, unconditionally.

use tracing::debug;

/// Result of an image acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready for rendering.
    Ready {
        /// Index of the acquired swapchain image.
        image_index: u32,
    },
    /// The surface is out of date; the swapchain must be rebuilt.
    Stale,
}

/// Result of a present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was presented and the swapchain still matches the surface.
    Optimal,
    /// Presented (or rejected) against a stale surface; rebuild next frame.
    Stale,
}

/// What one scheduler iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented.
    Rendered,
    /// The acquire found a stale surface; nothing was submitted.
    SkippedStale,
}

/// Device operations the scheduler sequences.
///
/// Implemented by the Vulkan renderer for real frames and by mock devices
/// in tests.
pub trait FrameBackend {
    /// Backend error type; any error aborts the iteration.
    type Error;

    /// Blocks until the given slot's fence is signaled.
    fn wait_slot_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Requests the next presentable image, signaling the slot's
    /// image-available semaphore on completion.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, Self::Error>;

    /// Blocks until the fence of the slot previously submitted against the
    /// acquired image is signaled.
    fn wait_image_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Resets the slot's fence to unsignaled, immediately before submit.
    fn reset_slot_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Submits the prerecorded work for `image_index`, signaling the slot's
    /// render-finished semaphore and fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), Self::Error>;

    /// Presents `image_index`, waiting on the slot's render-finished
    /// semaphore.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, Self::Error>;
}

/// Bookkeeping for the frames-in-flight presentation loop.
pub struct FrameScheduler {
    current_slot: usize,
    slot_count: usize,
    /// For each swapchain image, the slot whose fence guards its last
    /// submission.
    image_owner: Vec<Option<usize>>,
    rebuild_requested: bool,
}

impl FrameScheduler {
    /// Creates a scheduler for `slot_count` frame slots and `image_count`
    /// swapchain images.
    pub fn new(slot_count: usize, image_count: usize) -> Self {
        assert!(slot_count > 0);
        Self {
            current_slot: 0,
            slot_count,
            image_owner: vec![None; image_count],
            rebuild_requested: false,
        }
    }

    /// Returns the slot the next iteration will use.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Returns the number of frame slots.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Flags that the swapchain must be rebuilt before the next frame.
    ///
    /// Called from resize notifications and from stale present results.
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// Returns whether a rebuild is pending.
    pub fn rebuild_requested(&self) -> bool {
        self.rebuild_requested
    }

    /// Records that the swapchain was rebuilt with `image_count` images.
    ///
    /// Clears the rebuild flag and forgets image ownership: every old
    /// submission has retired behind the rebuild's device-idle wait.
    pub fn rebuild_complete(&mut self, image_count: usize) {
        self.image_owner = vec![None; image_count];
        self.rebuild_requested = false;
        debug!("Swapchain rebuild recorded ({image_count} images)");
    }

    /// Runs one presentation loop iteration against `backend`.
    ///
    /// The slot index advances whether or not the iteration rendered.
    pub fn drive<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameOutcome, B::Error> {
        let slot = self.current_slot;

        backend.wait_slot_fence(slot)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Ready { image_index } => image_index,
            AcquireOutcome::Stale => {
                debug!("Acquire reported stale surface, skipping frame");
                self.rebuild_requested = true;
                self.advance();
                return Ok(FrameOutcome::SkippedStale);
            }
        };

        let image = image_index as usize;
        if let Some(owner) = self.image_owner[image] {
            backend.wait_image_fence(owner)?;
        }
        self.image_owner[image] = Some(slot);

        backend.reset_slot_fence(slot)?;
        backend.submit(slot, image_index)?;

        if backend.present(slot, image_index)? == PresentOutcome::Stale {
            debug!("Present reported stale surface, rebuild deferred");
            self.rebuild_requested = true;
        }

        self.advance();
        Ok(FrameOutcome::Rendered)
    }

    fn advance(&mut self) {
        self.current_slot = (self.current_slot + 1) % self.slot_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mock device that models fences well enough to catch ordering bugs:
    /// waiting a slot's fence retires every image that slot last wrote.
    struct MockBackend {
        image_count: usize,
        next_image: usize,
        /// Acquire call numbers (1-based) that report a stale surface.
        stale_acquires: Vec<usize>,
        /// Present call numbers (1-based) that report a stale surface.
        stale_presents: Vec<usize>,
        acquire_calls: usize,
        present_calls: usize,
        /// Which slot's submission currently targets each image.
        in_flight: Vec<Option<usize>>,
        /// Slot order observed at submit time.
        submitted_slots: Vec<usize>,
        submits: Vec<(usize, u32)>,
        fence_resets: Vec<usize>,
        violations: Vec<String>,
    }

    impl MockBackend {
        fn new(image_count: usize) -> Self {
            Self {
                image_count,
                next_image: 0,
                stale_acquires: Vec::new(),
                stale_presents: Vec::new(),
                acquire_calls: 0,
                present_calls: 0,
                in_flight: vec![None; image_count],
                submitted_slots: Vec::new(),
                submits: Vec::new(),
                fence_resets: Vec::new(),
                violations: Vec::new(),
            }
        }

        fn retire_slot(&mut self, slot: usize) {
            for owner in self.in_flight.iter_mut() {
                if *owner == Some(slot) {
                    *owner = None;
                }
            }
        }
    }

    impl FrameBackend for MockBackend {
        type Error = std::convert::Infallible;

        fn wait_slot_fence(&mut self, slot: usize) -> Result<(), Self::Error> {
            self.retire_slot(slot);
            Ok(())
        }

        fn acquire_image(&mut self, _slot: usize) -> Result<AcquireOutcome, Self::Error> {
            self.acquire_calls += 1;
            if self.stale_acquires.contains(&self.acquire_calls) {
                return Ok(AcquireOutcome::Stale);
            }
            let image_index = self.next_image as u32;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Ready { image_index })
        }

        fn wait_image_fence(&mut self, slot: usize) -> Result<(), Self::Error> {
            self.retire_slot(slot);
            Ok(())
        }

        fn reset_slot_fence(&mut self, slot: usize) -> Result<(), Self::Error> {
            self.fence_resets.push(slot);
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), Self::Error> {
            let image = image_index as usize;
            if let Some(owner) = self.in_flight[image] {
                self.violations.push(format!(
                    "image {image} submitted by slot {slot} while slot {owner} still owns it"
                ));
            }
            self.in_flight[image] = Some(slot);
            self.submitted_slots.push(slot);
            self.submits.push((slot, image_index));
            Ok(())
        }

        fn present(&mut self, _slot: usize, _image_index: u32) -> Result<PresentOutcome, Self::Error> {
            self.present_calls += 1;
            if self.stale_presents.contains(&self.present_calls) {
                Ok(PresentOutcome::Stale)
            } else {
                Ok(PresentOutcome::Optimal)
            }
        }
    }

    #[test]
    fn test_slots_cycle_with_fixed_period() {
        let mut backend = MockBackend::new(3);
        let mut scheduler = FrameScheduler::new(2, 3);

        for _ in 0..6 {
            scheduler.drive(&mut backend).unwrap();
        }

        assert_eq!(backend.submitted_slots, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(scheduler.current_slot(), 0);
    }

    #[test]
    fn test_never_submits_to_image_still_in_flight() {
        // More images than slots forces cross-slot image fence waits.
        let mut backend = MockBackend::new(3);
        let mut scheduler = FrameScheduler::new(2, 3);

        for _ in 0..12 {
            scheduler.drive(&mut backend).unwrap();
        }

        assert!(backend.violations.is_empty(), "{:?}", backend.violations);
        assert_eq!(backend.submits.len(), 12);
    }

    #[test]
    fn test_fence_reset_happens_for_every_submission() {
        let mut backend = MockBackend::new(2);
        let mut scheduler = FrameScheduler::new(2, 2);

        for _ in 0..4 {
            scheduler.drive(&mut backend).unwrap();
        }

        assert_eq!(backend.fence_resets, backend.submitted_slots);
    }

    #[test]
    fn test_stale_acquire_skips_once_and_never_skips_advance() {
        let mut backend = MockBackend::new(3);
        backend.stale_acquires = vec![5];
        let mut scheduler = FrameScheduler::new(2, 3);

        let mut rebuilds = 0;
        let mut outcomes = Vec::new();
        for _ in 0..10 {
            if scheduler.rebuild_requested() {
                rebuilds += 1;
                scheduler.rebuild_complete(3);
            }
            outcomes.push(scheduler.drive(&mut backend).unwrap());
        }

        assert_eq!(rebuilds, 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == FrameOutcome::SkippedStale)
                .count(),
            1
        );
        assert_eq!(outcomes[4], FrameOutcome::SkippedStale);
        assert_eq!(outcomes[5], FrameOutcome::Rendered);
        // Ten iterations advance the slot ten times, skip included.
        assert_eq!(scheduler.current_slot(), 10 % 2);
        assert_eq!(backend.submits.len(), 9);
    }

    #[test]
    fn test_stale_present_defers_rebuild_to_next_iteration() {
        let mut backend = MockBackend::new(2);
        backend.stale_presents = vec![1];
        let mut scheduler = FrameScheduler::new(2, 2);

        let outcome = scheduler.drive(&mut backend).unwrap();
        // The frame still rendered; only the flag is raised.
        assert_eq!(outcome, FrameOutcome::Rendered);
        assert!(scheduler.rebuild_requested());

        scheduler.rebuild_complete(2);
        assert!(!scheduler.rebuild_requested());
        assert_eq!(scheduler.drive(&mut backend).unwrap(), FrameOutcome::Rendered);
    }

    #[test]
    fn test_rebuild_complete_forgets_image_ownership() {
        let mut backend = MockBackend::new(2);
        let mut scheduler = FrameScheduler::new(2, 2);

        scheduler.drive(&mut backend).unwrap();
        scheduler.drive(&mut backend).unwrap();

        // Rebuild with a different image count resizes the ownership table.
        scheduler.rebuild_complete(4);
        assert_eq!(scheduler.image_owner, vec![None; 4]);
    }

    #[test]
    fn test_stop_after_three_frames_leaves_ring_consistent() {
        // Close requested on iteration 3: the loop stops after the frame
        // completes, leaving exactly three submissions and presents.
        let mut backend = MockBackend::new(2);
        let mut scheduler = FrameScheduler::new(2, 2);

        for _ in 0..3 {
            scheduler.drive(&mut backend).unwrap();
        }

        assert_eq!(backend.submits.len(), 3);
        assert_eq!(backend.present_calls, 3);
        assert_eq!(scheduler.current_slot(), 3 % 2);
    }
}
