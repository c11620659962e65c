//! Frame pacing across a fixed number of in-flight slots.
//!
//! [`FrameScheduler`] owns the loop state (current slot, image ownership,
//! resize flag) and drives any [`FrameBackend`] through one frame per call:
//!
//! ```text
//! Idle -> Acquiring -> Submitting -> Presenting -> Idle
//!   any stale swapchain: -> Rebuilding -> Idle
//! ```
//!
//! The backend performs the actual GPU work, so the scheduler can be
//! exercised without a driver.

use quad_rhi::RhiResult;
use quad_rhi::sync::FRAMES_IN_FLIGHT;
use quad_rhi::vk;
use tracing::{debug, info};

/// Result of acquiring a swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; it may no longer match the surface exactly.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be rebuilt.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// What a call to [`FrameScheduler::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented.
    Presented,
    /// The swapchain state was rebuilt this tick.
    Rebuilt,
    /// A rebuild is pending but the framebuffer has zero area.
    Paused,
}

/// Where the scheduler is within a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Submitting,
    Presenting,
    Rebuilding,
}

/// GPU operations the scheduler sequences.
///
/// Slots are indices in `0..slot_count`; image indices come from
/// [`FrameBackend::acquire_image`].
pub trait FrameBackend {
    /// Blocks until the slot's frame-complete fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires the next image, signaling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Returns the slot's fence to the unsignaled state.
    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Submits the work recorded for `image_index`, signaling the slot's
    /// render-finished semaphore and fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Presents `image_index` once the slot's render-finished semaphore is signaled.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Current framebuffer size in pixels; zero area while minimized.
    fn framebuffer_extent(&self) -> vk::Extent2D;

    /// Blocks until the device has no pending work.
    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Releases every object tied to the current swapchain.
    fn destroy_swapchain_state(&mut self);

    /// Builds a new swapchain state and returns its image count.
    fn create_swapchain_state(&mut self, extent: vk::Extent2D) -> RhiResult<usize>;
}

/// Frame loop state machine.
#[derive(Debug)]
pub struct FrameScheduler {
    current_slot: usize,
    slot_count: usize,
    /// Slot that last submitted work against each swapchain image.
    images_in_flight: Vec<Option<usize>>,
    framebuffer_resized: bool,
    rebuild_pending: bool,
    size: (u32, u32),
    state: FrameState,
}

impl FrameScheduler {
    /// Creates a scheduler with [`FRAMES_IN_FLIGHT`] slots for a swapchain of
    /// `image_count` images.
    pub fn new(image_count: usize) -> Self {
        Self {
            current_slot: 0,
            slot_count: FRAMES_IN_FLIGHT,
            images_in_flight: vec![None; image_count],
            framebuffer_resized: false,
            rebuild_pending: false,
            size: (0, 0),
            state: FrameState::Idle,
        }
    }

    /// Records a window resize; the swapchain is rebuilt after the next present.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        if self.size != (width, height) {
            debug!("Resize notified: {}x{}", width, height);
        }
        self.size = (width, height);
        self.framebuffer_resized = true;
    }

    /// Runs one iteration of the frame protocol.
    ///
    /// # Errors
    ///
    /// Any backend failure other than an out-of-date or suboptimal swapchain.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<FrameOutcome> {
        if self.rebuild_pending {
            return self.rebuild(backend);
        }

        let slot = self.current_slot;

        self.state = FrameState::Acquiring;
        backend.wait_for_slot(slot)?;

        let (image_index, acquire_suboptimal) = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire");
                return self.rebuild(backend);
            }
        };

        self.state = FrameState::Submitting;
        let image = image_index as usize;
        if let Some(owner) = self.images_in_flight.get(image).copied().flatten()
            && owner != slot
        {
            backend.wait_for_slot(owner)?;
        }
        if let Some(entry) = self.images_in_flight.get_mut(image) {
            *entry = Some(slot);
        }

        backend.reset_slot_fence(slot)?;
        backend.submit(slot, image_index)?;

        self.state = FrameState::Presenting;
        let present = backend.present(slot, image_index)?;

        let stale = match present {
            PresentOutcome::Optimal => acquire_suboptimal,
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                debug!("Present reported {:?}", present);
                true
            }
        };

        let outcome = if stale || self.framebuffer_resized {
            self.rebuild(backend)?
        } else {
            self.state = FrameState::Idle;
            FrameOutcome::Presented
        };

        self.current_slot = (self.current_slot + 1) % self.slot_count;
        Ok(outcome)
    }

    /// Rebuilds the swapchain state, or defers while the framebuffer has zero area.
    fn rebuild<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<FrameOutcome> {
        self.state = FrameState::Rebuilding;
        self.rebuild_pending = true;

        let extent = backend.framebuffer_extent();
        if extent.width == 0 || extent.height == 0 {
            self.state = FrameState::Idle;
            return Ok(FrameOutcome::Paused);
        }

        backend.wait_idle()?;
        backend.destroy_swapchain_state();
        let image_count = backend.create_swapchain_state(extent)?;

        self.images_in_flight = vec![None; image_count];
        self.framebuffer_resized = false;
        self.rebuild_pending = false;
        self.state = FrameState::Idle;

        info!(
            "Swapchain rebuilt: {}x{}, {} images",
            extent.width, extent.height, image_count
        );
        Ok(FrameOutcome::Rebuilt)
    }

    /// Waits for the device to go idle and releases the swapchain state.
    pub fn shutdown<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<()> {
        backend.wait_idle()?;
        backend.destroy_swapchain_state();
        self.images_in_flight.clear();
        self.state = FrameState::Idle;
        Ok(())
    }

    /// Slot the next frame will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Number of in-flight slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Slot owning each swapchain image, if any.
    #[inline]
    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Whether a rebuild is waiting for a nonzero framebuffer.
    #[inline]
    pub fn is_rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    /// Last size passed to [`FrameScheduler::notify_resized`].
    #[inline]
    pub fn last_notified_size(&self) -> (u32, u32) {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scheduler() {
        let scheduler = FrameScheduler::new(3);
        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(scheduler.slot_count(), FRAMES_IN_FLIGHT);
        assert_eq!(scheduler.images_in_flight(), &[None, None, None]);
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert!(!scheduler.is_rebuild_pending());
    }

    #[test]
    fn test_notify_resized_caches_size() {
        let mut scheduler = FrameScheduler::new(2);
        scheduler.notify_resized(800, 600);
        assert_eq!(scheduler.last_notified_size(), (800, 600));
        assert!(scheduler.framebuffer_resized);
    }
}
