//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations
//! - [`Fence`] - GPU-to-CPU completion signal the host can wait on
//! - [`FrameSlot`] - the set of both that one in-flight frame needs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quad_rhi::device::Device;
//! use quad_rhi::sync::{FRAMES_IN_FLIGHT, FrameSlot};
//!
//! # fn example(device: Arc<Device>) -> Result<(), quad_rhi::RhiError> {
//! let slots: Vec<FrameSlot> = (0..FRAMES_IN_FLIGHT)
//!     .map(|_| FrameSlot::new(device.clone()))
//!     .collect::<Result<_, _>>()?;
//!
//! let slot = &slots[0];
//! slot.frame_complete().wait(u64::MAX)?;
//! slot.frame_complete().reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore in the unsignaled state.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        // SAFETY: device is alive.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: the owner guarantees no pending queue operation uses the semaphore.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence, optionally already signaled so the first wait
    /// returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        // SAFETY: device is alive.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// Pass `u64::MAX` to wait forever. A timeout is reported as
    /// `vk::Result::TIMEOUT`.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: the fence belongs to this device.
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending in any queue submission.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: callers only reset after waiting on the fence.
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: the owner guarantees the fence is not pending in any submission.
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one in-flight frame.
///
/// ```text
/// 1. Wait frame_complete, then reset it
/// 2. Acquire an image, signaling image_available
/// 3. Submit: wait image_available, signal render_finished and frame_complete
/// 4. Present, waiting on render_finished
/// ```
pub struct FrameSlot {
    image_available: Semaphore,
    render_finished: Semaphore,
    frame_complete: Fence,
}

impl FrameSlot {
    /// Creates both semaphores and a fence that starts signaled, so the first
    /// wait on a fresh slot does not block.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let frame_complete = Fence::new(device, true)?;

        debug!("Created frame slot synchronization objects");

        Ok(Self {
            image_available,
            render_finished,
            frame_complete,
        })
    }

    /// Signaled by image acquisition, waited on by the submission.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Signaled by the submission, waited on by presentation.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Signaled when this slot's submission has finished executing.
    #[inline]
    pub fn frame_complete(&self) -> &Fence {
        &self.frame_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_in_flight() {
        assert_eq!(FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }

    #[test]
    fn test_frame_slot_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameSlot>();
    }
}
