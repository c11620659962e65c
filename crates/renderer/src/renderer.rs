//! Main renderer orchestration.
//!
//! [`Renderer`] pairs the Vulkan [`RenderContext`] with the
//! [`FrameScheduler`] that paces it, and is the only type the application
//! talks to.

use tracing::{error, info};

use quad_core::GraphicsConfig;
use quad_platform::Window;
use quad_rhi::{RhiResult, vk};

use crate::context::RenderContext;
use crate::frame_scheduler::{FrameOutcome, FrameScheduler};

/// Draws the spinning quad into a window.
pub struct Renderer {
    context: RenderContext,
    scheduler: FrameScheduler,
    shut_down: bool,
}

impl Renderer {
    /// Creates a new renderer for the given window.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan resource creation fails.
    pub fn new(window: &Window, config: &GraphicsConfig) -> RhiResult<Self> {
        let context = RenderContext::new(window, config)?;
        let scheduler = FrameScheduler::new(context.image_count());

        Ok(Self {
            context,
            scheduler,
            shut_down: false,
        })
    }

    /// Notifies the renderer that the window has been resized.
    ///
    /// The swapchain is rebuilt after the next present.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.scheduler.notify_resized(width, height);
    }

    /// Renders one frame, rebuilding the swapchain when it has gone stale.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan operation fails; out-of-date and
    /// suboptimal swapchains are handled internally.
    pub fn render_frame(&mut self) -> RhiResult<FrameOutcome> {
        self.scheduler.draw_frame(&mut self.context)
    }

    /// Waits for the GPU and releases the swapchain state. Idempotent.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.scheduler.shutdown(&mut self.context)?;
        info!("Renderer shut down");
        Ok(())
    }

    /// Returns the current swapchain extent.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.context.extent()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Renderer shutdown failed: {:?}", e);
        }
    }
}
