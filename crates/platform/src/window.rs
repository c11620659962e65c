//! Window management using winit.

use std::sync::Arc;

use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use quad_core::{Error, Result, WindowConfig};

use crate::Surface;

/// A resizable application window.
///
/// The framebuffer size is always read back from winit, so it reflects
/// minimization (zero area) and resizes that have not been delivered yet.
/// Clones share the same winit window.
#[derive(Clone)]
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Create a new window from the configured size and title.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!(
            "Window '{}' created: {}x{}",
            config.title,
            config.width,
            config.height
        );

        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Current framebuffer size in pixels.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Get the display handle for Vulkan instance and surface creation.
    pub fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Create a Vulkan surface for this window.
    ///
    /// The instance must outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        Surface::new(entry, instance, self.window.as_ref())
    }
}
