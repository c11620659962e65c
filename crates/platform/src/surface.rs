//! Vulkan surface creation for a winit window.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};

use quad_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// Owns a `vk::SurfaceKHR` handle together with the loader needed to destroy it.
/// The Vulkan instance must outlive this struct.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Create a surface for anything that exposes raw window and display handles.
    pub fn new<W>(entry: &ash::Entry, instance: &ash::Instance, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display_handle = window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are valid for the duration of the call and the
        // handles come from a live window. The surface is destroyed in Drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?;

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Self {
            handle,
            surface_loader,
        })
    }

    /// Get the raw Vulkan surface handle.
    ///
    /// Valid only as long as this `Surface` exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get the surface extension loader used for capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by ash_window::create_surface with the same
        // instance as the loader, and nothing else destroys it.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Instance extensions required to create a surface on the given display.
///
/// The returned pointers reference static strings owned by `ash_window` and stay
/// valid for the lifetime of the program.
pub fn required_surface_extensions(display_handle: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Vulkan(format!("Failed to enumerate surface extensions: {}", e)))?;

    tracing::debug!(
        "Surface extensions: {:?}",
        extensions
            .iter()
            // SAFETY: ash_window returns valid, null-terminated static strings.
            .map(|&ext| unsafe { CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Surface>();
    }
}
