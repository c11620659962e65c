//! Platform layer of the quad demo.
//!
//! This crate provides:
//! - Window creation and framebuffer size queries via winit
//! - Vulkan surface creation and the instance extensions it requires

mod surface;
mod window;

pub use surface::{Surface, required_surface_extensions};
pub use window::Window;
