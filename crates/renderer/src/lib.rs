//! Frame scheduling and drawing of the quad.
//!
//! This crate orchestrates the rendering process:
//! - [`frame_scheduler`]: the backend-agnostic frame state machine
//! - [`swapchain_state`]: everything rebuilt with the swapchain
//! - [`context`]: the Vulkan backend the scheduler drives
//! - [`Renderer`]: the facade used by the application

pub mod context;
pub mod frame_scheduler;
pub mod geometry;
pub mod renderer;
pub mod swapchain_state;
pub mod ubo;

pub use frame_scheduler::{
    AcquireOutcome, FrameBackend, FrameOutcome, FrameScheduler, FrameState, PresentOutcome,
};
pub use renderer::Renderer;
pub use swapchain_state::{TEARDOWN_ORDER, TeardownStep};
