//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant except the presentation results handled by the frame
/// scheduler is fatal to the application.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// The selected GPU lacks a queue family this application needs
    #[error("Missing {0} queue family")]
    MissingQueueFamily(&'static str),

    /// A required instance or device extension is not supported
    #[error("Required extension not supported: {0}")]
    MissingExtension(String),

    /// Validation was requested but the Khronos layer is not installed
    #[error("Validation layers requested, but not available")]
    ValidationLayerUnavailable,

    /// The surface exposes no formats or no present modes on the device
    #[error("Surface unsupported: {0}")]
    UnsupportedSurface(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
