//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//! A [`Swapchain`] is never resized in place: when it goes stale the owner drops
//! it (after the device is idle) and builds a new one.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use quad_rhi::{device::Device, instance::Instance, swapchain::Swapchain, vk};
//! # fn example(
//! #     instance: &Instance,
//! #     device: Arc<Device>,
//! #     surface: vk::SurfaceKHR,
//! #     surface_loader: &ash::khr::surface::Instance,
//! #     image_available: vk::Semaphore,
//! #     render_finished: vk::Semaphore,
//! # ) -> quad_rhi::RhiResult<()> {
//! let swapchain = Swapchain::new(
//!     instance,
//!     device.clone(),
//!     surface,
//!     surface_loader,
//!     vk::Extent2D { width: 1920, height: 1080 },
//! )?;
//!
//! let (image_index, _suboptimal) = swapchain.acquire_next_image(image_available)?;
//! // ... submit work that signals render_finished ...
//! let _stale = swapchain.present(device.present_queue(), image_index, render_finished)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// What a surface supports on a given physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: the physical device and surface belong to the loader's instance.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain wrapper owning the presentable images' views.
///
/// Not thread-safe; the frame loop is its only user.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    /// Owned by the swapchain, released with it
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain and one image view per image.
    ///
    /// Format, present mode, extent and image count follow the selection
    /// policies of [`choose_surface_format`], [`choose_present_mode`],
    /// [`choose_extent`] and [`determine_image_count`].
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedSurface`] when the device reports no format
    /// or no present mode for the surface; otherwise any Vulkan failure.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        desired_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| RhiError::UnsupportedSurface("no surface formats".to_string()))?;
        if support.present_modes.is_empty() {
            return Err(RhiError::UnsupportedSurface(
                "no present modes".to_string(),
            ));
        }
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(
            &support.capabilities,
            desired_extent.width,
            desired_extent.height,
        );
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let queue_families = device.queue_families();
        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::MissingQueueFamily("graphics"))?;
        let present_family = queue_families
            .present_family
            .ok_or(RhiError::MissingQueueFamily("present"))?;
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        // SAFETY: surface and device are alive and create_info references locals.
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        // From here on Drop cleans up whatever was created.
        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain)? };
        info!("Swapchain created with {} images", this.images.len());

        this.image_views = create_image_views(&this.device, &this.images, this.format)?;

        Ok(this)
    }

    /// Acquires the next presentable image with no timeout.
    ///
    /// Returns `(image_index, suboptimal)`. `ERROR_OUT_OF_DATE_KHR` is returned as
    /// an error so the caller can rebuild.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        // SAFETY: the semaphore is unsignaled with no pending signal operation,
        // which the per-slot fence wait guarantees.
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for presentation after `wait_semaphore` is signaled.
    ///
    /// Returns true if the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: image_index was acquired from this swapchain and not yet presented.
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Returns all image views. Empty after [`Swapchain::destroy_image_views`].
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Destroys all image views, leaving the swapchain handle alive.
    ///
    /// Lets the owner release views and the swapchain as separate teardown steps.
    pub fn destroy_image_views(&mut self) {
        for image_view in self.image_views.drain(..) {
            // SAFETY: no framebuffer referencing the view is alive any more.
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        // SAFETY: the owner waited for the device to go idle, so no image is in use.
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR, else the first reported format.
///
/// Returns `None` only when `formats` is empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return Some(format);
    }

    let first = formats.first().copied();
    if let Some(format) = first {
        warn!("Using first available surface format: {:?}", format.format);
    }
    first
}

/// Prefers MAILBOX, else FIFO (always available).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }

    debug!("Selected FIFO present mode");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent.
///
/// A surface-reported current extent is used verbatim. When the surface reports
/// the `u32::MAX` sentinel, the framebuffer size is clamped to the surface limits.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );

    extent
}

/// One more than the minimum image count, capped at the maximum (0 = no maximum).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        // SAFETY: image belongs to a live swapchain on this device.
        let created = unsafe { device.handle().create_image_view(&create_info, None) };
        match created {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}
