//! Vulkan objects behind the frame scheduler.
//!
//! [`RenderContext`] owns every GPU object for the lifetime of the window and
//! implements [`FrameBackend`] on top of them.
//!
//! # Resource Destruction Order
//!
//! 1. Wait for the device to go idle
//! 2. Swapchain state and frame slots (see [`crate::swapchain_state::TEARDOWN_ORDER`])
//! 3. Geometry, shaders, descriptor set layout, command pool
//! 4. Device
//! 5. Surface
//! 6. Instance
//!
//! ManuallyDrop is used to make that order explicit.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::{debug, error, info};

use quad_core::{GraphicsConfig, Timer};
use quad_platform::{Surface, Window, required_surface_extensions};
use quad_rhi::command::CommandPool;
use quad_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout};
use quad_rhi::device::Device;
use quad_rhi::instance::Instance;
use quad_rhi::physical_device::select_physical_device;
use quad_rhi::shader::{Shader, ShaderStage};
use quad_rhi::sync::{FRAMES_IN_FLIGHT, FrameSlot};
use quad_rhi::{RhiError, RhiResult, vk};

use crate::frame_scheduler::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::geometry::QuadGeometry;
use crate::swapchain_state::{StateInputs, SwapchainState};
use crate::ubo::UniformBufferObject;

/// Compiled vertex shader file name inside the shader directory.
pub const VERTEX_SHADER_FILE: &str = "triangle_vert.spv";
/// Compiled fragment shader file name inside the shader directory.
pub const FRAGMENT_SHADER_FILE: &str = "triangle_frag.spv";

/// Owner of all Vulkan objects for one window.
pub struct RenderContext {
    swapchain_state: Option<SwapchainState>,

    geometry: ManuallyDrop<QuadGeometry>,
    vertex_shader: ManuallyDrop<Shader>,
    fragment_shader: ManuallyDrop<Shader>,
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    command_pool: ManuallyDrop<CommandPool>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    window: Window,
    clear_color: [f32; 4],
    timer: Timer,
}

impl RenderContext {
    /// Creates every long-lived object and the first swapchain state.
    ///
    /// # Errors
    ///
    /// Any setup failure: missing loader, extension, validation layer, GPU,
    /// queue family, surface support or shader file.
    pub fn new(window: &Window, config: &GraphicsConfig) -> RhiResult<Self> {
        let (width, height) = window.framebuffer_size();
        info!("Initializing Vulkan ({}x{})", width, height);

        let display_handle = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let surface_extensions = required_surface_extensions(display_handle.as_raw())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::new(&surface_extensions, config.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::MissingQueueFamily("graphics"))?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let ubo_binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        let descriptor_set_layout = DescriptorSetLayout::new(device.clone(), &[ubo_binding])?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.shader_dir.join(VERTEX_SHADER_FILE),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.shader_dir.join(FRAGMENT_SHADER_FILE),
            ShaderStage::Fragment,
            "main",
        )?;

        let geometry = QuadGeometry::upload(device.clone(), &command_pool)?;

        let swapchain_state = SwapchainState::build(
            &StateInputs {
                instance: &instance,
                device: &device,
                surface: &surface,
                descriptor_set_layout: &descriptor_set_layout,
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                command_pool: &command_pool,
                geometry: &geometry,
                clear_color: config.clear_color,
            },
            vk::Extent2D { width, height },
        )?;

        info!(
            "Render context ready: {} swapchain images, {} frames in flight",
            swapchain_state.image_count(),
            FRAMES_IN_FLIGHT
        );

        Ok(Self {
            swapchain_state: Some(swapchain_state),
            geometry: ManuallyDrop::new(geometry),
            vertex_shader: ManuallyDrop::new(vertex_shader),
            fragment_shader: ManuallyDrop::new(fragment_shader),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            command_pool: ManuallyDrop::new(command_pool),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            window: window.clone(),
            clear_color: config.clear_color,
            timer: Timer::new(),
        })
    }

    /// Image count of the live swapchain, 0 while none exists.
    pub fn image_count(&self) -> usize {
        self.swapchain_state
            .as_ref()
            .map_or(0, SwapchainState::image_count)
    }

    /// Extent of the live swapchain.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain_state.as_ref().map(SwapchainState::extent)
    }

    fn state(&self) -> RhiResult<&SwapchainState> {
        self.swapchain_state
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("No swapchain state".to_string()))
    }

    fn slot(&self, slot: usize) -> RhiResult<&FrameSlot> {
        self.state()?
            .frame_slot(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("No frame slot {}", slot)))
    }
}

impl FrameBackend for RenderContext {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.frame_complete().wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.slot(slot)?.image_available().handle();
        let swapchain = self
            .state()?
            .swapchain()
            .ok_or_else(|| RhiError::SwapchainError("Swapchain destroyed".to_string()))?;

        match swapchain.acquire_next_image(semaphore) {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }

    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.frame_complete().reset()
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let state = self.state()?;
        let extent = state.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let ubo = UniformBufferObject::at_time(self.timer.elapsed_secs(), aspect);
        state.update_uniform_buffer(image_index, &ubo)?;

        let command_buffer = state.command_buffer(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No command buffer for image {}", image_index))
        })?;

        let frame = self.slot(slot)?;
        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished().handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer is fully recorded, and the slot fence was
        // reset after its previous submission completed.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.frame_complete().handle())
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let render_finished = self.slot(slot)?.render_finished().handle();
        let swapchain = self
            .state()?
            .swapchain()
            .ok_or_else(|| RhiError::SwapchainError("Swapchain destroyed".to_string()))?;

        match swapchain.present(self.device.present_queue(), image_index, render_finished) {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.window.framebuffer_size();
        vk::Extent2D { width, height }
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn destroy_swapchain_state(&mut self) {
        if let Some(mut state) = self.swapchain_state.take() {
            state.destroy();
            debug!("Swapchain state destroyed");
        }
    }

    fn create_swapchain_state(&mut self, extent: vk::Extent2D) -> RhiResult<usize> {
        let state = SwapchainState::build(
            &StateInputs {
                instance: &self.instance,
                device: &self.device,
                surface: &self.surface,
                descriptor_set_layout: &self.descriptor_set_layout,
                vertex_shader: &self.vertex_shader,
                fragment_shader: &self.fragment_shader,
                command_pool: &self.command_pool,
                geometry: &self.geometry,
                clear_color: self.clear_color,
            },
            extent,
        )?;
        let image_count = state.image_count();
        self.swapchain_state = Some(state);
        Ok(image_count)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during teardown: {:?}", e);
        }

        self.destroy_swapchain_state();

        // SAFETY: each field is dropped exactly once, dependents before the
        // objects they were created from.
        unsafe {
            ManuallyDrop::drop(&mut self.geometry);
            ManuallyDrop::drop(&mut self.vertex_shader);
            ManuallyDrop::drop(&mut self.fragment_shader);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Render context destroyed");
    }
}
