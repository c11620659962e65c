//! Everything that depends on the swapchain and is rebuilt with it.

use std::sync::Arc;

use tracing::{debug, info};

use quad_platform::Surface;
use quad_rhi::{RhiError, RhiResult, vk};
use quad_rhi::buffer::{Buffer, BufferUsage};
use quad_rhi::command::{CommandBuffer, CommandPool};
use quad_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_uniform_buffer};
use quad_rhi::device::Device;
use quad_rhi::framebuffer::Framebuffer;
use quad_rhi::instance::Instance;
use quad_rhi::pipeline::{
    CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout, full_scissor,
};
use quad_rhi::render_pass::RenderPass;
use quad_rhi::shader::Shader;
use quad_rhi::swapchain::Swapchain;
use quad_rhi::sync::{FRAMES_IN_FLIGHT, FrameSlot};
use quad_rhi::vertex::Vertex;

use crate::geometry::QuadGeometry;
use crate::ubo::UniformBufferObject;

/// One stage of swapchain state teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownStep {
    CommandBuffers,
    DescriptorPool,
    UniformBuffers,
    Framebuffers,
    Pipeline,
    PipelineLayout,
    RenderPass,
    ImageViews,
    Swapchain,
    FrameSlots,
}

/// Teardown order; each step only destroys objects nothing later depends on.
pub const TEARDOWN_ORDER: [TeardownStep; 10] = [
    TeardownStep::CommandBuffers,
    TeardownStep::DescriptorPool,
    TeardownStep::UniformBuffers,
    TeardownStep::Framebuffers,
    TeardownStep::Pipeline,
    TeardownStep::PipelineLayout,
    TeardownStep::RenderPass,
    TeardownStep::ImageViews,
    TeardownStep::Swapchain,
    TeardownStep::FrameSlots,
];

/// Release hook for each [`TeardownStep`].
trait StateParts {
    fn free_command_buffers(&mut self);
    fn destroy_descriptor_pool(&mut self);
    fn destroy_uniform_buffers(&mut self);
    fn destroy_framebuffers(&mut self);
    fn destroy_pipeline(&mut self);
    fn destroy_pipeline_layout(&mut self);
    fn destroy_render_pass(&mut self);
    fn destroy_image_views(&mut self);
    fn destroy_swapchain(&mut self);
    fn destroy_frame_slots(&mut self);
}

fn release_step<P: StateParts>(parts: &mut P, step: TeardownStep) {
    match step {
        TeardownStep::CommandBuffers => parts.free_command_buffers(),
        TeardownStep::DescriptorPool => parts.destroy_descriptor_pool(),
        TeardownStep::UniformBuffers => parts.destroy_uniform_buffers(),
        TeardownStep::Framebuffers => parts.destroy_framebuffers(),
        TeardownStep::Pipeline => parts.destroy_pipeline(),
        TeardownStep::PipelineLayout => parts.destroy_pipeline_layout(),
        TeardownStep::RenderPass => parts.destroy_render_pass(),
        TeardownStep::ImageViews => parts.destroy_image_views(),
        TeardownStep::Swapchain => parts.destroy_swapchain(),
        TeardownStep::FrameSlots => parts.destroy_frame_slots(),
    }
}

fn release_all<P: StateParts>(parts: &mut P) {
    for step in TEARDOWN_ORDER {
        release_step(parts, step);
    }
}

/// Long-lived objects a swapchain state is built from.
pub struct StateInputs<'a> {
    pub instance: &'a Instance,
    pub device: &'a Arc<Device>,
    pub surface: &'a Surface,
    pub descriptor_set_layout: &'a DescriptorSetLayout,
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub command_pool: &'a CommandPool,
    pub geometry: &'a QuadGeometry,
    pub clear_color: [f32; 4],
}

/// Swapchain plus its render pass, pipeline, framebuffers, per-image uniform
/// buffers, descriptor sets, prerecorded command buffers and the per-slot
/// synchronization objects.
///
/// Built in one call and torn down in [`TEARDOWN_ORDER`]; callers only ever
/// see a complete state or none.
pub struct SwapchainState {
    device: Arc<Device>,
    command_pool: vk::CommandPool,
    command_buffers: Vec<CommandBuffer>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: Option<DescriptorPool>,
    uniform_buffers: Vec<Buffer>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Option<Pipeline>,
    pipeline_layout: Option<PipelineLayout>,
    render_pass: Option<RenderPass>,
    swapchain: Option<Swapchain>,
    frame_slots: Vec<FrameSlot>,
    extent: vk::Extent2D,
    image_count: usize,
}

impl SwapchainState {
    /// Builds the full state for `desired_extent`.
    ///
    /// On failure every object created so far is released before returning.
    pub fn build(inputs: &StateInputs<'_>, desired_extent: vk::Extent2D) -> RhiResult<Self> {
        let device = inputs.device;

        let frame_slots = (0..FRAMES_IN_FLIGHT)
            .map(|_| FrameSlot::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        let swapchain = Swapchain::new(
            inputs.instance,
            device.clone(),
            inputs.surface.handle(),
            inputs.surface.loader(),
            desired_extent,
        )?;
        let extent = swapchain.extent();
        let image_count = swapchain.image_count();

        let render_pass = RenderPass::new(device.clone(), swapchain.format())?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[inputs.descriptor_set_layout.handle()])?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(inputs.vertex_shader)
            .fragment_shader(inputs.fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .extent(extent)
            .render_pass(render_pass.handle(), 0)
            .build(device.clone(), &pipeline_layout)?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| Framebuffer::new(device.clone(), render_pass.handle(), view, extent))
            .collect::<RhiResult<Vec<_>>>()?;

        let uniform_buffers = (0..image_count)
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    UniformBufferObject::SIZE as vk::DeviceSize,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let descriptor_pool = DescriptorPool::for_uniform_buffers(device.clone(), image_count as u32)?;
        let layouts = vec![inputs.descriptor_set_layout.handle(); image_count];
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;
        for (&set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
            write_uniform_buffer(device, set, 0, buffer.handle(), buffer.size());
        }

        let command_buffers = inputs
            .command_pool
            .allocate_command_buffers(image_count as u32)?;

        let state = Self {
            device: device.clone(),
            command_pool: inputs.command_pool.handle(),
            command_buffers,
            descriptor_sets,
            descriptor_pool: Some(descriptor_pool),
            uniform_buffers,
            framebuffers,
            pipeline: Some(pipeline),
            pipeline_layout: Some(pipeline_layout),
            render_pass: Some(render_pass),
            swapchain: Some(swapchain),
            frame_slots,
            extent,
            image_count,
        };
        state.record_command_buffers(inputs.geometry, inputs.clear_color)?;

        info!(
            "Swapchain state built: {}x{}, {} images",
            extent.width, extent.height, image_count
        );

        Ok(state)
    }

    /// Records the draw for each image once; the buffers are resubmitted every frame.
    fn record_command_buffers(&self, geometry: &QuadGeometry, clear_color: [f32; 4]) -> RhiResult<()> {
        let (Some(render_pass), Some(pipeline), Some(pipeline_layout)) =
            (&self.render_pass, &self.pipeline, &self.pipeline_layout)
        else {
            return Ok(());
        };

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        for ((cmd, framebuffer), &set) in self
            .command_buffers
            .iter()
            .zip(&self.framebuffers)
            .zip(&self.descriptor_sets)
        {
            cmd.begin()?;

            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(render_pass.handle())
                .framebuffer(framebuffer.handle())
                .render_area(full_scissor(self.extent))
                .clear_values(&clear_values);

            cmd.begin_render_pass(&begin_info);
            cmd.bind_graphics_pipeline(pipeline.handle());
            cmd.bind_vertex_buffers(0, &[geometry.vertex_buffer()], &[0]);
            cmd.bind_index_buffer(geometry.index_buffer(), 0, geometry.index_type());
            cmd.bind_descriptor_sets(pipeline_layout.handle(), 0, &[set]);
            cmd.draw_indexed(geometry.index_count(), 1, 0, 0, 0);
            cmd.end_render_pass();

            cmd.end()?;
        }

        debug!("Recorded {} command buffer(s)", self.command_buffers.len());
        Ok(())
    }

    /// Releases every object in [`TEARDOWN_ORDER`]. Idempotent.
    ///
    /// The device must be idle.
    pub fn destroy(&mut self) {
        release_all(self);
    }

    /// Writes `ubo` into the uniform buffer read by `image_index`'s command buffer.
    pub fn update_uniform_buffer(&self, image_index: u32, ubo: &UniformBufferObject) -> RhiResult<()> {
        match self.uniform_buffers.get(image_index as usize) {
            Some(buffer) => buffer.write_value(ubo),
            None => Err(RhiError::InvalidHandle(format!(
                "No uniform buffer for image {}",
                image_index
            ))),
        }
    }

    /// Prerecorded command buffer for `image_index`.
    pub fn command_buffer(&self, image_index: u32) -> Option<vk::CommandBuffer> {
        self.command_buffers
            .get(image_index as usize)
            .map(CommandBuffer::handle)
    }

    /// Synchronization objects of in-flight slot `slot`.
    pub fn frame_slot(&self, slot: usize) -> Option<&FrameSlot> {
        self.frame_slots.get(slot)
    }

    /// The live swapchain, `None` once destroyed.
    #[inline]
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_count
    }
}

impl StateParts for SwapchainState {
    fn free_command_buffers(&mut self) {
        if self.command_buffers.is_empty() {
            return;
        }
        let handles: Vec<vk::CommandBuffer> = self
            .command_buffers
            .drain(..)
            .map(|cmd| cmd.handle())
            .collect();
        // SAFETY: the buffers came from this pool and the device is idle.
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.command_pool, &handles);
        }
    }

    fn destroy_descriptor_pool(&mut self) {
        self.descriptor_sets.clear();
        self.descriptor_pool = None;
    }

    fn destroy_uniform_buffers(&mut self) {
        self.uniform_buffers.clear();
    }

    fn destroy_framebuffers(&mut self) {
        self.framebuffers.clear();
    }

    fn destroy_pipeline(&mut self) {
        self.pipeline = None;
    }

    fn destroy_pipeline_layout(&mut self) {
        self.pipeline_layout = None;
    }

    fn destroy_render_pass(&mut self) {
        self.render_pass = None;
    }

    fn destroy_image_views(&mut self) {
        if let Some(swapchain) = self.swapchain.as_mut() {
            swapchain.destroy_image_views();
        }
    }

    fn destroy_swapchain(&mut self) {
        if self.swapchain.take().is_some() {
            debug!("Swapchain released");
        }
    }

    fn destroy_frame_slots(&mut self) {
        self.frame_slots.clear();
    }
}

impl Drop for SwapchainState {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(step: TeardownStep) -> usize {
        TEARDOWN_ORDER
            .iter()
            .position(|&s| s == step)
            .unwrap_or(usize::MAX)
    }

    #[test]
    fn test_teardown_order_covers_every_step() {
        assert_eq!(TEARDOWN_ORDER.len(), 10);
        for (i, step) in TEARDOWN_ORDER.iter().enumerate() {
            assert_eq!(position(*step), i);
        }
    }

    #[test]
    fn test_teardown_order_respects_dependencies() {
        // Framebuffers reference the render pass and the image views.
        assert!(position(TeardownStep::Framebuffers) < position(TeardownStep::RenderPass));
        assert!(position(TeardownStep::Framebuffers) < position(TeardownStep::ImageViews));
        // The pipeline references its layout and the render pass.
        assert!(position(TeardownStep::Pipeline) < position(TeardownStep::PipelineLayout));
        assert!(position(TeardownStep::Pipeline) < position(TeardownStep::RenderPass));
        // Descriptor sets reference the uniform buffers.
        assert!(position(TeardownStep::DescriptorPool) < position(TeardownStep::UniformBuffers));
        // Views belong to swapchain images.
        assert!(position(TeardownStep::ImageViews) < position(TeardownStep::Swapchain));
        assert_eq!(TEARDOWN_ORDER[0], TeardownStep::CommandBuffers);
        assert_eq!(TEARDOWN_ORDER[8], TeardownStep::Swapchain);
        assert_eq!(TEARDOWN_ORDER[9], TeardownStep::FrameSlots);
    }

    /// Tracks which parts are alive and checks dependents are gone first.
    #[derive(Debug)]
    struct LiveParts {
        command_buffers: bool,
        descriptor_pool: bool,
        uniform_buffers: bool,
        framebuffers: bool,
        pipeline: bool,
        pipeline_layout: bool,
        render_pass: bool,
        image_views: bool,
        swapchain: bool,
        frame_slots: bool,
        released: Vec<&'static str>,
    }

    impl LiveParts {
        fn built() -> Self {
            Self {
                command_buffers: true,
                descriptor_pool: true,
                uniform_buffers: true,
                framebuffers: true,
                pipeline: true,
                pipeline_layout: true,
                render_pass: true,
                image_views: true,
                swapchain: true,
                frame_slots: true,
                released: Vec::new(),
            }
        }

        fn any_alive(&self) -> bool {
            self.command_buffers
                || self.descriptor_pool
                || self.uniform_buffers
                || self.framebuffers
                || self.pipeline
                || self.pipeline_layout
                || self.render_pass
                || self.image_views
                || self.swapchain
                || self.frame_slots
        }
    }

    impl StateParts for LiveParts {
        fn free_command_buffers(&mut self) {
            self.command_buffers = false;
            self.released.push("command_buffers");
        }

        fn destroy_descriptor_pool(&mut self) {
            assert!(!self.command_buffers, "sets are bound by recorded commands");
            self.descriptor_pool = false;
            self.released.push("descriptor_pool");
        }

        fn destroy_uniform_buffers(&mut self) {
            assert!(!self.descriptor_pool, "descriptor sets point at the buffers");
            self.uniform_buffers = false;
            self.released.push("uniform_buffers");
        }

        fn destroy_framebuffers(&mut self) {
            assert!(!self.command_buffers);
            self.framebuffers = false;
            self.released.push("framebuffers");
        }

        fn destroy_pipeline(&mut self) {
            assert!(!self.command_buffers);
            self.pipeline = false;
            self.released.push("pipeline");
        }

        fn destroy_pipeline_layout(&mut self) {
            assert!(!self.pipeline);
            self.pipeline_layout = false;
            self.released.push("pipeline_layout");
        }

        fn destroy_render_pass(&mut self) {
            assert!(!self.framebuffers && !self.pipeline);
            self.render_pass = false;
            self.released.push("render_pass");
        }

        fn destroy_image_views(&mut self) {
            assert!(!self.framebuffers);
            self.image_views = false;
            self.released.push("image_views");
        }

        fn destroy_swapchain(&mut self) {
            assert!(!self.image_views);
            self.swapchain = false;
            self.released.push("swapchain");
        }

        fn destroy_frame_slots(&mut self) {
            self.frame_slots = false;
            self.released.push("frame_slots");
        }
    }

    #[test]
    fn test_release_step_touches_only_its_part() {
        let mut parts = LiveParts::built();
        parts.command_buffers = false;

        release_step(&mut parts, TeardownStep::Framebuffers);

        assert!(!parts.framebuffers);
        assert!(parts.render_pass);
        assert!(parts.image_views);
        assert!(parts.pipeline);
        assert_eq!(parts.released, vec!["framebuffers"]);
    }

    #[test]
    fn test_release_all_follows_dependencies() {
        let mut parts = LiveParts::built();

        release_all(&mut parts);

        assert!(!parts.any_alive());
        assert_eq!(
            parts.released,
            vec![
                "command_buffers",
                "descriptor_pool",
                "uniform_buffers",
                "framebuffers",
                "pipeline",
                "pipeline_layout",
                "render_pass",
                "image_views",
                "swapchain",
                "frame_slots",
            ]
        );
    }

    #[test]
    fn test_each_step_releases_a_distinct_part() {
        for step in TEARDOWN_ORDER {
            let mut parts = LiveParts {
                command_buffers: false,
                descriptor_pool: false,
                uniform_buffers: false,
                framebuffers: false,
                pipeline: false,
                pipeline_layout: false,
                render_pass: false,
                image_views: false,
                swapchain: false,
                frame_slots: false,
                released: Vec::new(),
            };
            release_step(&mut parts, step);
            assert_eq!(parts.released.len(), 1, "{:?}", step);
        }

        let mut names: Vec<&str> = Vec::new();
        for step in TEARDOWN_ORDER {
            let mut parts = LiveParts::built();
            parts.command_buffers = false;
            parts.descriptor_pool = false;
            parts.framebuffers = false;
            parts.pipeline = false;
            parts.image_views = false;
            release_step(&mut parts, step);
            names.extend(parts.released);
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TEARDOWN_ORDER.len());
    }
}
