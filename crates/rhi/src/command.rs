//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns a VkCommandPool and allocates primary buffers from it
//! - [`CommandBuffer`] wraps a VkCommandBuffer with recording helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quad_rhi::device::Device;
//! use quad_rhi::command::CommandPool;
//!
//! # fn example(device: Arc<Device>, graphics_family: u32) -> Result<(), quad_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), graphics_family)?;
//! pool.submit_one_time(device.graphics_queue(), |cmd| {
//!     // record transfer commands
//! })?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;
use crate::sync::Fence;

/// Vulkan command pool wrapper.
///
/// Tied to one queue family. Not thread-safe; one pool per recording thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a command pool for the given queue family.
    ///
    /// Buffers are allocated once per swapchain and recorded once, so no
    /// reset flag is requested.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index);

        // SAFETY: device is alive and the family index came from its queue families.
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: the pool belongs to this device.
        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };

        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer::from_handle(self.device.clone(), buffer))
            .collect())
    }

    /// Returns command buffers to the pool.
    ///
    /// The buffers must not be pending execution.
    pub fn free_command_buffers(&self, buffers: &[CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }

        let handles: Vec<vk::CommandBuffer> = buffers.iter().map(CommandBuffer::handle).collect();
        // SAFETY: the buffers were allocated from this pool and the caller
        // guarantees they are idle.
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, &handles);
        }
        debug!("Freed {} command buffer(s)", handles.len());
    }

    /// Records a throwaway command buffer, submits it to `queue` and blocks
    /// until it has executed.
    pub fn submit_one_time<F>(&self, queue: vk::Queue, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        let buffers = self.allocate_command_buffers(1)?;
        let result = self.record_and_wait(queue, &buffers, record);
        self.free_command_buffers(&buffers);
        result
    }

    fn record_and_wait<F>(&self, queue: vk::Queue, buffers: &[CommandBuffer], record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        let cmd = &buffers[0];
        cmd.begin_one_time()?;
        record(cmd);
        cmd.end()?;

        let fence = Fence::new(self.device.clone(), false)?;
        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        // SAFETY: the buffer is fully recorded and the fence is fresh.
        unsafe {
            self.device
                .handle()
                .queue_submit(queue, &[submit_info], fence.handle())?;
        }
        fence.wait(u64::MAX)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: no buffer from this pool is pending; the device is idle at teardown.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Vulkan command buffer wrapper.
///
/// Does not own the handle: it is released through
/// [`CommandPool::free_command_buffers`] or with the pool itself.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Wraps an existing command buffer handle.
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording for a single submission.
    pub fn begin_one_time(&self) -> RhiResult<()> {
        self.begin_with_flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    /// Begins recording a buffer that is submitted every time its image is drawn.
    pub fn begin(&self) -> RhiResult<()> {
        self.begin_with_flags(vk::CommandBufferUsageFlags::empty())
    }

    fn begin_with_flags(&self, flags: vk::CommandBufferUsageFlags) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        // SAFETY: the buffer is in the initial state.
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Finishes recording.
    pub fn end(&self) -> RhiResult<()> {
        // SAFETY: the buffer is in the recording state.
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        Ok(())
    }

    // =========================================================================
    // Render Pass
    // =========================================================================

    /// Begins a render pass with inline subpass contents.
    pub fn begin_render_pass(&self, begin_info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    /// Ends the current render pass.
    pub fn end_render_pass(&self) {
        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Binds a graphics pipeline.
    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Binds vertex buffers starting at `first_binding`.
    pub fn bind_vertex_buffers(
        &self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.device.handle().cmd_bind_vertex_buffers(
                self.buffer,
                first_binding,
                buffers,
                offsets,
            );
        }
    }

    /// Binds an index buffer.
    pub fn bind_index_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(self.buffer, buffer, offset, index_type);
        }
    }

    /// Binds descriptor sets for the graphics bind point.
    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    // =========================================================================
    // Drawing and Transfer
    // =========================================================================

    /// Issues an indexed draw command.
    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.handle().cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    /// Copies regions between buffers.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, regions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
    }

    #[test]
    fn test_command_pool_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandPool>();
    }
}
