//! GPU buffer management.
//!
//! Vertex and index data lives in device-local memory and is uploaded once
//! through a staging buffer; uniform buffers stay host-visible so they can be
//! rewritten every frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quad_rhi::device::Device;
//! use quad_rhi::command::CommandPool;
//! use quad_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), quad_rhi::RhiError> {
//! let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = Buffer::new_device_local(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// How a buffer is used; selects Vulkan usage flags and memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data, device-local, filled by a transfer
    Vertex,
    /// Index data, device-local, filled by a transfer
    Index,
    /// Shader uniforms, host-visible
    Uniform,
    /// Host-visible transfer source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer with gpu-allocator managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    /// Taken in Drop
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates an uninitialized buffer of `size` bytes.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: device is alive; buffer_info is fully initialized.
        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        // Drop destroys the buffer if allocation or binding fails below.
        let mut this = Self {
            device,
            buffer,
            allocation: None,
            size,
            usage,
        };

        let requirements = unsafe { this.device.handle().get_buffer_memory_requirements(buffer) };
        let allocation = this.device.allocator()?.allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        // SAFETY: the allocation satisfies the buffer's memory requirements.
        let bound = unsafe {
            this.device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        this.allocation = Some(allocation);
        bound?;

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(this)
    }

    /// Creates a host-visible buffer initialized with `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer and fills it with `data` through a staging
    /// buffer, blocking until the copy has completed.
    pub fn new_device_local(
        device: Arc<Device>,
        command_pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device.clone(), usage, staging.size())?;

        let region = vk::BufferCopy::default().size(staging.size());
        command_pool.submit_one_time(device.graphics_queue(), |cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
        })?;

        debug!(
            "Uploaded {} bytes to {} buffer via staging",
            data.len(),
            usage.name()
        );
        Ok(buffer)
    }

    /// Writes bytes at `offset`. The buffer must be host-visible.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        // SAFETY: the range was bounds-checked above and the memory is host-coherent.
        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Writes a plain-old-data value at offset 0.
    pub fn write_value<T: Pod>(&self, value: &T) -> RhiResult<()> {
        self.write_data(0, bytemuck::bytes_of(value))
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking {} buffer memory: {}", self.usage.name(), e),
            }
        }

        // SAFETY: the owner guarantees the buffer is no longer used by the GPU.
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}
