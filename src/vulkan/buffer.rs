//! Buffer creation, host writes and mapping.

use std::ptr::{copy_nonoverlapping as memcpy, NonNull};

use anyhow::{anyhow, Result};
use vulkanalia::prelude::v1_0::*;

use super::convert::buffer_usage_to_vk;
use super::memory::{is_host_visible, MemoryAllocator};
use crate::types::{BufferDesc, BufferUsage, MemoryUsage};

/// Backend record behind a `BufferHandle`.
pub(crate) struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_usage: MemoryUsage,
}

pub(crate) unsafe fn create_buffer(
    device: &Device,
    allocator: &mut MemoryAllocator,
    desc: &BufferDesc,
    buffer_device_address: bool,
) -> Result<Buffer> {
    if desc.size == 0 {
        return Err(anyhow!("buffer size must be greater than zero"));
    }
    if desc.usage.is_empty() {
        return Err(anyhow!("buffer usage mask must not be empty"));
    }

    let mut usage = buffer_usage_to_vk(desc.usage);
    if buffer_device_address {
        usage |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    }

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(desc.size)
        .usage(usage)
        // Only the graphics queue touches buffers at this layer.
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    // This creates a buffer handle, but no memory is allocated for it yet.
    let buffer = device.create_buffer(&buffer_info, None)?;

    let requirements = device.get_buffer_memory_requirements(buffer);
    let memory = match allocate_buffer_memory(
        device,
        allocator,
        requirements,
        desc.memory,
        buffer_device_address,
    ) {
        Ok(memory) => memory,
        Err(error) => {
            // No partial state escapes a failed create.
            device.destroy_buffer(buffer, None);
            return Err(error);
        }
    };

    if let Err(error) = device.bind_buffer_memory(buffer, memory, 0) {
        allocator.free(device, memory);
        device.destroy_buffer(buffer, None);
        return Err(error.into());
    }

    Ok(Buffer {
        buffer,
        memory,
        size: desc.size,
        usage: desc.usage,
        memory_usage: desc.memory,
    })
}

unsafe fn allocate_buffer_memory(
    device: &Device,
    allocator: &mut MemoryAllocator,
    requirements: vk::MemoryRequirements,
    memory_usage: MemoryUsage,
    buffer_device_address: bool,
) -> Result<vk::DeviceMemory> {
    // Buffers carrying the device-address usage bit need the matching
    // allocation flag or address queries are invalid.
    if buffer_device_address {
        allocator.allocate_with_device_address(device, requirements, memory_usage)
    } else {
        allocator.allocate(device, requirements, memory_usage)
    }
}

pub(crate) unsafe fn destroy_buffer(
    device: &Device,
    allocator: &mut MemoryAllocator,
    buffer: Buffer,
) {
    device.destroy_buffer(buffer.buffer, None);
    allocator.free(device, buffer.memory);
}

/// Copies `data` into mappable buffer memory at `offset`. Rejects buffers
/// in `GpuOnly` memory; those are filled with copy commands instead.
pub(crate) unsafe fn write_buffer(
    device: &Device,
    buffer: &Buffer,
    offset: u64,
    data: &[u8],
) -> Result<()> {
    if !is_host_visible(buffer.memory_usage) {
        return Err(anyhow!("cannot write to GPU-only buffer memory"));
    }
    if offset + data.len() as u64 > buffer.size {
        return Err(anyhow!("buffer write out of bounds"));
    }

    let memory = device.map_memory(
        buffer.memory,
        offset,
        data.len() as u64,
        vk::MemoryMapFlags::empty(),
    )?;

    memcpy(data.as_ptr(), memory.cast(), data.len());

    device.unmap_memory(buffer.memory);
    Ok(())
}

pub(crate) unsafe fn map_buffer(
    device: &Device,
    buffer: &Buffer,
    offset: u64,
    size: u64,
) -> Result<NonNull<u8>> {
    if !is_host_visible(buffer.memory_usage) {
        return Err(anyhow!("cannot map GPU-only buffer memory"));
    }
    if offset + size > buffer.size {
        return Err(anyhow!("buffer map range out of bounds"));
    }

    let memory = device.map_memory(buffer.memory, offset, size, vk::MemoryMapFlags::empty())?;
    NonNull::new(memory.cast()).ok_or_else(|| anyhow!("map_memory returned null"))
}

pub(crate) unsafe fn unmap_buffer(device: &Device, buffer: &Buffer) {
    if is_host_visible(buffer.memory_usage) {
        device.unmap_memory(buffer.memory);
    }
}
