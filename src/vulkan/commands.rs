//! Command-buffer lifecycle: pool-per-buffer creation, begin/end/submit.
//!
//! Recording operations themselves are thin translations living on the
//! device in `vulkan::mod`, since they need handle lookups.

use anyhow::{anyhow, Result};
use vulkanalia::prelude::v1_0::*;

/// Backend record behind a `CommandBufferHandle`. Each command buffer owns
/// its pool and a completion fence signaled by submit. The pipeline layout
/// of the most recent `cmd_set_pipeline` is cached here so bind-group and
/// push-constant commands can target it.
///
/// The fence starts signaled and is reset by submit, so "signaled" always
/// reads as "no submitted work is pending". `begin` and `destroy` gate on
/// it; resetting or freeing a command buffer the GPU is still executing is
/// invalid usage.
pub(crate) struct CommandBuffer {
    pub command_buffer: vk::CommandBuffer,
    pub pool: vk::CommandPool,
    pub fence: vk::Fence,
    pub is_recording: bool,
    pub current_layout: vk::PipelineLayout,
    pub current_bind_point: vk::PipelineBindPoint,
}

pub(crate) unsafe fn create_command_buffer(
    device: &Device,
    queue_family: u32,
) -> Result<CommandBuffer> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family);

    let pool = device.create_command_pool(&pool_info, None)?;

    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = match device.allocate_command_buffers(&alloc_info) {
        Ok(buffers) => buffers[0],
        Err(error) => {
            device.destroy_command_pool(pool, None);
            return Err(error.into());
        }
    };

    // Signaled at creation so the first begin and a destroy-before-submit
    // pass straight through the fence wait.
    let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
    let fence = match device.create_fence(&fence_info, None) {
        Ok(fence) => fence,
        Err(error) => {
            device.destroy_command_pool(pool, None);
            return Err(error.into());
        }
    };

    Ok(CommandBuffer {
        command_buffer,
        pool,
        fence,
        is_recording: false,
        current_layout: vk::PipelineLayout::null(),
        current_bind_point: vk::PipelineBindPoint::GRAPHICS,
    })
}

/// Blocks until the last submission of this command buffer has retired.
/// Instant when nothing was ever submitted.
pub(crate) unsafe fn wait_for_completion(
    device: &Device,
    command_buffer: &CommandBuffer,
) -> Result<()> {
    device.wait_for_fences(&[command_buffer.fence], true, u64::MAX)?;
    Ok(())
}

/// Whether the last submission has retired (true when never submitted).
pub(crate) unsafe fn is_complete(device: &Device, command_buffer: &CommandBuffer) -> bool {
    matches!(
        device.get_fence_status(command_buffer.fence),
        Ok(vk::SuccessCode::SUCCESS)
    )
}

pub(crate) unsafe fn destroy_command_buffer(device: &Device, command_buffer: CommandBuffer) {
    // The pool implicitly frees the buffer, and neither it nor the fence
    // may be destroyed while a submission is still executing.
    let _ = device.wait_for_fences(&[command_buffer.fence], true, u64::MAX);
    device.destroy_fence(command_buffer.fence, None);
    device.destroy_command_pool(command_buffer.pool, None);
}

/// Resets the buffer and opens a one-time-submit recording. Waits for the
/// previous submission to retire first; resetting a command buffer that is
/// still pending on the GPU is invalid usage.
pub(crate) unsafe fn begin(device: &Device, command_buffer: &mut CommandBuffer) -> Result<()> {
    if command_buffer.is_recording {
        return Err(anyhow!("command buffer is already recording"));
    }

    wait_for_completion(device, command_buffer)?;

    device.reset_command_buffer(
        command_buffer.command_buffer,
        vk::CommandBufferResetFlags::empty(),
    )?;

    let info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(command_buffer.command_buffer, &info)?;

    command_buffer.is_recording = true;
    command_buffer.current_layout = vk::PipelineLayout::null();
    command_buffer.current_bind_point = vk::PipelineBindPoint::GRAPHICS;
    Ok(())
}

pub(crate) unsafe fn end(device: &Device, command_buffer: &mut CommandBuffer) -> Result<()> {
    if !command_buffer.is_recording {
        return Err(anyhow!("command buffer is not recording"));
    }

    device.end_command_buffer(command_buffer.command_buffer)?;
    command_buffer.is_recording = false;
    Ok(())
}

/// Posts the buffer to the graphics queue. Non-blocking; the owned fence
/// is reset first and signaled when the GPU finishes.
pub(crate) unsafe fn submit(
    device: &Device,
    queue: vk::Queue,
    command_buffer: &CommandBuffer,
) -> Result<()> {
    if command_buffer.is_recording {
        return Err(anyhow!("cannot submit a command buffer that is still recording"));
    }

    device.reset_fences(&[command_buffer.fence])?;

    let command_buffers = &[command_buffer.command_buffer];
    let info = vk::SubmitInfo::builder().command_buffers(command_buffers);

    device.queue_submit(queue, &[info], command_buffer.fence)?;
    Ok(())
}

/// Records a single buffer copy into `command_buffer` and submits it to
/// `queue` signaling `fence`. Used by the per-frame upload ring to push
/// staging data into device-local buffers; the caller owns the fence wait
/// and the staging buffer's lifetime.
pub(crate) unsafe fn record_and_submit_copy(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    queue: vk::Queue,
    fence: vk::Fence,
    src: vk::Buffer,
    dst: vk::Buffer,
    dst_offset: u64,
    size: u64,
) -> Result<()> {
    device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;

    let info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(command_buffer, &info)?;

    let region = vk::BufferCopy::builder()
        .src_offset(0)
        .dst_offset(dst_offset)
        .size(size);
    device.cmd_copy_buffer(command_buffer, src, dst, &[region]);

    device.end_command_buffer(command_buffer)?;

    device.reset_fences(&[fence])?;
    let command_buffers = &[command_buffer];
    let submit = vk::SubmitInfo::builder().command_buffers(command_buffers);
    device.queue_submit(queue, &[submit], fence)?;

    Ok(())
}
