//! The Vulkan backend.
//!
//! `VulkanDevice` owns the instance, the selected adapter, the logical
//! device and queues, the memory allocator, the global descriptor pool,
//! the per-frame synchronization objects and one generational pool per
//! resource class. Every operation of the device interface resolves its
//! handles here and translates into native calls; failed creates are
//! logged and reported as null handles, and destroys accept null.

mod buffer;
mod commands;
mod convert;
mod debug;
mod descriptor;
mod device;
mod framebuffer;
mod instance;
mod memory;
mod physical_device;
mod pipeline;
mod render_pass;
mod sampler;
mod shader;
mod swapchain;
mod texture;

use std::ffi::CString;
use std::ptr::NonNull;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{ExtDebugUtilsExtension, Handle as VkHandle, KhrSurfaceExtension, KhrSwapchainExtension};
use vulkanalia::window as vk_window;
use winit::window::Window;

use crate::device::{ObjectHandle, RenderDevice};
use crate::handle::*;
use crate::types::*;
use crate::MAX_FRAMES_IN_FLIGHT;

use buffer::Buffer;
use commands::CommandBuffer;
use descriptor::{BindGroupLayout, ResolvedBinding};
use framebuffer::Framebuffer;
use memory::MemoryAllocator;
use physical_device::Adapter;
use pipeline::{Pipeline, PipelineLayout};
use render_pass::RenderPass;
use shader::Shader;
use swapchain::Swapchain;
use texture::{Texture, TextureView};

/// One generational pool per resource class.
#[derive(Default)]
struct Resources {
    buffers: crate::handle::HandlePool<Buffer>,
    textures: crate::handle::HandlePool<Texture>,
    texture_views: crate::handle::HandlePool<TextureView>,
    samplers: crate::handle::HandlePool<vk::Sampler>,
    shaders: crate::handle::HandlePool<Shader>,
    bind_group_layouts: crate::handle::HandlePool<BindGroupLayout>,
    pipeline_layouts: crate::handle::HandlePool<PipelineLayout>,
    pipelines: crate::handle::HandlePool<Pipeline>,
    bind_groups: crate::handle::HandlePool<vk::DescriptorSet>,
    render_passes: crate::handle::HandlePool<RenderPass>,
    framebuffers: crate::handle::HandlePool<Framebuffer>,
    command_buffers: crate::handle::HandlePool<CommandBuffer>,
    swapchains: crate::handle::HandlePool<Swapchain>,
}

/// One slot of the device's staging-upload ring. The staging buffer stays
/// alive until the slot's fence proves the copy has retired.
#[derive(Default)]
struct UploadSlot {
    staging: Option<Buffer>,
    in_flight: bool,
}

pub(crate) struct VulkanDevice {
    entry: Entry,
    instance: Instance,
    messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Throwaway surface used for presentation-support queries during
    /// adapter selection; swapchains build their own.
    probe_surface: vk::SurfaceKHR,
    adapter: Adapter,
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    device_features: DeviceFeatures,
    device_limits: DeviceLimits,
    allocator: MemoryAllocator,
    descriptor_pool: vk::DescriptorPool,
    /// Per-frame fence/command-buffer ring backing device-local buffer
    /// uploads: up to `MAX_FRAMES_IN_FLIGHT` staging copies may be in
    /// flight before `write_buffer` blocks on a slot's fence.
    frame_fences: Vec<vk::Fence>,
    frame_command_pool: vk::CommandPool,
    frame_command_buffers: Vec<vk::CommandBuffer>,
    upload_slots: Vec<UploadSlot>,
    upload_frame: usize,
    resources: Resources,
}

impl VulkanDevice {
    /// Builds the whole device: loader, instance, adapter, logical device,
    /// queues, allocator, descriptor pool and per-frame objects.
    pub unsafe fn create(window: &Window) -> Result<Self> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;

        let (instance, messenger) = instance::create_instance(window, &entry)?;
        let probe_surface = vk_window::create_surface(&instance, &window, &window)?;

        let adapter = physical_device::pick_physical_device(&instance, probe_surface)?;
        let (device, device_features) = device::create_logical_device(&entry, &instance, &adapter)?;

        let graphics_queue = device.get_device_queue(adapter.families.graphics, 0);
        let present_queue = device.get_device_queue(adapter.families.present, 0);

        let allocator = MemoryAllocator::new(adapter.memory_properties);
        let descriptor_pool = descriptor::create_descriptor_pool(&device)?;

        // Per-frame fences start signaled: an upload slot that was never
        // submitted must read as retired.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let mut frame_fences = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            frame_fences.push(device.create_fence(&fence_info, None)?);
        }

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(adapter.families.graphics);
        let frame_command_pool = device.create_command_pool(&pool_info, None)?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(frame_command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);
        let frame_command_buffers = device.allocate_command_buffers(&alloc_info)?;

        let limits = adapter.properties.limits;
        let device_limits = DeviceLimits {
            max_image_dimension_2d: limits.max_image_dimension_2d,
            max_push_constant_size: limits.max_push_constants_size,
            max_bind_groups: limits.max_bound_descriptor_sets,
            max_color_attachments: limits.max_color_attachments,
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_sampler_anisotropy: limits.max_sampler_anisotropy,
        };

        Ok(Self {
            entry,
            instance,
            messenger,
            probe_surface,
            adapter,
            device,
            graphics_queue,
            present_queue,
            device_features,
            device_limits,
            allocator,
            descriptor_pool,
            frame_fences,
            frame_command_pool,
            frame_command_buffers,
            upload_slots: (0..MAX_FRAMES_IN_FLIGHT).map(|_| UploadSlot::default()).collect(),
            upload_frame: 0,
            resources: Resources::default(),
        })
    }

    /// Pushes `data` into a device-local buffer through the per-frame
    /// upload ring: a staging buffer is written on the host, a copy into
    /// `dst` is recorded on the slot's command buffer and submitted
    /// signaling the slot's fence. Reusing a slot waits on its fence
    /// first, which paces the CPU to `MAX_FRAMES_IN_FLIGHT` uploads in
    /// flight and retires the slot's previous staging buffer.
    unsafe fn upload_gpu_only(&mut self, dst: vk::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let slot_index = self.upload_frame;
        self.upload_frame = (self.upload_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        let fence = self.frame_fences[slot_index];

        if self.upload_slots[slot_index].in_flight {
            self.device.wait_for_fences(&[fence], true, u64::MAX)?;
            self.upload_slots[slot_index].in_flight = false;
        }
        if let Some(staging) = self.upload_slots[slot_index].staging.take() {
            buffer::destroy_buffer(&self.device, &mut self.allocator, staging);
        }

        let staging = buffer::create_buffer(
            &self.device,
            &mut self.allocator,
            &BufferDesc {
                size: data.len() as u64,
                usage: BufferUsage::COPY_SRC,
                memory: MemoryUsage::CpuToGpu,
            },
            false,
        )?;
        if let Err(error) = buffer::write_buffer(&self.device, &staging, 0, data) {
            buffer::destroy_buffer(&self.device, &mut self.allocator, staging);
            return Err(error);
        }

        let submitted = commands::record_and_submit_copy(
            &self.device,
            self.frame_command_buffers[slot_index],
            self.graphics_queue,
            fence,
            staging.buffer,
            dst,
            offset,
            data.len() as u64,
        );
        match submitted {
            Ok(()) => {
                let slot = &mut self.upload_slots[slot_index];
                slot.staging = Some(staging);
                slot.in_flight = true;
                Ok(())
            }
            Err(error) => {
                buffer::destroy_buffer(&self.device, &mut self.allocator, staging);
                Err(error)
            }
        }
    }

    fn debug_utils_enabled(&self) -> bool {
        self.messenger.is_some()
    }

    /// Builds wrapper texture records and 2D color views for a batch of
    /// swapchain-owned images.
    unsafe fn wrap_swapchain_images(
        &mut self,
        images: &[vk::Image],
        format: Format,
        extent: vk::Extent2D,
    ) -> Result<(Vec<TextureHandle>, Vec<TextureViewHandle>)> {
        let mut textures = Vec::with_capacity(images.len());
        let mut views = Vec::with_capacity(images.len());

        for image in images {
            let record = texture::wrap_swapchain_image(*image, format, extent.width, extent.height);
            let handle = TextureHandle(self.resources.textures.insert(record));
            let record = self
                .resources
                .textures
                .get(handle.0)
                .ok_or_else(|| anyhow!("texture record vanished"))?;

            let view_desc = TextureViewDesc {
                texture: handle,
                ..Default::default()
            };
            let view = texture::create_texture_view(&self.device, record, handle, &view_desc)?;
            let view_handle = TextureViewHandle(self.resources.texture_views.insert(view));

            textures.push(handle);
            views.push(view_handle);
        }

        Ok((textures, views))
    }

    /// Drops the wrapper textures and views of a swapchain generation.
    unsafe fn release_swapchain_images(
        &mut self,
        textures: Vec<TextureHandle>,
        views: Vec<TextureViewHandle>,
    ) {
        for view in views {
            if let Some(view) = self.resources.texture_views.remove(view.0) {
                self.device.destroy_image_view(view.view, None);
            }
        }
        for texture in textures {
            // Wrapper records carry no allocation, removal is enough.
            self.resources.textures.remove(texture.0);
        }
    }

    /// Tears down images, views and the native swapchain, then rebuilds
    /// them against the same surface. Semaphores survive.
    unsafe fn recreate_swapchain(&mut self, handle: SwapchainHandle) -> Result<()> {
        self.device.device_wait_idle()?;

        let (surface, old_swapchain, old_textures, old_views, format, width, height, vsync) = {
            let record = self
                .resources
                .swapchains
                .get_mut(handle.0)
                .ok_or_else(|| anyhow!("stale swapchain handle"))?;
            (
                record.surface,
                record.swapchain,
                std::mem::take(&mut record.textures),
                std::mem::take(&mut record.views),
                record.format,
                record.requested_width,
                record.requested_height,
                record.vsync,
            )
        };

        self.release_swapchain_images(old_textures, old_views);
        self.device.destroy_swapchain_khr(old_swapchain, None);

        let objects = swapchain::create_swapchain_objects(
            &self.instance,
            &self.device,
            self.adapter.physical_device,
            surface,
            self.adapter.families.graphics,
            self.adapter.families.present,
            convert::format_to_vk(format),
            width,
            height,
            vsync,
        )?;

        let new_format =
            convert::format_from_vk(objects.surface_format.format).unwrap_or(format);
        let (textures, views) =
            self.wrap_swapchain_images(&objects.images, new_format, objects.extent)?;

        let record = self
            .resources
            .swapchains
            .get_mut(handle.0)
            .ok_or_else(|| anyhow!("stale swapchain handle"))?;
        record.swapchain = objects.swapchain;
        record.format = new_format;
        record.vk_format = objects.surface_format.format;
        record.present_mode = swapchain::present_mode_from_vk(objects.present_mode);
        record.extent = objects.extent;
        record.textures = textures;
        record.views = views;
        record.current_image = 0;

        debug!(
            "Swapchain recreated at {}x{} ({} images).",
            record.extent.width,
            record.extent.height,
            record.textures.len()
        );
        Ok(())
    }

    fn resolve_bind_group_entries(
        &self,
        entries: &[BindGroupEntry],
    ) -> Result<Vec<(u32, ResolvedBinding)>> {
        let mut resolved = Vec::with_capacity(entries.len());

        for entry in entries {
            let filled = [
                !entry.buffer.is_null(),
                !entry.texture_view.is_null(),
                !entry.sampler.is_null(),
            ]
            .iter()
            .filter(|f| **f)
            .count();
            if filled != 1 {
                return Err(anyhow!(
                    "bind group entry {} must reference exactly one resource",
                    entry.binding
                ));
            }

            let binding = if !entry.buffer.is_null() {
                let buffer = self
                    .resources
                    .buffers
                    .get(entry.buffer.0)
                    .ok_or_else(|| anyhow!("bind group entry references a dead buffer"))?;
                // The buffer's usage mask selects the descriptor type.
                let descriptor_type = if buffer.usage.contains(BufferUsage::UNIFORM) {
                    vk::DescriptorType::UNIFORM_BUFFER
                } else {
                    vk::DescriptorType::STORAGE_BUFFER
                };
                ResolvedBinding::Buffer {
                    buffer: buffer.buffer,
                    range: buffer.size,
                    descriptor_type,
                }
            } else if !entry.texture_view.is_null() {
                let view = self
                    .resources
                    .texture_views
                    .get(entry.texture_view.0)
                    .ok_or_else(|| anyhow!("bind group entry references a dead texture view"))?;
                let texture = self
                    .resources
                    .textures
                    .get(view.texture.0)
                    .ok_or_else(|| anyhow!("texture view references a dead texture"))?;
                if texture.usage.contains(TextureUsage::STORAGE) {
                    ResolvedBinding::Image {
                        view: view.view,
                        layout: vk::ImageLayout::GENERAL,
                        descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
                    }
                } else {
                    ResolvedBinding::Image {
                        view: view.view,
                        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        descriptor_type: vk::DescriptorType::SAMPLED_IMAGE,
                    }
                }
            } else {
                let sampler = self
                    .resources
                    .samplers
                    .get(entry.sampler.0)
                    .ok_or_else(|| anyhow!("bind group entry references a dead sampler"))?;
                ResolvedBinding::Sampler { sampler: *sampler }
            };

            resolved.push((entry.binding, binding));
        }

        Ok(resolved)
    }

    fn object_type_and_handle(&self, object: ObjectHandle) -> Option<(vk::ObjectType, u64)> {
        match object {
            ObjectHandle::Buffer(h) => self
                .resources
                .buffers
                .get(h.0)
                .map(|b| (vk::ObjectType::BUFFER, b.buffer.as_raw())),
            ObjectHandle::Texture(h) => self
                .resources
                .textures
                .get(h.0)
                .map(|t| (vk::ObjectType::IMAGE, t.image.as_raw())),
            ObjectHandle::TextureView(h) => self
                .resources
                .texture_views
                .get(h.0)
                .map(|v| (vk::ObjectType::IMAGE_VIEW, v.view.as_raw())),
            ObjectHandle::Sampler(h) => self
                .resources
                .samplers
                .get(h.0)
                .map(|s| (vk::ObjectType::SAMPLER, s.as_raw())),
            ObjectHandle::Shader(h) => self
                .resources
                .shaders
                .get(h.0)
                .map(|s| (vk::ObjectType::SHADER_MODULE, s.module.as_raw())),
            ObjectHandle::BindGroupLayout(h) => self
                .resources
                .bind_group_layouts
                .get(h.0)
                .map(|l| (vk::ObjectType::DESCRIPTOR_SET_LAYOUT, l.layout.as_raw())),
            ObjectHandle::PipelineLayout(h) => self
                .resources
                .pipeline_layouts
                .get(h.0)
                .map(|l| (vk::ObjectType::PIPELINE_LAYOUT, l.layout.as_raw())),
            ObjectHandle::Pipeline(h) => self
                .resources
                .pipelines
                .get(h.0)
                .map(|p| (vk::ObjectType::PIPELINE, p.pipeline.as_raw())),
            ObjectHandle::BindGroup(h) => self
                .resources
                .bind_groups
                .get(h.0)
                .map(|s| (vk::ObjectType::DESCRIPTOR_SET, s.as_raw())),
            ObjectHandle::RenderPass(h) => self
                .resources
                .render_passes
                .get(h.0)
                .map(|r| (vk::ObjectType::RENDER_PASS, r.render_pass.as_raw())),
            ObjectHandle::Framebuffer(h) => self
                .resources
                .framebuffers
                .get(h.0)
                .map(|f| (vk::ObjectType::FRAMEBUFFER, f.framebuffer.as_raw())),
            ObjectHandle::CommandBuffer(h) => self
                .resources
                .command_buffers
                .get(h.0)
                .map(|c| (vk::ObjectType::COMMAND_BUFFER, c.command_buffer.as_raw() as u64)),
            ObjectHandle::Swapchain(h) => self
                .resources
                .swapchains
                .get(h.0)
                .map(|s| (vk::ObjectType::SWAPCHAIN_KHR, s.swapchain.as_raw())),
        }
    }

    fn native_command_buffer(&self, cmd: CommandBufferHandle) -> Option<vk::CommandBuffer> {
        self.resources
            .command_buffers
            .get(cmd.0)
            .map(|c| c.command_buffer)
    }

    fn native_buffer(&self, buffer: BufferHandle) -> Option<vk::Buffer> {
        self.resources.buffers.get(buffer.0).map(|b| b.buffer)
    }
}

impl RenderDevice for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.device_limits
    }

    fn features(&self) -> DeviceFeatures {
        self.device_features
    }

    fn wait_idle(&self) {
        if let Err(error) = unsafe { self.device.device_wait_idle() } {
            error!("device_wait_idle failed: {}", error);
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferHandle {
        let result = unsafe {
            buffer::create_buffer(
                &self.device,
                &mut self.allocator,
                desc,
                self.device_features.buffer_device_address,
            )
        };
        match result {
            Ok(record) => BufferHandle(self.resources.buffers.insert(record)),
            Err(error) => {
                error!("Failed to create buffer: {}", error);
                BufferHandle::NULL
            }
        }
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(record) = self.resources.buffers.remove(handle.0) {
            unsafe { buffer::destroy_buffer(&self.device, &mut self.allocator, record) };
        }
    }

    fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) {
        let Some(record) = self.resources.buffers.get(handle.0) else {
            return;
        };

        if memory::is_host_visible(record.memory_usage) {
            if let Err(error) = unsafe { buffer::write_buffer(&self.device, record, offset, data) } {
                error!("Failed to write buffer: {}", error);
            }
            return;
        }

        // Device-local buffers are filled through the staging ring.
        let (dst, size) = (record.buffer, record.size);
        if offset + data.len() as u64 > size {
            error!("Failed to write buffer: buffer write out of bounds");
            return;
        }
        if let Err(error) = unsafe { self.upload_gpu_only(dst, offset, data) } {
            error!("Failed to write buffer: {}", error);
        }
    }

    fn map_buffer(&mut self, handle: BufferHandle, offset: u64, size: u64) -> Option<NonNull<u8>> {
        let record = self.resources.buffers.get(handle.0)?;
        match unsafe { buffer::map_buffer(&self.device, record, offset, size) } {
            Ok(pointer) => Some(pointer),
            Err(error) => {
                error!("Failed to map buffer: {}", error);
                None
            }
        }
    }

    fn unmap_buffer(&mut self, handle: BufferHandle) {
        if let Some(record) = self.resources.buffers.get(handle.0) {
            unsafe { buffer::unmap_buffer(&self.device, record) };
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle {
        match unsafe { texture::create_texture(&self.device, &mut self.allocator, desc) } {
            Ok(record) => TextureHandle(self.resources.textures.insert(record)),
            Err(error) => {
                error!("Failed to create texture: {}", error);
                TextureHandle::NULL
            }
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(record) = self.resources.textures.remove(handle.0) {
            unsafe { texture::destroy_texture(&self.device, &mut self.allocator, record) };
        }
    }

    fn create_texture_view(&mut self, desc: &TextureViewDesc) -> TextureViewHandle {
        let Some(record) = self.resources.textures.get(desc.texture.0) else {
            error!("Failed to create texture view: texture handle is null or dead");
            return TextureViewHandle::NULL;
        };
        match unsafe { texture::create_texture_view(&self.device, record, desc.texture, desc) } {
            Ok(view) => TextureViewHandle(self.resources.texture_views.insert(view)),
            Err(error) => {
                error!("Failed to create texture view: {}", error);
                TextureViewHandle::NULL
            }
        }
    }

    fn destroy_texture_view(&mut self, handle: TextureViewHandle) {
        if let Some(view) = self.resources.texture_views.remove(handle.0) {
            unsafe { self.device.destroy_image_view(view.view, None) };
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> SamplerHandle {
        match unsafe { sampler::create_sampler(&self.device, desc) } {
            Ok(sampler) => SamplerHandle(self.resources.samplers.insert(sampler)),
            Err(error) => {
                error!("Failed to create sampler: {}", error);
                SamplerHandle::NULL
            }
        }
    }

    fn destroy_sampler(&mut self, handle: SamplerHandle) {
        if let Some(sampler) = self.resources.samplers.remove(handle.0) {
            unsafe { self.device.destroy_sampler(sampler, None) };
        }
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> ShaderHandle {
        match unsafe { shader::create_shader(&self.device, desc) } {
            Ok(record) => ShaderHandle(self.resources.shaders.insert(record)),
            Err(error) => {
                error!("Failed to create shader: {}", error);
                ShaderHandle::NULL
            }
        }
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        if let Some(record) = self.resources.shaders.remove(handle.0) {
            unsafe { self.device.destroy_shader_module(record.module, None) };
        }
    }

    fn create_bind_group_layout(&mut self, desc: &BindGroupLayoutDesc) -> BindGroupLayoutHandle {
        match unsafe { descriptor::create_bind_group_layout(&self.device, desc) } {
            Ok(record) => BindGroupLayoutHandle(self.resources.bind_group_layouts.insert(record)),
            Err(error) => {
                error!("Failed to create bind group layout: {}", error);
                BindGroupLayoutHandle::NULL
            }
        }
    }

    fn destroy_bind_group_layout(&mut self, handle: BindGroupLayoutHandle) {
        if let Some(record) = self.resources.bind_group_layouts.remove(handle.0) {
            unsafe { self.device.destroy_descriptor_set_layout(record.layout, None) };
        }
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> PipelineLayoutHandle {
        let mut set_layouts = Vec::with_capacity(desc.bind_group_layouts.len());
        for handle in &desc.bind_group_layouts {
            let Some(record) = self.resources.bind_group_layouts.get(handle.0) else {
                error!("Failed to create pipeline layout: bind group layout is null or dead");
                return PipelineLayoutHandle::NULL;
            };
            set_layouts.push(record.layout);
        }

        match unsafe { pipeline::create_pipeline_layout(&self.device, &set_layouts) } {
            Ok(record) => PipelineLayoutHandle(self.resources.pipeline_layouts.insert(record)),
            Err(error) => {
                error!("Failed to create pipeline layout: {}", error);
                PipelineLayoutHandle::NULL
            }
        }
    }

    fn destroy_pipeline_layout(&mut self, handle: PipelineLayoutHandle) {
        if let Some(record) = self.resources.pipeline_layouts.remove(handle.0) {
            unsafe { self.device.destroy_pipeline_layout(record.layout, None) };
        }
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> BindGroupHandle {
        let Some(layout) = self.resources.bind_group_layouts.get(desc.layout.0) else {
            error!("Failed to create bind group: layout handle is null or dead");
            return BindGroupHandle::NULL;
        };
        let layout = layout.layout;

        let resolved = match self.resolve_bind_group_entries(&desc.entries) {
            Ok(resolved) => resolved,
            Err(error) => {
                error!("Failed to create bind group: {}", error);
                return BindGroupHandle::NULL;
            }
        };

        match unsafe {
            descriptor::create_bind_group(&self.device, self.descriptor_pool, layout, &resolved)
        } {
            Ok(set) => BindGroupHandle(self.resources.bind_groups.insert(set)),
            Err(error) => {
                error!("Failed to create bind group: {}", error);
                BindGroupHandle::NULL
            }
        }
    }

    fn destroy_bind_group(&mut self, handle: BindGroupHandle) {
        if let Some(set) = self.resources.bind_groups.remove(handle.0) {
            // The pool was created with the free-descriptor-set flag, so
            // sets are returned individually.
            let _ = unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &[set]) };
        }
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> PipelineHandle {
        let Some(vertex) = self.resources.shaders.get(desc.vertex_shader.0) else {
            error!("Failed to create graphics pipeline: vertex shader is null or dead");
            return PipelineHandle::NULL;
        };
        let fragment = if desc.fragment_shader.is_null() {
            None
        } else {
            match self.resources.shaders.get(desc.fragment_shader.0) {
                Some(shader) => Some(shader),
                None => {
                    error!("Failed to create graphics pipeline: fragment shader is dead");
                    return PipelineHandle::NULL;
                }
            }
        };
        let Some(layout) = self.resources.pipeline_layouts.get(desc.layout.0) else {
            error!("Failed to create graphics pipeline: layout handle is null or dead");
            return PipelineHandle::NULL;
        };

        match unsafe {
            pipeline::create_graphics_pipeline(&self.device, desc, vertex, fragment, layout)
        } {
            Ok(native) => {
                let record = Pipeline {
                    pipeline: native,
                    layout: desc.layout,
                    vk_layout: layout.layout,
                    bind_point: vk::PipelineBindPoint::GRAPHICS,
                };
                PipelineHandle(self.resources.pipelines.insert(record))
            }
            Err(error) => {
                error!("Failed to create graphics pipeline: {}", error);
                PipelineHandle::NULL
            }
        }
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> PipelineHandle {
        let Some(shader) = self.resources.shaders.get(desc.shader.0) else {
            error!("Failed to create compute pipeline: shader is null or dead");
            return PipelineHandle::NULL;
        };
        let Some(layout) = self.resources.pipeline_layouts.get(desc.layout.0) else {
            error!("Failed to create compute pipeline: layout handle is null or dead");
            return PipelineHandle::NULL;
        };

        match unsafe { pipeline::create_compute_pipeline(&self.device, shader, layout) } {
            Ok(native) => {
                let record = Pipeline {
                    pipeline: native,
                    layout: desc.layout,
                    vk_layout: layout.layout,
                    bind_point: vk::PipelineBindPoint::COMPUTE,
                };
                PipelineHandle(self.resources.pipelines.insert(record))
            }
            Err(error) => {
                error!("Failed to create compute pipeline: {}", error);
                PipelineHandle::NULL
            }
        }
    }

    fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        if let Some(record) = self.resources.pipelines.remove(handle.0) {
            unsafe { self.device.destroy_pipeline(record.pipeline, None) };
        }
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RenderPassHandle {
        match unsafe { render_pass::create_render_pass(&self.device, desc) } {
            Ok(record) => RenderPassHandle(self.resources.render_passes.insert(record)),
            Err(error) => {
                error!("Failed to create render pass: {}", error);
                RenderPassHandle::NULL
            }
        }
    }

    fn destroy_render_pass(&mut self, handle: RenderPassHandle) {
        if let Some(record) = self.resources.render_passes.remove(handle.0) {
            unsafe { self.device.destroy_render_pass(record.render_pass, None) };
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferHandle {
        let Some(render_pass) = self.resources.render_passes.get(desc.render_pass.0) else {
            error!("Failed to create framebuffer: render pass is null or dead");
            return FramebufferHandle::NULL;
        };
        let render_pass = render_pass.render_pass;

        // Attachment order must match the render pass: color first, then
        // the optional depth view.
        let mut attachments = Vec::with_capacity(desc.color_views.len() + 1);
        for view in &desc.color_views {
            let Some(record) = self.resources.texture_views.get(view.0) else {
                error!("Failed to create framebuffer: color view is null or dead");
                return FramebufferHandle::NULL;
            };
            attachments.push(record.view);
        }
        if !desc.depth_view.is_null() {
            let Some(record) = self.resources.texture_views.get(desc.depth_view.0) else {
                error!("Failed to create framebuffer: depth view is dead");
                return FramebufferHandle::NULL;
            };
            attachments.push(record.view);
        }

        match unsafe {
            framebuffer::create_framebuffer(
                &self.device,
                render_pass,
                &attachments,
                desc.width,
                desc.height,
                desc.layers,
            )
        } {
            Ok(record) => FramebufferHandle(self.resources.framebuffers.insert(record)),
            Err(error) => {
                error!("Failed to create framebuffer: {}", error);
                FramebufferHandle::NULL
            }
        }
    }

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        if let Some(record) = self.resources.framebuffers.remove(handle.0) {
            unsafe { self.device.destroy_framebuffer(record.framebuffer, None) };
        }
    }

    fn create_command_buffer(&mut self) -> CommandBufferHandle {
        match unsafe {
            commands::create_command_buffer(&self.device, self.adapter.families.graphics)
        } {
            Ok(record) => CommandBufferHandle(self.resources.command_buffers.insert(record)),
            Err(error) => {
                error!("Failed to create command buffer: {}", error);
                CommandBufferHandle::NULL
            }
        }
    }

    fn destroy_command_buffer(&mut self, handle: CommandBufferHandle) {
        if let Some(record) = self.resources.command_buffers.remove(handle.0) {
            unsafe { commands::destroy_command_buffer(&self.device, record) };
        }
    }

    fn begin_command_buffer(&mut self, handle: CommandBufferHandle) {
        let Some(record) = self.resources.command_buffers.get_mut(handle.0) else {
            return;
        };
        if let Err(error) = unsafe { commands::begin(&self.device, record) } {
            error!("Failed to begin command buffer: {}", error);
        }
    }

    fn end_command_buffer(&mut self, handle: CommandBufferHandle) {
        let Some(record) = self.resources.command_buffers.get_mut(handle.0) else {
            return;
        };
        if let Err(error) = unsafe { commands::end(&self.device, record) } {
            error!("Failed to end command buffer: {}", error);
        }
    }

    fn submit_command_buffer(&mut self, handle: CommandBufferHandle) {
        let Some(record) = self.resources.command_buffers.get(handle.0) else {
            return;
        };
        if let Err(error) = unsafe { commands::submit(&self.device, self.graphics_queue, record) } {
            error!("Failed to submit command buffer: {}", error);
        }
    }

    fn wait_command_buffer(&mut self, handle: CommandBufferHandle) {
        let Some(record) = self.resources.command_buffers.get(handle.0) else {
            return;
        };
        if let Err(error) = unsafe { commands::wait_for_completion(&self.device, record) } {
            error!("Failed to wait for command buffer: {}", error);
        }
    }

    fn command_buffer_is_complete(&self, handle: CommandBufferHandle) -> bool {
        self.resources
            .command_buffers
            .get(handle.0)
            .map(|record| unsafe { commands::is_complete(&self.device, record) })
            .unwrap_or(true)
    }

    fn cmd_begin_render_pass(&mut self, cmd: CommandBufferHandle, desc: &RenderPassBeginDesc) {
        let Some(command_buffer) = self.native_command_buffer(cmd) else {
            return;
        };
        let Some(render_pass) = self.resources.render_passes.get(desc.render_pass.0) else {
            error!("cmd_begin_render_pass: render pass is null or dead");
            return;
        };
        let Some(framebuffer) = self.resources.framebuffers.get(desc.framebuffer.0) else {
            error!("cmd_begin_render_pass: framebuffer is null or dead");
            return;
        };

        let mut clear_values = Vec::with_capacity(render_pass.color_count as usize + 1);
        for index in 0..render_pass.color_count as usize {
            let color = desc.clear_colors.get(index).copied().unwrap_or_default();
            clear_values.push(vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            });
        }
        if render_pass.has_depth {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: desc.clear_depth,
                    stencil: desc.clear_stencil,
                },
            });
        }

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: framebuffer.width,
                height: framebuffer.height,
            },
        };

        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass.render_pass)
            .framebuffer(framebuffer.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE)
        };
    }

    fn cmd_end_render_pass(&mut self, cmd: CommandBufferHandle) {
        if let Some(command_buffer) = self.native_command_buffer(cmd) {
            unsafe { self.device.cmd_end_render_pass(command_buffer) };
        }
    }

    fn cmd_set_pipeline(&mut self, cmd: CommandBufferHandle, pipeline: PipelineHandle) {
        let Some(record) = self.resources.pipelines.get(pipeline.0) else {
            return;
        };
        let (native, bind_point, layout) = (record.pipeline, record.bind_point, record.vk_layout);

        let Some(command_buffer) = self.resources.command_buffers.get_mut(cmd.0) else {
            return;
        };
        // Remember the layout and bind point so bind-group and
        // push-constant commands recorded after this bind can target it.
        command_buffer.current_layout = layout;
        command_buffer.current_bind_point = bind_point;
        let native_cmd = command_buffer.command_buffer;

        unsafe { self.device.cmd_bind_pipeline(native_cmd, bind_point, native) };
    }

    fn cmd_set_bind_group(&mut self, cmd: CommandBufferHandle, index: u32, group: BindGroupHandle) {
        let Some(set) = self.resources.bind_groups.get(group.0).copied() else {
            return;
        };
        let Some(record) = self.resources.command_buffers.get(cmd.0) else {
            return;
        };
        if record.current_layout.is_null() {
            error!("cmd_set_bind_group: no pipeline bound");
            return;
        }

        unsafe {
            self.device.cmd_bind_descriptor_sets(
                record.command_buffer,
                record.current_bind_point,
                record.current_layout,
                index,
                &[set],
                &[],
            )
        };
    }

    fn cmd_set_vertex_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    ) {
        let (Some(command_buffer), Some(buffer)) =
            (self.native_command_buffer(cmd), self.native_buffer(buffer))
        else {
            return;
        };
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, slot, &[buffer], &[offset])
        };
    }

    fn cmd_set_index_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    ) {
        let (Some(command_buffer), Some(buffer)) =
            (self.native_command_buffer(cmd), self.native_buffer(buffer))
        else {
            return;
        };
        unsafe {
            self.device.cmd_bind_index_buffer(
                command_buffer,
                buffer,
                offset,
                convert::index_format_to_vk(format),
            )
        };
    }

    fn cmd_push_constants(&mut self, cmd: CommandBufferHandle, offset: u32, data: &[u8]) {
        let Some(record) = self.resources.command_buffers.get(cmd.0) else {
            return;
        };
        if record.current_layout.is_null() {
            error!("cmd_push_constants: no pipeline bound");
            return;
        }

        unsafe {
            self.device.cmd_push_constants(
                record.command_buffer,
                record.current_layout,
                vk::ShaderStageFlags::ALL,
                offset,
                data,
            )
        };
    }

    fn cmd_set_viewport(
        &mut self,
        cmd: CommandBufferHandle,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) {
        let Some(command_buffer) = self.native_command_buffer(cmd) else {
            return;
        };
        let viewport = vk::Viewport::builder()
            .x(x)
            .y(y)
            .width(width)
            .height(height)
            .min_depth(min_depth)
            .max_depth(max_depth);
        unsafe { self.device.cmd_set_viewport(command_buffer, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&mut self, cmd: CommandBufferHandle, x: u32, y: u32, width: u32, height: u32) {
        let Some(command_buffer) = self.native_command_buffer(cmd) else {
            return;
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: x as i32,
                y: y as i32,
            },
            extent: vk::Extent2D { width, height },
        };
        unsafe { self.device.cmd_set_scissor(command_buffer, 0, &[scissor]) };
    }

    fn cmd_set_blend_constant(&mut self, cmd: CommandBufferHandle, color: [f32; 4]) {
        if let Some(command_buffer) = self.native_command_buffer(cmd) {
            unsafe { self.device.cmd_set_blend_constants(command_buffer, color) };
        }
    }

    fn cmd_set_stencil_reference(&mut self, cmd: CommandBufferHandle, reference: u32) {
        if let Some(command_buffer) = self.native_command_buffer(cmd) {
            unsafe {
                self.device.cmd_set_stencil_reference(
                    command_buffer,
                    vk::StencilFaceFlags::FRONT_AND_BACK,
                    reference,
                )
            };
        }
    }

    fn cmd_draw(
        &mut self,
        cmd: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if let Some(command_buffer) = self.native_command_buffer(cmd) {
            unsafe {
                self.device.cmd_draw(
                    command_buffer,
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                )
            };
        }
    }

    fn cmd_draw_indexed(
        &mut self,
        cmd: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        if let Some(command_buffer) = self.native_command_buffer(cmd) {
            unsafe {
                self.device.cmd_draw_indexed(
                    command_buffer,
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                )
            };
        }
    }

    fn cmd_draw_indirect(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        let (Some(command_buffer), Some(buffer)) =
            (self.native_command_buffer(cmd), self.native_buffer(buffer))
        else {
            return;
        };
        unsafe {
            self.device
                .cmd_draw_indirect(command_buffer, buffer, offset, draw_count, stride)
        };
    }

    fn cmd_draw_indexed_indirect(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        let (Some(command_buffer), Some(buffer)) =
            (self.native_command_buffer(cmd), self.native_buffer(buffer))
        else {
            return;
        };
        unsafe {
            self.device
                .cmd_draw_indexed_indirect(command_buffer, buffer, offset, draw_count, stride)
        };
    }

    fn cmd_dispatch(&mut self, cmd: CommandBufferHandle, x: u32, y: u32, z: u32) {
        if let Some(command_buffer) = self.native_command_buffer(cmd) {
            unsafe { self.device.cmd_dispatch(command_buffer, x, y, z) };
        }
    }

    fn cmd_dispatch_indirect(&mut self, cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64) {
        let (Some(command_buffer), Some(buffer)) =
            (self.native_command_buffer(cmd), self.native_buffer(buffer))
        else {
            return;
        };
        unsafe { self.device.cmd_dispatch_indirect(command_buffer, buffer, offset) };
    }

    fn cmd_copy_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        let (Some(command_buffer), Some(src), Some(dst)) = (
            self.native_command_buffer(cmd),
            self.native_buffer(src),
            self.native_buffer(dst),
        ) else {
            return;
        };

        let region = vk::BufferCopy::builder()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe { self.device.cmd_copy_buffer(command_buffer, src, dst, &[region]) };
    }

    fn cmd_copy_texture(&mut self, cmd: CommandBufferHandle, src: TextureHandle, dst: TextureHandle) {
        let Some(command_buffer) = self.native_command_buffer(cmd) else {
            return;
        };
        let (Some(src), Some(dst)) = (
            self.resources.textures.get(src.0),
            self.resources.textures.get(dst.0),
        ) else {
            return;
        };

        // Whole-texture copy: base mip, every layer.
        let region = vk::ImageCopy::builder()
            .src_subresource(
                vk::ImageSubresourceLayers::builder()
                    .aspect_mask(convert::format_aspect(src.format))
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(src.array_layers)
                    .build(),
            )
            .src_offset(vk::Offset3D::default())
            .dst_subresource(
                vk::ImageSubresourceLayers::builder()
                    .aspect_mask(convert::format_aspect(dst.format))
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(src.array_layers)
                    .build(),
            )
            .dst_offset(vk::Offset3D::default())
            .extent(vk::Extent3D {
                width: src.width,
                height: src.height,
                depth: src.depth,
            });

        unsafe {
            self.device.cmd_copy_image(
                command_buffer,
                src.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn cmd_copy_buffer_to_texture(
        &mut self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: TextureHandle,
        mip_level: u32,
        array_layer: u32,
    ) {
        let (Some(command_buffer), Some(src)) =
            (self.native_command_buffer(cmd), self.native_buffer(src))
        else {
            return;
        };
        let Some(dst) = self.resources.textures.get(dst.0) else {
            return;
        };

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(src_offset)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(mip_level)
                    .base_array_layer(array_layer)
                    .layer_count(1)
                    .build(),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: convert::mip_extent(dst.width, mip_level),
                height: convert::mip_extent(dst.height, mip_level),
                depth: convert::mip_extent(dst.depth, mip_level),
            });

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                command_buffer,
                src,
                dst.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn cmd_copy_texture_to_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        src: TextureHandle,
        mip_level: u32,
        array_layer: u32,
        dst: BufferHandle,
        dst_offset: u64,
    ) {
        let (Some(command_buffer), Some(dst)) =
            (self.native_command_buffer(cmd), self.native_buffer(dst))
        else {
            return;
        };
        let Some(src) = self.resources.textures.get(src.0) else {
            return;
        };

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(dst_offset)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(mip_level)
                    .base_array_layer(array_layer)
                    .layer_count(1)
                    .build(),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: convert::mip_extent(src.width, mip_level),
                height: convert::mip_extent(src.height, mip_level),
                depth: convert::mip_extent(src.depth, mip_level),
            });

        unsafe {
            self.device.cmd_copy_image_to_buffer(
                command_buffer,
                src.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                &[region],
            )
        };
    }

    fn create_swapchain(&mut self, window: &Window, desc: &SwapchainDesc) -> SwapchainHandle {
        let result: Result<SwapchainHandle> = (|| unsafe {
            let surface = vk_window::create_surface(&self.instance, &window, &window)?;

            let objects = swapchain::create_swapchain_objects(
                &self.instance,
                &self.device,
                self.adapter.physical_device,
                surface,
                self.adapter.families.graphics,
                self.adapter.families.present,
                convert::format_to_vk(desc.format),
                desc.width,
                desc.height,
                desc.vsync,
            );

            let objects = match objects {
                Ok(objects) => objects,
                Err(error) => {
                    self.instance.destroy_surface_khr(surface, None);
                    return Err(error);
                }
            };

            let format =
                convert::format_from_vk(objects.surface_format.format).unwrap_or(desc.format);
            let (textures, views) =
                self.wrap_swapchain_images(&objects.images, format, objects.extent)?;
            let (image_available, render_finished) =
                swapchain::create_frame_semaphores(&self.device)?;

            info!(
                "Swapchain created at {}x{} with {} images ({:?}).",
                objects.extent.width,
                objects.extent.height,
                textures.len(),
                swapchain::present_mode_from_vk(objects.present_mode),
            );

            let record = Swapchain {
                surface,
                swapchain: objects.swapchain,
                format,
                vk_format: objects.surface_format.format,
                present_mode: swapchain::present_mode_from_vk(objects.present_mode),
                extent: objects.extent,
                requested_width: desc.width,
                requested_height: desc.height,
                vsync: desc.vsync,
                textures,
                views,
                image_available,
                render_finished,
                current_image: 0,
                current_frame: 0,
            };
            Ok(SwapchainHandle(self.resources.swapchains.insert(record)))
        })();

        match result {
            Ok(handle) => handle,
            Err(error) => {
                error!("Failed to create swapchain: {}", error);
                SwapchainHandle::NULL
            }
        }
    }

    fn destroy_swapchain(&mut self, handle: SwapchainHandle) {
        let Some(record) = self.resources.swapchains.remove(handle.0) else {
            return;
        };

        self.wait_idle();
        unsafe {
            self.release_swapchain_images(record.textures, record.views);
            self.device.destroy_swapchain_khr(record.swapchain, None);
            for semaphore in record
                .image_available
                .into_iter()
                .chain(record.render_finished)
            {
                self.device.destroy_semaphore(semaphore, None);
            }
            self.instance.destroy_surface_khr(record.surface, None);
        }
    }

    fn resize_swapchain(&mut self, handle: SwapchainHandle, width: u32, height: u32) {
        {
            let Some(record) = self.resources.swapchains.get_mut(handle.0) else {
                return;
            };
            record.requested_width = width;
            record.requested_height = height;
        }
        if let Err(error) = unsafe { self.recreate_swapchain(handle) } {
            error!("Failed to resize swapchain: {}", error);
        }
    }

    fn swapchain_texture_count(&self, handle: SwapchainHandle) -> u32 {
        self.resources
            .swapchains
            .get(handle.0)
            .map(|record| record.textures.len() as u32)
            .unwrap_or(0)
    }

    fn swapchain_texture(&self, handle: SwapchainHandle, index: u32) -> TextureHandle {
        self.resources
            .swapchains
            .get(handle.0)
            .and_then(|record| record.textures.get(index as usize).copied())
            .unwrap_or(TextureHandle::NULL)
    }

    fn present_swapchain(&mut self, handle: SwapchainHandle) {
        let (native, image_available, render_finished) =
            match self.resources.swapchains.get(handle.0) {
                Some(record) => (
                    record.swapchain,
                    record.image_available[record.current_frame],
                    record.render_finished[record.current_frame],
                ),
                None => return,
            };

        // Acquire blocks until an image is handed out; the semaphore is
        // what rendering waits on, not this call.
        let result = unsafe {
            self.device
                .acquire_next_image_khr(native, u64::MAX, image_available, vk::Fence::null())
        };
        let image_index = match result {
            Ok((image_index, _)) => image_index,
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => {
                if let Err(error) = unsafe { self.recreate_swapchain(handle) } {
                    error!("Failed to recreate swapchain: {}", error);
                }
                return;
            }
            Err(error) => {
                error!("Failed to acquire swapchain image: {}", error);
                return;
            }
        };

        if let Some(record) = self.resources.swapchains.get_mut(handle.0) {
            record.current_image = image_index;
        }

        // The client must have submitted work signaling this frame's
        // render-finished semaphore before calling present.
        let wait_semaphores = &[render_finished];
        let swapchains = &[native];
        let image_indices = &[image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = unsafe { self.device.queue_present_khr(self.present_queue, &info) };
        let changed = result == Ok(vk::SuccessCode::SUBOPTIMAL_KHR)
            || result == Err(vk::ErrorCode::OUT_OF_DATE_KHR);
        if changed {
            if let Err(error) = unsafe { self.recreate_swapchain(handle) } {
                error!("Failed to recreate swapchain: {}", error);
            }
        } else if let Err(error) = result {
            error!("Failed to present swapchain image: {}", error);
        }

        if let Some(record) = self.resources.swapchains.get_mut(handle.0) {
            record.current_frame = (record.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        }
    }

    fn set_object_name(&mut self, object: ObjectHandle, name: &str) {
        // Best-effort: silently inert without debug utils.
        if !self.debug_utils_enabled() {
            return;
        }
        let Some((object_type, object_handle)) = self.object_type_and_handle(object) else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };

        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(object_type)
            .object_handle(object_handle)
            .object_name(name.to_bytes_with_nul());
        if let Err(error) = unsafe { self.instance.set_debug_utils_object_name_ext(self.device.handle(), &info) } {
            debug!("set_object_name rejected by driver: {}", error);
        }
    }

    fn cmd_begin_debug_label(&mut self, cmd: CommandBufferHandle, label: &str) {
        if !self.debug_utils_enabled() {
            return;
        }
        let Some(command_buffer) = self.native_command_buffer(cmd) else {
            return;
        };
        let Ok(label) = CString::new(label) else {
            return;
        };

        let info = vk::DebugUtilsLabelEXT::builder()
            .label_name(label.to_bytes_with_nul())
            .color([0.0, 0.0, 0.0, 0.0]);
        unsafe {
            self.instance
                .cmd_begin_debug_utils_label_ext(command_buffer, &info)
        };
    }

    fn cmd_end_debug_label(&mut self, cmd: CommandBufferHandle) {
        if !self.debug_utils_enabled() {
            return;
        }
        if let Some(command_buffer) = self.native_command_buffer(cmd) {
            unsafe { self.instance.cmd_end_debug_utils_label_ext(command_buffer) };
        }
    }

    fn terminate(&mut self) {
        // Nothing may still be executing when teardown starts.
        self.wait_idle();

        unsafe {
            for record in self.resources.command_buffers.drain_all() {
                commands::destroy_command_buffer(&self.device, record);
            }
            for record in self.resources.framebuffers.drain_all() {
                self.device.destroy_framebuffer(record.framebuffer, None);
            }
            for record in self.resources.render_passes.drain_all() {
                self.device.destroy_render_pass(record.render_pass, None);
            }
            for record in self.resources.pipelines.drain_all() {
                self.device.destroy_pipeline(record.pipeline, None);
            }
            for record in self.resources.pipeline_layouts.drain_all() {
                self.device.destroy_pipeline_layout(record.layout, None);
            }
            for set in self.resources.bind_groups.drain_all() {
                let _ = self
                    .device
                    .free_descriptor_sets(self.descriptor_pool, &[set]);
            }
            for record in self.resources.bind_group_layouts.drain_all() {
                self.device.destroy_descriptor_set_layout(record.layout, None);
            }
            for record in self.resources.shaders.drain_all() {
                self.device.destroy_shader_module(record.module, None);
            }
            for sampler in self.resources.samplers.drain_all() {
                self.device.destroy_sampler(sampler, None);
            }
            for view in self.resources.texture_views.drain_all() {
                self.device.destroy_image_view(view.view, None);
            }
            for record in self.resources.swapchains.drain_all() {
                self.device.destroy_swapchain_khr(record.swapchain, None);
                for semaphore in record
                    .image_available
                    .into_iter()
                    .chain(record.render_finished)
                {
                    self.device.destroy_semaphore(semaphore, None);
                }
                self.instance.destroy_surface_khr(record.surface, None);
            }
            for record in self.resources.textures.drain_all() {
                texture::destroy_texture(&self.device, &mut self.allocator, record);
            }
            for record in self.resources.buffers.drain_all() {
                buffer::destroy_buffer(&self.device, &mut self.allocator, record);
            }

            // Staging buffers of the upload ring; their copies retired
            // with the wait_idle above.
            for slot in &mut self.upload_slots {
                slot.in_flight = false;
                if let Some(staging) = slot.staging.take() {
                    buffer::destroy_buffer(&self.device, &mut self.allocator, staging);
                }
            }

            if self.allocator.outstanding() != 0 {
                warn!(
                    "{} device-memory allocations leaked past terminate",
                    self.allocator.outstanding()
                );
            }

            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            for fence in self.frame_fences.drain(..) {
                self.device.destroy_fence(fence, None);
            }
            self.device
                .free_command_buffers(self.frame_command_pool, &self.frame_command_buffers);
            self.device.destroy_command_pool(self.frame_command_pool, None);

            self.device.destroy_device(None);
            if let Some(messenger) = self.messenger.take() {
                self.instance.destroy_debug_utils_messenger_ext(messenger, None);
            }
            self.instance.destroy_surface_khr(self.probe_surface, None);
            self.instance.destroy_instance(None);
        }

        debug!("Vulkan device terminated.");
    }
}
