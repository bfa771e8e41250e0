//! The render-device interface and the facade that owns it.
//!
//! [`RenderDevice`] is the uniform command surface every backend implements;
//! it is the trait rendition of a flat function-pointer vtable. [`Graphics`]
//! owns exactly one backend for its whole lifetime and forwards every public
//! call to it, so client code never names a backend type.

use std::ptr::NonNull;

use log::*;
use winit::window::Window;

use crate::error::GraphicsError;
use crate::handle::*;
use crate::types::*;
use crate::vulkan::VulkanDevice;
use crate::webgpu::WebGpuDevice;

/// The graphics APIs a device can be built on. `Metal` and `D3d12` are
/// reserved and currently report "not supported yet".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// Resolve to the platform-preferred backend.
    #[default]
    Auto,
    Vulkan,
    Metal,
    D3d12,
    WebGpu,
}

impl Backend {
    /// The backend the current platform prefers when the caller does not
    /// care. WebGPU on the web, Vulkan everywhere else.
    pub fn platform_default() -> Self {
        if cfg!(target_arch = "wasm32") {
            Backend::WebGpu
        } else {
            Backend::Vulkan
        }
    }
}

/// A resource reference for debug naming.
#[derive(Copy, Clone, Debug)]
pub enum ObjectHandle {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    TextureView(TextureViewHandle),
    Sampler(SamplerHandle),
    Shader(ShaderHandle),
    BindGroupLayout(BindGroupLayoutHandle),
    PipelineLayout(PipelineLayoutHandle),
    Pipeline(PipelineHandle),
    BindGroup(BindGroupHandle),
    RenderPass(RenderPassHandle),
    Framebuffer(FramebufferHandle),
    CommandBuffer(CommandBufferHandle),
    Swapchain(SwapchainHandle),
}

/// The uniform per-backend command surface.
///
/// Creation functions return a null handle on failure after logging the
/// cause; destroy functions are total and accept null as a no-op. All calls
/// must happen on the thread that created the device.
pub trait RenderDevice {
    fn limits(&self) -> DeviceLimits;
    fn features(&self) -> DeviceFeatures;
    /// Blocks until the GPU has drained all submitted work.
    fn wait_idle(&self);

    // Buffer
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferHandle;
    fn destroy_buffer(&mut self, handle: BufferHandle);
    fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]);
    fn map_buffer(&mut self, handle: BufferHandle, offset: u64, size: u64) -> Option<NonNull<u8>>;
    fn unmap_buffer(&mut self, handle: BufferHandle);

    // Texture
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle;
    fn destroy_texture(&mut self, handle: TextureHandle);
    fn create_texture_view(&mut self, desc: &TextureViewDesc) -> TextureViewHandle;
    fn destroy_texture_view(&mut self, handle: TextureViewHandle);

    // Sampler
    fn create_sampler(&mut self, desc: &SamplerDesc) -> SamplerHandle;
    fn destroy_sampler(&mut self, handle: SamplerHandle);

    // Shader
    fn create_shader(&mut self, desc: &ShaderDesc) -> ShaderHandle;
    fn destroy_shader(&mut self, handle: ShaderHandle);

    // Layouts and bind groups
    fn create_bind_group_layout(&mut self, desc: &BindGroupLayoutDesc) -> BindGroupLayoutHandle;
    fn destroy_bind_group_layout(&mut self, handle: BindGroupLayoutHandle);
    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> PipelineLayoutHandle;
    fn destroy_pipeline_layout(&mut self, handle: PipelineLayoutHandle);
    fn create_bind_group(&mut self, desc: &BindGroupDesc) -> BindGroupHandle;
    fn destroy_bind_group(&mut self, handle: BindGroupHandle);

    // Pipelines
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> PipelineHandle;
    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> PipelineHandle;
    fn destroy_pipeline(&mut self, handle: PipelineHandle);

    // Render pass & framebuffer (legacy path)
    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RenderPassHandle;
    fn destroy_render_pass(&mut self, handle: RenderPassHandle);
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferHandle;
    fn destroy_framebuffer(&mut self, handle: FramebufferHandle);

    // Command buffers
    fn create_command_buffer(&mut self) -> CommandBufferHandle;
    fn destroy_command_buffer(&mut self, handle: CommandBufferHandle);
    fn begin_command_buffer(&mut self, handle: CommandBufferHandle);
    fn end_command_buffer(&mut self, handle: CommandBufferHandle);
    /// Non-blocking; signals the command buffer's completion fence.
    fn submit_command_buffer(&mut self, handle: CommandBufferHandle);
    /// Blocks until the command buffer's last submission has retired.
    /// Returns immediately when nothing was submitted.
    fn wait_command_buffer(&mut self, handle: CommandBufferHandle);
    /// Whether the command buffer's last submission has retired. True when
    /// nothing was ever submitted or the handle is null.
    fn command_buffer_is_complete(&self, handle: CommandBufferHandle) -> bool;

    // Recording: render pass
    fn cmd_begin_render_pass(&mut self, cmd: CommandBufferHandle, desc: &RenderPassBeginDesc);
    fn cmd_end_render_pass(&mut self, cmd: CommandBufferHandle);

    // Recording: state
    fn cmd_set_pipeline(&mut self, cmd: CommandBufferHandle, pipeline: PipelineHandle);
    fn cmd_set_bind_group(&mut self, cmd: CommandBufferHandle, index: u32, group: BindGroupHandle);
    fn cmd_set_vertex_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    );
    fn cmd_set_index_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    );
    fn cmd_push_constants(&mut self, cmd: CommandBufferHandle, offset: u32, data: &[u8]);
    fn cmd_set_viewport(
        &mut self,
        cmd: CommandBufferHandle,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    );
    fn cmd_set_scissor(&mut self, cmd: CommandBufferHandle, x: u32, y: u32, width: u32, height: u32);
    fn cmd_set_blend_constant(&mut self, cmd: CommandBufferHandle, color: [f32; 4]);
    fn cmd_set_stencil_reference(&mut self, cmd: CommandBufferHandle, reference: u32);

    // Recording: draw
    fn cmd_draw(
        &mut self,
        cmd: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_draw_indexed(
        &mut self,
        cmd: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_draw_indirect(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );
    fn cmd_draw_indexed_indirect(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );

    // Recording: compute
    fn cmd_dispatch(&mut self, cmd: CommandBufferHandle, x: u32, y: u32, z: u32);
    fn cmd_dispatch_indirect(&mut self, cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64);

    // Recording: copies
    fn cmd_copy_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    );
    fn cmd_copy_texture(&mut self, cmd: CommandBufferHandle, src: TextureHandle, dst: TextureHandle);
    fn cmd_copy_buffer_to_texture(
        &mut self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: TextureHandle,
        mip_level: u32,
        array_layer: u32,
    );
    fn cmd_copy_texture_to_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        src: TextureHandle,
        mip_level: u32,
        array_layer: u32,
        dst: BufferHandle,
        dst_offset: u64,
    );

    // Swapchain
    fn create_swapchain(&mut self, window: &Window, desc: &SwapchainDesc) -> SwapchainHandle;
    fn destroy_swapchain(&mut self, handle: SwapchainHandle);
    fn resize_swapchain(&mut self, handle: SwapchainHandle, width: u32, height: u32);
    fn swapchain_texture_count(&self, handle: SwapchainHandle) -> u32;
    fn swapchain_texture(&self, handle: SwapchainHandle, index: u32) -> TextureHandle;
    /// Acquire-then-present. The client is responsible for submitting the
    /// rendering work that signals the frame's render-finished semaphore
    /// before calling this.
    fn present_swapchain(&mut self, handle: SwapchainHandle);

    // Debug
    fn set_object_name(&mut self, object: ObjectHandle, name: &str);
    fn cmd_begin_debug_label(&mut self, cmd: CommandBufferHandle, label: &str);
    fn cmd_end_debug_label(&mut self, cmd: CommandBufferHandle);

    /// Tears down every surviving resource and the device singletons.
    /// Called exactly once, by `Graphics::drop`.
    fn terminate(&mut self);
}

/// The device facade. Owns the active backend for its whole lifetime and
/// serializes all access to it through `&mut self`; dropping it tears the
/// device down.
pub struct Graphics {
    device: Box<dyn RenderDevice>,
    backend: Backend,
}

impl Graphics {
    /// Builds a device on the requested backend. `window` supplies the
    /// platform pieces instance construction needs (required surface
    /// extensions, and a throwaway surface for presentation-support
    /// queries during adapter selection).
    pub fn new(window: &Window, backend: Backend) -> Result<Self, GraphicsError> {
        let requested = resolve_backend(backend)?;

        let device: Box<dyn RenderDevice> = match requested {
            Backend::Vulkan => Box::new(
                unsafe { VulkanDevice::create(window) }.map_err(|e| {
                    error!("Vulkan device creation failed: {}", e);
                    GraphicsError::Init(e)
                })?,
            ),
            Backend::WebGpu => Box::new(WebGpuDevice::new()),
            Backend::Metal | Backend::D3d12 => {
                error!("{:?} backend not supported yet", requested);
                return Err(GraphicsError::BackendUnavailable("not supported yet"));
            }
            Backend::Auto => unreachable!(),
        };

        info!("Graphics device initialized ({:?} backend).", requested);
        Ok(Self {
            device,
            backend: requested,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn limits(&self) -> DeviceLimits {
        self.device.limits()
    }

    pub fn features(&self) -> DeviceFeatures {
        self.device.features()
    }

    pub fn wait_idle(&self) {
        self.device.wait_idle();
    }

    pub fn create_buffer(&mut self, desc: &BufferDesc) -> BufferHandle {
        self.device.create_buffer(desc)
    }

    pub fn destroy_buffer(&mut self, handle: BufferHandle) {
        self.device.destroy_buffer(handle);
    }

    pub fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) {
        self.device.write_buffer(handle, offset, data);
    }

    pub fn map_buffer(&mut self, handle: BufferHandle, offset: u64, size: u64) -> Option<NonNull<u8>> {
        self.device.map_buffer(handle, offset, size)
    }

    pub fn unmap_buffer(&mut self, handle: BufferHandle) {
        self.device.unmap_buffer(handle);
    }

    pub fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle {
        self.device.create_texture(desc)
    }

    pub fn destroy_texture(&mut self, handle: TextureHandle) {
        self.device.destroy_texture(handle);
    }

    pub fn create_texture_view(&mut self, desc: &TextureViewDesc) -> TextureViewHandle {
        self.device.create_texture_view(desc)
    }

    pub fn destroy_texture_view(&mut self, handle: TextureViewHandle) {
        self.device.destroy_texture_view(handle);
    }

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> SamplerHandle {
        self.device.create_sampler(desc)
    }

    pub fn destroy_sampler(&mut self, handle: SamplerHandle) {
        self.device.destroy_sampler(handle);
    }

    pub fn create_shader(&mut self, desc: &ShaderDesc) -> ShaderHandle {
        self.device.create_shader(desc)
    }

    pub fn destroy_shader(&mut self, handle: ShaderHandle) {
        self.device.destroy_shader(handle);
    }

    pub fn create_bind_group_layout(&mut self, desc: &BindGroupLayoutDesc) -> BindGroupLayoutHandle {
        self.device.create_bind_group_layout(desc)
    }

    pub fn destroy_bind_group_layout(&mut self, handle: BindGroupLayoutHandle) {
        self.device.destroy_bind_group_layout(handle);
    }

    pub fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> PipelineLayoutHandle {
        self.device.create_pipeline_layout(desc)
    }

    pub fn destroy_pipeline_layout(&mut self, handle: PipelineLayoutHandle) {
        self.device.destroy_pipeline_layout(handle);
    }

    pub fn create_bind_group(&mut self, desc: &BindGroupDesc) -> BindGroupHandle {
        self.device.create_bind_group(desc)
    }

    pub fn destroy_bind_group(&mut self, handle: BindGroupHandle) {
        self.device.destroy_bind_group(handle);
    }

    pub fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> PipelineHandle {
        self.device.create_graphics_pipeline(desc)
    }

    pub fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> PipelineHandle {
        self.device.create_compute_pipeline(desc)
    }

    pub fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        self.device.destroy_pipeline(handle);
    }

    pub fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RenderPassHandle {
        self.device.create_render_pass(desc)
    }

    pub fn destroy_render_pass(&mut self, handle: RenderPassHandle) {
        self.device.destroy_render_pass(handle);
    }

    pub fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferHandle {
        self.device.create_framebuffer(desc)
    }

    pub fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        self.device.destroy_framebuffer(handle);
    }

    pub fn create_command_buffer(&mut self) -> CommandBufferHandle {
        self.device.create_command_buffer()
    }

    pub fn destroy_command_buffer(&mut self, handle: CommandBufferHandle) {
        self.device.destroy_command_buffer(handle);
    }

    pub fn begin_command_buffer(&mut self, handle: CommandBufferHandle) {
        self.device.begin_command_buffer(handle);
    }

    pub fn end_command_buffer(&mut self, handle: CommandBufferHandle) {
        self.device.end_command_buffer(handle);
    }

    pub fn submit_command_buffer(&mut self, handle: CommandBufferHandle) {
        self.device.submit_command_buffer(handle);
    }

    pub fn wait_command_buffer(&mut self, handle: CommandBufferHandle) {
        self.device.wait_command_buffer(handle);
    }

    pub fn command_buffer_is_complete(&self, handle: CommandBufferHandle) -> bool {
        self.device.command_buffer_is_complete(handle)
    }

    pub fn cmd_begin_render_pass(&mut self, cmd: CommandBufferHandle, desc: &RenderPassBeginDesc) {
        self.device.cmd_begin_render_pass(cmd, desc);
    }

    pub fn cmd_end_render_pass(&mut self, cmd: CommandBufferHandle) {
        self.device.cmd_end_render_pass(cmd);
    }

    pub fn cmd_set_pipeline(&mut self, cmd: CommandBufferHandle, pipeline: PipelineHandle) {
        self.device.cmd_set_pipeline(cmd, pipeline);
    }

    pub fn cmd_set_bind_group(&mut self, cmd: CommandBufferHandle, index: u32, group: BindGroupHandle) {
        self.device.cmd_set_bind_group(cmd, index, group);
    }

    pub fn cmd_set_vertex_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    ) {
        self.device.cmd_set_vertex_buffer(cmd, slot, buffer, offset);
    }

    pub fn cmd_set_index_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    ) {
        self.device.cmd_set_index_buffer(cmd, buffer, offset, format);
    }

    pub fn cmd_push_constants(&mut self, cmd: CommandBufferHandle, offset: u32, data: &[u8]) {
        self.device.cmd_push_constants(cmd, offset, data);
    }

    pub fn cmd_set_viewport(
        &mut self,
        cmd: CommandBufferHandle,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) {
        self.device
            .cmd_set_viewport(cmd, x, y, width, height, min_depth, max_depth);
    }

    pub fn cmd_set_scissor(&mut self, cmd: CommandBufferHandle, x: u32, y: u32, width: u32, height: u32) {
        self.device.cmd_set_scissor(cmd, x, y, width, height);
    }

    pub fn cmd_set_blend_constant(&mut self, cmd: CommandBufferHandle, color: [f32; 4]) {
        self.device.cmd_set_blend_constant(cmd, color);
    }

    pub fn cmd_set_stencil_reference(&mut self, cmd: CommandBufferHandle, reference: u32) {
        self.device.cmd_set_stencil_reference(cmd, reference);
    }

    pub fn cmd_draw(
        &mut self,
        cmd: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.device
            .cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance);
    }

    pub fn cmd_draw_indexed(
        &mut self,
        cmd: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.device.cmd_draw_indexed(
            cmd,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        );
    }

    pub fn cmd_draw_indirect(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.device.cmd_draw_indirect(cmd, buffer, offset, draw_count, stride);
    }

    pub fn cmd_draw_indexed_indirect(
        &mut self,
        cmd: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.device
            .cmd_draw_indexed_indirect(cmd, buffer, offset, draw_count, stride);
    }

    pub fn cmd_dispatch(&mut self, cmd: CommandBufferHandle, x: u32, y: u32, z: u32) {
        self.device.cmd_dispatch(cmd, x, y, z);
    }

    pub fn cmd_dispatch_indirect(&mut self, cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64) {
        self.device.cmd_dispatch_indirect(cmd, buffer, offset);
    }

    pub fn cmd_copy_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        self.device
            .cmd_copy_buffer(cmd, src, src_offset, dst, dst_offset, size);
    }

    pub fn cmd_copy_texture(&mut self, cmd: CommandBufferHandle, src: TextureHandle, dst: TextureHandle) {
        self.device.cmd_copy_texture(cmd, src, dst);
    }

    pub fn cmd_copy_buffer_to_texture(
        &mut self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        src_offset: u64,
        dst: TextureHandle,
        mip_level: u32,
        array_layer: u32,
    ) {
        self.device
            .cmd_copy_buffer_to_texture(cmd, src, src_offset, dst, mip_level, array_layer);
    }

    pub fn cmd_copy_texture_to_buffer(
        &mut self,
        cmd: CommandBufferHandle,
        src: TextureHandle,
        mip_level: u32,
        array_layer: u32,
        dst: BufferHandle,
        dst_offset: u64,
    ) {
        self.device
            .cmd_copy_texture_to_buffer(cmd, src, mip_level, array_layer, dst, dst_offset);
    }

    pub fn create_swapchain(&mut self, window: &Window, desc: &SwapchainDesc) -> SwapchainHandle {
        self.device.create_swapchain(window, desc)
    }

    pub fn destroy_swapchain(&mut self, handle: SwapchainHandle) {
        self.device.destroy_swapchain(handle);
    }

    pub fn resize_swapchain(&mut self, handle: SwapchainHandle, width: u32, height: u32) {
        self.device.resize_swapchain(handle, width, height);
    }

    pub fn swapchain_texture_count(&self, handle: SwapchainHandle) -> u32 {
        self.device.swapchain_texture_count(handle)
    }

    pub fn swapchain_texture(&self, handle: SwapchainHandle, index: u32) -> TextureHandle {
        self.device.swapchain_texture(handle, index)
    }

    pub fn present_swapchain(&mut self, handle: SwapchainHandle) {
        self.device.present_swapchain(handle);
    }

    pub fn set_object_name(&mut self, object: ObjectHandle, name: &str) {
        self.device.set_object_name(object, name);
    }

    pub fn cmd_begin_debug_label(&mut self, cmd: CommandBufferHandle, label: &str) {
        self.device.cmd_begin_debug_label(cmd, label);
    }

    pub fn cmd_end_debug_label(&mut self, cmd: CommandBufferHandle) {
        self.device.cmd_end_debug_label(cmd);
    }
}

impl Drop for Graphics {
    fn drop(&mut self) {
        self.device.terminate();
    }
}

/// Maps a caller's backend request to what the platform can actually run.
/// Mirrors the platform contract's backend query: the web always answers
/// WebGPU, native platforms honor the request.
pub(crate) fn resolve_backend(requested: Backend) -> Result<Backend, GraphicsError> {
    match requested {
        Backend::Auto => Ok(Backend::platform_default()),
        other if cfg!(target_arch = "wasm32") && other != Backend::WebGpu => {
            Err(GraphicsError::BackendUnavailable("only WebGPU is available on the web"))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolves_to_platform_default() {
        assert_eq!(resolve_backend(Backend::Auto).unwrap(), Backend::platform_default());
    }

    #[test]
    fn explicit_backend_passes_through_on_native() {
        if !cfg!(target_arch = "wasm32") {
            assert_eq!(resolve_backend(Backend::Vulkan).unwrap(), Backend::Vulkan);
            assert_eq!(resolve_backend(Backend::WebGpu).unwrap(), Backend::WebGpu);
        }
    }
}
