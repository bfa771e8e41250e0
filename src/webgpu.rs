//! WebGPU backend stub.
//!
//! Fills every slot of the device interface so the dispatch shape is in
//! place, but no operation reaches a real GPU yet. Creates return null
//! handles after logging, recording is ignored. The real implementation
//! binds against the browser's WebGPU device on wasm targets.

use std::ptr::NonNull;

use log::*;
use winit::window::Window;

use crate::device::{ObjectHandle, RenderDevice};
use crate::handle::*;
use crate::types::*;

pub(crate) struct WebGpuDevice {
    limits: DeviceLimits,
    features: DeviceFeatures,
}

impl WebGpuDevice {
    pub fn new() -> Self {
        warn!("WebGPU backend is a stub; all operations are inert.");
        Self {
            limits: DeviceLimits::default(),
            features: DeviceFeatures::default(),
        }
    }

    fn unsupported(&self, what: &str) {
        error!("WebGPU backend: {} not implemented", what);
    }
}

impl RenderDevice for WebGpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn wait_idle(&self) {}

    fn create_buffer(&mut self, _desc: &BufferDesc) -> BufferHandle {
        self.unsupported("create_buffer");
        BufferHandle::NULL
    }

    fn destroy_buffer(&mut self, _handle: BufferHandle) {}

    fn write_buffer(&mut self, _handle: BufferHandle, _offset: u64, _data: &[u8]) {
        self.unsupported("write_buffer");
    }

    fn map_buffer(&mut self, _handle: BufferHandle, _offset: u64, _size: u64) -> Option<NonNull<u8>> {
        self.unsupported("map_buffer");
        None
    }

    fn unmap_buffer(&mut self, _handle: BufferHandle) {}

    fn create_texture(&mut self, _desc: &TextureDesc) -> TextureHandle {
        self.unsupported("create_texture");
        TextureHandle::NULL
    }

    fn destroy_texture(&mut self, _handle: TextureHandle) {}

    fn create_texture_view(&mut self, _desc: &TextureViewDesc) -> TextureViewHandle {
        self.unsupported("create_texture_view");
        TextureViewHandle::NULL
    }

    fn destroy_texture_view(&mut self, _handle: TextureViewHandle) {}

    fn create_sampler(&mut self, _desc: &SamplerDesc) -> SamplerHandle {
        self.unsupported("create_sampler");
        SamplerHandle::NULL
    }

    fn destroy_sampler(&mut self, _handle: SamplerHandle) {}

    fn create_shader(&mut self, _desc: &ShaderDesc) -> ShaderHandle {
        self.unsupported("create_shader");
        ShaderHandle::NULL
    }

    fn destroy_shader(&mut self, _handle: ShaderHandle) {}

    fn create_bind_group_layout(&mut self, _desc: &BindGroupLayoutDesc) -> BindGroupLayoutHandle {
        self.unsupported("create_bind_group_layout");
        BindGroupLayoutHandle::NULL
    }

    fn destroy_bind_group_layout(&mut self, _handle: BindGroupLayoutHandle) {}

    fn create_pipeline_layout(&mut self, _desc: &PipelineLayoutDesc) -> PipelineLayoutHandle {
        self.unsupported("create_pipeline_layout");
        PipelineLayoutHandle::NULL
    }

    fn destroy_pipeline_layout(&mut self, _handle: PipelineLayoutHandle) {}

    fn create_bind_group(&mut self, _desc: &BindGroupDesc) -> BindGroupHandle {
        self.unsupported("create_bind_group");
        BindGroupHandle::NULL
    }

    fn destroy_bind_group(&mut self, _handle: BindGroupHandle) {}

    fn create_graphics_pipeline(&mut self, _desc: &GraphicsPipelineDesc) -> PipelineHandle {
        self.unsupported("create_graphics_pipeline");
        PipelineHandle::NULL
    }

    fn create_compute_pipeline(&mut self, _desc: &ComputePipelineDesc) -> PipelineHandle {
        self.unsupported("create_compute_pipeline");
        PipelineHandle::NULL
    }

    fn destroy_pipeline(&mut self, _handle: PipelineHandle) {}

    fn create_render_pass(&mut self, _desc: &RenderPassDesc) -> RenderPassHandle {
        self.unsupported("create_render_pass");
        RenderPassHandle::NULL
    }

    fn destroy_render_pass(&mut self, _handle: RenderPassHandle) {}

    fn create_framebuffer(&mut self, _desc: &FramebufferDesc) -> FramebufferHandle {
        self.unsupported("create_framebuffer");
        FramebufferHandle::NULL
    }

    fn destroy_framebuffer(&mut self, _handle: FramebufferHandle) {}

    fn create_command_buffer(&mut self) -> CommandBufferHandle {
        self.unsupported("create_command_buffer");
        CommandBufferHandle::NULL
    }

    fn destroy_command_buffer(&mut self, _handle: CommandBufferHandle) {}

    fn begin_command_buffer(&mut self, _handle: CommandBufferHandle) {}

    fn end_command_buffer(&mut self, _handle: CommandBufferHandle) {}

    fn submit_command_buffer(&mut self, _handle: CommandBufferHandle) {}

    fn wait_command_buffer(&mut self, _handle: CommandBufferHandle) {}

    fn command_buffer_is_complete(&self, _handle: CommandBufferHandle) -> bool {
        true
    }

    fn cmd_begin_render_pass(&mut self, _cmd: CommandBufferHandle, _desc: &RenderPassBeginDesc) {}

    fn cmd_end_render_pass(&mut self, _cmd: CommandBufferHandle) {}

    fn cmd_set_pipeline(&mut self, _cmd: CommandBufferHandle, _pipeline: PipelineHandle) {}

    fn cmd_set_bind_group(&mut self, _cmd: CommandBufferHandle, _index: u32, _group: BindGroupHandle) {}

    fn cmd_set_vertex_buffer(
        &mut self,
        _cmd: CommandBufferHandle,
        _slot: u32,
        _buffer: BufferHandle,
        _offset: u64,
    ) {
    }

    fn cmd_set_index_buffer(
        &mut self,
        _cmd: CommandBufferHandle,
        _buffer: BufferHandle,
        _offset: u64,
        _format: IndexFormat,
    ) {
    }

    fn cmd_push_constants(&mut self, _cmd: CommandBufferHandle, _offset: u32, _data: &[u8]) {}

    fn cmd_set_viewport(
        &mut self,
        _cmd: CommandBufferHandle,
        _x: f32,
        _y: f32,
        _width: f32,
        _height: f32,
        _min_depth: f32,
        _max_depth: f32,
    ) {
    }

    fn cmd_set_scissor(&mut self, _cmd: CommandBufferHandle, _x: u32, _y: u32, _width: u32, _height: u32) {}

    fn cmd_set_blend_constant(&mut self, _cmd: CommandBufferHandle, _color: [f32; 4]) {}

    fn cmd_set_stencil_reference(&mut self, _cmd: CommandBufferHandle, _reference: u32) {}

    fn cmd_draw(
        &mut self,
        _cmd: CommandBufferHandle,
        _vertex_count: u32,
        _instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
    }

    fn cmd_draw_indexed(
        &mut self,
        _cmd: CommandBufferHandle,
        _index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
    }

    fn cmd_draw_indirect(
        &mut self,
        _cmd: CommandBufferHandle,
        _buffer: BufferHandle,
        _offset: u64,
        _draw_count: u32,
        _stride: u32,
    ) {
    }

    fn cmd_draw_indexed_indirect(
        &mut self,
        _cmd: CommandBufferHandle,
        _buffer: BufferHandle,
        _offset: u64,
        _draw_count: u32,
        _stride: u32,
    ) {
    }

    fn cmd_dispatch(&mut self, _cmd: CommandBufferHandle, _x: u32, _y: u32, _z: u32) {}

    fn cmd_dispatch_indirect(&mut self, _cmd: CommandBufferHandle, _buffer: BufferHandle, _offset: u64) {}

    fn cmd_copy_buffer(
        &mut self,
        _cmd: CommandBufferHandle,
        _src: BufferHandle,
        _src_offset: u64,
        _dst: BufferHandle,
        _dst_offset: u64,
        _size: u64,
    ) {
    }

    fn cmd_copy_texture(&mut self, _cmd: CommandBufferHandle, _src: TextureHandle, _dst: TextureHandle) {}

    fn cmd_copy_buffer_to_texture(
        &mut self,
        _cmd: CommandBufferHandle,
        _src: BufferHandle,
        _src_offset: u64,
        _dst: TextureHandle,
        _mip_level: u32,
        _array_layer: u32,
    ) {
    }

    fn cmd_copy_texture_to_buffer(
        &mut self,
        _cmd: CommandBufferHandle,
        _src: TextureHandle,
        _mip_level: u32,
        _array_layer: u32,
        _dst: BufferHandle,
        _dst_offset: u64,
    ) {
    }

    fn create_swapchain(&mut self, _window: &Window, _desc: &SwapchainDesc) -> SwapchainHandle {
        self.unsupported("create_swapchain");
        SwapchainHandle::NULL
    }

    fn destroy_swapchain(&mut self, _handle: SwapchainHandle) {}

    fn resize_swapchain(&mut self, _handle: SwapchainHandle, _width: u32, _height: u32) {}

    fn swapchain_texture_count(&self, _handle: SwapchainHandle) -> u32 {
        0
    }

    fn swapchain_texture(&self, _handle: SwapchainHandle, _index: u32) -> TextureHandle {
        TextureHandle::NULL
    }

    fn present_swapchain(&mut self, _handle: SwapchainHandle) {}

    fn set_object_name(&mut self, _object: ObjectHandle, _name: &str) {}

    fn cmd_begin_debug_label(&mut self, _cmd: CommandBufferHandle, _label: &str) {}

    fn cmd_end_debug_label(&mut self, _cmd: CommandBufferHandle) {}

    fn terminate(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_report_null_handles() {
        let mut device = WebGpuDevice::new();
        assert!(device.create_buffer(&BufferDesc::default()).is_null());
        assert!(device.create_texture(&TextureDesc::default()).is_null());
        assert!(device.create_command_buffer().is_null());
    }

    #[test]
    fn destroy_of_null_is_a_no_op() {
        let mut device = WebGpuDevice::new();
        device.destroy_buffer(BufferHandle::NULL);
        device.destroy_texture(TextureHandle::NULL);
        device.destroy_swapchain(SwapchainHandle::NULL);
        assert_eq!(device.swapchain_texture_count(SwapchainHandle::NULL), 0);
    }
}
