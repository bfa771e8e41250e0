#![allow(
    dead_code,
    clippy::too_many_arguments,
    clippy::missing_safety_doc
)]

//! A thin hardware abstraction layer over explicit GPU APIs.
//!
//! Client code allocates, configures and issues work against GPU resources
//! (buffers, textures, samplers, shaders, pipelines, bind groups, render
//! passes, command buffers, swapchains) through a single uniform interface.
//! A pluggable [`RenderDevice`] dispatches every call to the active backend.
//! Vulkan is the primary backend; WebGPU is a vtable-shaped stub, Metal and
//! D3D12 are reserved.

mod device;
mod error;
mod handle;
mod types;
mod webgpu;
mod vulkan;

pub use device::{Backend, Graphics, ObjectHandle, RenderDevice};
pub use error::GraphicsError;
pub use handle::{
    BindGroupHandle, BindGroupLayoutHandle, BufferHandle, CommandBufferHandle, FramebufferHandle,
    PipelineHandle, PipelineLayoutHandle, RenderPassHandle, SamplerHandle, ShaderHandle,
    SwapchainHandle, TextureHandle, TextureViewHandle,
};
pub use types::*;

/// Number of frames the CPU may prepare while the GPU is still rendering.
/// Per-frame fences, command buffers and swapchain semaphore pairs are all
/// sized by this constant.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Maximum number of descriptor sets the global descriptor pool can serve.
pub const DESCRIPTOR_POOL_MAX_SETS: u32 = 5000;

/// Descriptors reserved in the global pool for every supported type.
pub const DESCRIPTOR_POOL_SIZE_PER_TYPE: u32 = 5000;

/// Size of the single push-constant range installed in every pipeline
/// layout, shared across all shader stages.
pub const PUSH_CONSTANT_SIZE: u32 = 128;

pub(crate) const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
