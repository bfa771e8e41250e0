//! Backend-agnostic enums, usage masks and descriptor structs.
//!
//! These are the inputs to every `create_*` operation. They deliberately
//! mirror the common subset of Vulkan and WebGPU so each backend can
//! translate them with a flat match.

use bitflags::bitflags;

use crate::handle::{
    BindGroupLayoutHandle, BufferHandle, FramebufferHandle, PipelineLayoutHandle,
    RenderPassHandle, SamplerHandle, ShaderHandle, TextureHandle, TextureViewHandle,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Undefined,
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    R32Uint,
    R32Sint,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl Format {
    /// True for formats with a depth aspect (pure depth or combined).
    pub fn has_depth(self) -> bool {
        matches!(
            self,
            Format::D16Unorm | Format::D32Float | Format::D24UnormS8Uint | Format::D32FloatS8Uint
        )
    }

    /// True for formats with a stencil aspect.
    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32FloatS8Uint)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
}

bitflags! {
    #[derive(Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct ShaderStage: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

/// Where a resource's memory lives and which side writes it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MemoryUsage {
    /// Device-local, never mapped. Uploads go through copy commands.
    #[default]
    GpuOnly,
    /// Host-visible upload memory, written by the CPU every frame.
    CpuToGpu,
    /// Readback memory, written by the GPU and mapped by the CPU.
    GpuToCpu,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer,
    SampledTexture,
    StorageTexture,
    Sampler,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PresentMode {
    /// Queued presentation, always available. What vsync maps to.
    #[default]
    Fifo,
    /// Latest-wins triple buffering.
    Mailbox,
    /// No queueing, may tear.
    Immediate,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum VertexFormat {
    Float32,
    #[default]
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Sint32,
    Unorm8x4,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TextureAspect {
    /// Derive from the format: depth and/or stencil for depth formats,
    /// color otherwise.
    #[default]
    All,
    Color,
    Depth,
    Stencil,
}

// ---------------------------------------------------------------------------
// Descriptor structs
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default)]
pub struct BufferDesc {
    /// Must be greater than zero.
    pub size: u64,
    /// Must be a non-empty mask.
    pub usage: BufferUsage,
    pub memory: MemoryUsage,
}

#[derive(Copy, Clone, Debug)]
pub struct TextureDesc {
    pub dimension: TextureDimension,
    pub format: Format,
    pub width: u32,
    /// Defaults to 1 when zero (1D textures).
    pub height: u32,
    /// Defaults to 1 when zero (1D/2D textures).
    pub depth: u32,
    /// Defaults to 1 when zero.
    pub mip_levels: u32,
    /// Defaults to 1 when zero. Six or more layers on a 2D texture mark the
    /// image cube-compatible.
    pub array_layers: u32,
    /// Defaults to 1 when zero.
    pub sample_count: u32,
    /// Must be a non-empty mask.
    pub usage: TextureUsage,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            dimension: TextureDimension::D2,
            format: Format::Rgba8Unorm,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            usage: TextureUsage::SAMPLED,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TextureViewDesc {
    pub texture: TextureHandle,
    /// `Undefined` inherits the texture's format.
    pub format: Format,
    pub aspect: TextureAspect,
    pub base_mip_level: u32,
    /// Zero means "all remaining levels".
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    /// Zero means "all remaining layers".
    pub array_layer_count: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub lod_min: f32,
    pub lod_max: f32,
    /// Anisotropic filtering kicks in above 1.0.
    pub max_anisotropy: f32,
    /// Anything but `Always` enables compare mode (shadow samplers).
    pub compare: CompareFunction,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            lod_min: 0.0,
            lod_max: 1000.0,
            max_anisotropy: 1.0,
            compare: CompareFunction::Always,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ShaderDesc<'a> {
    /// SPIR-V bytecode, consumed as-is.
    pub code: &'a [u8],
    pub stage: ShaderStage,
    /// Defaults to "main" when empty.
    pub entry_point: &'a str,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Clone, Debug, Default)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Copy, Clone, Debug)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub wireframe: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            wireframe: false,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare: CompareFunction::Less,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct BlendState {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enable: false,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        }
    }
}

/// Graphics pipelines are built for dynamic rendering: the color and depth
/// formats below define the output surface, no render-pass handle is
/// involved. Viewport and scissor are dynamic state.
#[derive(Clone, Debug, Default)]
pub struct GraphicsPipelineDesc {
    /// Required.
    pub vertex_shader: ShaderHandle,
    /// Optional; leave null for depth-only pipelines.
    pub fragment_shader: ShaderHandle,
    /// Required.
    pub layout: PipelineLayoutHandle,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    /// `Undefined` means no color attachment (depth-only).
    pub color_format: Format,
    /// `Undefined` means no depth attachment.
    pub depth_format: Format,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ComputePipelineDesc {
    pub shader: ShaderHandle,
    pub layout: PipelineLayoutHandle,
}

#[derive(Copy, Clone, Debug)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStage,
    pub ty: BindingType,
}

#[derive(Clone, Debug, Default)]
pub struct BindGroupLayoutDesc {
    pub entries: Vec<BindGroupLayoutEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineLayoutDesc {
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
}

/// At most one of the three resource handles may be non-null; the non-null
/// one selects the descriptor type at write time.
#[derive(Copy, Clone, Debug, Default)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub buffer: BufferHandle,
    pub texture_view: TextureViewHandle,
    pub sampler: SamplerHandle,
}

#[derive(Clone, Debug, Default)]
pub struct BindGroupDesc {
    pub layout: BindGroupLayoutHandle,
    pub entries: Vec<BindGroupEntry>,
}

#[derive(Copy, Clone, Debug)]
pub struct RenderPassAttachment {
    pub format: Format,
    pub sample_count: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl Default for RenderPassAttachment {
    fn default() -> Self {
        Self {
            format: Format::Undefined,
            sample_count: 1,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
        }
    }
}

/// Legacy-style render pass description, used by the framebuffer path.
#[derive(Clone, Debug, Default)]
pub struct RenderPassDesc {
    pub color_attachments: Vec<RenderPassAttachment>,
    pub depth_attachment: Option<RenderPassAttachment>,
}

#[derive(Clone, Debug, Default)]
pub struct FramebufferDesc {
    pub render_pass: RenderPassHandle,
    pub color_views: Vec<TextureViewHandle>,
    /// Optional; leave null when the render pass has no depth attachment.
    pub depth_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    /// Defaults to 1 when zero.
    pub layers: u32,
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassBeginDesc {
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    /// One entry per color attachment, RGBA.
    pub clear_colors: Vec<[f32; 4]>,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct SwapchainDesc {
    /// Requested surface format; falls back to the first reported format
    /// when unavailable.
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self {
            format: Format::Bgra8Unorm,
            width: 0,
            height: 0,
            vsync: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Device capability records
// ---------------------------------------------------------------------------

/// Optional capabilities that were actually enabled on the logical device,
/// as opposed to what the adapter merely advertised.
#[derive(Copy, Clone, Debug, Default)]
pub struct DeviceFeatures {
    pub depth_stencil_resolve: bool,
    pub push_descriptor: bool,
    pub maintenance4: bool,
    pub buffer_device_address: bool,
    pub draw_indirect_count: bool,
    /// Requires both the ray-tracing-pipeline and acceleration-structure
    /// extensions.
    pub ray_tracing: bool,
    pub ray_query: bool,
    pub spirv_1_4: bool,
    pub shader_float_controls: bool,
    pub pipeline_library: bool,
    pub deferred_host_operations: bool,
    pub dedicated_allocation: bool,
    pub bindless_texture_supported: bool,
    pub bindless_buffer_supported: bool,
    pub multiview: bool,
    pub shader_draw_parameters: bool,
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    pub wide_lines: bool,
    pub fill_mode_non_solid: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DeviceLimits {
    pub max_image_dimension_2d: u32,
    pub max_push_constant_size: u32,
    pub max_bind_groups: u32,
    pub max_color_attachments: u32,
    pub min_uniform_buffer_offset_alignment: u64,
    pub max_sampler_anisotropy: f32,
}
