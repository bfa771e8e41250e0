//! Pipeline layouts and graphics/compute pipeline assembly.
//!
//! Graphics pipelines are built for dynamic rendering: the output surface
//! is declared through a `PipelineRenderingCreateInfo` carrying the color
//! and depth formats, never through a render-pass handle. Viewport and
//! scissor are dynamic state, so pipelines survive swapchain resizes.

use anyhow::{anyhow, Result};
use vulkanalia::prelude::v1_0::*;

use super::convert::{
    blend_factor_to_vk, blend_op_to_vk, compare_to_vk, cull_mode_to_vk, format_to_vk,
    front_face_to_vk, topology_to_vk, vertex_format_to_vk,
};
use super::shader::Shader;
use crate::handle::PipelineLayoutHandle;
use crate::types::{Format, GraphicsPipelineDesc, VertexBufferLayout};
use crate::PUSH_CONSTANT_SIZE;

/// Backend record behind a `PipelineLayoutHandle`.
pub(crate) struct PipelineLayout {
    pub layout: vk::PipelineLayout,
    pub push_constant_size: u32,
}

/// Backend record behind a `PipelineHandle`. The layout is kept both ways:
/// the handle for clients, the native object for bind-time lookups.
pub(crate) struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: PipelineLayoutHandle,
    pub vk_layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
}

/// Builds a pipeline layout over the given set layouts with the fixed
/// 128-byte push-constant range shared by all stages.
pub(crate) unsafe fn create_pipeline_layout(
    device: &Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<PipelineLayout> {
    let push_constant_range = vk::PushConstantRange::builder()
        .stage_flags(vk::ShaderStageFlags::ALL)
        .offset(0)
        .size(PUSH_CONSTANT_SIZE);

    let push_constant_ranges = &[push_constant_range];
    let info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);

    let layout = device.create_pipeline_layout(&info, None)?;
    Ok(PipelineLayout {
        layout,
        push_constant_size: PUSH_CONSTANT_SIZE,
    })
}

fn vertex_input_descriptions(
    layouts: &[VertexBufferLayout],
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let mut bindings = Vec::with_capacity(layouts.len());
    let mut attributes = Vec::new();

    for (binding, layout) in layouts.iter().enumerate() {
        bindings.push(
            vk::VertexInputBindingDescription::builder()
                .binding(binding as u32)
                .stride(layout.stride)
                .input_rate(vk::VertexInputRate::VERTEX)
                .build(),
        );
        for attribute in &layout.attributes {
            attributes.push(
                vk::VertexInputAttributeDescription::builder()
                    .binding(binding as u32)
                    .location(attribute.location)
                    .format(vertex_format_to_vk(attribute.format))
                    .offset(attribute.offset)
                    .build(),
            );
        }
    }

    (bindings, attributes)
}

pub(crate) unsafe fn create_graphics_pipeline(
    device: &Device,
    desc: &GraphicsPipelineDesc,
    vertex: &Shader,
    fragment: Option<&Shader>,
    layout: &PipelineLayout,
) -> Result<vk::Pipeline> {
    let mut stages = vec![vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vertex.module)
        .name(vertex.entry_point.to_bytes_with_nul())
        .build()];

    // Fragment stage is optional for depth-only pipelines.
    if let Some(fragment) = fragment {
        stages.push(
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment.module)
                .name(fragment.entry_point.to_bytes_with_nul())
                .build(),
        );
    }

    let (binding_descriptions, attribute_descriptions) =
        vertex_input_descriptions(&desc.vertex_buffers);
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(topology_to_vk(desc.topology))
        .primitive_restart_enable(false);

    // Viewport and scissor are set at record time; only the counts are
    // fixed here.
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(if desc.rasterizer.wireframe {
            vk::PolygonMode::LINE
        } else {
            vk::PolygonMode::FILL
        })
        .line_width(1.0)
        .cull_mode(cull_mode_to_vk(desc.rasterizer.cull_mode))
        .front_face(front_face_to_vk(desc.rasterizer.front_face))
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::_1);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(desc.depth_stencil.depth_test)
        .depth_write_enable(desc.depth_stencil.depth_write)
        .depth_compare_op(compare_to_vk(desc.depth_stencil.compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::all())
        .blend_enable(desc.blend.enable)
        .src_color_blend_factor(blend_factor_to_vk(desc.blend.src_color))
        .dst_color_blend_factor(blend_factor_to_vk(desc.blend.dst_color))
        .color_blend_op(blend_op_to_vk(desc.blend.color_op))
        .src_alpha_blend_factor(blend_factor_to_vk(desc.blend.src_alpha))
        .dst_alpha_blend_factor(blend_factor_to_vk(desc.blend.dst_alpha))
        .alpha_blend_op(blend_op_to_vk(desc.blend.alpha_op))
        .build();

    // Blend attachment count has to match the rendering-info color count,
    // so depth-only pipelines get none.
    let attachments = if desc.color_format != Format::Undefined {
        vec![attachment]
    } else {
        Vec::new()
    };
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&attachments)
        .blend_constants([0.0, 0.0, 0.0, 0.0]);

    // Dynamic rendering: declare the attachment formats directly instead
    // of referencing a render pass.
    let color_formats = if desc.color_format != Format::Undefined {
        vec![format_to_vk(desc.color_format)]
    } else {
        Vec::new()
    };
    let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(format_to_vk(desc.depth_format));

    let info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout.layout)
        .render_pass(vk::RenderPass::null())
        .subpass(0)
        .push_next(&mut rendering_info);

    let pipeline = device
        .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)?
        .0[0];

    Ok(pipeline)
}

pub(crate) unsafe fn create_compute_pipeline(
    device: &Device,
    shader: &Shader,
    layout: &PipelineLayout,
) -> Result<vk::Pipeline> {
    if !shader.stage.contains(crate::types::ShaderStage::COMPUTE) {
        return Err(anyhow!("compute pipeline requires a compute-stage shader"));
    }

    let stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader.module)
        .name(shader.entry_point.to_bytes_with_nul())
        .build();

    let info = vk::ComputePipelineCreateInfo::builder()
        .stage(stage)
        .layout(layout.layout);

    let pipeline = device
        .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)?
        .0[0];

    Ok(pipeline)
}
