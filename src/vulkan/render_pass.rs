//! Legacy render-pass construction, used together with framebuffers.
//!
//! Pipelines themselves are built with dynamic rendering; this path exists
//! for clients recording through `cmd_begin_render_pass`.

use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use super::convert::{format_to_vk, load_op_to_vk, sample_count_to_vk, store_op_to_vk};
use crate::types::RenderPassDesc;

/// Backend record behind a `RenderPassHandle`.
pub(crate) struct RenderPass {
    pub render_pass: vk::RenderPass,
    pub color_count: u32,
    pub has_depth: bool,
}

/// Builds a single-subpass render pass: color attachments first, depth
/// last when present, and one external dependency covering color output
/// and early-fragment tests.
pub(crate) unsafe fn create_render_pass(
    device: &Device,
    desc: &RenderPassDesc,
) -> Result<RenderPass> {
    let mut attachments = Vec::new();
    let mut color_refs = Vec::new();

    for attachment in &desc.color_attachments {
        color_refs.push(
            vk::AttachmentReference::builder()
                .attachment(attachments.len() as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(format_to_vk(attachment.format))
                .samples(sample_count_to_vk(attachment.sample_count))
                .load_op(load_op_to_vk(attachment.load_op))
                .store_op(store_op_to_vk(attachment.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                // Color stays in attachment layout on both sides; the
                // client owns any transition to present or sampling.
                .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );
    }

    let depth_ref;
    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);

    if let Some(depth) = &desc.depth_attachment {
        depth_ref = vk::AttachmentReference::builder()
            .attachment(attachments.len() as u32)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(format_to_vk(depth.format))
                .samples(sample_count_to_vk(depth.sample_count))
                .load_op(load_op_to_vk(depth.load_op))
                .store_op(store_op_to_vk(depth.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        );
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }

    // One dependency from outside the pass into the single subpass,
    // covering both color writes and the depth tests that touch the
    // attachments first.
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let subpasses = &[subpass];
    let dependencies = &[dependency];
    let info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    let render_pass = device.create_render_pass(&info, None)?;

    Ok(RenderPass {
        render_pass,
        color_count: desc.color_attachments.len() as u32,
        has_depth: desc.depth_attachment.is_some(),
    })
}
