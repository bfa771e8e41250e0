//! Framebuffer creation for the legacy render-pass path.

use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

/// Backend record behind a `FramebufferHandle`.
pub(crate) struct Framebuffer {
    pub framebuffer: vk::Framebuffer,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// Collects the views in attachment order (color first, depth last, the
/// same order the render pass declared) and builds the framebuffer.
pub(crate) unsafe fn create_framebuffer(
    device: &Device,
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    width: u32,
    height: u32,
    layers: u32,
) -> Result<Framebuffer> {
    let layers = layers.max(1);

    let info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(attachments)
        // The framebuffer's dimensions must match the attachments'.
        .width(width)
        .height(height)
        .layers(layers);

    let framebuffer = device.create_framebuffer(&info, None)?;
    Ok(Framebuffer {
        framebuffer,
        width,
        height,
        layers,
    })
}
