//! Swapchain negotiation and native-object construction.
//!
//! The negotiation rules (extent clamping, image count, format fallback,
//! present-mode preference) are pure functions over the surface report, so
//! they are testable without a device. The lifecycle itself (wrapper
//! textures, per-frame semaphores, acquire/present/recreate) is driven by
//! `vulkan::mod`, which owns the resource pools.

use anyhow::Result;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{KhrSurfaceExtension, KhrSwapchainExtension};

use crate::handle::{TextureHandle, TextureViewHandle};
use crate::types::{Format, PresentMode};
use crate::MAX_FRAMES_IN_FLIGHT;

/// What the surface reports about itself for a given adapter.
#[derive(Clone, Debug)]
pub(crate) struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        Ok(Self {
            capabilities: instance
                .get_physical_device_surface_capabilities_khr(physical_device, surface)?,
            formats: instance.get_physical_device_surface_formats_khr(physical_device, surface)?,
            present_modes: instance
                .get_physical_device_surface_present_modes_khr(physical_device, surface)?,
        })
    }
}

/// The surface's current extent when it is defined; otherwise the caller's
/// requested extent clamped into the supported range.
pub(crate) fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested_width: u32,
    requested_height: u32,
) -> vk::Extent2D {
    // u32::MAX is the sentinel for "the surface lets the swapchain decide".
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested_width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested_height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image above the minimum so acquire rarely stalls, clamped when the
/// surface bounds the count (zero max means unbounded).
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

/// The requested format when the surface offers it, else the first
/// reported format.
pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    requested: vk::Format,
) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| f.format == requested)
        .unwrap_or_else(|| formats[0])
}

/// FIFO for vsync (always available); otherwise mailbox, falling back to
/// immediate, falling back to FIFO.
pub(crate) fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    vsync: bool,
) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    for preferred in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
        if present_modes.contains(&preferred) {
            return preferred;
        }
    }
    vk::PresentModeKHR::FIFO
}

pub(crate) fn present_mode_from_vk(mode: vk::PresentModeKHR) -> PresentMode {
    match mode {
        vk::PresentModeKHR::MAILBOX => PresentMode::Mailbox,
        vk::PresentModeKHR::IMMEDIATE => PresentMode::Immediate,
        _ => PresentMode::Fifo,
    }
}

/// Backend record behind a `SwapchainHandle`. The surface and the
/// semaphore pairs survive recreation; everything else is rebuilt when the
/// swapchain goes out of date or is resized.
pub(crate) struct Swapchain {
    pub surface: vk::SurfaceKHR,
    pub swapchain: vk::SwapchainKHR,
    pub format: Format,
    pub vk_format: vk::Format,
    pub present_mode: PresentMode,
    pub extent: vk::Extent2D,
    pub requested_width: u32,
    pub requested_height: u32,
    pub vsync: bool,
    pub textures: Vec<TextureHandle>,
    pub views: Vec<TextureViewHandle>,
    pub image_available: Vec<vk::Semaphore>,
    pub render_finished: Vec<vk::Semaphore>,
    pub current_image: u32,
    pub current_frame: usize,
}

/// The native objects one (re)creation round produces.
pub(crate) struct SwapchainObjects {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

/// Negotiates against the surface and creates the swapchain plus its
/// images. Sharing is concurrent across the two queues only when graphics
/// and present are different families.
pub(crate) unsafe fn create_swapchain_objects(
    instance: &Instance,
    device: &Device,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    graphics_family: u32,
    present_family: u32,
    requested_format: vk::Format,
    requested_width: u32,
    requested_height: u32,
    vsync: bool,
) -> Result<SwapchainObjects> {
    let support = SwapchainSupport::get(instance, physical_device, surface)?;

    let surface_format = choose_surface_format(&support.formats, requested_format);
    let present_mode = choose_present_mode(&support.present_modes, vsync);
    let extent = choose_extent(&support.capabilities, requested_width, requested_height);
    let image_count = choose_image_count(&support.capabilities);

    let queue_family_indices = [graphics_family, present_family];
    let (sharing_mode, queue_families): (vk::SharingMode, &[u32]) =
        if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &queue_family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[])
        };

    let info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(queue_families)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());

    let swapchain = device.create_swapchain_khr(&info, None)?;
    let images = device.get_swapchain_images_khr(swapchain)?;

    Ok(SwapchainObjects {
        swapchain,
        images,
        surface_format,
        present_mode,
        extent,
    })
}

/// One image-available plus one render-finished semaphore per frame in
/// flight, paired for the acquire/present handshake.
pub(crate) unsafe fn create_frame_semaphores(
    device: &Device,
) -> Result<(Vec<vk::Semaphore>, Vec<vk::Semaphore>)> {
    let info = vk::SemaphoreCreateInfo::builder();
    let mut image_available = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    let mut render_finished = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        image_available.push(device.create_semaphore(&info, None)?);
        render_finished.push(device.create_semaphore(&info, None)?);
    }
    Ok((image_available, render_finished))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(
        min_count: u32,
        max_count: u32,
        current: (u32, u32),
        min_extent: (u32, u32),
        max_extent: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        let mut capabilities = vk::SurfaceCapabilitiesKHR::default();
        capabilities.min_image_count = min_count;
        capabilities.max_image_count = max_count;
        capabilities.current_extent = vk::Extent2D {
            width: current.0,
            height: current.1,
        };
        capabilities.min_image_extent = vk::Extent2D {
            width: min_extent.0,
            height: min_extent.1,
        };
        capabilities.max_image_extent = vk::Extent2D {
            width: max_extent.0,
            height: max_extent.1,
        };
        capabilities
    }

    #[test]
    fn extent_uses_the_surface_when_defined() {
        let caps = capabilities(2, 0, (800, 600), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 1280, 720);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_the_request_when_undefined() {
        let caps = capabilities(2, 0, (u32::MAX, u32::MAX), (640, 480), (1920, 1080));
        let extent = choose_extent(&caps, 4096, 100);
        assert_eq!((extent.width, extent.height), (1920, 480));
    }

    #[test]
    fn image_count_is_min_plus_one_clamped_to_max() {
        let caps = capabilities(2, 0, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&caps), 3);

        let bounded = capabilities(2, 2, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&bounded), 2);
    }

    #[test]
    fn format_falls_back_to_the_first_reported() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let chosen = choose_surface_format(&formats, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);

        let fallback = choose_surface_format(&formats, vk::Format::R5G6B5_UNORM_PACK16);
        assert_eq!(fallback.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn vsync_always_means_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn no_vsync_prefers_mailbox_then_immediate_then_fifo() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

        let without_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&without_mailbox, false),
            vk::PresentModeKHR::IMMEDIATE
        );

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&fifo_only, false), vk::PresentModeKHR::FIFO);
    }
}
