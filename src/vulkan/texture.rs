//! Texture (image) and texture-view creation.

use anyhow::{anyhow, Result};
use vulkanalia::prelude::v1_0::*;

use super::convert::{
    aspect_to_vk, format_to_vk, image_type_to_vk, sample_count_to_vk, texture_usage_to_vk,
    view_type_for,
};
use super::memory::MemoryAllocator;
use crate::handle::TextureHandle;
use crate::types::{Format, MemoryUsage, TextureDesc, TextureDimension, TextureUsage, TextureViewDesc};

/// Backend record behind a `TextureHandle`. Swapchain-owned images carry a
/// null memory handle and are flagged so the destroy path never frees what
/// the swapchain owns.
pub(crate) struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub dimension: TextureDimension,
    pub usage: TextureUsage,
    pub is_swapchain_image: bool,
}

/// Fills in the defaulting rules: lower-dimension extents, mip, layer and
/// sample counts all become one when left zero.
pub(crate) fn normalize_desc(desc: &TextureDesc) -> TextureDesc {
    let mut desc = *desc;
    if desc.height == 0 {
        desc.height = 1;
    }
    if desc.depth == 0 {
        desc.depth = 1;
    }
    if desc.mip_levels == 0 {
        desc.mip_levels = 1;
    }
    if desc.array_layers == 0 {
        desc.array_layers = 1;
    }
    if desc.sample_count == 0 {
        desc.sample_count = 1;
    }
    desc
}

pub(crate) unsafe fn create_texture(
    device: &Device,
    allocator: &mut MemoryAllocator,
    desc: &TextureDesc,
) -> Result<Texture> {
    if desc.width == 0 {
        return Err(anyhow!("texture width must be greater than zero"));
    }
    if desc.usage.is_empty() {
        return Err(anyhow!("texture usage mask must not be empty"));
    }

    let desc = normalize_desc(desc);

    // Six or more layers on a 2D image may be viewed as a cube map.
    let flags = if desc.dimension == TextureDimension::D2 && desc.array_layers >= 6 {
        vk::ImageCreateFlags::CUBE_COMPATIBLE
    } else {
        vk::ImageCreateFlags::empty()
    };

    let info = vk::ImageCreateInfo::builder()
        .flags(flags)
        .image_type(image_type_to_vk(desc.dimension))
        .format(format_to_vk(desc.format))
        .extent(vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
        })
        .mip_levels(desc.mip_levels)
        .array_layers(desc.array_layers)
        .samples(sample_count_to_vk(desc.sample_count))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(texture_usage_to_vk(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = device.create_image(&info, None)?;

    let requirements = device.get_image_memory_requirements(image);
    let memory = match allocator.allocate(device, requirements, MemoryUsage::GpuOnly) {
        Ok(memory) => memory,
        Err(error) => {
            device.destroy_image(image, None);
            return Err(error);
        }
    };

    if let Err(error) = device.bind_image_memory(image, memory, 0) {
        allocator.free(device, memory);
        device.destroy_image(image, None);
        return Err(error.into());
    }

    Ok(Texture {
        image,
        memory,
        format: desc.format,
        width: desc.width,
        height: desc.height,
        depth: desc.depth,
        mip_levels: desc.mip_levels,
        array_layers: desc.array_layers,
        sample_count: desc.sample_count,
        dimension: desc.dimension,
        usage: desc.usage,
        is_swapchain_image: false,
    })
}

/// Wraps a swapchain-owned image in a texture record. The swapchain keeps
/// ownership of the image itself.
pub(crate) fn wrap_swapchain_image(
    image: vk::Image,
    format: Format,
    width: u32,
    height: u32,
) -> Texture {
    Texture {
        image,
        memory: vk::DeviceMemory::null(),
        format,
        width,
        height,
        depth: 1,
        mip_levels: 1,
        array_layers: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::COPY_DST,
        is_swapchain_image: true,
    }
}

pub(crate) unsafe fn destroy_texture(
    device: &Device,
    allocator: &mut MemoryAllocator,
    texture: Texture,
) {
    // Swapchain images belong to the swapchain; destroying the wrapper
    // must not touch them.
    if texture.is_swapchain_image {
        return;
    }
    device.destroy_image(texture.image, None);
    if !texture.memory.is_null() {
        allocator.free(device, texture.memory);
    }
}

/// Backend record behind a `TextureViewHandle`.
pub(crate) struct TextureView {
    pub view: vk::ImageView,
    pub texture: TextureHandle,
}

pub(crate) unsafe fn create_texture_view(
    device: &Device,
    texture: &Texture,
    parent: TextureHandle,
    desc: &TextureViewDesc,
) -> Result<TextureView> {
    // A format override falls back to the texture's own format.
    let format = if desc.format == Format::Undefined {
        texture.format
    } else {
        desc.format
    };

    // Zero counts mean "all remaining".
    let mip_count = if desc.mip_level_count == 0 {
        texture.mip_levels.saturating_sub(desc.base_mip_level)
    } else {
        desc.mip_level_count
    };
    let layer_count = if desc.array_layer_count == 0 {
        texture.array_layers.saturating_sub(desc.base_array_layer)
    } else {
        desc.array_layer_count
    };

    let subresource_range = vk::ImageSubresourceRange::builder()
        .aspect_mask(aspect_to_vk(desc.aspect, format))
        .base_mip_level(desc.base_mip_level)
        .level_count(mip_count)
        .base_array_layer(desc.base_array_layer)
        .layer_count(layer_count);

    let info = vk::ImageViewCreateInfo::builder()
        .image(texture.image)
        .view_type(view_type_for(texture.dimension, layer_count))
        .format(format_to_vk(format))
        .components(vk::ComponentMapping::default())
        .subresource_range(subresource_range);

    let view = device.create_image_view(&info, None)?;
    Ok(TextureView {
        view,
        texture: parent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_counts_default_to_one() {
        let desc = TextureDesc {
            width: 64,
            height: 0,
            depth: 0,
            mip_levels: 0,
            array_layers: 0,
            sample_count: 0,
            ..Default::default()
        };
        let normalized = normalize_desc(&desc);
        assert_eq!(normalized.height, 1);
        assert_eq!(normalized.depth, 1);
        assert_eq!(normalized.mip_levels, 1);
        assert_eq!(normalized.array_layers, 1);
        assert_eq!(normalized.sample_count, 1);
    }

    #[test]
    fn explicit_counts_survive_normalization() {
        let desc = TextureDesc {
            width: 64,
            height: 32,
            mip_levels: 7,
            array_layers: 6,
            sample_count: 4,
            ..Default::default()
        };
        let normalized = normalize_desc(&desc);
        assert_eq!(normalized.height, 32);
        assert_eq!(normalized.mip_levels, 7);
        assert_eq!(normalized.array_layers, 6);
        assert_eq!(normalized.sample_count, 4);
    }

    #[test]
    fn swapchain_wrappers_are_flagged() {
        let texture = wrap_swapchain_image(vk::Image::null(), Format::Bgra8Unorm, 800, 600);
        assert!(texture.is_swapchain_image);
        assert!(texture.memory.is_null());
        assert_eq!(texture.width, 800);
        assert_eq!(texture.mip_levels, 1);
    }
}
