//! Sampler creation.

use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use super::convert::{address_mode_to_vk, compare_to_vk, filter_to_vk, mipmap_mode_to_vk};
use crate::types::{CompareFunction, SamplerDesc};

pub(crate) unsafe fn create_sampler(device: &Device, desc: &SamplerDesc) -> Result<vk::Sampler> {
    // Anisotropy only makes sense past a factor of one; compare mode is a
    // shadow-sampler feature selected by any compare other than Always.
    let anisotropy_enable = desc.max_anisotropy > 1.0;
    let compare_enable = desc.compare != CompareFunction::Always;

    let info = vk::SamplerCreateInfo::builder()
        .mag_filter(filter_to_vk(desc.mag_filter))
        .min_filter(filter_to_vk(desc.min_filter))
        .mipmap_mode(mipmap_mode_to_vk(desc.mipmap_filter))
        .address_mode_u(address_mode_to_vk(desc.address_mode_u))
        .address_mode_v(address_mode_to_vk(desc.address_mode_v))
        .address_mode_w(address_mode_to_vk(desc.address_mode_w))
        .mip_lod_bias(0.0)
        .anisotropy_enable(anisotropy_enable)
        .max_anisotropy(desc.max_anisotropy)
        .compare_enable(compare_enable)
        .compare_op(compare_to_vk(desc.compare))
        .min_lod(desc.lod_min)
        .max_lod(desc.lod_max)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false);

    Ok(device.create_sampler(&info, None)?)
}
