//! Bind-group layouts, the global descriptor pool and bind groups.

use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use super::convert::{binding_type_to_vk, shader_stage_to_vk};
use crate::types::BindGroupLayoutDesc;
use crate::{DESCRIPTOR_POOL_MAX_SETS, DESCRIPTOR_POOL_SIZE_PER_TYPE};

/// Backend record behind a `BindGroupLayoutHandle`.
pub(crate) struct BindGroupLayout {
    pub layout: vk::DescriptorSetLayout,
    pub binding_count: u32,
}

pub(crate) unsafe fn create_bind_group_layout(
    device: &Device,
    desc: &BindGroupLayoutDesc,
) -> Result<BindGroupLayout> {
    let bindings = desc
        .entries
        .iter()
        .map(|entry| {
            vk::DescriptorSetLayoutBinding::builder()
                .binding(entry.binding)
                .descriptor_type(binding_type_to_vk(entry.ty))
                // No bindless arrays at this layer.
                .descriptor_count(1)
                .stage_flags(shader_stage_to_vk(entry.visibility))
                .build()
        })
        .collect::<Vec<_>>();

    let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    let layout = device.create_descriptor_set_layout(&info, None)?;
    Ok(BindGroupLayout {
        layout,
        binding_count: bindings.len() as u32,
    })
}

/// Creates the device-wide descriptor pool every bind group allocates
/// from. Sized generously up front and created with the free-descriptor-set
/// flag so individual bind groups can be released.
pub(crate) unsafe fn create_descriptor_pool(device: &Device) -> Result<vk::DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::SAMPLED_IMAGE,
        vk::DescriptorType::STORAGE_IMAGE,
        vk::DescriptorType::SAMPLER,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    ]
    .into_iter()
    .map(|type_| {
        vk::DescriptorPoolSize::builder()
            .type_(type_)
            .descriptor_count(DESCRIPTOR_POOL_SIZE_PER_TYPE)
            .build()
    })
    .collect::<Vec<_>>();

    let info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .pool_sizes(&pool_sizes)
        .max_sets(DESCRIPTOR_POOL_MAX_SETS);

    Ok(device.create_descriptor_pool(&info, None)?)
}

/// A bind-group entry with its handle resolved to the native objects and
/// its descriptor type already decided from the resource's usage mask.
pub(crate) enum ResolvedBinding {
    Buffer {
        buffer: vk::Buffer,
        range: u64,
        descriptor_type: vk::DescriptorType,
    },
    Image {
        view: vk::ImageView,
        layout: vk::ImageLayout,
        descriptor_type: vk::DescriptorType,
    },
    Sampler {
        sampler: vk::Sampler,
    },
}

/// Allocates one descriptor set and writes every binding in a single
/// update call.
pub(crate) unsafe fn create_bind_group(
    device: &Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    bindings: &[(u32, ResolvedBinding)],
) -> Result<vk::DescriptorSet> {
    let layouts = [layout];
    let info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let set = device.allocate_descriptor_sets(&info)?[0];

    // The info arrays must stay alive until the update call, so they are
    // collected first and the writes index into them.
    let mut buffer_infos = Vec::new();
    let mut image_infos = Vec::new();
    for (_, binding) in bindings {
        match binding {
            ResolvedBinding::Buffer { buffer, range, .. } => {
                buffer_infos.push(
                    vk::DescriptorBufferInfo::builder()
                        .buffer(*buffer)
                        .offset(0)
                        .range(*range)
                        .build(),
                );
            }
            ResolvedBinding::Image { view, layout, .. } => {
                image_infos.push(
                    vk::DescriptorImageInfo::builder()
                        .image_view(*view)
                        .image_layout(*layout)
                        .build(),
                );
            }
            ResolvedBinding::Sampler { sampler } => {
                image_infos.push(vk::DescriptorImageInfo::builder().sampler(*sampler).build());
            }
        }
    }

    let mut writes = Vec::with_capacity(bindings.len());
    let mut buffer_index = 0;
    let mut image_index = 0;
    for (binding, resolved) in bindings {
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(*binding)
            .dst_array_element(0);

        let write = match resolved {
            ResolvedBinding::Buffer {
                descriptor_type, ..
            } => {
                let info = &buffer_infos[buffer_index..buffer_index + 1];
                buffer_index += 1;
                write.descriptor_type(*descriptor_type).buffer_info(info)
            }
            ResolvedBinding::Image {
                descriptor_type, ..
            } => {
                let info = &image_infos[image_index..image_index + 1];
                image_index += 1;
                write.descriptor_type(*descriptor_type).image_info(info)
            }
            ResolvedBinding::Sampler { .. } => {
                let info = &image_infos[image_index..image_index + 1];
                image_index += 1;
                write
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(info)
            }
        };

        writes.push(write.build());
    }

    device.update_descriptor_sets(&writes, &[] as &[vk::CopyDescriptorSet]);

    Ok(set)
}
