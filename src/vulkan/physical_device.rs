//! Adapter enumeration, chained feature discovery and scoring.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::prelude::v1_3::*;
use vulkanalia::vk::KhrSurfaceExtension;

use crate::error::SuitabilityError;

/// Queue-family layout of one adapter. `graphics` is the first family with
/// the graphics bit, `present` the first that can present to the probe
/// surface. The dedicated flags feed the score only.
#[derive(Copy, Clone, Debug)]
pub(crate) struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub has_dedicated_compute: bool,
    pub has_dedicated_transfer: bool,
}

/// The facts scoring runs on, split from the live Vulkan objects so the
/// ranking is a pure function.
#[derive(Copy, Clone, Debug)]
pub(crate) struct AdapterProfile {
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub has_graphics_family: bool,
    pub has_present_family: bool,
    pub has_dedicated_compute: bool,
    pub has_dedicated_transfer: bool,
}

/// Ranks an adapter. An adapter that cannot both draw and present scores
/// zero and is never selected.
pub(crate) fn score_adapter(profile: &AdapterProfile) -> u32 {
    if !profile.has_graphics_family || !profile.has_present_family {
        return 0;
    }

    let mut score = profile.max_image_dimension_2d / 1024;
    score += match profile.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
        _ => 0,
    };
    if profile.has_dedicated_compute {
        score += 100;
    }
    if profile.has_dedicated_transfer {
        score += 100;
    }
    score
}

/// Index of the highest-scoring adapter, ignoring zero scores.
pub(crate) fn best_adapter_index(scores: &[u32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| **s > 0)
        .max_by_key(|(_, s)| **s)
        .map(|(i, _)| i)
}

/// Descriptor-indexing bits copied out of the chained feature query.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct DescriptorIndexingSupport {
    pub sampled_image_non_uniform_indexing: bool,
    pub storage_buffer_non_uniform_indexing: bool,
    pub partially_bound: bool,
    pub runtime_descriptor_array: bool,
    pub sampled_image_update_after_bind: bool,
    pub storage_image_update_after_bind: bool,
    pub storage_buffer_update_after_bind: bool,
}

impl DescriptorIndexingSupport {
    /// Bindless texture arrays need non-uniform sampled-image indexing,
    /// partial binding, runtime arrays and update-after-bind for both
    /// sampled and storage images.
    pub fn bindless_textures(&self) -> bool {
        self.sampled_image_non_uniform_indexing
            && self.partially_bound
            && self.runtime_descriptor_array
            && self.sampled_image_update_after_bind
            && self.storage_image_update_after_bind
    }

    /// The storage-buffer analogue of `bindless_textures`.
    pub fn bindless_buffers(&self) -> bool {
        self.storage_buffer_non_uniform_indexing
            && self.partially_bound
            && self.runtime_descriptor_array
            && self.storage_buffer_update_after_bind
    }
}

/// Everything the adapter advertised, copied into plain values so nothing
/// keeps a `pNext` chain alive.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct AdapterFeatures {
    pub indexing: DescriptorIndexingSupport,
    pub maintenance4: bool,
    pub buffer_device_address: bool,
    pub ray_query: bool,
    pub acceleration_structure: bool,
    pub ray_tracing_pipeline: bool,
    pub shader_draw_parameters: bool,
    pub multiview: bool,
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    pub wide_lines: bool,
    pub fill_mode_non_solid: bool,
}

/// The selected physical device and everything later stages need from it.
pub(crate) struct Adapter {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub families: QueueFamilies,
    pub features: AdapterFeatures,
    pub extensions: HashSet<vk::ExtensionName>,
    pub score: u32,
}

/// Enumerates physical devices, scores each and returns the best. The
/// probe `surface` exists only to answer presentation-support queries.
pub(crate) unsafe fn pick_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
) -> Result<Adapter> {
    let physical_devices = instance.enumerate_physical_devices()?;
    if physical_devices.is_empty() {
        return Err(anyhow!(SuitabilityError("no device found")));
    }

    let mut adapters = Vec::new();
    let mut scores = Vec::new();

    for physical_device in physical_devices {
        let properties = instance.get_physical_device_properties(physical_device);

        match inspect_physical_device(instance, surface, physical_device) {
            Ok(adapter) => {
                info!(
                    "Adapter '{}' scored {} (type {:?}).",
                    properties.device_name, adapter.score, properties.device_type
                );
                scores.push(adapter.score);
                adapters.push(adapter);
            }
            Err(error) => {
                warn!(
                    "Skipping physical device ('{}'): {}",
                    properties.device_name, error
                );
            }
        }
    }

    let best = best_adapter_index(&scores).ok_or(anyhow!(SuitabilityError("no device found")))?;
    let adapter = adapters.swap_remove(best);
    info!(
        "Selected physical device ('{}').",
        adapter.properties.device_name
    );
    Ok(adapter)
}

unsafe fn inspect_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Result<Adapter> {
    let properties = instance.get_physical_device_properties(physical_device);
    let memory_properties = instance.get_physical_device_memory_properties(physical_device);
    let families = find_queue_families(instance, surface, physical_device)?;
    let features = query_adapter_features(instance, physical_device);

    let extensions = instance
        .enumerate_device_extension_properties(physical_device, None)?
        .iter()
        .map(|e| e.extension_name)
        .collect::<HashSet<_>>();

    let profile = AdapterProfile {
        device_type: properties.device_type,
        max_image_dimension_2d: properties.limits.max_image_dimension_2d,
        has_graphics_family: true,
        has_present_family: true,
        has_dedicated_compute: families.has_dedicated_compute,
        has_dedicated_transfer: families.has_dedicated_transfer,
    };

    Ok(Adapter {
        physical_device,
        properties,
        memory_properties,
        families,
        features,
        extensions,
        score: score_adapter(&profile),
    })
}

unsafe fn find_queue_families(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueFamilies> {
    let properties = instance.get_physical_device_queue_family_properties(physical_device);

    let graphics = properties
        .iter()
        .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);

    let mut present = None;
    for (index, _) in properties.iter().enumerate() {
        if instance.get_physical_device_surface_support_khr(
            physical_device,
            index as u32,
            surface,
        )? {
            present = Some(index as u32);
            break;
        }
    }

    let has_dedicated_compute = properties.iter().any(|p| {
        p.queue_flags.contains(vk::QueueFlags::COMPUTE)
            && !p.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    });
    let has_dedicated_transfer = properties.iter().any(|p| {
        p.queue_flags.contains(vk::QueueFlags::TRANSFER)
            && !p.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && !p.queue_flags.contains(vk::QueueFlags::COMPUTE)
    });

    if let (Some(graphics), Some(present)) = (graphics, present) {
        Ok(QueueFamilies {
            graphics,
            present,
            has_dedicated_compute,
            has_dedicated_transfer,
        })
    } else {
        Err(anyhow!(SuitabilityError("Missing required queue families.")))
    }
}

/// Runs the chained feature query and copies the requested bits back into
/// plain booleans. The chain lives only for the duration of this call.
unsafe fn query_adapter_features(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> AdapterFeatures {
    let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::builder();
    let mut maintenance4 = vk::PhysicalDeviceMaintenance4Features::builder();
    let mut buffer_device_address = vk::PhysicalDeviceBufferDeviceAddressFeatures::builder();
    let mut ray_query = vk::PhysicalDeviceRayQueryFeaturesKHR::builder();
    let mut acceleration = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::builder();
    let mut ray_tracing = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::builder();
    let mut draw_parameters = vk::PhysicalDeviceShaderDrawParametersFeatures::builder();
    let mut multiview = vk::PhysicalDeviceMultiviewFeatures::builder();

    let mut features2 = vk::PhysicalDeviceFeatures2::builder()
        .push_next(&mut indexing)
        .push_next(&mut maintenance4)
        .push_next(&mut buffer_device_address)
        .push_next(&mut ray_query)
        .push_next(&mut acceleration)
        .push_next(&mut ray_tracing)
        .push_next(&mut draw_parameters)
        .push_next(&mut multiview);

    instance.get_physical_device_features2(physical_device, &mut features2);

    let core = features2.features;
    AdapterFeatures {
        indexing: DescriptorIndexingSupport {
            sampled_image_non_uniform_indexing: indexing
                .shader_sampled_image_array_non_uniform_indexing
                == vk::TRUE,
            storage_buffer_non_uniform_indexing: indexing
                .shader_storage_buffer_array_non_uniform_indexing
                == vk::TRUE,
            partially_bound: indexing.descriptor_binding_partially_bound == vk::TRUE,
            runtime_descriptor_array: indexing.runtime_descriptor_array == vk::TRUE,
            sampled_image_update_after_bind: indexing
                .descriptor_binding_sampled_image_update_after_bind
                == vk::TRUE,
            storage_image_update_after_bind: indexing
                .descriptor_binding_storage_image_update_after_bind
                == vk::TRUE,
            storage_buffer_update_after_bind: indexing
                .descriptor_binding_storage_buffer_update_after_bind
                == vk::TRUE,
        },
        maintenance4: maintenance4.maintenance4 == vk::TRUE,
        buffer_device_address: buffer_device_address.buffer_device_address == vk::TRUE,
        ray_query: ray_query.ray_query == vk::TRUE,
        acceleration_structure: acceleration.acceleration_structure == vk::TRUE,
        ray_tracing_pipeline: ray_tracing.ray_tracing_pipeline == vk::TRUE,
        shader_draw_parameters: draw_parameters.shader_draw_parameters == vk::TRUE,
        multiview: multiview.multiview == vk::TRUE,
        sampler_anisotropy: core.sampler_anisotropy == vk::TRUE,
        sample_rate_shading: core.sample_rate_shading == vk::TRUE,
        wide_lines: core.wide_lines == vk::TRUE,
        fill_mode_non_solid: core.fill_mode_non_solid == vk::TRUE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrete_profile() -> AdapterProfile {
        AdapterProfile {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            max_image_dimension_2d: 16384,
            has_graphics_family: true,
            has_present_family: true,
            has_dedicated_compute: true,
            has_dedicated_transfer: true,
        }
    }

    #[test]
    fn discrete_adapter_scores_exactly_by_the_formula() {
        let score = score_adapter(&discrete_profile());
        assert_eq!(score, 16384 / 1024 + 1000 + 100 + 100);
    }

    #[test]
    fn discrete_beats_integrated() {
        let integrated = AdapterProfile {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            has_dedicated_compute: false,
            has_dedicated_transfer: false,
            ..discrete_profile()
        };

        let scores = vec![score_adapter(&integrated), score_adapter(&discrete_profile())];
        assert_eq!(best_adapter_index(&scores), Some(1));
    }

    #[test]
    fn adapter_without_present_family_scores_zero() {
        let headless = AdapterProfile {
            has_present_family: false,
            ..discrete_profile()
        };
        assert_eq!(score_adapter(&headless), 0);

        let no_graphics = AdapterProfile {
            has_graphics_family: false,
            ..discrete_profile()
        };
        assert_eq!(score_adapter(&no_graphics), 0);
    }

    #[test]
    fn all_zero_scores_select_nothing() {
        assert_eq!(best_adapter_index(&[0, 0, 0]), None);
        assert_eq!(best_adapter_index(&[]), None);
    }

    #[test]
    fn bindless_textures_require_the_full_update_after_bind_triple() {
        // Runtime arrays and partial binding alone are not enough.
        let partial = DescriptorIndexingSupport {
            sampled_image_non_uniform_indexing: true,
            partially_bound: true,
            runtime_descriptor_array: true,
            ..Default::default()
        };
        assert!(!partial.bindless_textures());

        let full = DescriptorIndexingSupport {
            sampled_image_update_after_bind: true,
            storage_image_update_after_bind: true,
            ..partial
        };
        assert!(full.bindless_textures());
    }

    #[test]
    fn bindless_buffers_gate_on_the_storage_buffer_bits() {
        let support = DescriptorIndexingSupport {
            storage_buffer_non_uniform_indexing: true,
            partially_bound: true,
            runtime_descriptor_array: true,
            storage_buffer_update_after_bind: true,
            ..Default::default()
        };
        assert!(support.bindless_buffers());
        assert!(!support.bindless_textures());

        let without_update = DescriptorIndexingSupport {
            storage_buffer_update_after_bind: false,
            ..support
        };
        assert!(!without_update.bindless_buffers());
    }
}
