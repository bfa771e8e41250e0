//! Logical-device construction: extension negotiation, feature chaining and
//! the capability record reported back to clients.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::prelude::v1_3::*;

use super::instance::{PORTABILITY_MACOS_VERSION, VALIDATION_LAYER};
use super::physical_device::Adapter;
use crate::types::DeviceFeatures;
use crate::VALIDATION_ENABLED;

/// Extensions the device cannot work without. Creation aborts when any of
/// these are missing.
pub(crate) const REQUIRED_EXTENSIONS: &[vk::ExtensionName] = &[
    vk::KHR_SWAPCHAIN_EXTENSION.name,
    vk::KHR_CREATE_RENDERPASS2_EXTENSION.name,
];

/// Extensions enabled opportunistically when the adapter reports them;
/// each records a capability bit in `DeviceFeatures`.
const OPTIONAL_EXTENSIONS: &[vk::ExtensionName] = &[
    vk::KHR_DEPTH_STENCIL_RESOLVE_EXTENSION.name,
    vk::KHR_PUSH_DESCRIPTOR_EXTENSION.name,
    vk::KHR_MAINTENANCE4_EXTENSION.name,
    vk::KHR_BUFFER_DEVICE_ADDRESS_EXTENSION.name,
    vk::KHR_DRAW_INDIRECT_COUNT_EXTENSION.name,
    vk::KHR_RAY_TRACING_PIPELINE_EXTENSION.name,
    vk::KHR_ACCELERATION_STRUCTURE_EXTENSION.name,
    vk::KHR_RAY_QUERY_EXTENSION.name,
    vk::KHR_SPIRV_1_4_EXTENSION.name,
    vk::KHR_SHADER_FLOAT_CONTROLS_EXTENSION.name,
    vk::KHR_PIPELINE_LIBRARY_EXTENSION.name,
    vk::KHR_DEFERRED_HOST_OPERATIONS_EXTENSION.name,
    vk::KHR_DEDICATED_ALLOCATION_EXTENSION.name,
    vk::EXT_DESCRIPTOR_INDEXING_EXTENSION.name,
];

/// Incremental device-extension list. Skips duplicates, only accepts names
/// the adapter actually reports, and remembers what was accepted so feature
/// structs can be chained for exactly the accepted set.
pub(crate) struct ExtensionList<'a> {
    available: &'a HashSet<vk::ExtensionName>,
    names: Vec<vk::ExtensionName>,
}

impl<'a> ExtensionList<'a> {
    pub fn new(available: &'a HashSet<vk::ExtensionName>) -> Self {
        Self {
            available,
            names: Vec::new(),
        }
    }

    /// Adds `name` if the adapter reports it. Returns whether the
    /// extension is in the list afterwards.
    pub fn try_add(&mut self, name: vk::ExtensionName) -> bool {
        if self.names.contains(&name) {
            return true;
        }
        if !self.available.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    /// Adds a mandatory extension, failing when the adapter lacks it.
    pub fn require(&mut self, name: vk::ExtensionName) -> Result<()> {
        if self.try_add(name) {
            Ok(())
        } else {
            Err(anyhow!("missing required device extension: {}", name))
        }
    }

    pub fn contains(&self, name: vk::ExtensionName) -> bool {
        self.names.contains(&name)
    }

    pub fn as_ptrs(&self) -> Vec<*const std::os::raw::c_char> {
        self.names.iter().map(|n| n.as_ptr()).collect()
    }
}

/// Computes the capability record from the accepted extension list and the
/// adapter's advertised features. This is what `features()` reports, so it
/// must describe what was enabled, never what was merely advertised.
pub(crate) fn resolve_device_features(
    extensions: &ExtensionList,
    adapter: &super::physical_device::AdapterFeatures,
) -> DeviceFeatures {
    let indexing_enabled = extensions.contains(vk::EXT_DESCRIPTOR_INDEXING_EXTENSION.name);

    DeviceFeatures {
        depth_stencil_resolve: extensions.contains(vk::KHR_DEPTH_STENCIL_RESOLVE_EXTENSION.name),
        push_descriptor: extensions.contains(vk::KHR_PUSH_DESCRIPTOR_EXTENSION.name),
        maintenance4: extensions.contains(vk::KHR_MAINTENANCE4_EXTENSION.name)
            && adapter.maintenance4,
        buffer_device_address: extensions.contains(vk::KHR_BUFFER_DEVICE_ADDRESS_EXTENSION.name)
            && adapter.buffer_device_address,
        draw_indirect_count: extensions.contains(vk::KHR_DRAW_INDIRECT_COUNT_EXTENSION.name),
        // Ray tracing needs both the pipeline and the acceleration
        // structure extension; one without the other is useless.
        ray_tracing: extensions.contains(vk::KHR_RAY_TRACING_PIPELINE_EXTENSION.name)
            && extensions.contains(vk::KHR_ACCELERATION_STRUCTURE_EXTENSION.name)
            && adapter.ray_tracing_pipeline
            && adapter.acceleration_structure,
        ray_query: extensions.contains(vk::KHR_RAY_QUERY_EXTENSION.name) && adapter.ray_query,
        spirv_1_4: extensions.contains(vk::KHR_SPIRV_1_4_EXTENSION.name),
        shader_float_controls: extensions.contains(vk::KHR_SHADER_FLOAT_CONTROLS_EXTENSION.name),
        pipeline_library: extensions.contains(vk::KHR_PIPELINE_LIBRARY_EXTENSION.name),
        deferred_host_operations: extensions
            .contains(vk::KHR_DEFERRED_HOST_OPERATIONS_EXTENSION.name),
        dedicated_allocation: extensions.contains(vk::KHR_DEDICATED_ALLOCATION_EXTENSION.name),
        bindless_texture_supported: indexing_enabled && adapter.indexing.bindless_textures(),
        bindless_buffer_supported: indexing_enabled && adapter.indexing.bindless_buffers(),
        multiview: adapter.multiview,
        shader_draw_parameters: adapter.shader_draw_parameters,
        sampler_anisotropy: adapter.sampler_anisotropy,
        sample_rate_shading: adapter.sample_rate_shading,
        wide_lines: adapter.wide_lines,
        fill_mode_non_solid: adapter.fill_mode_non_solid,
    }
}

/// Creates the logical device with one queue per distinct family and every
/// optional extension the adapter supports, chaining the matching feature
/// structs into the create-info.
pub(crate) unsafe fn create_logical_device(
    entry: &Entry,
    instance: &Instance,
    adapter: &Adapter,
) -> Result<(Device, DeviceFeatures)> {
    let mut unique_families = vec![adapter.families.graphics];
    if adapter.families.present != adapter.families.graphics {
        unique_families.push(adapter.families.present);
    }

    let queue_priorities = &[1.0];
    let queue_infos = unique_families
        .iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(*family)
                .queue_priorities(queue_priorities)
                .build()
        })
        .collect::<Vec<_>>();

    let layers = if VALIDATION_ENABLED {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let mut extensions = ExtensionList::new(&adapter.extensions);
    for required in REQUIRED_EXTENSIONS {
        extensions.require(*required)?;
    }

    // Required by the Vulkan SDK on macOS since 1.3.216.
    if cfg!(target_os = "macos") && entry.version()? >= PORTABILITY_MACOS_VERSION {
        extensions.try_add(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name);
    }

    for optional in OPTIONAL_EXTENSIONS {
        if !extensions.try_add(*optional) {
            debug!("Optional device extension not present: {}", optional);
        }
    }

    let device_features = resolve_device_features(&extensions, &adapter.features);

    let features = vk::PhysicalDeviceFeatures::builder()
        .sampler_anisotropy(adapter.features.sampler_anisotropy)
        .sample_rate_shading(adapter.features.sample_rate_shading)
        .depth_clamp(true)
        .fill_mode_non_solid(adapter.features.fill_mode_non_solid)
        .wide_lines(adapter.features.wide_lines);

    // Feature structs are chained only when the matching extension was
    // accepted and the adapter advertised the feature, otherwise device
    // creation rejects the chain.
    let indexing = &adapter.features.indexing;
    let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::builder()
        .shader_sampled_image_array_non_uniform_indexing(indexing.sampled_image_non_uniform_indexing)
        .shader_storage_buffer_array_non_uniform_indexing(
            indexing.storage_buffer_non_uniform_indexing,
        )
        .descriptor_binding_partially_bound(indexing.partially_bound)
        .runtime_descriptor_array(indexing.runtime_descriptor_array)
        .descriptor_binding_sampled_image_update_after_bind(
            indexing.sampled_image_update_after_bind,
        )
        .descriptor_binding_storage_image_update_after_bind(
            indexing.storage_image_update_after_bind,
        )
        .descriptor_binding_storage_buffer_update_after_bind(
            indexing.storage_buffer_update_after_bind,
        );
    let mut buffer_device_address_features = vk::PhysicalDeviceBufferDeviceAddressFeatures::builder()
        .buffer_device_address(true);
    let mut maintenance4_features =
        vk::PhysicalDeviceMaintenance4Features::builder().maintenance4(true);
    let mut ray_tracing_features =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::builder().ray_tracing_pipeline(true);
    let mut acceleration_features = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::builder()
        .acceleration_structure(true);
    let mut ray_query_features = vk::PhysicalDeviceRayQueryFeaturesKHR::builder().ray_query(true);
    let mut draw_parameters_features =
        vk::PhysicalDeviceShaderDrawParametersFeatures::builder().shader_draw_parameters(true);
    let mut multiview_features = vk::PhysicalDeviceMultiviewFeatures::builder().multiview(true);

    let extension_ptrs = extensions.as_ptrs();
    let mut info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&features);

    if extensions.contains(vk::EXT_DESCRIPTOR_INDEXING_EXTENSION.name)
        && (indexing.runtime_descriptor_array || indexing.partially_bound)
    {
        info = info.push_next(&mut indexing_features);
    }
    if device_features.buffer_device_address {
        info = info.push_next(&mut buffer_device_address_features);
    }
    if device_features.maintenance4 {
        info = info.push_next(&mut maintenance4_features);
    }
    if device_features.ray_tracing {
        info = info.push_next(&mut ray_tracing_features);
        info = info.push_next(&mut acceleration_features);
    }
    if device_features.ray_query {
        info = info.push_next(&mut ray_query_features);
    }
    if adapter.features.shader_draw_parameters {
        info = info.push_next(&mut draw_parameters_features);
    }
    if adapter.features.multiview {
        info = info.push_next(&mut multiview_features);
    }

    let device = instance.create_device(adapter.physical_device, &info, None)?;
    debug!("Logical device created.");

    Ok((device, device_features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::physical_device::{AdapterFeatures, DescriptorIndexingSupport};

    fn available(names: &[vk::ExtensionName]) -> HashSet<vk::ExtensionName> {
        names.iter().copied().collect()
    }

    #[test]
    fn try_add_filters_unavailable_extensions() {
        let available = available(&[vk::KHR_SWAPCHAIN_EXTENSION.name]);
        let mut list = ExtensionList::new(&available);

        assert!(list.try_add(vk::KHR_SWAPCHAIN_EXTENSION.name));
        assert!(!list.try_add(vk::KHR_RAY_QUERY_EXTENSION.name));
        assert!(list.contains(vk::KHR_SWAPCHAIN_EXTENSION.name));
        assert!(!list.contains(vk::KHR_RAY_QUERY_EXTENSION.name));
    }

    #[test]
    fn try_add_skips_duplicates() {
        let available = available(&[vk::KHR_SWAPCHAIN_EXTENSION.name]);
        let mut list = ExtensionList::new(&available);

        assert!(list.try_add(vk::KHR_SWAPCHAIN_EXTENSION.name));
        assert!(list.try_add(vk::KHR_SWAPCHAIN_EXTENSION.name));
        assert_eq!(list.as_ptrs().len(), 1);
    }

    #[test]
    fn require_fails_on_missing_extension() {
        let available = available(&[]);
        let mut list = ExtensionList::new(&available);
        assert!(list.require(vk::KHR_SWAPCHAIN_EXTENSION.name).is_err());
    }

    #[test]
    fn ray_tracing_needs_both_extensions() {
        let adapter = AdapterFeatures {
            ray_tracing_pipeline: true,
            acceleration_structure: true,
            ..Default::default()
        };

        let only_pipeline = available(&[vk::KHR_RAY_TRACING_PIPELINE_EXTENSION.name]);
        let mut list = ExtensionList::new(&only_pipeline);
        list.try_add(vk::KHR_RAY_TRACING_PIPELINE_EXTENSION.name);
        assert!(!resolve_device_features(&list, &adapter).ray_tracing);

        let both = available(&[
            vk::KHR_RAY_TRACING_PIPELINE_EXTENSION.name,
            vk::KHR_ACCELERATION_STRUCTURE_EXTENSION.name,
        ]);
        let mut list = ExtensionList::new(&both);
        list.try_add(vk::KHR_RAY_TRACING_PIPELINE_EXTENSION.name);
        list.try_add(vk::KHR_ACCELERATION_STRUCTURE_EXTENSION.name);
        assert!(resolve_device_features(&list, &adapter).ray_tracing);
    }

    #[test]
    fn bindless_reporting_requires_update_after_bind() {
        // Runtime arrays and partial binding advertised, but no
        // update-after-bind: bindless textures must read false.
        let adapter = AdapterFeatures {
            indexing: DescriptorIndexingSupport {
                sampled_image_non_uniform_indexing: true,
                partially_bound: true,
                runtime_descriptor_array: true,
                sampled_image_update_after_bind: false,
                storage_image_update_after_bind: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let avail = available(&[vk::EXT_DESCRIPTOR_INDEXING_EXTENSION.name]);
        let mut list = ExtensionList::new(&avail);
        list.try_add(vk::EXT_DESCRIPTOR_INDEXING_EXTENSION.name);

        let features = resolve_device_features(&list, &adapter);
        assert!(!features.bindless_texture_supported);
        assert!(!features.bindless_buffer_supported);
    }

    #[test]
    fn features_reflect_enabled_extensions_not_advertised_ones() {
        // The adapter advertises maintenance4 but the extension was never
        // added to the list, so the capability must read false.
        let adapter = AdapterFeatures {
            maintenance4: true,
            ..Default::default()
        };
        let avail = available(&[]);
        let list = ExtensionList::new(&avail);
        assert!(!resolve_device_features(&list, &adapter).maintenance4);
    }
}
