//! Device-memory sub-allocation.
//!
//! Every buffer and image allocation funnels through [`MemoryAllocator`],
//! which picks a memory type matching the resource's requirements and the
//! engine-level usage class, and keeps an allocation/free balance the
//! terminate path asserts on.

use anyhow::{anyhow, Result};
use vulkanalia::prelude::v1_0::*;

use crate::types::MemoryUsage;

/// The property flags a memory-usage class asks for, in preference order.
/// Readback memory would rather be cached on the host but works without.
pub(crate) fn memory_properties_for(usage: MemoryUsage) -> Vec<vk::MemoryPropertyFlags> {
    match usage {
        MemoryUsage::GpuOnly => vec![vk::MemoryPropertyFlags::DEVICE_LOCAL],
        MemoryUsage::CpuToGpu => vec![
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ],
        MemoryUsage::GpuToCpu => vec![
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ],
    }
}

/// Whether a usage class yields host-mappable memory.
pub(crate) fn is_host_visible(usage: MemoryUsage) -> bool {
    !matches!(usage, MemoryUsage::GpuOnly)
}

pub(crate) struct MemoryAllocator {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    allocation_count: u64,
    free_count: u64,
}

impl MemoryAllocator {
    pub fn new(memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            memory_properties,
            allocation_count: 0,
            free_count: 0,
        }
    }

    /// Returns a memory type index for memory that satisfies the given
    /// requirements and has the given properties.
    pub fn memory_type_index(
        &self,
        properties: vk::MemoryPropertyFlags,
        requirements: vk::MemoryRequirements,
    ) -> Result<u32> {
        let memory = &self.memory_properties;
        (0..memory.memory_type_count)
            .find(|i| {
                let suitable = (requirements.memory_type_bits & (1 << i)) != 0;
                let memory_type = memory.memory_types[*i as usize];
                suitable && memory_type.property_flags.contains(properties)
            })
            .ok_or_else(|| anyhow!("Failed to find suitable memory type."))
    }

    /// Allocates memory satisfying `requirements` in the class `usage` asks
    /// for, trying the preferred property set first.
    pub unsafe fn allocate(
        &mut self,
        device: &Device,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
    ) -> Result<vk::DeviceMemory> {
        let mut memory_type_index = None;
        for properties in memory_properties_for(usage) {
            if let Ok(index) = self.memory_type_index(properties, requirements) {
                memory_type_index = Some(index);
                break;
            }
        }
        let memory_type_index =
            memory_type_index.ok_or_else(|| anyhow!("Failed to find suitable memory type."))?;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = device.allocate_memory(&info, None)?;
        self.allocation_count += 1;
        Ok(memory)
    }

    /// Like `allocate`, but tags the allocation for buffer-device-address
    /// use. Required for buffers created with the device-address usage bit.
    pub unsafe fn allocate_with_device_address(
        &mut self,
        device: &Device,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
    ) -> Result<vk::DeviceMemory> {
        let mut memory_type_index = None;
        for properties in memory_properties_for(usage) {
            if let Ok(index) = self.memory_type_index(properties, requirements) {
                memory_type_index = Some(index);
                break;
            }
        }
        let memory_type_index =
            memory_type_index.ok_or_else(|| anyhow!("Failed to find suitable memory type."))?;

        let mut flags_info = vk::MemoryAllocateFlagsInfo::builder()
            .flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut flags_info);

        let memory = device.allocate_memory(&info, None)?;
        self.allocation_count += 1;
        Ok(memory)
    }

    pub unsafe fn free(&mut self, device: &Device, memory: vk::DeviceMemory) {
        device.free_memory(memory, None);
        self.free_count += 1;
    }

    /// Allocations that have not been freed yet.
    pub fn outstanding(&self) -> u64 {
        self.allocation_count - self.free_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            properties.memory_types[i].property_flags = *flags;
        }
        properties
    }

    fn requirements(bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 1024,
            alignment: 256,
            memory_type_bits: bits,
        }
    }

    #[test]
    fn picks_the_first_matching_memory_type() {
        let allocator = MemoryAllocator::new(mock_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]));

        let index = allocator
            .memory_type_index(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                requirements(0b11),
            )
            .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_the_requirements_type_mask() {
        let allocator = MemoryAllocator::new(mock_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]));

        // Only type 1 is allowed by the mask.
        let index = allocator
            .memory_type_index(vk::MemoryPropertyFlags::DEVICE_LOCAL, requirements(0b10))
            .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn fails_when_nothing_matches() {
        let allocator =
            MemoryAllocator::new(mock_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]));
        assert!(allocator
            .memory_type_index(vk::MemoryPropertyFlags::HOST_VISIBLE, requirements(0b1))
            .is_err());
    }

    #[test]
    fn usage_classes_map_to_property_flags() {
        assert_eq!(
            memory_properties_for(MemoryUsage::GpuOnly),
            vec![vk::MemoryPropertyFlags::DEVICE_LOCAL]
        );
        // Readback falls back to uncached host memory.
        let readback = memory_properties_for(MemoryUsage::GpuToCpu);
        assert_eq!(readback.len(), 2);
        assert!(readback[0].contains(vk::MemoryPropertyFlags::HOST_CACHED));
        assert!(!readback[1].contains(vk::MemoryPropertyFlags::HOST_CACHED));

        assert!(!is_host_visible(MemoryUsage::GpuOnly));
        assert!(is_host_visible(MemoryUsage::CpuToGpu));
        assert!(is_host_visible(MemoryUsage::GpuToCpu));
    }
}
