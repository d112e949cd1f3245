//! Cached memory layout and hardware limits of the physical device.

use ash::vk;

/// Snapshot of the physical device's memory table and limits.
///
/// Captured once when the allocator is constructed and never mutated after.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceProperties {
    memory: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
}

impl DeviceProperties {
    /// Query the snapshot from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let (memory, properties) = unsafe {
            (
                instance.get_physical_device_memory_properties(physical_device),
                instance.get_physical_device_properties(physical_device),
            )
        };

        Self {
            memory,
            limits: properties.limits,
        }
    }

    /// Build a snapshot from explicit tables.
    pub fn new(memory: vk::PhysicalDeviceMemoryProperties, limits: vk::PhysicalDeviceLimits) -> Self {
        Self { memory, limits }
    }

    /// Build a snapshot from a list of heaps and memory types.
    ///
    /// Entries past the Vulkan maxima (16 heaps, 32 types) are ignored.
    pub fn with_memory_layout(heaps: &[vk::MemoryHeap], types: &[vk::MemoryType]) -> Self {
        let mut memory = vk::PhysicalDeviceMemoryProperties::default();

        let heap_count = heaps.len().min(vk::MAX_MEMORY_HEAPS);
        memory.memory_heaps[..heap_count].copy_from_slice(&heaps[..heap_count]);
        memory.memory_heap_count = heap_count as u32;

        let type_count = types.len().min(vk::MAX_MEMORY_TYPES);
        memory.memory_types[..type_count].copy_from_slice(&types[..type_count]);
        memory.memory_type_count = type_count as u32;

        Self {
            memory,
            limits: vk::PhysicalDeviceLimits::default(),
        }
    }

    /// Replace the hardware limits.
    #[must_use]
    pub fn with_limits(mut self, limits: vk::PhysicalDeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Raw memory properties.
    pub fn memory(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory
    }

    /// Hardware limits.
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Reported memory types.
    pub fn memory_types(&self) -> &[vk::MemoryType] {
        let count = (self.memory.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
        &self.memory.memory_types[..count]
    }

    /// Reported memory heaps.
    pub fn memory_heaps(&self) -> &[vk::MemoryHeap] {
        let count = (self.memory.memory_heap_count as usize).min(vk::MAX_MEMORY_HEAPS);
        &self.memory.memory_heaps[..count]
    }

    /// Heap backing the given memory type.
    pub fn heap_for_type(&self, type_index: u32) -> Option<&vk::MemoryHeap> {
        let memory_type = self.memory_types().get(type_index as usize)?;
        self.memory_heaps().get(memory_type.heap_index as usize)
    }

    /// Lowest memory type index allowed by `type_bits` whose flags contain
    /// `properties`.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        self.memory_types()
            .iter()
            .enumerate()
            .find(|(i, memory_type)| {
                type_bits & (1 << i) != 0 && memory_type.property_flags.contains(properties)
            })
            .map(|(i, _)| i as u32)
    }

    /// Total size of device-local heaps in bytes.
    pub fn device_local_bytes(&self) -> u64 {
        self.memory_heaps()
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} memory types, {} heaps, {} MB device-local, max {} allocations",
            self.memory_types().len(),
            self.memory_heaps().len(),
            self.device_local_bytes() / (1024 * 1024),
            self.limits.max_memory_allocation_count,
        )
    }
}
