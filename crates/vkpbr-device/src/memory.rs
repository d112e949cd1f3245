//! Device memory allocation and host mapping.

use ash::vk;
use bytemuck::Pod;
use std::ffi::c_void;
use std::ptr::NonNull;

use crate::backend::DeviceApi;
use crate::error::{AllocatorError, Result};
use crate::properties::DeviceProperties;

/// Host address of a live mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MappedPtr(NonNull<c_void>);

// SAFETY: the allocator never dereferences mapped pointers; callers that write
// through a `MappedRange` go through its unsafe accessors.
unsafe impl Send for MappedPtr {}
// SAFETY: see above.
unsafe impl Sync for MappedPtr {}

/// A host-visible window into a device memory block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRange {
    memory: vk::DeviceMemory,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    ptr: MappedPtr,
}

impl MappedRange {
    /// The mapped memory block.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Offset of the mapping from the start of the block.
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    /// Size of the mapping in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Host pointer to the first mapped byte.
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.0.as_ptr()
    }

    /// Copy raw bytes into the mapping at `offset` (relative to the mapping).
    ///
    /// # Safety
    /// The mapping must still be live: not unmapped and the allocator not
    /// destroyed.
    pub unsafe fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| AllocatorError::OutOfBounds("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(AllocatorError::OutOfBounds(format!(
                "Write of {} bytes at {offset} exceeds mapping of {} bytes",
                data.len(),
                self.size
            )));
        }

        let dst = self.as_ptr().cast::<u8>();
        // SAFETY: the range was checked against the mapping size and the caller
        // guarantees the mapping is live
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst.add(offset as usize), data.len());
        }

        Ok(())
    }

    /// Copy plain-old-data values into the mapping at `offset`.
    ///
    /// # Safety
    /// Same as [`Self::write_bytes`].
    pub unsafe fn write<T: Pod>(&self, offset: vk::DeviceSize, data: &[T]) -> Result<()> {
        unsafe { self.write_bytes(offset, bytemuck::cast_slice(data)) }
    }
}

/// A device memory block owned by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub type_index: u32,
    pub heap_index: u32,
    pub properties: vk::MemoryPropertyFlags,
    pub mapping: Option<MappedRange>,
}

impl MemoryBlock {
    /// Whether the block may be mapped.
    pub fn is_host_visible(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

/// Tracks every allocation and every live mapping.
///
/// Allocations and mappings live in separate lists so teardown can unmap
/// everything before any block is freed.
#[derive(Debug)]
pub struct MemoryAllocator {
    blocks: Vec<MemoryBlock>,
    mapped: Vec<vk::DeviceMemory>,
    heap_usage: [vk::DeviceSize; vk::MAX_MEMORY_HEAPS],
    log_allocations: bool,
}

impl MemoryAllocator {
    /// Create an empty memory tracker.
    pub fn new(log_allocations: bool) -> Self {
        Self {
            blocks: Vec::new(),
            mapped: Vec::new(),
            heap_usage: [0; vk::MAX_MEMORY_HEAPS],
            log_allocations,
        }
    }

    /// Allocate `size` bytes from the lowest memory type allowed by
    /// `type_bits` whose flags contain `properties`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate<D: DeviceApi + ?Sized>(
        &mut self,
        device: &D,
        device_properties: &DeviceProperties,
        size: vk::DeviceSize,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let type_index = device_properties
            .find_memory_type(type_bits, properties)
            .ok_or(AllocatorError::NoCompatibleMemoryType {
                type_bits,
                properties,
            })?;

        let memory_type = device_properties.memory_types()[type_index as usize];
        let heap_index = memory_type.heap_index;
        if let Some(heap) = device_properties.heap_for_type(type_index) {
            let committed = self.heap_usage(heap_index).saturating_add(size);
            if committed > heap.size {
                tracing::warn!(
                    "Allocation of {size} bytes brings heap {heap_index} to {committed} of {} bytes",
                    heap.size
                );
            }
        }

        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(type_index);
        // SAFETY: caller guarantees the device is valid
        let memory = unsafe { device.allocate_memory(&info)? };

        if let Some(usage) = self.heap_usage.get_mut(heap_index as usize) {
            *usage = usage.saturating_add(size);
        }
        self.blocks.push(MemoryBlock {
            memory,
            size,
            type_index,
            heap_index,
            properties: memory_type.property_flags,
            mapping: None,
        });

        if self.log_allocations {
            tracing::debug!(
                "Allocated {size} bytes from memory type {type_index} ({:?})",
                memory_type.property_flags
            );
        }

        Ok(memory)
    }

    /// Map `size` bytes of `memory` starting at `offset`.
    ///
    /// `vk::WHOLE_SIZE` maps from `offset` to the end of the block.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn map<D: DeviceApi + ?Sized>(
        &mut self,
        device: &D,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<MappedRange> {
        let block = self
            .blocks
            .iter_mut()
            .find(|block| block.memory == memory)
            .ok_or(AllocatorError::UnknownMemory(memory))?;

        if !block.is_host_visible() {
            return Err(AllocatorError::NotHostVisible(memory));
        }

        let size = resolve_map_size(offset, size, block.size)?;

        if block.mapping.is_some() {
            return Err(AllocatorError::AlreadyMapped(memory));
        }

        // SAFETY: caller guarantees the device is valid; range checked above
        let ptr = unsafe { device.map_memory(memory, offset, size)? };
        let Some(ptr) = NonNull::new(ptr) else {
            // SAFETY: the native map succeeded, so the block is mapped
            unsafe { device.unmap_memory(memory) };
            return Err(AllocatorError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED));
        };

        let range = MappedRange {
            memory,
            offset,
            size,
            ptr: MappedPtr(ptr),
        };
        block.mapping = Some(range);
        self.mapped.push(memory);

        if self.log_allocations {
            tracing::debug!("Mapped {size} bytes at offset {offset} of {memory:?}");
        }

        Ok(range)
    }

    /// Release a live mapping.
    ///
    /// # Safety
    /// The device must be valid and no pointer into the mapping may be used
    /// afterwards.
    pub unsafe fn unmap<D: DeviceApi + ?Sized>(
        &mut self,
        device: &D,
        memory: vk::DeviceMemory,
    ) -> Result<()> {
        let block = self
            .blocks
            .iter_mut()
            .find(|block| block.memory == memory)
            .ok_or(AllocatorError::UnknownMemory(memory))?;

        if block.mapping.take().is_none() {
            return Err(AllocatorError::NotMapped(memory));
        }
        self.mapped.retain(|&m| m != memory);

        // SAFETY: the block is mapped and owned by this allocator
        unsafe { device.unmap_memory(memory) };
        Ok(())
    }

    /// Unmap every live mapping, then free every block.
    ///
    /// Returns `(unmapped, freed)`.
    ///
    /// # Safety
    /// The device must be valid and no block may be in use.
    pub unsafe fn release_all<D: DeviceApi + ?Sized>(&mut self, device: &D) -> (usize, usize) {
        let mapped = std::mem::take(&mut self.mapped);
        for &memory in &mapped {
            // SAFETY: every entry of the mapped list is a live mapping
            unsafe { device.unmap_memory(memory) };
        }

        let blocks = std::mem::take(&mut self.blocks);
        for block in &blocks {
            // SAFETY: every block was allocated on this device and is unmapped now
            unsafe { device.free_memory(block.memory) };
        }

        self.heap_usage = [0; vk::MAX_MEMORY_HEAPS];
        (mapped.len(), blocks.len())
    }

    /// All live blocks, in allocation order.
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    /// Look up a block by handle.
    pub fn block(&self, memory: vk::DeviceMemory) -> Option<&MemoryBlock> {
        self.blocks.iter().find(|block| block.memory == memory)
    }

    /// Blocks with a live mapping, in mapping order.
    pub fn mapped(&self) -> &[vk::DeviceMemory] {
        &self.mapped
    }

    /// Bytes currently allocated from a heap.
    pub fn heap_usage(&self, heap_index: u32) -> vk::DeviceSize {
        self.heap_usage
            .get(heap_index as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// Validate a map request against the block size and return the byte count.
fn resolve_map_size(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
) -> Result<vk::DeviceSize> {
    let out_of_range = || AllocatorError::MapOutOfRange {
        offset,
        size,
        allocation_size,
    };

    let resolved = if size == vk::WHOLE_SIZE {
        allocation_size.checked_sub(offset).ok_or_else(out_of_range)?
    } else {
        let end = offset.checked_add(size).ok_or_else(out_of_range)?;
        if end > allocation_size {
            return Err(out_of_range());
        }
        size
    };

    if resolved == 0 {
        return Err(out_of_range());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{two_type_layout, DeviceCall, RecordingDevice};

    #[test]
    fn map_range_resolution() {
        assert_eq!(resolve_map_size(0, 64, 64), Ok(64));
        assert_eq!(resolve_map_size(16, vk::WHOLE_SIZE, 64), Ok(48));
        assert!(resolve_map_size(32, 64, 64).is_err());
        assert!(resolve_map_size(64, vk::WHOLE_SIZE, 64).is_err());
        assert!(resolve_map_size(0, 0, 64).is_err());
        assert!(resolve_map_size(u64::MAX - 1, 8, 64).is_err());
    }

    #[test]
    fn unsatisfiable_mask_allocates_nothing() {
        let device = RecordingDevice::new();
        let props = two_type_layout();
        let mut memory = MemoryAllocator::new(false);

        let result = unsafe {
            memory.allocate(&device, &props, 64, 0b100, vk::MemoryPropertyFlags::empty())
        };

        assert!(matches!(
            result,
            Err(AllocatorError::NoCompatibleMemoryType { type_bits: 0b100, .. })
        ));
        assert!(memory.blocks().is_empty());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn heap_usage_tracks_allocations() {
        let device = RecordingDevice::new();
        let props = two_type_layout();
        let mut memory = MemoryAllocator::new(false);

        unsafe {
            memory
                .allocate(&device, &props, 64, 0b01, vk::MemoryPropertyFlags::DEVICE_LOCAL)
                .unwrap();
            memory
                .allocate(&device, &props, 32, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE)
                .unwrap();
        }
        assert_eq!(memory.heap_usage(0), 96);

        let (unmapped, freed) = unsafe { memory.release_all(&device) };
        assert_eq!((unmapped, freed), (0, 2));
        assert_eq!(memory.heap_usage(0), 0);
    }

    #[test]
    fn unmap_releases_mapping_and_allows_remap() {
        let device = RecordingDevice::new();
        let props = two_type_layout();
        let mut memory = MemoryAllocator::new(false);

        let block = unsafe {
            memory
                .allocate(&device, &props, 64, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE)
                .unwrap()
        };
        unsafe {
            memory.map(&device, block, 0, 64).unwrap();
            assert_eq!(
                memory.map(&device, block, 0, 16),
                Err(AllocatorError::AlreadyMapped(block))
            );
            memory.unmap(&device, block).unwrap();
            assert_eq!(
                memory.unmap(&device, block),
                Err(AllocatorError::NotMapped(block))
            );
        }
        assert!(memory.mapped().is_empty());

        let range = unsafe { memory.map(&device, block, 8, vk::WHOLE_SIZE).unwrap() };
        assert_eq!(range.size(), 56);
        assert_eq!(memory.mapped(), &[block]);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::Unmap { .. })),
            1
        );
    }

    #[test]
    fn writes_land_in_mapped_memory() {
        let device = RecordingDevice::new();
        let props = two_type_layout();
        let mut memory = MemoryAllocator::new(false);

        let block = unsafe {
            memory
                .allocate(&device, &props, 16, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE)
                .unwrap()
        };
        let range = unsafe { memory.map(&device, block, 4, 8).unwrap() };

        unsafe {
            range.write::<u16>(2, &[0x0201, 0x0403]).unwrap();
            assert!(range.write_bytes(6, &[0; 4]).is_err());
        }

        let contents = device.memory_contents(block).unwrap();
        assert_eq!(&contents[4..12], &[0, 0, 1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn null_mapping_is_released_and_not_tracked() {
        let device = RecordingDevice::new();
        let props = two_type_layout();
        let mut memory = MemoryAllocator::new(false);

        let block = unsafe {
            memory
                .allocate(&device, &props, 64, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE)
                .unwrap()
        };
        device.return_null_on_next_map();

        let result = unsafe { memory.map(&device, block, 0, 64) };

        assert_eq!(
            result,
            Err(AllocatorError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))
        );
        assert!(memory.mapped().is_empty());
        assert!(memory.block(block).is_some_and(|b| b.mapping.is_none()));
        let calls = device.calls();
        assert!(matches!(calls[calls.len() - 2], DeviceCall::Map { .. }));
        assert!(matches!(calls[calls.len() - 1], DeviceCall::Unmap { .. }));

        // The block can still be mapped, and teardown unmaps it exactly once more.
        unsafe { memory.map(&device, block, 0, 64).unwrap() };
        let (unmapped, freed) = unsafe { memory.release_all(&device) };
        assert_eq!((unmapped, freed), (1, 1));
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::Unmap { .. })),
            2
        );
    }

    #[test]
    fn unknown_memory_is_rejected() {
        use ash::vk::Handle;

        let device = RecordingDevice::new();
        let mut memory = MemoryAllocator::new(false);
        let stray = vk::DeviceMemory::from_raw(0xBAD);

        let result = unsafe { memory.map(&device, stray, 0, 4) };
        assert_eq!(result, Err(AllocatorError::UnknownMemory(stray)));
        assert!(device.calls().is_empty());
    }
}
