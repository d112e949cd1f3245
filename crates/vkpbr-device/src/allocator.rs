//! The device resource allocator.

use ash::vk;

use crate::backend::{AshDevice, DeviceApi};
use crate::config::AllocatorConfig;
use crate::error::{AllocatorError, Result};
use crate::kind::ObjectKind;
use crate::memory::{MappedRange, MemoryAllocator, MemoryBlock};
use crate::object::{DeviceObject, RegisteredHandle};
use crate::properties::DeviceProperties;
use crate::registry::ResourceRegistry;

/// Owns every object and memory block created on one logical device.
///
/// Handles returned by the creation methods stay valid until [`destroy`]
/// runs; callers may use them freely but must never destroy them
/// themselves. `destroy()` must be the last call before the device itself
/// is destroyed.
///
/// [`destroy`]: Self::destroy
pub struct ResourceAllocator<D: DeviceApi = AshDevice> {
    pub(crate) device: D,
    pub(crate) properties: DeviceProperties,
    pub(crate) registry: ResourceRegistry,
    pub(crate) memory: MemoryAllocator,
    pub(crate) config: AllocatorConfig,
    pub(crate) destroyed: bool,
}

impl ResourceAllocator<AshDevice> {
    /// Create an allocator for a live logical device, querying the memory
    /// layout and limits of its physical device.
    ///
    /// # Safety
    /// The instance, device and physical device must be valid and the device
    /// must have been created from `physical_device`.
    pub unsafe fn from_vulkan(
        instance: &ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        config: AllocatorConfig,
    ) -> Self {
        // SAFETY: caller guarantees the handles are valid
        let properties = unsafe { DeviceProperties::query(instance, physical_device) };
        Self::new(AshDevice::new(instance, device), properties, config)
    }

    /// The wrapped ash device.
    pub fn ash_device(&self) -> &ash::Device {
        self.device.raw()
    }
}

macro_rules! typed_create {
    ($($name:ident($info:ident) -> $handle:ident;)+) => {
        $(
            #[doc = concat!("Create and track a `vk::", stringify!($handle), "`.")]
            pub fn $name(&mut self, info: &vk::$info<'_>) -> Result<vk::$handle> {
                self.create::<vk::$handle>(info)
            }
        )+
    };
}

impl<D: DeviceApi> ResourceAllocator<D> {
    /// Create an allocator over any device backend.
    pub fn new(device: D, properties: DeviceProperties, config: AllocatorConfig) -> Self {
        tracing::info!("[{}] Resource allocator ready: {}", config.label, properties.summary());

        Self {
            device,
            properties,
            registry: ResourceRegistry::new(),
            memory: MemoryAllocator::new(config.debug.log_allocations),
            config,
            destroyed: false,
        }
    }

    /// Create an object through its native call and take ownership of it.
    ///
    /// The descriptor is forwarded verbatim; invalid descriptors surface as
    /// the native call's own failure.
    pub fn create<T: DeviceObject>(&mut self, info: &T::CreateInfo<'_>) -> Result<T> {
        self.ensure_live()?;
        // SAFETY: the device outlives the allocator; descriptor validity is
        // the driver's to enforce
        let handle = unsafe { T::create(&self.device, info)? };
        Ok(self.track(handle))
    }

    typed_create! {
        create_descriptor_pool(DescriptorPoolCreateInfo) -> DescriptorPool;
        create_descriptor_set_layout(DescriptorSetLayoutCreateInfo) -> DescriptorSetLayout;
        create_buffer(BufferCreateInfo) -> Buffer;
        create_sampler(SamplerCreateInfo) -> Sampler;
        create_image(ImageCreateInfo) -> Image;
        create_buffer_view(BufferViewCreateInfo) -> BufferView;
        create_image_view(ImageViewCreateInfo) -> ImageView;
        create_render_pass(RenderPassCreateInfo) -> RenderPass;
        create_framebuffer(FramebufferCreateInfo) -> Framebuffer;
        create_shader_module(ShaderModuleCreateInfo) -> ShaderModule;
        create_pipeline_layout(PipelineLayoutCreateInfo) -> PipelineLayout;
        create_semaphore(SemaphoreCreateInfo) -> Semaphore;
        create_fence(FenceCreateInfo) -> Fence;
        create_command_pool(CommandPoolCreateInfo) -> CommandPool;
    }

    /// Allocate device memory.
    ///
    /// Selects the lowest memory type index that is set in `type_bits` and
    /// whose property flags contain `properties`.
    pub fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        self.ensure_live()?;
        // SAFETY: the device outlives the allocator
        unsafe {
            self.memory
                .allocate(&self.device, &self.properties, size, type_bits, properties)
        }
    }

    /// Allocate device memory with the configured default property flags.
    pub fn allocate_memory_default(
        &mut self,
        size: vk::DeviceSize,
        type_bits: u32,
    ) -> Result<vk::DeviceMemory> {
        let properties = self.config.default_memory_properties;
        self.allocate_memory(size, type_bits, properties)
    }

    /// Map part of a host-visible allocation.
    ///
    /// The returned range stays valid until [`Self::unmap_memory`] or
    /// [`Self::destroy`].
    pub fn map_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<MappedRange> {
        self.ensure_live()?;
        // SAFETY: the device outlives the allocator
        unsafe { self.memory.map(&self.device, memory, offset, size) }
    }

    /// Release a mapping before teardown.
    pub fn unmap_memory(&mut self, memory: vk::DeviceMemory) -> Result<()> {
        self.ensure_live()?;
        // SAFETY: the device outlives the allocator
        unsafe { self.memory.unmap(&self.device, memory) }
    }

    /// Destroy every tracked object, unmap and free every allocation, and
    /// clear the cached device properties.
    ///
    /// The device must be idle. The allocator cannot create anything
    /// afterwards; a second call does nothing.
    pub fn destroy(&mut self) {
        if self.destroyed {
            tracing::warn!("[{}] destroy() called more than once", self.config.label);
            return;
        }

        if self.config.debug.log_teardown {
            for kind in ObjectKind::DESTRUCTION_ORDER {
                let count = self.registry.count(kind);
                if count > 0 {
                    tracing::debug!("[{}] Releasing {count} {kind}(s)", self.config.label);
                }
            }
        }

        // SAFETY: the caller guarantees the device is idle; every handle and
        // block was created on this device
        let objects = unsafe { self.registry.destroy_all(&self.device) };
        let (unmapped, freed) = unsafe { self.memory.release_all(&self.device) };

        self.properties = DeviceProperties::default();
        self.destroyed = true;

        if self.config.debug.log_teardown {
            tracing::info!(
                "[{}] Destroyed {objects} objects, unmapped {unmapped} and freed {freed} allocations",
                self.config.label
            );
        }
    }

    /// Whether [`Self::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Logical device handle.
    pub fn device(&self) -> vk::Device {
        self.device.handle()
    }

    /// Device backend.
    pub fn device_api(&self) -> &D {
        &self.device
    }

    /// Cached hardware limits.
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        self.properties.limits()
    }

    /// Cached memory layout and limits.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Allocator configuration.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Per-kind ownership containers.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Tracked handles of one kind, in creation order.
    pub fn handles<T: RegisteredHandle>(&self) -> Vec<T> {
        self.registry.handles::<T>().collect()
    }

    /// Number of tracked handles of one kind.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.registry.count(kind)
    }

    /// Every live allocation.
    pub fn allocations(&self) -> &[MemoryBlock] {
        self.memory.blocks()
    }

    /// Allocations with a live mapping.
    pub fn mapped_memory(&self) -> &[vk::DeviceMemory] {
        self.memory.mapped()
    }

    /// Look up one allocation.
    pub fn memory_block(&self, memory: vk::DeviceMemory) -> Option<&MemoryBlock> {
        self.memory.block(memory)
    }

    /// Bytes allocated so far from a heap.
    pub fn heap_usage(&self, heap_index: u32) -> vk::DeviceSize {
        self.memory.heap_usage(heap_index)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            return Err(AllocatorError::Destroyed);
        }
        Ok(())
    }

    pub(crate) fn track<T: RegisteredHandle>(&mut self, handle: T) -> T {
        self.registry.record(handle);
        if self.config.debug.log_creations {
            tracing::debug!(
                "[{}] Created {} {:#x}",
                self.config.label,
                T::KIND,
                handle.as_raw()
            );
        }
        handle
    }
}

impl<D: DeviceApi> Drop for ResourceAllocator<D> {
    fn drop(&mut self) {
        if self.destroyed || !self.config.debug.log_leaks_on_drop {
            return;
        }

        let objects = self.registry.total();
        let blocks = self.memory.blocks().len();
        if objects > 0 || blocks > 0 {
            tracing::warn!(
                "[{}] Dropped without destroy(): leaking {objects} objects and {blocks} allocations",
                self.config.label
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{two_type_layout, DeviceCall, RecordingDevice};

    fn allocator() -> ResourceAllocator<RecordingDevice> {
        ResourceAllocator::new(
            RecordingDevice::new(),
            two_type_layout(),
            AllocatorConfig::new("test"),
        )
    }

    #[test]
    fn creations_are_tracked_per_kind() {
        let mut alloc = allocator();

        let a = alloc.create_buffer(&vk::BufferCreateInfo::default()).unwrap();
        let b = alloc.create_buffer(&vk::BufferCreateInfo::default()).unwrap();
        let fence = alloc.create_fence(&vk::FenceCreateInfo::default()).unwrap();

        assert_eq!(alloc.handles::<vk::Buffer>(), vec![a, b]);
        assert_eq!(alloc.handles::<vk::Fence>(), vec![fence]);
        assert_eq!(alloc.count(ObjectKind::Image), 0);
        alloc.destroy();
    }

    #[test]
    fn native_failure_records_nothing() {
        let mut alloc = allocator();
        alloc
            .device_api()
            .fail_next_call(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        let result = alloc.create_image(&vk::ImageCreateInfo::default());

        assert_eq!(
            result,
            Err(AllocatorError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        );
        assert_eq!(alloc.count(ObjectKind::Image), 0);
        alloc.destroy();
        assert_eq!(alloc.device_api().destroyed(ObjectKind::Image), 0);
    }

    #[test]
    fn default_properties_come_from_config() {
        let mut alloc = ResourceAllocator::new(
            RecordingDevice::new(),
            two_type_layout(),
            AllocatorConfig::new("test")
                .with_default_memory_properties(vk::MemoryPropertyFlags::HOST_VISIBLE),
        );

        let memory = alloc.allocate_memory_default(32, 0b11).unwrap();

        assert_eq!(alloc.memory_block(memory).map(|b| b.type_index), Some(1));
        alloc.destroy();
    }

    #[test]
    fn destroy_unmaps_before_freeing() {
        let mut alloc = allocator();
        let memory = alloc
            .allocate_memory(64, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap();
        alloc.map_memory(memory, 0, 64).unwrap();
        alloc.create_sampler(&vk::SamplerCreateInfo::default()).unwrap();

        alloc.destroy();

        let tail: Vec<DeviceCall> = alloc.device_api().calls().into_iter().rev().take(3).collect();
        assert!(matches!(tail[0], DeviceCall::Free { .. }));
        assert!(matches!(tail[1], DeviceCall::Unmap { .. }));
        assert!(matches!(
            tail[2],
            DeviceCall::Destroy {
                kind: ObjectKind::Sampler,
                ..
            }
        ));
    }

    #[test]
    fn use_after_destroy_is_rejected() {
        let mut alloc = allocator();
        alloc.destroy();

        assert_eq!(
            alloc.create_semaphore(&vk::SemaphoreCreateInfo::default()),
            Err(AllocatorError::Destroyed)
        );
        assert_eq!(
            alloc.allocate_memory(16, 0b11, vk::MemoryPropertyFlags::empty()),
            Err(AllocatorError::Destroyed)
        );
        assert!(alloc.device_api().calls().is_empty());

        // Second destroy is a no-op.
        alloc.destroy();
        assert!(alloc.is_destroyed());
    }

    #[test]
    fn destroy_clears_cached_properties() {
        let mut alloc = allocator();
        assert_eq!(alloc.properties().memory_types().len(), 2);

        alloc.destroy();

        assert!(alloc.properties().memory_types().is_empty());
        assert_eq!(alloc.limits().max_memory_allocation_count, 0);
    }
}
