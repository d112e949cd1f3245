//! Instrumented device backend for exercising the allocator without a GPU.
//!
//! [`RecordingDevice`] hands out unique fake handles, backs every memory
//! allocation with host memory so mappings can be written and read back, and
//! logs each native call in order.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::c_void;

use crate::backend::DeviceApi;
use crate::kind::ObjectKind;
use crate::properties::DeviceProperties;

const FIRST_HANDLE: u64 = 0x1000;

/// One native call observed by [`RecordingDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    Create {
        kind: ObjectKind,
        raw: u64,
    },
    CreatePipeline {
        bind_point: vk::PipelineBindPoint,
        raw: u64,
    },
    Destroy {
        kind: ObjectKind,
        raw: u64,
    },
    Allocate {
        memory: u64,
        size: vk::DeviceSize,
        type_index: u32,
    },
    Map {
        memory: u64,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
    Unmap {
        memory: u64,
    },
    Free {
        memory: u64,
    },
}

#[derive(Default)]
struct State {
    next_handle: u64,
    calls: Vec<DeviceCall>,
    fail_next: Option<vk::Result>,
    null_next_map: bool,
    backing: HashMap<u64, Box<[u8]>>,
}

impl State {
    fn issue(&mut self) -> VkResult<u64> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        let raw = FIRST_HANDLE + self.next_handle;
        self.next_handle += 1;
        Ok(raw)
    }
}

/// Stub [`DeviceApi`] that records every call.
#[derive(Default)]
pub struct RecordingDevice {
    state: Mutex<State>,
}

impl RecordingDevice {
    /// Create a device with an empty call log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next creation, allocation or mapping call fail with `result`.
    pub fn fail_next_call(&self, result: vk::Result) {
        self.state.lock().fail_next = Some(result);
    }

    /// Make the next map call report success but hand back a null pointer.
    pub fn return_null_on_next_map(&self) {
        self.state.lock().null_next_map = true;
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls matching a predicate.
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of creation calls that produced an object of `kind`.
    pub fn created(&self, kind: ObjectKind) -> usize {
        self.count_calls(|call| match call {
            DeviceCall::Create { kind: k, .. } => *k == kind,
            DeviceCall::CreatePipeline { .. } => kind == ObjectKind::Pipeline,
            _ => false,
        })
    }

    /// Number of destruction calls for objects of `kind`.
    pub fn destroyed(&self, kind: ObjectKind) -> usize {
        self.count_calls(|call| matches!(call, DeviceCall::Destroy { kind: k, .. } if *k == kind))
    }

    /// Copy of the host bytes backing an allocation, if it is still live.
    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.state
            .lock()
            .backing
            .get(&memory.as_raw())
            .map(|bytes| bytes.to_vec())
    }

    fn create<T: Handle>(&self, kind: ObjectKind) -> VkResult<T> {
        let mut state = self.state.lock();
        let raw = state.issue()?;
        state.calls.push(DeviceCall::Create { kind, raw });
        Ok(T::from_raw(raw))
    }

    fn create_pipeline(&self, bind_point: vk::PipelineBindPoint) -> VkResult<vk::Pipeline> {
        let mut state = self.state.lock();
        let raw = state.issue()?;
        state.calls.push(DeviceCall::CreatePipeline { bind_point, raw });
        Ok(vk::Pipeline::from_raw(raw))
    }
}

impl DeviceApi for RecordingDevice {
    fn handle(&self) -> vk::Device {
        vk::Device::from_raw(0xD0D0)
    }

    unsafe fn create_descriptor_pool(
        &self,
        _info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        self.create(ObjectKind::DescriptorPool)
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        _info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.create(ObjectKind::DescriptorSetLayout)
    }

    unsafe fn create_buffer(&self, _info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        self.create(ObjectKind::Buffer)
    }

    unsafe fn create_sampler(&self, _info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        self.create(ObjectKind::Sampler)
    }

    unsafe fn create_image(&self, _info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        self.create(ObjectKind::Image)
    }

    unsafe fn create_buffer_view(
        &self,
        _info: &vk::BufferViewCreateInfo<'_>,
    ) -> VkResult<vk::BufferView> {
        self.create(ObjectKind::BufferView)
    }

    unsafe fn create_image_view(
        &self,
        _info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        self.create(ObjectKind::ImageView)
    }

    unsafe fn create_render_pass(
        &self,
        _info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        self.create(ObjectKind::RenderPass)
    }

    unsafe fn create_framebuffer(
        &self,
        _info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        self.create(ObjectKind::Framebuffer)
    }

    unsafe fn create_shader_module(
        &self,
        _info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        self.create(ObjectKind::ShaderModule)
    }

    unsafe fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        self.create(ObjectKind::PipelineLayout)
    }

    unsafe fn create_semaphore(
        &self,
        _info: &vk::SemaphoreCreateInfo<'_>,
    ) -> VkResult<vk::Semaphore> {
        self.create(ObjectKind::Semaphore)
    }

    unsafe fn create_fence(&self, _info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        self.create(ObjectKind::Fence)
    }

    unsafe fn create_command_pool(
        &self,
        _info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        self.create(ObjectKind::CommandPool)
    }

    unsafe fn create_graphics_pipeline(
        &self,
        _cache: vk::PipelineCache,
        _info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        self.create_pipeline(vk::PipelineBindPoint::GRAPHICS)
    }

    unsafe fn create_compute_pipeline(
        &self,
        _cache: vk::PipelineCache,
        _info: &vk::ComputePipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        self.create_pipeline(vk::PipelineBindPoint::COMPUTE)
    }

    unsafe fn create_swapchain(
        &self,
        _info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        self.create(ObjectKind::Swapchain)
    }

    unsafe fn destroy_object(&self, kind: ObjectKind, raw: u64) {
        self.state.lock().calls.push(DeviceCall::Destroy { kind, raw });
    }

    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        let mut state = self.state.lock();
        let memory = state.issue()?;
        let len = usize::try_from(info.allocation_size)
            .map_err(|_| vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        state.backing.insert(memory, vec![0u8; len].into_boxed_slice());
        state.calls.push(DeviceCall::Allocate {
            memory,
            size: info.allocation_size,
            type_index: info.memory_type_index,
        });
        Ok(vk::DeviceMemory::from_raw(memory))
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        let raw = memory.as_raw();
        let offset_bytes = usize::try_from(offset).map_err(|_| vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let ptr = match state.backing.get_mut(&raw) {
            Some(bytes) if offset_bytes <= bytes.len() => {
                // SAFETY: offset is within the backing slice
                unsafe { bytes.as_mut_ptr().add(offset_bytes) }
            }
            _ => return Err(vk::Result::ERROR_MEMORY_MAP_FAILED),
        };
        state.calls.push(DeviceCall::Map {
            memory: raw,
            offset,
            size,
        });
        if std::mem::take(&mut state.null_next_map) {
            return Ok(std::ptr::null_mut());
        }
        Ok(ptr.cast())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.state.lock().calls.push(DeviceCall::Unmap {
            memory: memory.as_raw(),
        });
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        state.backing.remove(&memory.as_raw());
        state.calls.push(DeviceCall::Free {
            memory: memory.as_raw(),
        });
    }
}

/// Two memory types over one 256-byte heap: index 0 is device-local only,
/// index 1 is device-local and host-visible.
pub fn two_type_layout() -> DeviceProperties {
    DeviceProperties::with_memory_layout(
        &[vk::MemoryHeap {
            size: 256,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        }],
        &[
            vk::MemoryType {
                property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                heap_index: 0,
            },
            vk::MemoryType {
                property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_VISIBLE,
                heap_index: 0,
            },
        ],
    )
}
