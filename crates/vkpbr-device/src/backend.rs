//! Native device calls used by the allocator.
//!
//! [`DeviceApi`] is the seam between the allocator's bookkeeping and the
//! driver. [`AshDevice`] forwards to a real `ash::Device`; the
//! `testing` module (behind the `testing` feature) provides an instrumented
//! stand-in.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::c_void;

use crate::kind::ObjectKind;

/// Creation, destruction and memory calls issued against one logical device.
///
/// # Safety
/// Every method forwards to a Vulkan entry point. Callers must uphold the
/// valid-usage rules of the corresponding `vk*` function.
#[allow(clippy::missing_safety_doc)]
pub trait DeviceApi {
    /// Raw logical device handle.
    fn handle(&self) -> vk::Device;

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool>;
    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout>;
    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer>;
    unsafe fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler>;
    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image>;
    unsafe fn create_buffer_view(
        &self,
        info: &vk::BufferViewCreateInfo<'_>,
    ) -> VkResult<vk::BufferView>;
    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView>;
    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass>;
    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer>;
    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule>;
    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn create_semaphore(
        &self,
        info: &vk::SemaphoreCreateInfo<'_>,
    ) -> VkResult<vk::Semaphore>;
    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence>;
    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool>;

    unsafe fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn create_compute_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::ComputePipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline>;

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR>;

    /// Destroy a registry-tracked object given its kind and raw handle.
    unsafe fn destroy_object(&self, kind: ObjectKind, raw: u64);

    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory>;
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void>;
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
}

/// [`DeviceApi`] backed by a live `ash::Device`.
pub struct AshDevice {
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl AshDevice {
    /// Wrap a logical device.
    ///
    /// The swapchain entry points are loaded eagerly; calling
    /// `create_swapchain` requires `VK_KHR_swapchain` to be enabled on the
    /// device.
    pub fn new(instance: &ash::Instance, device: ash::Device) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);
        Self {
            device,
            swapchain_loader,
        }
    }

    /// The wrapped ash device, for command recording by surrounding code.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }
}

impl DeviceApi for AshDevice {
    fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        unsafe { self.device.create_descriptor_pool(info, None) }
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.device.create_descriptor_set_layout(info, None) }
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        unsafe { self.device.create_buffer(info, None) }
    }

    unsafe fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        unsafe { self.device.create_sampler(info, None) }
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        unsafe { self.device.create_image(info, None) }
    }

    unsafe fn create_buffer_view(
        &self,
        info: &vk::BufferViewCreateInfo<'_>,
    ) -> VkResult<vk::BufferView> {
        unsafe { self.device.create_buffer_view(info, None) }
    }

    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }
    }

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }
    }

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        unsafe { self.device.create_shader_module(info, None) }
    }

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(info, None) }
    }

    unsafe fn create_semaphore(
        &self,
        info: &vk::SemaphoreCreateInfo<'_>,
    ) -> VkResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(info, None) }
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        unsafe { self.device.create_fence(info, None) }
    }

    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, None) }
    }

    unsafe fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(cache, std::slice::from_ref(info), None)
        }
        .map_err(|(_pipelines, e)| e)?;
        Ok(pipelines[0])
    }

    unsafe fn create_compute_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::ComputePipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(cache, std::slice::from_ref(info), None)
        }
        .map_err(|(_pipelines, e)| e)?;
        Ok(pipelines[0])
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    unsafe fn destroy_object(&self, kind: ObjectKind, raw: u64) {
        use vk::Handle;

        let device = &self.device;
        unsafe {
            match kind {
                ObjectKind::DescriptorPool => {
                    device.destroy_descriptor_pool(vk::DescriptorPool::from_raw(raw), None);
                }
                ObjectKind::DescriptorSetLayout => {
                    device.destroy_descriptor_set_layout(
                        vk::DescriptorSetLayout::from_raw(raw),
                        None,
                    );
                }
                ObjectKind::Buffer => device.destroy_buffer(vk::Buffer::from_raw(raw), None),
                ObjectKind::Sampler => device.destroy_sampler(vk::Sampler::from_raw(raw), None),
                ObjectKind::Image => device.destroy_image(vk::Image::from_raw(raw), None),
                ObjectKind::BufferView => {
                    device.destroy_buffer_view(vk::BufferView::from_raw(raw), None);
                }
                ObjectKind::ImageView => {
                    device.destroy_image_view(vk::ImageView::from_raw(raw), None);
                }
                ObjectKind::RenderPass => {
                    device.destroy_render_pass(vk::RenderPass::from_raw(raw), None);
                }
                ObjectKind::Framebuffer => {
                    device.destroy_framebuffer(vk::Framebuffer::from_raw(raw), None);
                }
                ObjectKind::ShaderModule => {
                    device.destroy_shader_module(vk::ShaderModule::from_raw(raw), None);
                }
                ObjectKind::PipelineLayout => {
                    device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(raw), None);
                }
                ObjectKind::Semaphore => {
                    device.destroy_semaphore(vk::Semaphore::from_raw(raw), None);
                }
                ObjectKind::Fence => device.destroy_fence(vk::Fence::from_raw(raw), None),
                ObjectKind::CommandPool => {
                    device.destroy_command_pool(vk::CommandPool::from_raw(raw), None);
                }
                ObjectKind::Pipeline => device.destroy_pipeline(vk::Pipeline::from_raw(raw), None),
                ObjectKind::Swapchain => self
                    .swapchain_loader
                    .destroy_swapchain(vk::SwapchainKHR::from_raw(raw), None),
            }
        }
    }

    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        unsafe { self.device.allocate_memory(info, None) }
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        unsafe {
            self.device
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
        }
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }
}
