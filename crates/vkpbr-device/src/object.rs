//! Typed access to the registry's per-kind containers.

use ash::prelude::VkResult;
use ash::vk;

use crate::backend::DeviceApi;
use crate::kind::ObjectKind;

/// A native handle type that follows the plain create/destroy pattern.
///
/// Implemented once per simple object kind; pipelines and swapchains have
/// their own creation paths but share [`RegisteredHandle`].
pub trait DeviceObject: RegisteredHandle {
    /// Creation descriptor forwarded verbatim to the native call.
    type CreateInfo<'a>;

    /// Issue the native creation call.
    ///
    /// # Safety
    /// `info` must satisfy the valid-usage rules of the native call.
    unsafe fn create<D: DeviceApi + ?Sized>(
        device: &D,
        info: &Self::CreateInfo<'_>,
    ) -> VkResult<Self>;
}

/// A native handle stored in one of the registry's containers.
pub trait RegisteredHandle: vk::Handle + Copy {
    /// Container this handle type lives in.
    const KIND: ObjectKind;
}

macro_rules! device_objects {
    ($($handle:ident => $kind:ident, $info:ident, $create:ident;)+) => {
        $(
            impl RegisteredHandle for vk::$handle {
                const KIND: ObjectKind = ObjectKind::$kind;
            }

            impl DeviceObject for vk::$handle {
                type CreateInfo<'a> = vk::$info<'a>;

                unsafe fn create<D: DeviceApi + ?Sized>(
                    device: &D,
                    info: &Self::CreateInfo<'_>,
                ) -> VkResult<Self> {
                    unsafe { device.$create(info) }
                }
            }
        )+
    };
}

device_objects! {
    DescriptorPool => DescriptorPool, DescriptorPoolCreateInfo, create_descriptor_pool;
    DescriptorSetLayout => DescriptorSetLayout, DescriptorSetLayoutCreateInfo, create_descriptor_set_layout;
    Buffer => Buffer, BufferCreateInfo, create_buffer;
    Sampler => Sampler, SamplerCreateInfo, create_sampler;
    Image => Image, ImageCreateInfo, create_image;
    BufferView => BufferView, BufferViewCreateInfo, create_buffer_view;
    ImageView => ImageView, ImageViewCreateInfo, create_image_view;
    RenderPass => RenderPass, RenderPassCreateInfo, create_render_pass;
    Framebuffer => Framebuffer, FramebufferCreateInfo, create_framebuffer;
    ShaderModule => ShaderModule, ShaderModuleCreateInfo, create_shader_module;
    PipelineLayout => PipelineLayout, PipelineLayoutCreateInfo, create_pipeline_layout;
    Semaphore => Semaphore, SemaphoreCreateInfo, create_semaphore;
    Fence => Fence, FenceCreateInfo, create_fence;
    CommandPool => CommandPool, CommandPoolCreateInfo, create_command_pool;
}

impl RegisteredHandle for vk::Pipeline {
    const KIND: ObjectKind = ObjectKind::Pipeline;
}

impl RegisteredHandle for vk::SwapchainKHR {
    const KIND: ObjectKind = ObjectKind::Swapchain;
}
