//! Swapchain creation.

use ash::vk;

use crate::allocator::ResourceAllocator;
use crate::backend::DeviceApi;
use crate::error::Result;

impl<D: DeviceApi> ResourceAllocator<D> {
    /// Create and track a swapchain.
    ///
    /// The surface named in `info` stays owned by the caller and must outlive
    /// [`ResourceAllocator::destroy`], which releases the swapchain after any
    /// image views of its images.
    pub fn create_swapchain(
        &mut self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR> {
        self.ensure_live()?;
        // SAFETY: the device outlives the allocator
        let swapchain = unsafe { self.device.create_swapchain(info)? };

        tracing::debug!(
            "[{}] Swapchain created: {}x{} ({} images, {:?})",
            self.config.label,
            info.image_extent.width,
            info.image_extent.height,
            info.min_image_count,
            info.present_mode
        );

        Ok(self.track(swapchain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use crate::kind::ObjectKind;
    use crate::testing::{two_type_layout, DeviceCall, RecordingDevice};
    use ash::vk::Handle;

    #[test]
    fn swapchain_outlives_views_of_its_images() {
        let mut alloc = ResourceAllocator::new(
            RecordingDevice::new(),
            two_type_layout(),
            AllocatorConfig::default(),
        );

        let info = vk::SwapchainCreateInfoKHR::default()
            .min_image_count(3)
            .image_extent(vk::Extent2D {
                width: 1400,
                height: 1400,
            })
            .present_mode(vk::PresentModeKHR::FIFO);
        let swapchain = alloc.create_swapchain(&info).unwrap();
        let view = alloc
            .create_image_view(&vk::ImageViewCreateInfo::default())
            .unwrap();

        assert_eq!(alloc.handles::<vk::SwapchainKHR>(), vec![swapchain]);
        alloc.destroy();

        let destroyed: Vec<u64> = alloc
            .device_api()
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::Destroy { raw, .. } => Some(raw),
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, vec![view.as_raw(), swapchain.as_raw()]);
        assert_eq!(alloc.count(ObjectKind::Swapchain), 0);
    }
}
