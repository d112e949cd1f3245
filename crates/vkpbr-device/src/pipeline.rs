//! Graphics and compute pipeline creation.
//!
//! Both creation paths need a different descriptor and native call, so they
//! sit beside the registry's generic path but share its pipeline container.

use ash::vk;

use crate::allocator::ResourceAllocator;
use crate::backend::DeviceApi;
use crate::error::{AllocatorError, Result};

/// Descriptor for either pipeline kind.
#[derive(Clone, Copy)]
pub enum PipelineDesc<'r, 'a> {
    Graphics(&'r vk::GraphicsPipelineCreateInfo<'a>),
    Compute(&'r vk::ComputePipelineCreateInfo<'a>),
}

impl PipelineDesc<'_, '_> {
    /// Bind point of the pipeline this descriptor creates.
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        match self {
            Self::Graphics(_) => vk::PipelineBindPoint::GRAPHICS,
            Self::Compute(_) => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

impl<'r, 'a> From<&'r vk::GraphicsPipelineCreateInfo<'a>> for PipelineDesc<'r, 'a> {
    fn from(info: &'r vk::GraphicsPipelineCreateInfo<'a>) -> Self {
        Self::Graphics(info)
    }
}

impl<'r, 'a> From<&'r vk::ComputePipelineCreateInfo<'a>> for PipelineDesc<'r, 'a> {
    fn from(info: &'r vk::ComputePipelineCreateInfo<'a>) -> Self {
        Self::Compute(info)
    }
}

impl<D: DeviceApi> ResourceAllocator<D> {
    /// Create a pipeline from either descriptor kind.
    ///
    /// ```ignore
    /// let graphics = allocator.create_pipeline(&graphics_info)?;
    /// let compute = allocator.create_pipeline(&compute_info)?;
    /// ```
    pub fn create_pipeline<'r, 'a>(
        &mut self,
        desc: impl Into<PipelineDesc<'r, 'a>>,
    ) -> Result<vk::Pipeline>
    where
        'a: 'r,
    {
        match desc.into() {
            PipelineDesc::Graphics(info) => self.create_graphics_pipeline(info),
            PipelineDesc::Compute(info) => self.create_compute_pipeline(info),
        }
    }

    /// Create and track a graphics pipeline.
    pub fn create_graphics_pipeline(
        &mut self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline> {
        self.ensure_live()?;
        let cache = self.config.pipeline_cache;
        // SAFETY: the device outlives the allocator
        let pipeline = unsafe { self.device.create_graphics_pipeline(cache, info) }
            .map_err(AllocatorError::PipelineCreation)?;
        Ok(self.track(pipeline))
    }

    /// Create and track a compute pipeline.
    pub fn create_compute_pipeline(
        &mut self,
        info: &vk::ComputePipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline> {
        self.ensure_live()?;
        let cache = self.config.pipeline_cache;
        // SAFETY: the device outlives the allocator
        let pipeline = unsafe { self.device.create_compute_pipeline(cache, info) }
            .map_err(AllocatorError::PipelineCreation)?;
        Ok(self.track(pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use crate::kind::ObjectKind;
    use crate::testing::{two_type_layout, DeviceCall, RecordingDevice};

    #[test]
    fn both_paths_share_the_pipeline_container() {
        let mut alloc = ResourceAllocator::new(
            RecordingDevice::new(),
            two_type_layout(),
            AllocatorConfig::default(),
        );
        let graphics_info = vk::GraphicsPipelineCreateInfo::default();
        let compute_info = vk::ComputePipelineCreateInfo::default();

        let graphics = alloc.create_pipeline(&graphics_info).unwrap();
        let compute = alloc.create_pipeline(&compute_info).unwrap();

        assert_eq!(alloc.handles::<vk::Pipeline>(), vec![graphics, compute]);
        let bind_points: Vec<_> = alloc
            .device_api()
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::CreatePipeline { bind_point, .. } => Some(bind_point),
                _ => None,
            })
            .collect();
        assert_eq!(
            bind_points,
            vec![vk::PipelineBindPoint::GRAPHICS, vk::PipelineBindPoint::COMPUTE]
        );

        alloc.destroy();
        assert_eq!(alloc.device_api().destroyed(ObjectKind::Pipeline), 2);
    }

    #[test]
    fn pipeline_failure_is_reported() {
        let mut alloc = ResourceAllocator::new(
            RecordingDevice::new(),
            two_type_layout(),
            AllocatorConfig::default(),
        );
        alloc
            .device_api()
            .fail_next_call(vk::Result::ERROR_INVALID_SHADER_NV);

        let result = alloc.create_compute_pipeline(&vk::ComputePipelineCreateInfo::default());

        assert_eq!(
            result,
            Err(AllocatorError::PipelineCreation(
                vk::Result::ERROR_INVALID_SHADER_NV
            ))
        );
        assert_eq!(alloc.count(ObjectKind::Pipeline), 0);
        alloc.destroy();
    }

    #[test]
    fn descriptor_reports_bind_point() {
        let info = vk::ComputePipelineCreateInfo::default();
        assert_eq!(
            PipelineDesc::from(&info).bind_point(),
            vk::PipelineBindPoint::COMPUTE
        );
    }
}
