//! Object kinds owned by the allocator and their teardown order.

use std::fmt;

/// Category of native object tracked by the resource registry.
///
/// Every kind owns exactly one insertion-ordered container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    DescriptorPool,
    DescriptorSetLayout,
    Buffer,
    Sampler,
    Image,
    BufferView,
    ImageView,
    RenderPass,
    Framebuffer,
    ShaderModule,
    PipelineLayout,
    Semaphore,
    Fence,
    CommandPool,
    Pipeline,
    Swapchain,
}

impl ObjectKind {
    /// Number of object kinds.
    pub const COUNT: usize = 16;

    /// All kinds in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::DescriptorPool,
        Self::DescriptorSetLayout,
        Self::Buffer,
        Self::Sampler,
        Self::Image,
        Self::BufferView,
        Self::ImageView,
        Self::RenderPass,
        Self::Framebuffer,
        Self::ShaderModule,
        Self::PipelineLayout,
        Self::Semaphore,
        Self::Fence,
        Self::CommandPool,
        Self::Pipeline,
        Self::Swapchain,
    ];

    /// Order in which containers are emptied at teardown.
    ///
    /// A kind appears after every kind whose objects may reference it:
    /// command buffers (freed with their pool) reference nearly everything,
    /// pipelines reference layouts, render passes and shader modules,
    /// framebuffers reference render passes and image views, descriptor sets
    /// (freed with their pool) reference layouts, views and samplers, and
    /// views reference images, buffers and swapchain images.
    pub const DESTRUCTION_ORDER: [Self; Self::COUNT] = [
        Self::CommandPool,
        Self::Pipeline,
        Self::Framebuffer,
        Self::RenderPass,
        Self::PipelineLayout,
        Self::ShaderModule,
        Self::DescriptorPool,
        Self::DescriptorSetLayout,
        Self::ImageView,
        Self::BufferView,
        Self::Sampler,
        Self::Swapchain,
        Self::Image,
        Self::Buffer,
        Self::Fence,
        Self::Semaphore,
    ];

    /// Index of this kind's container.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name used in log output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DescriptorPool => "descriptor pool",
            Self::DescriptorSetLayout => "descriptor set layout",
            Self::Buffer => "buffer",
            Self::Sampler => "sampler",
            Self::Image => "image",
            Self::BufferView => "buffer view",
            Self::ImageView => "image view",
            Self::RenderPass => "render pass",
            Self::Framebuffer => "framebuffer",
            Self::ShaderModule => "shader module",
            Self::PipelineLayout => "pipeline layout",
            Self::Semaphore => "semaphore",
            Self::Fence => "fence",
            Self::CommandPool => "command pool",
            Self::Pipeline => "pipeline",
            Self::Swapchain => "swapchain",
        }
    }

    /// Position of this kind in [`Self::DESTRUCTION_ORDER`].
    pub fn teardown_rank(self) -> usize {
        Self::DESTRUCTION_ORDER
            .iter()
            .position(|&kind| kind == self)
            .unwrap_or(Self::COUNT)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_declaration_order() {
        for (i, kind) in ObjectKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn destruction_order_covers_every_kind_once() {
        let mut seen = [false; ObjectKind::COUNT];
        for kind in ObjectKind::DESTRUCTION_ORDER {
            assert!(!seen[kind.index()], "{kind} listed twice");
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn dependents_are_released_first() {
        use ObjectKind::*;

        // (dependent, dependency)
        let edges = [
            (Pipeline, PipelineLayout),
            (Pipeline, RenderPass),
            (Pipeline, ShaderModule),
            (Framebuffer, RenderPass),
            (Framebuffer, ImageView),
            (PipelineLayout, DescriptorSetLayout),
            (DescriptorPool, DescriptorSetLayout),
            (DescriptorPool, Sampler),
            (DescriptorPool, ImageView),
            (DescriptorPool, Buffer),
            (ImageView, Image),
            (ImageView, Swapchain),
            (BufferView, Buffer),
            (CommandPool, Pipeline),
            (CommandPool, Framebuffer),
        ];

        for (dependent, dependency) in edges {
            assert!(
                dependent.teardown_rank() < dependency.teardown_rank(),
                "{dependent} must be destroyed before {dependency}"
            );
        }
    }
}
