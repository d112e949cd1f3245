//! Allocator configuration.

use ash::vk;

/// Controls which allocator events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorDebugSettings {
    /// Log every object creation at debug level.
    pub log_creations: bool,
    /// Log every memory allocation and mapping at debug level.
    pub log_allocations: bool,
    /// Log a per-kind summary when `destroy()` runs.
    pub log_teardown: bool,
    /// Warn when the allocator is dropped while still owning objects.
    pub log_leaks_on_drop: bool,
}

impl Default for AllocatorDebugSettings {
    fn default() -> Self {
        Self {
            log_creations: false,
            log_allocations: cfg!(debug_assertions),
            log_teardown: true,
            log_leaks_on_drop: true,
        }
    }
}

/// Allocator configuration.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Name attached to log output.
    pub label: String,
    /// Property flags used by `allocate_memory_default`.
    pub default_memory_properties: vk::MemoryPropertyFlags,
    /// Pipeline cache passed to both pipeline creation paths.
    pub pipeline_cache: vk::PipelineCache,
    /// Logging switches.
    pub debug: AllocatorDebugSettings,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            label: "vkpbr".to_string(),
            default_memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            pipeline_cache: vk::PipelineCache::null(),
            debug: AllocatorDebugSettings::default(),
        }
    }
}

impl AllocatorConfig {
    /// Create a config with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Set the default memory property flags.
    #[must_use]
    pub fn with_default_memory_properties(mut self, properties: vk::MemoryPropertyFlags) -> Self {
        self.default_memory_properties = properties;
        self
    }

    /// Use a pipeline cache for pipeline creation.
    #[must_use]
    pub fn with_pipeline_cache(mut self, cache: vk::PipelineCache) -> Self {
        self.pipeline_cache = cache;
        self
    }

    /// Replace the logging switches.
    #[must_use]
    pub fn with_debug(mut self, debug: AllocatorDebugSettings) -> Self {
        self.debug = debug;
        self
    }
}
