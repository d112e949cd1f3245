//! Device-scoped Vulkan resource allocator for the vkpbr renderer.
//!
//! This crate provides:
//! - Per-kind ownership of every object created on the device
//! - Memory type selection, allocation and host mapping
//! - Graphics and compute pipeline creation
//! - Swapchain creation
//! - Dependency-ordered teardown of all of the above
//! - A single process-wide device context

pub mod allocator;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod kind;
pub mod memory;
pub mod object;
pub mod pipeline;
pub mod properties;
pub mod registry;
pub mod swapchain;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use allocator::ResourceAllocator;
pub use backend::{AshDevice, DeviceApi};
pub use config::{AllocatorConfig, AllocatorDebugSettings};
pub use context::{active_device, DeviceContext};
pub use error::{AllocatorError, Result};
pub use guard::SingleInstance;
pub use kind::ObjectKind;
pub use memory::{MappedRange, MemoryBlock};
pub use object::{DeviceObject, RegisteredHandle};
pub use pipeline::PipelineDesc;
pub use properties::DeviceProperties;
pub use registry::ResourceRegistry;
