//! Allocator error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the resource allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
    /// A native creation, allocation or mapping call was rejected by the driver.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No memory type satisfies both the type mask and the property flags.
    #[error("No memory type matches type bits {type_bits:#b} with properties {properties:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Mapping was requested for memory without `HOST_VISIBLE`.
    #[error("Memory {0:?} was not allocated host-visible")]
    NotHostVisible(vk::DeviceMemory),

    /// The requested mapping range does not fit inside the allocation.
    #[error("Map range {offset}+{size} exceeds allocation of {allocation_size} bytes")]
    MapOutOfRange {
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        allocation_size: vk::DeviceSize,
    },

    /// The memory already has a live mapping.
    #[error("Memory {0:?} is already mapped")]
    AlreadyMapped(vk::DeviceMemory),

    /// Unmap was requested for memory without a live mapping.
    #[error("Memory {0:?} is not mapped")]
    NotMapped(vk::DeviceMemory),

    /// The memory handle was not allocated through this allocator.
    #[error("Memory {0:?} is not owned by this allocator")]
    UnknownMemory(vk::DeviceMemory),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(vk::Result),

    /// A write into a mapped range fell outside it.
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// The single-instance slot was already filled.
    #[error("Allocator already initialized")]
    AlreadyInitialized,

    /// The allocator was used after `destroy()`.
    #[error("Allocator used after destroy()")]
    Destroyed,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, AllocatorError>;
