//! Device context shared by everything that creates GPU resources.

use ash::vk;
use parking_lot::{Mutex, MutexGuard};

use crate::allocator::ResourceAllocator;
use crate::backend::{AshDevice, DeviceApi};
use crate::error::Result;
use crate::guard::SingleInstance;

/// The process-wide device context.
static ACTIVE: SingleInstance<DeviceContext> = SingleInstance::new("Device context");

/// Resource allocator and device handle for the active logical device.
///
/// Components that create or destroy resources take a `&DeviceContext`.
/// The allocator sits behind a mutex so creation from several threads is
/// serialized at the call boundary.
pub struct DeviceContext<D: DeviceApi = AshDevice> {
    device: vk::Device,
    allocator: Mutex<ResourceAllocator<D>>,
}

impl<D: DeviceApi> DeviceContext<D> {
    /// Wrap an allocator.
    pub fn new(allocator: ResourceAllocator<D>) -> Self {
        Self {
            device: allocator.device(),
            allocator: Mutex::new(allocator),
        }
    }

    /// Logical device handle.
    pub fn device(&self) -> vk::Device {
        self.device
    }

    /// Lock the allocator for creation, allocation or queries.
    pub fn allocator(&self) -> MutexGuard<'_, ResourceAllocator<D>> {
        self.allocator.lock()
    }

    /// Install a context built from `allocator` into `slot`.
    ///
    /// Only the first install into a slot succeeds; later calls are reported
    /// and leave the installed context untouched.
    pub fn install_into(
        slot: &'static SingleInstance<Self>,
        allocator: ResourceAllocator<D>,
    ) -> Result<&'static Self> {
        slot.set(Self::new(allocator))
    }

    /// Release every resource owned by the allocator.
    ///
    /// The device must be idle. Must run before the device is destroyed.
    pub fn destroy(&self) {
        self.allocator.lock().destroy();
    }
}

impl DeviceContext {
    /// Install the process-wide context. See [`Self::install_into`].
    pub fn install(allocator: ResourceAllocator) -> Result<&'static Self> {
        Self::install_into(&ACTIVE, allocator)
    }

    /// The process-wide context.
    ///
    /// # Panics
    /// Panics if [`Self::install`] has not been called.
    pub fn active() -> &'static Self {
        ACTIVE.get()
    }

    /// The process-wide context, if installed.
    pub fn try_active() -> Option<&'static Self> {
        ACTIVE.try_get()
    }
}

/// Handle of the device owned by the process-wide context.
///
/// # Panics
/// Panics if no context has been installed.
pub fn active_device() -> vk::Device {
    DeviceContext::active().device()
}
