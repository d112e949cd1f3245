//! Headless Vulkan instance and device bring-up.

use std::ffi::{CStr, CString};

use anyhow::{anyhow, Context};
use ash::vk;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance, physical device and logical device for one probe run.
pub struct HeadlessDevice {
    // Entry must outlive the instance
    _entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family: u32,
}

impl HeadlessDevice {
    /// Load Vulkan and create a device with a single graphics queue.
    pub fn new(app_name: &str, enable_validation: bool) -> anyhow::Result<Self> {
        // SAFETY: loading the system Vulkan library
        let entry = unsafe { ash::Entry::load() }.context("Vulkan loader not found")?;
        let instance = unsafe { create_instance(&entry, app_name, enable_validation) }?;

        let selected = unsafe { select_physical_device(&instance) };
        let (physical_device, queue_family) = match selected {
            Ok(found) => found,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let priority = 1.0_f32;
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(std::slice::from_ref(&priority));
        let device_info =
            vk::DeviceCreateInfo::default().queue_create_infos(std::slice::from_ref(&queue_info));

        let device = match unsafe { instance.create_device(physical_device, &device_info, None) } {
            Ok(device) => device,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e).context("logical device creation failed");
            }
        };

        Ok(Self {
            _entry: entry,
            instance,
            physical_device,
            device,
            queue_family,
        })
    }

    /// Destroy the device and instance.
    ///
    /// # Safety
    /// Every object created on the device must already be destroyed.
    pub unsafe fn destroy(self) {
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Create an instance without surface extensions.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> anyhow::Result<ash::Instance> {
    let app_name = CString::new(app_name).context("application name contains a NUL byte")?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"vkpbr")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_2);

    let mut layer_names: Vec<*const std::ffi::c_char> = Vec::new();
    if enable_validation {
        let available = unsafe { entry.enumerate_instance_layer_properties() }?;
        let found = available
            .iter()
            .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if found {
            layer_names.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!("Validation layer {:?} not available", VALIDATION_LAYER);
        }
    }

    #[cfg(target_os = "macos")]
    let (create_flags, extension_names) = (
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR,
        vec![ash::khr::portability_enumeration::NAME.as_ptr()],
    );
    #[cfg(not(target_os = "macos"))]
    let (create_flags, extension_names): (_, Vec<*const std::ffi::c_char>) =
        (vk::InstanceCreateFlags::empty(), Vec::new());

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(&extension_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None) }?;
    Ok(instance)
}

/// Pick the highest-scoring physical device that has a graphics queue.
///
/// # Safety
/// The instance must be valid.
unsafe fn select_physical_device(
    instance: &ash::Instance,
) -> anyhow::Result<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }?;

    devices
        .into_iter()
        .filter_map(|device| {
            let family = unsafe { graphics_queue_family(instance, device) }?;
            let score = unsafe { score_physical_device(instance, device) };
            Some((score, device, family))
        })
        .max_by_key(|(score, ..)| *score)
        .map(|(_, device, family)| (device, family))
        .ok_or_else(|| anyhow!("no Vulkan device with a graphics queue"))
}

unsafe fn graphics_queue_family(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .and_then(|index| u32::try_from(index).ok())
}

unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> u64 {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory = unsafe { instance.get_physical_device_memory_properties(device) };

    let kind = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };

    // +1 per GB of device-local memory
    let vram_gb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size >> 30)
        .sum();

    kind + vram_gb
}
