//! vkpbr device probe
//!
//! Brings up a headless Vulkan device, creates a handful of tracked objects
//! and a host-visible buffer through the resource allocator, writes to the
//! mapped memory, then tears everything down.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkpbr-probe -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod instance;

use ash::vk;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vkpbr_device::{AllocatorConfig, DeviceContext, ObjectKind, ResourceAllocator};

use crate::instance::HeadlessDevice;

/// Probe options read from the command line.
#[derive(Debug, Clone)]
struct ProbeConfig {
    /// Enable Vulkan validation layers (default: debug builds only).
    validation: bool,
    /// Size of the host-visible uniform buffer in bytes.
    buffer_size: vk::DeviceSize,
    /// Number of semaphore/fence pairs to create.
    sync_pairs: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            buffer_size: 256,
            sync_pairs: 2,
        }
    }
}

impl ProbeConfig {
    fn from_args() -> Self {
        let mut config = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--validation" => config.validation = true,
                "--no-validation" => config.validation = false,
                "--buffer-size" => {
                    if let Some(v) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                        config.buffer_size = v;
                        i += 1;
                    }
                }
                "--sync-pairs" => {
                    if let Some(v) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                        config.sync_pairs = v;
                        i += 1;
                    }
                }
                other => tracing::warn!("Ignoring unknown argument {other}"),
            }
            i += 1;
        }

        config.buffer_size = config.buffer_size.max(16);
        config
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProbeConfig::from_args();
    info!("Probe config: {config:?}");

    let headless = HeadlessDevice::new("vkpbr-probe", config.validation)?;

    // SAFETY: the device was created from this physical device and instance
    let allocator = unsafe {
        ResourceAllocator::from_vulkan(
            &headless.instance,
            headless.device.clone(),
            headless.physical_device,
            AllocatorConfig::new("probe"),
        )
    };
    let context = DeviceContext::install(allocator)?;

    let result = exercise(context, &config, headless.queue_family);

    if let Err(e) = unsafe { headless.device.device_wait_idle() } {
        tracing::warn!("device_wait_idle failed: {e}");
    }
    context.destroy();
    // SAFETY: the allocator released everything created on the device
    unsafe { headless.destroy() };

    result
}

/// Create one of each object the probe needs and write through mapped memory.
fn exercise(context: &DeviceContext, config: &ProbeConfig, queue_family: u32) -> anyhow::Result<()> {
    let mut allocator = context.allocator();

    let buffer = allocator.create_buffer(
        &vk::BufferCreateInfo::default()
            .size(config.buffer_size)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE),
    )?;

    let requirements = unsafe { allocator.ash_device().get_buffer_memory_requirements(buffer) };
    let memory = allocator.allocate_memory(
        requirements.size,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    unsafe { allocator.ash_device().bind_buffer_memory(buffer, memory, 0) }?;

    let mapped = allocator.map_memory(memory, 0, vk::WHOLE_SIZE)?;
    let floats = usize::try_from(config.buffer_size / 4)?;
    let ramp: Vec<f32> = (0..floats).map(|i| i as f32 / floats as f32).collect();
    // SAFETY: the range stays mapped until the allocator is destroyed
    unsafe { mapped.write(0, &ramp) }?;
    info!("Wrote {} bytes through {:?}", mapped.size(), mapped.memory());

    allocator.create_command_pool(
        &vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
    )?;
    for _ in 0..config.sync_pairs {
        allocator.create_semaphore(&vk::SemaphoreCreateInfo::default())?;
        allocator.create_fence(&vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED))?;
    }

    for kind in ObjectKind::ALL {
        let count = allocator.count(kind);
        if count > 0 {
            info!("{kind}: {count}");
        }
    }
    let heap_index = allocator.memory_block(memory).map_or(0, |block| block.heap_index);
    info!(
        "{} allocation(s), {} mapped, {} bytes on heap {heap_index}",
        allocator.allocations().len(),
        allocator.mapped_memory().len(),
        allocator.heap_usage(heap_index),
    );

    Ok(())
}

fn print_help() {
    eprintln!(
        "vkpbr device probe

USAGE:
    cargo run -p vkpbr-probe -- [OPTIONS]

OPTIONS:
    --validation            Enable Vulkan validation layers
    --no-validation         Disable Vulkan validation layers
    --buffer-size <BYTES>   Size of the mapped uniform buffer (default: 256)
    --sync-pairs <N>        Semaphore/fence pairs to create (default: 2)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
