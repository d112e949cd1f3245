use ash::vk;
use vkpbr_device::testing::{two_type_layout, DeviceCall, RecordingDevice};
use vkpbr_device::{AllocatorConfig, ObjectKind, ResourceAllocator};

fn allocator() -> ResourceAllocator<RecordingDevice> {
    ResourceAllocator::new(
        RecordingDevice::new(),
        two_type_layout(),
        AllocatorConfig::new("teardown"),
    )
}

/// Create `n` objects of every kind through the named creation operations.
fn populate(alloc: &mut ResourceAllocator<RecordingDevice>, n: usize) {
    for _ in 0..n {
        alloc
            .create_descriptor_pool(&vk::DescriptorPoolCreateInfo::default())
            .unwrap();
        alloc
            .create_descriptor_set_layout(&vk::DescriptorSetLayoutCreateInfo::default())
            .unwrap();
        alloc.create_buffer(&vk::BufferCreateInfo::default()).unwrap();
        alloc.create_sampler(&vk::SamplerCreateInfo::default()).unwrap();
        alloc.create_image(&vk::ImageCreateInfo::default()).unwrap();
        alloc
            .create_buffer_view(&vk::BufferViewCreateInfo::default())
            .unwrap();
        alloc
            .create_image_view(&vk::ImageViewCreateInfo::default())
            .unwrap();
        alloc
            .create_render_pass(&vk::RenderPassCreateInfo::default())
            .unwrap();
        alloc
            .create_framebuffer(&vk::FramebufferCreateInfo::default())
            .unwrap();
        alloc
            .create_shader_module(&vk::ShaderModuleCreateInfo::default())
            .unwrap();
        alloc
            .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default())
            .unwrap();
        alloc
            .create_semaphore(&vk::SemaphoreCreateInfo::default())
            .unwrap();
        alloc.create_fence(&vk::FenceCreateInfo::default()).unwrap();
        alloc
            .create_command_pool(&vk::CommandPoolCreateInfo::default())
            .unwrap();
        alloc
            .create_pipeline(&vk::GraphicsPipelineCreateInfo::default())
            .unwrap();
        alloc
            .create_swapchain(&vk::SwapchainCreateInfoKHR::default())
            .unwrap();
    }
}

#[test]
fn every_kind_is_tracked_and_destroyed_exactly_once() {
    const N: usize = 3;
    let mut alloc = allocator();
    populate(&mut alloc, N);

    for kind in ObjectKind::ALL {
        assert_eq!(alloc.count(kind), N, "{kind} container");
        assert_eq!(alloc.device_api().created(kind), N, "{kind} creations");
    }

    alloc.destroy();

    for kind in ObjectKind::ALL {
        assert_eq!(alloc.count(kind), 0, "{kind} container after destroy");
        assert_eq!(alloc.device_api().destroyed(kind), N, "{kind} destructions");
    }
}

#[test]
fn destruction_runs_kind_by_kind_in_declared_order() {
    let mut alloc = allocator();
    populate(&mut alloc, 2);
    alloc.destroy();

    let kinds: Vec<ObjectKind> = alloc
        .device_api()
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::Destroy { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();

    let expected: Vec<ObjectKind> = ObjectKind::DESTRUCTION_ORDER
        .iter()
        .flat_map(|&kind| [kind, kind])
        .collect();
    assert_eq!(kinds, expected);
}

#[test]
fn handles_within_a_kind_are_destroyed_in_creation_order() {
    let mut alloc = allocator();
    let created: Vec<vk::Buffer> = (0..4)
        .map(|_| alloc.create_buffer(&vk::BufferCreateInfo::default()).unwrap())
        .collect();
    assert_eq!(alloc.handles::<vk::Buffer>(), created);

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
    let expected: Vec<u64> = created.iter().map(|b| vk::Handle::as_raw(*b)).collect();
    assert_eq!(destroyed, expected);
}

#[test]
fn destroy_empties_every_container_and_memory_list() {
    let mut alloc = allocator();
    populate(&mut alloc, 1);
    let host = alloc
        .allocate_memory(64, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE)
        .unwrap();
    alloc
        .allocate_memory(128, 0b01, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        .unwrap();
    alloc.map_memory(host, 0, vk::WHOLE_SIZE).unwrap();
    assert_eq!(alloc.allocations().len(), 2);
    assert_eq!(alloc.mapped_memory(), &[host]);

    alloc.destroy();

    assert!(alloc.registry().is_empty());
    for kind in ObjectKind::ALL {
        assert!(alloc.registry().handles_of(kind).is_empty());
    }
    assert!(alloc.allocations().is_empty());
    assert!(alloc.mapped_memory().is_empty());
    assert_eq!(alloc.heap_usage(0), 0);

    let device = alloc.device_api();
    assert_eq!(
        device.count_calls(|c| matches!(c, DeviceCall::Unmap { .. })),
        1
    );
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::Free { .. })), 2);
}
