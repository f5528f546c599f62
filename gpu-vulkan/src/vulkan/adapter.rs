//! Physical-device enumeration: queue-family selection, memory-type
//! properties, and the `PrivateCapabilities`/`Workarounds` trio queried at
//! enumeration time (SPEC_FULL §3.1).

use ash::vk;

use super::{Adapter, Device, DeviceShared, Instance, PrivateCapabilities, Queue, Workarounds};
use crate::error::InitError;

const VENDOR_ID_NVIDIA: u32 = 0x10de;

impl Instance {
    /// # Safety
    /// The instance must outlive every `Adapter` returned.
    pub unsafe fn enumerate_adapters(&self) -> Vec<Adapter> {
        let raw = &self.shared.raw;
        let physical_devices = match unsafe { raw.enumerate_physical_devices() } {
            Ok(devices) => devices,
            Err(err) => {
                log::warn!("vkEnumeratePhysicalDevices failed: {err:?}");
                return Vec::new();
            }
        };

        physical_devices
            .into_iter()
            .filter_map(|pd| unsafe { self.adapter_from_physical_device(pd) })
            .collect()
    }

    unsafe fn adapter_from_physical_device(&self, raw: vk::PhysicalDevice) -> Option<Adapter> {
        let instance = &self.shared.raw;
        let properties = unsafe { instance.get_physical_device_properties(raw) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(raw) };

        if !supports_graphics_and_compute_queue(instance, raw) {
            log::warn!(
                "physical device {:?} has no queue family with graphics+compute, skipping",
                unsafe { std::ffi::CStr::from_ptr(properties.device_name.as_ptr()) }
            );
            return None;
        }

        let features = unsafe { instance.get_physical_device_features(raw) };
        let private_caps = PrivateCapabilities {
            multi_draw_indirect: features.multi_draw_indirect == vk::TRUE,
            bar_memory: memory_properties.memory_types[..memory_properties.memory_type_count as usize]
                .iter()
                .any(|ty| {
                    ty.property_flags.contains(
                        vk::MemoryPropertyFlags::DEVICE_LOCAL
                            | vk::MemoryPropertyFlags::HOST_VISIBLE
                            | vk::MemoryPropertyFlags::HOST_COHERENT,
                    )
                }),
            host_cached_memory: memory_properties.memory_types[..memory_properties.memory_type_count as usize]
                .iter()
                .any(|ty| ty.property_flags.contains(vk::MemoryPropertyFlags::HOST_CACHED)),
        };

        let mut workarounds = Workarounds::empty();
        if properties.vendor_id == VENDOR_ID_NVIDIA {
            // Empty `pResolveAttachments` pointers upset some Qualcomm/Nvidia
            // drivers when a subpass has zero color attachments.
            workarounds |= Workarounds::EMPTY_RESOLVE_ATTACHMENT_LISTS;
        }

        Some(Adapter {
            raw,
            instance: self.shared.clone(),
            memory_properties,
            min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
            private_caps,
            workarounds,
        })
    }
}

fn supports_graphics_and_compute_queue(instance: &ash::Instance, raw: vk::PhysicalDevice) -> bool {
    queue_family_index(instance, raw).is_some()
}

/// First queue family advertising both `GRAPHICS` and `COMPUTE` (§5: a
/// single unified queue carries all command kinds).
fn queue_family_index(instance: &ash::Instance, raw: vk::PhysicalDevice) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(raw) };
    families.iter().position(|family| {
        family.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE) && family.queue_count > 0
    }).map(|index| index as u32)
}

impl Adapter {
    /// # Safety
    /// `self` must outlive the returned `Device`/`Queue` pair.
    pub unsafe fn open(&self) -> Result<(Device, Queue), InitError> {
        let instance = &self.instance.raw;
        let queue_family_index =
            queue_family_index(instance, self.raw).ok_or(InitError::NoSuitableAdapter)?;

        let queue_priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)
            .build();

        let enabled_extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let features = vk::PhysicalDeviceFeatures::builder()
            .multi_draw_indirect(self.private_caps.multi_draw_indirect)
            .sampler_anisotropy(true)
            .independent_blend(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&enabled_extensions)
            .enabled_features(&features)
            .build();

        let raw_device = unsafe { instance.create_device(self.raw, &create_info, None) }.map_err(InitError::DeviceCreation)?;
        let raw_queue = unsafe { raw_device.get_device_queue(queue_family_index, 0) };

        let memory_type_count = self.memory_properties.memory_type_count as usize;
        let allocators = (0..memory_type_count)
            .map(|index| parking_lot::Mutex::new(super::alloc::SubAllocator::new(index as u32)))
            .collect();
        let memory_locks = (0..memory_type_count).map(|_| parking_lot::Mutex::new(())).collect();

        let shared = std::sync::Arc::new(DeviceShared {
            raw: raw_device,
            instance: self.instance.clone(),
            physical_device: self.raw,
            queue_family_index,
            raw_queue,
            private_caps: self.private_caps.clone(),
            workarounds: self.workarounds,
            min_uniform_buffer_offset_alignment: self.min_uniform_buffer_offset_alignment,
            render_passes: parking_lot::Mutex::new(rustc_hash::FxHashMap::default()),
            framebuffers: parking_lot::Mutex::new(super::cache::FramebufferCache::default()),
            pipeline_layouts: parking_lot::Mutex::new(rustc_hash::FxHashMap::default()),
            descriptor_layouts: parking_lot::Mutex::new(Default::default()),
            deletion: parking_lot::Mutex::new(Default::default()),
            allocators,
            memory_locks,
            command_pools: Default::default(),
            descriptor_cache_pool: parking_lot::Mutex::new(Vec::new()),
            uniform_buffer_pool: parking_lot::Mutex::new(Vec::new()),
            fence_pool: parking_lot::Mutex::new(Vec::new()),
            submitted_generation: std::sync::atomic::AtomicU64::new(0),
            defrag_in_progress: std::sync::atomic::AtomicBool::new(false),
        });

        let swapchain_fn = ash::extensions::khr::Swapchain::new(instance, &shared.raw);

        let device = Device { shared: shared.clone() };
        let queue = Queue {
            raw: raw_queue,
            device: shared,
            swapchain_fn,
            submit_lock: parking_lot::Mutex::new(()),
        };

        Ok((device, queue))
    }

    /// Index of the first memory type whose flags match `wanted`, used by
    /// `SubAllocator::select_memory_type` callers that already have an
    /// `Adapter` in hand rather than a raw `vkGetBufferMemoryRequirements`
    /// result (§4.1).
    pub fn find_memory_type_index(&self, type_filter: u32, wanted: vk::MemoryPropertyFlags) -> Option<u32> {
        (0..self.memory_properties.memory_type_count).find(|&index| {
            let bit_set = type_filter & (1 << index) != 0;
            bit_set && self.memory_properties.memory_types[index as usize].property_flags.contains(wanted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvidia_vendor_id_is_the_workaround_trigger() {
        assert_eq!(VENDOR_ID_NVIDIA, 0x10de);
    }
}
