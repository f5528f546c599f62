//! C4: descriptor-set layout interning and per-command-buffer descriptor-set
//! caches (§4.4). The chained fixed-capacity pool design is grounded on
//! `thundr`'s `DescPool` (`get_ideal_pool`/`add_pool`), generalized here from
//! one layout to a table of interned layouts addressed by `layoutId`.

use std::collections::HashMap;

use ash::vk;

use crate::error::DeviceError;

/// Counts that key an interned [`DescriptorSetLayout`] (§3): "the full
/// counts tuple" the core hashes layouts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorLayoutKey {
    pub stage: vk::ShaderStageFlags,
    pub samplers: u32,
    pub storage_textures: u32,
    pub storage_buffers: u32,
    pub write_storage_textures: u32,
    pub write_storage_buffers: u32,
    pub uniform_buffers: u32,
}

/// An interned `VkDescriptorSetLayout` plus its monotonic `layoutId`, used
/// to index per-command-buffer pool arrays (§3).
#[derive(Debug)]
pub struct DescriptorSetLayout {
    pub raw: vk::DescriptorSetLayout,
    pub layout_id: u32,
    pub key: DescriptorLayoutKey,
}

/// Device-wide table of interned layouts, guarded by the device's own lock
/// (§4.4 "guarded by its own lock").
#[derive(Default)]
pub struct DescriptorLayoutTable {
    by_key: HashMap<DescriptorLayoutKey, std::sync::Arc<DescriptorSetLayout>>,
    next_id: u32,
}

impl DescriptorLayoutTable {
    /// Binding layout within a set: samplers, then sampled-images (read-only
    /// storage textures, declared the same as samplers' image type so
    /// shader declarations are uniform), storage-buffers (read), then
    /// storage-images (write), storage-buffers (write), dynamic-uniform
    /// buffers — each category starts at binding 0 within itself, i.e.
    /// bindings are assigned contiguously across categories in this order
    /// (§4.4).
    pub fn get_or_create(
        &mut self,
        device: &ash::Device,
        key: DescriptorLayoutKey,
    ) -> Result<std::sync::Arc<DescriptorSetLayout>, DeviceError> {
        if let Some(existing) = self.by_key.get(&key) {
            return Ok(existing.clone());
        }

        let mut bindings = Vec::new();
        let mut binding_index = 0u32;
        let mut push_category = |count: u32, ty: vk::DescriptorType, binding_index: &mut u32, bindings: &mut Vec<vk::DescriptorSetLayoutBinding>| {
            for _ in 0..count {
                bindings.push(
                    vk::DescriptorSetLayoutBinding::builder()
                        .binding(*binding_index)
                        .descriptor_type(ty)
                        .descriptor_count(1)
                        .stage_flags(key.stage)
                        .build(),
                );
                *binding_index += 1;
            }
        };
        push_category(key.samplers, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, &mut binding_index, &mut bindings);
        push_category(key.storage_textures, vk::DescriptorType::SAMPLED_IMAGE, &mut binding_index, &mut bindings);
        push_category(key.storage_buffers, vk::DescriptorType::STORAGE_BUFFER, &mut binding_index, &mut bindings);
        push_category(key.write_storage_textures, vk::DescriptorType::STORAGE_IMAGE, &mut binding_index, &mut bindings);
        push_category(key.write_storage_buffers, vk::DescriptorType::STORAGE_BUFFER, &mut binding_index, &mut bindings);
        push_category(key.uniform_buffers, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, &mut binding_index, &mut bindings);

        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings).build();
        let raw = unsafe { device.create_descriptor_set_layout(&info, None) }?;

        let layout_id = self.next_id;
        self.next_id += 1;
        let layout = std::sync::Arc::new(DescriptorSetLayout { raw, layout_id, key });
        self.by_key.insert(key, layout.clone());
        Ok(layout)
    }
}

/// A chain of fixed-capacity Vulkan descriptor pools for one `layoutId`,
/// grounded on `thundr::DescPool`: a `Vec<vk::DescriptorPool>` plus a
/// per-pool capacity, with `get_ideal_pool` scanning linearly for room
/// before allocating a new pool.
pub struct DescriptorSetPool {
    layout: vk::DescriptorSetLayout,
    key: DescriptorLayoutKey,
    pools: Vec<vk::DescriptorPool>,
    /// Monotonic allocation index into a flat, conceptually-infinite set
    /// array; `next % CAPACITY` within `pools[next / CAPACITY]` (§3).
    next: u32,
}

const POOL_CAPACITY: u32 = 128;

impl DescriptorSetPool {
    pub fn new(layout: vk::DescriptorSetLayout, key: DescriptorLayoutKey) -> Self {
        DescriptorSetPool {
            layout,
            key,
            pools: Vec::new(),
            next: 0,
        }
    }

    /// Each pool size is `POOL_CAPACITY * max_descriptors_of_that_type_per_set`:
    /// every one of the `POOL_CAPACITY` sets allocated from a pool carries
    /// up to `key`'s count of that type, so the pool must reserve enough
    /// descriptors for all of them at once. Types absent from this layout
    /// (count 0) are omitted — Vulkan requires `descriptorCount > 0` for
    /// every `VkDescriptorPoolSize` entry.
    fn add_pool(&mut self, device: &ash::Device) -> Result<(), DeviceError> {
        let mut sizes = Vec::new();
        let mut push = |ty: vk::DescriptorType, count: u32| {
            if count > 0 {
                sizes.push(vk::DescriptorPoolSize::builder().ty(ty).descriptor_count(POOL_CAPACITY * count).build());
            }
        };
        push(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, self.key.samplers);
        push(vk::DescriptorType::SAMPLED_IMAGE, self.key.storage_textures);
        push(vk::DescriptorType::STORAGE_IMAGE, self.key.write_storage_textures);
        push(vk::DescriptorType::STORAGE_BUFFER, self.key.storage_buffers + self.key.write_storage_buffers);
        push(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, self.key.uniform_buffers);

        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(POOL_CAPACITY)
            .pool_sizes(&sizes)
            .build();
        let pool = unsafe { device.create_descriptor_pool(&info, None) }?;
        self.pools.push(pool);
        Ok(())
    }

    /// Allocate one descriptor set, growing the pool chain on demand. No
    /// descriptor-set freeing happens here — sets live until the whole pool
    /// is reset (§4.4).
    pub fn allocate(&mut self, device: &ash::Device) -> Result<vk::DescriptorSet, DeviceError> {
        let slot_in_pool = self.next % POOL_CAPACITY;
        let pool_index = (self.next / POOL_CAPACITY) as usize;
        if pool_index == self.pools.len() {
            self.add_pool(device)?;
        }
        let _ = slot_in_pool;
        let pool = self.pools[pool_index];
        let layouts = [self.layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts)
            .build();
        let set = unsafe { device.allocate_descriptor_sets(&info) }?[0];
        self.next += 1;
        Ok(set)
    }

    /// Reset the monotonic allocation index to zero; called when the owning
    /// cache is returned to the renderer pool after fence signal (§4.4).
    pub fn reset(&mut self, device: &ash::Device) -> Result<(), DeviceError> {
        for &pool in &self.pools {
            unsafe { device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()) }?;
        }
        self.next = 0;
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }
}

/// Per-command-buffer cache of [`DescriptorSetPool`]s indexed by `layoutId`,
/// acquired from the renderer-wide pool and returned on completion (§3,
/// §4.4).
#[derive(Default)]
pub struct DescriptorSetCache {
    pools: Vec<Option<DescriptorSetPool>>,
}

impl DescriptorSetCache {
    pub fn new() -> Self {
        DescriptorSetCache { pools: Vec::new() }
    }

    pub fn allocate(
        &mut self,
        device: &ash::Device,
        layout: &DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DeviceError> {
        let idx = layout.layout_id as usize;
        if idx >= self.pools.len() {
            self.pools.resize_with(idx + 1, || None);
        }
        let pool = self.pools[idx].get_or_insert_with(|| DescriptorSetPool::new(layout.raw, layout.key));
        pool.allocate(device)
    }

    /// Reset every pool's monotonic index; called when returned to the
    /// renderer-wide pool after fence signal.
    pub fn reset_all(&mut self, device: &ash::Device) -> Result<(), DeviceError> {
        for pool in self.pools.iter_mut().flatten() {
            pool.reset(device)?;
        }
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for pool in self.pools.iter_mut().flatten() {
            pool.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_key_equality_ignores_insertion_order() {
        let a = DescriptorLayoutKey {
            stage: vk::ShaderStageFlags::FRAGMENT,
            samplers: 2,
            storage_textures: 0,
            storage_buffers: 0,
            write_storage_textures: 0,
            write_storage_buffers: 0,
            uniform_buffers: 1,
        };
        let b = a;
        assert_eq!(a, b);
    }
}
