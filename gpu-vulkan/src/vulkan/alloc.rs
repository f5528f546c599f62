//! C1: page-based device-memory suballocator (§4.1).
//!
//! One [`SubAllocator`] exists per memory-type index. It owns every
//! [`MemoryAllocation`] (page) bound to that type plus a size-sorted index
//! of free regions drawn from allocations marked [`AllocationState::Available`].
//! Allocations under defrag are excluded from the index so they stop
//! receiving new suballocations while being drained.

use ash::vk;
use once_cell::sync::OnceCell;

use crate::error::DeviceError;

/// Requested allocations at or below this size are served from 16 MiB
/// pages; above it, a page sized to the request (rounded up to 64 MiB).
const SMALL_REQUEST_THRESHOLD: u64 = 2 * 1024 * 1024;
const SMALL_PAGE_SIZE: u64 = 16 * 1024 * 1024;
const LARGE_PAGE_GRANULARITY: u64 = 64 * 1024 * 1024;

fn page_size_for(requested: u64) -> u64 {
    if requested <= SMALL_REQUEST_THRESHOLD {
        SMALL_PAGE_SIZE
    } else {
        ceil_to(requested, LARGE_PAGE_GRANULARITY)
    }
}

fn ceil_to(value: u64, granularity: u64) -> u64 {
    (value + granularity - 1) / granularity * granularity
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocationState {
    Available,
    /// Excluded from the free-region index while being drained by C8.
    Defragging,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeRegion {
    pub offset: u64,
    pub size: u64,
}

/// One `VkDeviceMemory` page, owned by a [`SubAllocator`].
#[derive(Debug)]
pub(crate) struct MemoryAllocation {
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub mapped_ptr: Option<*mut u8>,
    pub free_regions: Vec<FreeRegion>,
    pub state: AllocationState,
}

unsafe impl Send for MemoryAllocation {}

/// A live suballocation handed back to a resource. Carries a weak
/// back-pointer to the allocation it lives in purely for release/debugging;
/// ownership flows the other way (the allocation owns the memory, the
/// resource owns the `UsedRegion`).
#[derive(Debug)]
pub struct UsedRegion {
    pub(crate) allocation_index: usize,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) memory: vk::DeviceMemory,
    pub(crate) mapped_ptr: Option<*mut u8>,
}

unsafe impl Send for UsedRegion {}
unsafe impl Sync for UsedRegion {}

impl UsedRegion {
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.mapped_ptr
    }
}

/// Preference tier for a candidate memory type, most to least desirable
/// (§4.1 "Memory-type selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    RequiredPreferredNotTolerated,
    RequiredOnly,
    RequiredPreferredTolerated,
    RequiredTolerated,
}

/// A request for memory with required/preferred/tolerable property sets, as
/// described for GPU/uniform/transfer buffers in §4.1. `tolerable` loosens
/// the requirement rather than adding to it: a type satisfying `required`
/// but not `preferred` is acceptable only if it also satisfies `tolerable`
/// (or if `tolerable` is empty, meaning no fallback is needed).
pub struct MemoryTypeRequest {
    pub required: vk::MemoryPropertyFlags,
    pub preferred: vk::MemoryPropertyFlags,
    pub tolerable: vk::MemoryPropertyFlags,
}

static WARNED_NOT_DEVICE_LOCAL: OnceCell<()> = OnceCell::new();
static WARNED_NO_BAR: OnceCell<()> = OnceCell::new();
static WARNED_UMA: OnceCell<()> = OnceCell::new();

impl MemoryTypeRequest {
    pub fn gpu_buffer() -> Self {
        MemoryTypeRequest {
            required: vk::MemoryPropertyFlags::empty(),
            preferred: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            tolerable: vk::MemoryPropertyFlags::empty(),
        }
    }

    pub fn uniform_buffer() -> Self {
        MemoryTypeRequest {
            required: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            preferred: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            tolerable: vk::MemoryPropertyFlags::empty(),
        }
    }

    pub fn transfer_buffer() -> Self {
        MemoryTypeRequest {
            required: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            preferred: vk::MemoryPropertyFlags::HOST_CACHED,
            tolerable: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    pub fn texture() -> Self {
        MemoryTypeRequest {
            required: vk::MemoryPropertyFlags::empty(),
            preferred: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            tolerable: vk::MemoryPropertyFlags::empty(),
        }
    }

    /// Log the appropriate one-time warning for a request that missed its
    /// preferred tier, matching which request shape this is. Best-effort:
    /// a request built by hand that doesn't match one of the constructors
    /// above logs nothing.
    fn warn_fallback(&self) {
        if self.preferred.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
            && self.required.is_empty()
            && self.tolerable.is_empty()
        {
            WARNED_NOT_DEVICE_LOCAL.get_or_init(|| {
                log::warn!("allocating from a non-device-local memory type");
            });
        } else if self.preferred.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
            && self.required.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            WARNED_NO_BAR.get_or_init(|| {
                log::warn!("no BAR (device-local + host-visible) memory type available for uniform buffers");
            });
        } else if self.preferred.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
            WARNED_UMA.get_or_init(|| {
                log::info!("transfer buffers falling back to device-local memory (unified memory architecture)");
            });
        }
    }
}

/// Orders candidate memory-type indices by §4.1's four-tier preference list
/// and returns the first, preferring lower index within a tier (matching
/// Vulkan's own "prefer earlier index" convention for ties).
pub fn select_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    request: &MemoryTypeRequest,
) -> Option<u32> {
    let mut best: Option<(Tier, u32)> = None;
    for i in 0..props.memory_type_count {
        if type_filter & (1 << i) == 0 {
            continue;
        }
        let flags = props.memory_types[i as usize].property_flags;
        if !flags.contains(request.required) {
            continue;
        }
        let tier = if flags.contains(request.preferred) {
            if !request.tolerable.is_empty() && !flags.contains(request.tolerable) {
                Tier::RequiredPreferredNotTolerated
            } else if request.tolerable.is_empty() {
                Tier::RequiredPreferredNotTolerated
            } else {
                Tier::RequiredPreferredTolerated
            }
        } else if flags.contains(request.tolerable) && !request.tolerable.is_empty() {
            Tier::RequiredTolerated
        } else {
            Tier::RequiredOnly
        };
        match &best {
            Some((best_tier, _)) if *best_tier <= tier => {}
            _ => best = Some((tier, i)),
        }
    }
    if let Some((tier, index)) = best {
        if tier != Tier::RequiredPreferredNotTolerated {
            request.warn_fallback();
        }
        Some(index)
    } else {
        None
    }
}

/// One suballocator per memory-type index (§3, §4.1).
pub struct SubAllocator {
    pub(crate) memory_type_index: u32,
    allocations: Vec<MemoryAllocation>,
    /// Indices into `allocations` whose free regions participate in
    /// selection, sorted so `free_index` entries reference the largest
    /// regions first across all available allocations. Kept as
    /// `(allocation_index, region_index, size)` and re-sorted lazily.
    free_index: Vec<(usize, usize, u64)>,
    defrag_pending: bool,
}

impl SubAllocator {
    pub fn new(memory_type_index: u32) -> Self {
        SubAllocator {
            memory_type_index,
            allocations: Vec::new(),
            free_index: Vec::new(),
            defrag_pending: false,
        }
    }

    fn rebuild_free_index(&mut self) {
        self.free_index.clear();
        for (ai, alloc) in self.allocations.iter().enumerate() {
            if alloc.state != AllocationState::Available {
                continue;
            }
            for (ri, region) in alloc.free_regions.iter().enumerate() {
                self.free_index.push((ai, ri, region.size));
            }
        }
        self.free_index.sort_by(|a, b| b.2.cmp(&a.2));
    }

    /// `bind(memoryTypeIndex, requirements, resourceSize, dedicated) →
    /// UsedRegion | OutOfMemory` (§4.1).
    pub fn bind(
        &mut self,
        device: &ash::Device,
        requirements: vk::MemoryRequirements,
        resource_size: u64,
        dedicated: bool,
    ) -> Result<UsedRegion, DeviceError> {
        if dedicated {
            return self.allocate_dedicated(device, requirements);
        }

        self.rebuild_free_index();
        for &(ai, _, region_size) in &self.free_index {
            let alloc = &self.allocations[ai];
            let region = alloc.free_regions.iter().find(|r| r.size == region_size).copied();
            let Some(region) = region else { continue };
            let aligned_offset = ceil_to(region.offset, requirements.alignment);
            let end = aligned_offset + resource_size;
            if end <= region.offset + region.size {
                return Ok(self.carve(ai, region, aligned_offset, resource_size, end));
            }
        }

        // Miss: allocate a new page sized for this request's size class.
        let page_size = page_size_for(resource_size).max(requirements.size);
        match self.allocate_page(device, page_size) {
            Ok(ai) => {
                let region = self.allocations[ai].free_regions[0];
                let aligned_offset = ceil_to(region.offset, requirements.alignment);
                let end = aligned_offset + resource_size;
                Ok(self.carve(ai, region, aligned_offset, resource_size, end))
            }
            Err(err) => {
                self.maybe_mark_defrag();
                Err(err)
            }
        }
    }

    fn carve(
        &mut self,
        allocation_index: usize,
        region: FreeRegion,
        aligned_offset: u64,
        resource_size: u64,
        end: u64,
    ) -> UsedRegion {
        let alloc = &mut self.allocations[allocation_index];
        alloc.free_regions.retain(|r| r.offset != region.offset || r.size != region.size);
        let remainder_offset = end;
        let remainder_size = (region.offset + region.size).saturating_sub(end);
        if remainder_size > 0 {
            alloc.free_regions.push(FreeRegion {
                offset: remainder_offset,
                size: remainder_size,
            });
        }
        UsedRegion {
            allocation_index,
            offset: aligned_offset,
            size: resource_size,
            memory: alloc.memory,
            mapped_ptr: alloc.mapped_ptr.map(|p| unsafe { p.add(aligned_offset as usize) }),
        }
    }

    fn allocate_page(&mut self, device: &ash::Device, size: u64) -> Result<usize, DeviceError> {
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(self.memory_type_index)
            .build();
        let memory = unsafe { device.allocate_memory(&info, None) }?;
        self.allocations.push(MemoryAllocation {
            memory,
            size,
            mapped_ptr: None,
            free_regions: vec![FreeRegion { offset: 0, size }],
            state: AllocationState::Available,
        });
        Ok(self.allocations.len() - 1)
    }

    fn allocate_dedicated(
        &mut self,
        device: &ash::Device,
        requirements: vk::MemoryRequirements,
    ) -> Result<UsedRegion, DeviceError> {
        let size = requirements.size;
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(self.memory_type_index)
            .build();
        let memory = unsafe { device.allocate_memory(&info, None) }?;
        let ai = self.allocations.len();
        self.allocations.push(MemoryAllocation {
            memory,
            size,
            mapped_ptr: None,
            free_regions: Vec::new(),
            state: AllocationState::Available,
        });
        Ok(UsedRegion {
            allocation_index: ai,
            offset: 0,
            size,
            memory,
            mapped_ptr: None,
        })
    }

    /// On allocation-page miss with no defrag already pending, scan for an
    /// allocation with two or more free regions and mark it for defrag,
    /// pulling it out of the free index (§4.1).
    fn maybe_mark_defrag(&mut self) {
        if self.defrag_pending {
            return;
        }
        if let Some(alloc) = self
            .allocations
            .iter_mut()
            .find(|a| a.state == AllocationState::Available && a.free_regions.len() >= 2)
        {
            alloc.state = AllocationState::Defragging;
            self.defrag_pending = true;
        }
    }

    pub(crate) fn defragging_allocation(&self) -> Option<usize> {
        self.allocations
            .iter()
            .position(|a| a.state == AllocationState::Defragging)
    }

    pub(crate) fn clear_defrag_pending(&mut self) {
        self.defrag_pending = false;
    }

    /// Release a region, coalescing it against every free region already in
    /// the same allocation in one pass (§4.1 "Free-region merge").
    pub fn release(&mut self, region: UsedRegion) {
        let alloc = &mut self.allocations[region.allocation_index];
        let mut merged = FreeRegion {
            offset: region.offset,
            size: region.size,
        };
        let mut i = 0;
        while i < alloc.free_regions.len() {
            let candidate = alloc.free_regions[i];
            if candidate.offset + candidate.size == merged.offset {
                merged.offset = candidate.offset;
                merged.size += candidate.size;
                alloc.free_regions.swap_remove(i);
                continue;
            }
            if merged.offset + merged.size == candidate.offset {
                merged.size += candidate.size;
                alloc.free_regions.swap_remove(i);
                continue;
            }
            i += 1;
        }
        alloc.free_regions.push(merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_requests_use_16mib_pages() {
        assert_eq!(page_size_for(1024), SMALL_PAGE_SIZE);
        assert_eq!(page_size_for(SMALL_REQUEST_THRESHOLD), SMALL_PAGE_SIZE);
    }

    #[test]
    fn large_requests_round_up_to_64mib_granularity() {
        assert_eq!(page_size_for(SMALL_REQUEST_THRESHOLD + 1), LARGE_PAGE_GRANULARITY);
        assert_eq!(page_size_for(100 * 1024 * 1024), 128 * 1024 * 1024);
    }

    #[test]
    fn memory_type_selection_prefers_required_and_preferred() {
        let mut types = [vk::MemoryType::default(); vk::MAX_MEMORY_TYPES];
        types[0].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT
            | vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_types: types,
            ..Default::default()
        };
        let request = MemoryTypeRequest::uniform_buffer();
        let chosen = select_memory_type(&props, 0b11, &request);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn memory_type_selection_rejects_types_missing_required_bits() {
        let mut types = [vk::MemoryType::default(); vk::MAX_MEMORY_TYPES];
        types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 1,
            memory_types: types,
            ..Default::default()
        };
        let request = MemoryTypeRequest::uniform_buffer();
        assert_eq!(select_memory_type(&props, 0b1, &request), None);
    }
}
