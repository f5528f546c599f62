//! A Vulkan fence plus an atomic refcount, jointly owned by the submitting
//! command buffer and any swapchain image that paired with it (§3). Simpler
//! than the teacher's `Fence` enum (`TimelineSemaphore` / `FencePool`): this
//! spec has no timeline-semaphore path, just a device-wide free list of
//! signaled `VkFence`s recycled across submissions — the same recycling idea
//! as the teacher's `FencePool::free`, without the active/last_completed
//! bookkeeping a timeline requires.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::error::DeviceError;

#[derive(Debug)]
pub struct FenceHandle {
    pub(crate) raw: vk::Fence,
    pub(crate) refcount: Arc<AtomicUsize>,
}

impl FenceHandle {
    pub fn add_ref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release(&self) {
        self.refcount.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn raw(&self) -> vk::Fence {
        self.raw
    }
}

/// Acquire a fence for a new submission: pop a signaled one off `free` and
/// reset it, or create a new one.
pub(crate) fn acquire(device: &ash::Device, free: &mut Vec<vk::Fence>) -> Result<FenceHandle, DeviceError> {
    let raw = match free.pop() {
        Some(raw) => {
            unsafe { device.reset_fences(&[raw]) }?;
            raw
        }
        None => {
            let info = vk::FenceCreateInfo::builder().build();
            unsafe { device.create_fence(&info, None) }?
        }
    };
    Ok(FenceHandle {
        raw,
        refcount: Arc::new(AtomicUsize::new(1)),
    })
}

/// Return a signaled, zero-refcount fence to the free list for reuse
/// instead of destroying it.
pub(crate) fn recycle(free: &mut Vec<vk::Fence>, handle: FenceHandle) {
    free.push(handle.raw);
}

/// Non-blocking status check (§5 "QueryFence is non-blocking").
pub fn query(device: &ash::Device, fence: &FenceHandle) -> bool {
    unsafe { device.get_fence_status(fence.raw) }.unwrap_or(false)
}

/// Blocks with an effectively-infinite timeout; fails only on device lost
/// (§5).
pub fn wait_all(device: &ash::Device, fences: &[vk::Fence]) -> Result<(), DeviceError> {
    unsafe { device.wait_for_fences(fences, true, u64::MAX) }?;
    Ok(())
}
