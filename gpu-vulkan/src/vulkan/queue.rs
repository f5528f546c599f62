//! Submission and presentation on the single unified queue (§5). Grounded
//! on the teacher's `impl crate::Queue for super::Queue`, simplified: no
//! timeline-semaphore fence path (this spec's `FenceHandle` is always a
//! plain `VkFence`), and wait/signal semaphores come from each command
//! buffer's own `present_data` (populated by the swapchain manager at
//! acquire time, §4.9) rather than a queue-level relay chain.

use ash::vk;

use super::{CommandBuffer, FenceHandle, Queue, Surface, SurfaceTexture};
use crate::error::{DeviceError, SurfaceError};

impl Queue {
    /// # Safety
    /// Every command buffer must have finished recording and its fence (if
    /// any) must not already be in flight.
    pub unsafe fn submit(
        &self,
        command_buffers: &[&CommandBuffer],
        signal_fence: Option<&FenceHandle>,
    ) -> Result<(), DeviceError> {
        let _guard = self.submit_lock.lock();

        let mut wait_semaphores = Vec::new();
        let mut wait_stages = Vec::new();
        let mut signal_semaphores = Vec::new();
        for cb in command_buffers {
            wait_semaphores.extend_from_slice(&cb.wait_semaphores);
            wait_stages.extend(std::iter::repeat(vk::PipelineStageFlags::TOP_OF_PIPE).take(cb.wait_semaphores.len()));
            signal_semaphores.extend_from_slice(&cb.signal_semaphores);
        }

        let vk_cmd_buffers: Vec<vk::CommandBuffer> = command_buffers.iter().map(|cb| cb.raw).collect();
        let info = vk::SubmitInfo::builder()
            .command_buffers(&vk_cmd_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores)
            .build();

        let fence_raw = signal_fence.map(|f| f.raw()).unwrap_or(vk::Fence::null());

        profiling::scope!("vkQueueSubmit");
        unsafe { self.device.raw.queue_submit(self.raw, &[info], fence_raw) }?;
        Ok(())
    }

    /// # Safety
    /// `texture` must have come from a prior acquire on `surface` and not
    /// already have been presented or discarded.
    pub unsafe fn present(&self, surface: &Surface, texture: SurfaceTexture) -> Result<(), SurfaceError> {
        let _guard = self.submit_lock.lock();

        let swapchain = surface.current_swapchain();
        let swapchains = [swapchain];
        let indices = [texture.index()];
        let wait = texture.render_finished_semaphore();
        let waits = [wait];
        let info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&indices)
            .wait_semaphores(&waits)
            .build();

        let presented = unsafe { self.swapchain_fn.queue_present(self.raw, &info) };
        // Suboptimal / out-of-date are not errors (§7): the recreate loop on
        // the next acquire handles them.
        let suboptimal = match presented {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => return Err(SurfaceError::Lost),
            Err(other) => return Err(SurfaceError::Device(DeviceError::from(other))),
        };
        if suboptimal {
            surface.mark_needs_recreate();
            log::warn!("suboptimal present of image {}", texture.index());
        }
        Ok(())
    }
}

impl crate::Queue for Queue {
    type A = super::Api;

    unsafe fn submit(
        &self,
        command_buffers: &[&CommandBuffer],
        signal_fence: Option<&FenceHandle>,
    ) -> Result<(), DeviceError> {
        unsafe { Queue::submit(self, command_buffers, signal_fence) }
    }

    unsafe fn present(&self, surface: &Surface, texture: SurfaceTexture) -> Result<(), SurfaceError> {
        unsafe { Queue::present(self, surface, texture) }
    }
}
