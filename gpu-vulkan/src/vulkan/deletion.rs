//! C7: deferred destruction (§4.7). Grounded on `thundr`'s `DeletionQueue`
//! (`schedule_drop_at_point`/`drop_all_at_point`), generalized from one
//! timeline-gated queue to seven independent refcount-gated lists, one per
//! resource kind, since Vulkan handles here are reclaimed by refcount
//! reaching zero rather than by a single timeline point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ash::vk;

struct Pending<T> {
    raw: T,
    refcount: Arc<AtomicUsize>,
}

struct PendingList<T> {
    items: Vec<Pending<T>>,
}

impl<T> Default for PendingList<T> {
    fn default() -> Self {
        PendingList { items: Vec::new() }
    }
}

impl<T: Copy> PendingList<T> {
    fn push(&mut self, raw: T, refcount: Arc<AtomicUsize>) {
        self.items.push(Pending { raw, refcount });
    }

    /// Remove and return every entry whose refcount has reached zero.
    fn drain_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        self.items.retain(|entry| {
            if entry.refcount.load(Ordering::Acquire) == 0 {
                ready.push(entry.raw);
                false
            } else {
                true
            }
        });
        ready
    }
}

/// The seven refcount-gated deferred-destroy lists named in §4.7:
/// framebuffers, samplers, shaders, pipelines, buffers, textures, and
/// descriptor-set layouts (the core's own long-lived interned objects,
/// destroyed only at device teardown but tracked the same way for
/// uniformity).
#[derive(Default)]
pub struct DeletionQueues {
    framebuffers: PendingList<vk::Framebuffer>,
    samplers: PendingList<vk::Sampler>,
    shaders: PendingList<vk::ShaderModule>,
    pipelines: PendingList<vk::Pipeline>,
    buffers: PendingList<vk::Buffer>,
    textures: PendingList<vk::Image>,
    image_views: PendingList<vk::ImageView>,
}

impl DeletionQueues {
    pub fn schedule_framebuffer(&mut self, raw: vk::Framebuffer, refcount: Arc<AtomicUsize>) {
        self.framebuffers.push(raw, refcount);
    }

    pub fn schedule_sampler(&mut self, raw: vk::Sampler, refcount: Arc<AtomicUsize>) {
        self.samplers.push(raw, refcount);
    }

    pub fn schedule_shader(&mut self, raw: vk::ShaderModule, refcount: Arc<AtomicUsize>) {
        self.shaders.push(raw, refcount);
    }

    pub fn schedule_pipeline(&mut self, raw: vk::Pipeline, refcount: Arc<AtomicUsize>) {
        self.pipelines.push(raw, refcount);
    }

    pub fn schedule_buffer(&mut self, raw: vk::Buffer, refcount: Arc<AtomicUsize>) {
        self.buffers.push(raw, refcount);
    }

    pub fn schedule_texture(&mut self, raw: vk::Image, refcount: Arc<AtomicUsize>) {
        self.textures.push(raw, refcount);
    }

    pub fn schedule_image_view(&mut self, raw: vk::ImageView, refcount: Arc<AtomicUsize>) {
        self.image_views.push(raw, refcount);
    }

    /// Run after draining completed command buffers on every submission:
    /// destroy every entry across all seven lists whose refcount is zero
    /// (§4.7). Order matters — views before images, pipelines before
    /// shaders are not interdependent at destroy time in Vulkan, but
    /// framebuffers must go before the views/images they reference, so
    /// framebuffers are drained first.
    ///
    /// # Safety
    /// Every raw handle passed to `schedule_*` must not be used again by
    /// the caller after its refcount reaches zero.
    pub unsafe fn sweep(&mut self, device: &ash::Device) {
        for fb in self.framebuffers.drain_ready() {
            device.destroy_framebuffer(fb, None);
        }
        for view in self.image_views.drain_ready() {
            device.destroy_image_view(view, None);
        }
        for sampler in self.samplers.drain_ready() {
            device.destroy_sampler(sampler, None);
        }
        for shader in self.shaders.drain_ready() {
            device.destroy_shader_module(shader, None);
        }
        for pipeline in self.pipelines.drain_ready() {
            device.destroy_pipeline(pipeline, None);
        }
        for buffer in self.buffers.drain_ready() {
            device.destroy_buffer(buffer, None);
        }
        for image in self.textures.drain_ready() {
            device.destroy_image(image, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_released_only_once_refcount_reaches_zero() {
        let mut list: PendingList<u32> = PendingList::default();
        let rc = Arc::new(AtomicUsize::new(1));
        list.push(7, rc.clone());
        assert!(list.drain_ready().is_empty());
        rc.store(0, Ordering::Release);
        assert_eq!(list.drain_ready(), vec![7]);
        assert!(list.items.is_empty());
    }
}
