//! C5: render-pass, framebuffer, and pipeline-resource-layout caches (§4.5),
//! generalizing the teacher's `RenderPassKey`/`FramebufferKey` +
//! `Mutex<FxHashMap<K, V>>` pattern (`wgpu-hal` vulkan `mod.rs`) to the exact
//! key fields this spec documents.
//!
//! The open question of a stage-tagged hash (§9: pipeline-resource-layout
//! keys must not collide across shader stages with the same counts) is
//! resolved by carrying `stage` explicitly in [`PipelineLayoutKey`] rather
//! than folding it into an untagged count tuple.

use arrayvec::ArrayVec;
use ash::vk;

use crate::error::DeviceError;
use crate::MAX_COLOR_ATTACHMENTS;
use gput::TextureFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachmentKey {
    pub format: TextureFormat,
    pub load_op: gput::LoadOp,
    pub store_op: gput::StoreOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilAttachmentKey {
    pub format: TextureFormat,
    pub load_op: gput::LoadOp,
    pub store_op: gput::StoreOp,
    pub stencil_load_op: gput::LoadOp,
    pub stencil_store_op: gput::StoreOp,
}

/// Keys a cached `VkRenderPass` on (per-color-target: format/loadOp/storeOp),
/// resolve-target formats, depth/stencil descriptor, and sample count
/// (§4.5). A `StoreOp` of Resolve/ResolveAndStore implies a resolve
/// attachment on the subpass, encoded here via `resolve_formats`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    pub colors: ArrayVec<ColorAttachmentKey, MAX_COLOR_ATTACHMENTS>,
    pub resolve_formats: ArrayVec<TextureFormat, MAX_COLOR_ATTACHMENTS>,
    pub depth_stencil: Option<DepthStencilAttachmentKey>,
    pub samples: gput::SampleCount,
}

/// Keys a cached `VkFramebuffer` on its ordered attachment-view list plus
/// extent (§4.5). Views are excluded if the device had image-less
/// framebuffers (not assumed here; every attachment is a concrete view).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferKey {
    pub attachments: ArrayVec<vk::ImageView, MAX_TOTAL_ATTACHMENTS>,
    pub width: u32,
    pub height: u32,
}

const MAX_TOTAL_ATTACHMENTS: usize = MAX_COLOR_ATTACHMENTS * 2 + 1;

/// Keys the pipeline resource-layout cache on per-stage binding counts
/// (§4.5). Carries `stage` to keep graphics and compute layouts (and
/// distinct graphics stages) from colliding on identical counts — see
/// module doc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey {
    pub stage: vk::ShaderStageFlags,
    pub samplers: u32,
    pub storage_textures: u32,
    pub storage_buffers: u32,
    pub write_storage_textures: u32,
    pub write_storage_buffers: u32,
    pub uniform_buffers: u32,
}

/// A framebuffer together with the set of image views it references, so
/// `invalidate_view` can find and evict it without inspecting the raw
/// `VkFramebuffer` handle (§4.5 "On destruction of any view referenced by a
/// framebuffer...").
struct FramebufferEntry {
    raw: vk::Framebuffer,
    views: ArrayVec<vk::ImageView, MAX_TOTAL_ATTACHMENTS>,
}

/// Owns the framebuffer cache and supports eviction keyed by a destroyed
/// view, scheduling the evicted framebuffer for deferred release.
#[derive(Default)]
pub struct FramebufferCache {
    entries: rustc_hash::FxHashMap<FramebufferKey, FramebufferEntry>,
}

impl FramebufferCache {
    pub fn get_or_insert_with(
        &mut self,
        key: FramebufferKey,
        create: impl FnOnce() -> Result<vk::Framebuffer, DeviceError>,
    ) -> Result<vk::Framebuffer, DeviceError> {
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.raw);
        }
        let raw = create()?;
        let views = key.attachments.clone();
        self.entries.insert(key, FramebufferEntry { raw, views });
        Ok(raw)
    }

    /// Remove every framebuffer referencing `view`, returning their raw
    /// handles so the caller can push them onto the deferred-destroy list
    /// (§4.5, §4.7).
    pub fn invalidate_view(&mut self, view: vk::ImageView) -> Vec<vk::Framebuffer> {
        let mut evicted = Vec::new();
        self.entries.retain(|_, entry| {
            if entry.views.contains(&view) {
                evicted.push(entry.raw);
                false
            } else {
                true
            }
        });
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_view_evicts_only_matching_framebuffers() {
        let mut cache = FramebufferCache::default();
        let v1 = vk::ImageView::from_raw(1);
        let v2 = vk::ImageView::from_raw(2);
        let key_a = FramebufferKey {
            attachments: ArrayVec::from_iter([v1]),
            width: 1,
            height: 1,
        };
        let key_b = FramebufferKey {
            attachments: ArrayVec::from_iter([v2]),
            width: 1,
            height: 1,
        };
        cache.get_or_insert_with(key_a, || Ok(vk::Framebuffer::from_raw(10))).unwrap();
        cache.get_or_insert_with(key_b, || Ok(vk::Framebuffer::from_raw(20))).unwrap();

        let evicted = cache.invalidate_view(v1);
        assert_eq!(evicted, vec![vk::Framebuffer::from_raw(10)]);
        assert_eq!(cache.entries.len(), 1);
    }
}
