/*!
# Vulkan backend internals.

## Containers and cycling

Public handles returned to callers are `BufferContainer`/`TextureContainer`,
not the underlying `Buffer`/`Texture`. A container owns 1..N versioned
resources plus an `active` index; cycling (discard-write) picks a
replacement whose refcount is zero, or allocates a new one (§3).

## Render passes and framebuffers

Render passes are cached on the device and kept forever (`cache::PassCache`).
Framebuffers are cached too, but are dropped from the cache (and scheduled
for deferred release) when any image view they reference is destroyed
(§4.5).

## Fences

Every submission optionally carries a `FenceHandle`: a `VkFence` plus an
atomic refcount, jointly owned by the submitting command buffer and any
swapchain image paired with it (§3). A device-wide free list recycles
signaled fences instead of allocating a new `VkFence` every submission.

## Deferred destruction

A public `Release` call appends the resource to one of seven per-kind
deferred-destroy lists (`deletion::DeletionQueues`). Destruction runs after
every submission, once completed command buffers have been drained: an entry
is removed and destroyed once its refcount reaches zero (§4.7).
!*/

pub mod adapter;
pub mod alloc;
pub mod cache;
pub mod command;
pub mod conv;
pub mod defrag;
pub mod deletion;
pub mod descriptor;
pub mod device;
pub mod fence;
pub mod instance;
pub mod queue;
pub mod state;
pub mod swapchain;

use std::{
    borrow::Borrow,
    ffi::CStr,
    sync::atomic::{AtomicU64, AtomicUsize},
};

use arrayvec::ArrayVec;
use ash::{extensions::ext, vk};
use parking_lot::{Mutex, RwLock};

pub use fence::FenceHandle;

use crate::{CopyExtent, MAX_COLOR_ATTACHMENTS};
use alloc::UsedRegion;
use cache::{PipelineLayoutKey, RenderPassKey};
use descriptor::{DescriptorSetCache, DescriptorSetLayout};
use gput::{BufferKind, BufferUsage, Extent3d, TextureFormat, TextureUsage, UsageMode};

const MAX_TOTAL_ATTACHMENTS: usize = MAX_COLOR_ATTACHMENTS * 2 + 1;

#[derive(Clone, Debug)]
pub struct Api;

impl crate::Api for Api {
    type Instance = Instance;
    type Adapter = Adapter;
    type Device = Device;
    type Queue = Queue;
    type CommandEncoder = CommandEncoder;
    type CommandBuffer = CommandBuffer;
    type Surface = Surface;
    type Fence = FenceHandle;

    type Buffer = BufferContainer;
    type Texture = TextureContainer;
    type TextureView = TextureView;
    type Sampler = Sampler;
    type SurfaceTexture = SurfaceTexture;

    type DescriptorSetLayout = DescriptorSetLayout;
    type DescriptorSet = vk::DescriptorSet;
    type PipelineLayout = PipelineLayout;
    type ShaderModule = ShaderModule;
    type GraphicsPipeline = GraphicsPipeline;
    type ComputePipeline = ComputePipeline;
}

pub(crate) struct DebugUtils {
    pub extension: ext::DebugUtils,
    pub messenger: vk::DebugUtilsMessengerEXT,
}

pub struct InstanceShared {
    pub(crate) entry: ash::Entry,
    pub(crate) raw: ash::Instance,
    pub(crate) flags: crate::InstanceFlags,
    pub(crate) debug_utils: Option<DebugUtils>,
    pub(crate) surface_fn: ash::extensions::khr::Surface,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            if let Some(du) = &self.debug_utils {
                du.extension.destroy_debug_utils_messenger(du.messenger, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

pub struct Instance {
    pub(crate) shared: std::sync::Arc<InstanceShared>,
}

/// Physical-device capability record (SPEC_FULL §3.1).
#[derive(Clone, Debug, Default)]
pub struct PrivateCapabilities {
    pub multi_draw_indirect: bool,
    pub bar_memory: bool,
    pub host_cached_memory: bool,
}

bitflags::bitflags! {
    /// Vendor-specific workarounds discovered at adapter enumeration time
    /// (SPEC_FULL §3.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Workarounds: u32 {
        const EMPTY_RESOLVE_ATTACHMENT_LISTS = 0x1;
    }
}

pub struct Adapter {
    pub(crate) raw: vk::PhysicalDevice,
    pub(crate) instance: std::sync::Arc<InstanceShared>,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) min_uniform_buffer_offset_alignment: u64,
    pub(crate) private_caps: PrivateCapabilities,
    pub(crate) workarounds: Workarounds,
}

unsafe impl Send for Adapter {}
unsafe impl Sync for Adapter {}

pub struct DeviceShared {
    pub(crate) raw: ash::Device,
    pub(crate) instance: std::sync::Arc<InstanceShared>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) queue_family_index: u32,
    pub(crate) raw_queue: vk::Queue,
    pub(crate) private_caps: PrivateCapabilities,
    pub(crate) workarounds: Workarounds,
    pub(crate) min_uniform_buffer_offset_alignment: u64,

    /// C5: render passes are cached on the device and never evicted.
    pub(crate) render_passes: Mutex<rustc_hash::FxHashMap<RenderPassKey, vk::RenderPass>>,
    /// C5: framebuffers are cached, and dropped when a referenced view dies.
    pub(crate) framebuffers: Mutex<cache::FramebufferCache>,
    /// C5: per-stage-count pipeline resource layouts, independent of the
    /// pipeline cache.
    pub(crate) pipeline_layouts: Mutex<rustc_hash::FxHashMap<PipelineLayoutKey, std::sync::Arc<ResourceLayout>>>,
    /// C4: interned descriptor-set layouts, keyed by the full counts tuple.
    pub(crate) descriptor_layouts: Mutex<descriptor::DescriptorLayoutTable>,

    /// C7: seven refcount-gated deferred destroy lists.
    pub(crate) deletion: Mutex<deletion::DeletionQueues>,
    /// C1: one suballocator per memory-type index.
    pub(crate) allocators: Vec<Mutex<alloc::SubAllocator>>,
    /// Per-memory-type-index bind lock (Vulkan forbids concurrent
    /// `vkBind*Memory` on the same `VkDeviceMemory`); keyed the same as
    /// `allocators`.
    pub(crate) memory_locks: Vec<Mutex<()>>,

    /// C6: registry of per-thread command pools.
    pub(crate) command_pools: command::CommandPoolRegistry,
    /// C4: renderer-wide pool of descriptor-set caches available for
    /// acquisition by a command buffer.
    pub(crate) descriptor_cache_pool: Mutex<Vec<DescriptorSetCache>>,
    /// Pooled, 1 MiB, host-visible uniform buffers (§3).
    pub(crate) uniform_buffer_pool: Mutex<Vec<command::UniformBuffer>>,

    /// Free list of signaled `VkFence`s, recycled instead of re-created.
    pub(crate) fence_pool: Mutex<Vec<vk::Fence>>,

    pub(crate) submitted_generation: AtomicU64,
    pub(crate) defrag_in_progress: std::sync::atomic::AtomicBool,
}

pub struct Device {
    pub(crate) shared: std::sync::Arc<DeviceShared>,
}

pub struct Queue {
    pub(crate) raw: vk::Queue,
    pub(crate) device: std::sync::Arc<DeviceShared>,
    pub(crate) swapchain_fn: ash::extensions::khr::Swapchain,
    /// Guards `vkQueueSubmit`/`vkQueuePresentKHR` so submissions stay FIFO
    /// on the single unified queue (§5: `submitLock`).
    pub(crate) submit_lock: Mutex<()>,
}

// ---------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------

#[derive(Debug)]
pub struct Buffer {
    pub(crate) raw: vk::Buffer,
    pub(crate) region: Option<UsedRegion>,
    pub(crate) kind: BufferKind,
    pub(crate) usage: BufferUsage,
    pub(crate) size: u64,
    pub(crate) refcount: std::sync::Arc<AtomicUsize>,
    pub(crate) transitioned: std::sync::atomic::AtomicBool,
    pub(crate) marked_for_destroy: std::sync::atomic::AtomicBool,
}

/// Public handle: owns 1..N `Buffer`s plus an `active` index. Cycling
/// (discard-write) selects a replacement whose refcount is zero, or
/// allocates a new one (§3).
#[derive(Debug)]
pub struct BufferContainer {
    pub(crate) instances: RwLock<Vec<Buffer>>,
    pub(crate) active: std::sync::atomic::AtomicUsize,
    pub(crate) kind: BufferKind,
    pub(crate) usage: BufferUsage,
    pub(crate) size: u64,
    pub(crate) debug_name: Option<String>,
}

// ---------------------------------------------------------------------
// Textures
// ---------------------------------------------------------------------

/// One (layer, mip-level) of a texture — the barrier-granularity unit (§3).
#[derive(Debug, Default)]
pub struct Subresource {
    /// One render-target view per depth slice, for 3D color targets.
    pub(crate) render_target_views: Vec<vk::ImageView>,
    pub(crate) compute_write_view: Option<vk::ImageView>,
    pub(crate) depth_stencil_view: Option<vk::ImageView>,
    pub(crate) current_mode: parking_lot::Mutex<UsageMode>,
}

#[derive(Debug)]
pub struct Texture {
    pub(crate) raw: vk::Image,
    pub(crate) region: Option<UsedRegion>,
    pub(crate) format: TextureFormat,
    pub(crate) usage: TextureUsage,
    pub(crate) layer_count: u32,
    pub(crate) level_count: u32,
    pub(crate) depth: u32,
    pub(crate) extent: Extent3d,
    pub(crate) subresources: Vec<Subresource>,
    /// Sampled/read view across all layers/levels; only present when usage
    /// includes SAMPLER or a graphics/compute storage-read bit (§3).
    pub(crate) full_view: Option<vk::ImageView>,
    pub(crate) refcount: std::sync::Arc<AtomicUsize>,
    pub(crate) marked_for_destroy: std::sync::atomic::AtomicBool,
    /// Swapchain-owned images wrap a driver-owned `VkImage`: `region` is
    /// `None` and this texture must never be destroyed by this crate.
    pub(crate) driver_owned: bool,
}

impl Texture {
    pub(crate) fn subresource_index(&self, layer: u32, level: u32) -> usize {
        (level as usize) * (self.layer_count as usize) + layer as usize
    }
}

#[derive(Debug)]
pub struct TextureContainer {
    pub(crate) instances: RwLock<Vec<Texture>>,
    pub(crate) active: std::sync::atomic::AtomicUsize,
    pub(crate) format: TextureFormat,
    pub(crate) usage: TextureUsage,
    pub(crate) extent: Extent3d,
    pub(crate) layer_count: u32,
    pub(crate) level_count: u32,
    /// Swapchain textures are not cycleable (§4.6).
    pub(crate) cycleable: bool,
    pub(crate) debug_name: Option<String>,
}

#[derive(Debug)]
pub struct TextureView {
    pub(crate) raw: vk::ImageView,
}

#[derive(Debug)]
pub struct Sampler {
    pub(crate) raw: vk::Sampler,
}

#[derive(Debug)]
pub enum ShaderModule {
    Raw(vk::ShaderModule),
}

/// Four descriptor-set layouts in fixed slot order for graphics; three for
/// compute (§3). Shared by every pipeline with the same per-stage counts.
#[derive(Debug)]
pub struct ResourceLayout {
    pub(crate) set_layouts: ArrayVec<std::sync::Arc<DescriptorSetLayout>, 4>,
    pub(crate) pipeline_layout: vk::PipelineLayout,
}

#[derive(Debug)]
pub struct PipelineLayout {
    pub(crate) raw: vk::PipelineLayout,
}

#[derive(Debug)]
pub struct GraphicsPipeline {
    pub(crate) raw: vk::Pipeline,
    pub(crate) layout: std::sync::Arc<ResourceLayout>,
}

#[derive(Debug)]
pub struct ComputePipeline {
    pub(crate) raw: vk::Pipeline,
    pub(crate) layout: std::sync::Arc<ResourceLayout>,
}

// ---------------------------------------------------------------------
// Command buffers
// ---------------------------------------------------------------------

pub use command::{CommandBuffer, CommandEncoder};

// ---------------------------------------------------------------------
// Swapchain
// ---------------------------------------------------------------------

pub use swapchain::{Surface, SurfaceTexture};

impl Borrow<Texture> for SurfaceTexture {
    fn borrow(&self) -> &Texture {
        // SurfaceTexture wraps a single-instance, non-cycleable
        // TextureContainer; see `swapchain::SurfaceTexture`.
        self.texture()
    }
}

#[allow(dead_code)]
pub(crate) fn copy_extent_of(extent: &Extent3d) -> CopyExtent {
    CopyExtent {
        width: extent.width,
        height: extent.height,
        depth: extent.depth.max(1),
    }
}
