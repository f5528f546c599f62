//! C6: command buffer engine (§4.6). Per-thread pool acquisition is
//! grounded on the design note in §9 ("prefer thread-local storage for the
//! pool pointer with a fallback table guarded by a mutex"); the recording
//! surface below covers the operations §4.6 lists.
//!
//! Descriptor-set slots are lazily (re)written: a bind call only flips a
//! per-slot dirty bit, the set itself is built right before the next draw
//! or dispatch that needs it (§3, §4.4, §4.6). Graphics uses the fixed
//! four-slot order `{0: vertex read, 1: vertex uniforms, 2: fragment read,
//! 3: fragment uniforms}`; compute uses `{0: read-only, 1: read-write,
//! 2: uniforms}` (§3).

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use arrayvec::ArrayVec;
use ash::vk;
use parking_lot::Mutex;

use super::cache::{ColorAttachmentKey, DepthStencilAttachmentKey, FramebufferKey, RenderPassKey};
use super::descriptor::{DescriptorSetCache, DescriptorSetLayout};
use super::{BufferContainer, DeviceShared, FenceHandle, Sampler, Texture, TextureContainer, TextureView};
use crate::error::DeviceError;
use crate::{CopyExtent, MAX_COLOR_ATTACHMENTS};
use gput::{LoadOp, StoreOp, TextureFormat, UsageMode};

/// A fixed-size (default 1 MiB), host-visible, dedicated-allocation
/// `Buffer` plus `write_offset`/`draw_offset` (§3). Push writes append at
/// `write_offset`; `draw_offset` is captured per draw and supplied as the
/// dynamic descriptor offset.
pub struct UniformBuffer {
    pub(crate) buffer: super::Buffer,
    pub(crate) mapped_ptr: *mut u8,
    pub(crate) capacity: u64,
    pub(crate) write_offset: u64,
    pub(crate) draw_offset: u64,
}

unsafe impl Send for UniformBuffer {}

pub const UNIFORM_BUFFER_SIZE: u64 = 1024 * 1024;
/// Descriptor range reserved per `UNIFORM_BUFFER_DYNAMIC` binding. Every
/// push-uniform block must fit in this; it is not independently validated
/// here since §4.6 bounds each push by the uniform buffer's own capacity.
const UNIFORM_BINDING_RANGE: vk::DeviceSize = 65536;

impl UniformBuffer {
    /// Append `data`, aligned to `min_ubo_alignment`. Returns `None` (no
    /// room even after alignment) when a fresh uniform buffer must be
    /// acquired instead — the caller sets the new-descriptor-set /
    /// new-offsets flags in that case (§4.6 "Push uniform data").
    pub fn push(&mut self, data: &[u8], min_ubo_alignment: u64) -> Option<u64> {
        let aligned = align_up(self.write_offset, min_ubo_alignment);
        if aligned + data.len() as u64 > self.capacity {
            return None;
        }
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped_ptr.add(aligned as usize), data.len());
        }
        self.draw_offset = aligned;
        self.write_offset = aligned + data.len() as u64;
        Some(self.draw_offset)
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    (value + alignment - 1) / alignment * alignment
}

/// Index buffer element width (no `gput` equivalent exists — this backend's
/// own wire type, mirroring `vk::IndexType` one-for-one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexElementSize {
    Uint16,
    Uint32,
}

impl IndexElementSize {
    fn to_vk(self) -> vk::IndexType {
        match self {
            IndexElementSize::Uint16 => vk::IndexType::UINT16,
            IndexElementSize::Uint32 => vk::IndexType::UINT32,
        }
    }
}

/// A sampler+view pair, copied in as raw handles at bind time (§4.6).
/// Neither `Sampler` nor `TextureView` carries a refcount of its own
/// (unlike `Buffer`/`Texture`); lifetime past this call is the caller's
/// responsibility, same as `deletion::schedule_sampler`/`schedule_image_view`
/// already assume an externally supplied refcount.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundSampler {
    pub sampler: vk::Sampler,
    pub view: vk::ImageView,
}

/// A storage-buffer binding: the active instance's raw handle and its size
/// (used as the descriptor range). The refcount is pinned separately into
/// `CommandBuffer::tracked` for the life of the recording (§3).
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundBuffer {
    pub raw: vk::Buffer,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StageReadBindings {
    pub samplers: ArrayVec<BoundSampler, 16>,
    pub storage_textures: ArrayVec<vk::ImageView, 8>,
    pub storage_buffers: ArrayVec<BoundBuffer, 8>,
}

#[derive(Debug, Clone, Default)]
pub struct ComputeWriteBindings {
    pub storage_textures: ArrayVec<vk::ImageView, 8>,
    pub storage_buffers: ArrayVec<BoundBuffer, 8>,
}

/// Graphics-side binding + dynamic state, cleared at `Begin` (§3). Slot
/// order for `sets`/`dirty` is fixed: `[vertex read, vertex uniforms,
/// fragment read, fragment uniforms]`.
#[derive(Default)]
pub struct GraphicsState {
    pub pipeline: Option<Arc<super::GraphicsPipeline>>,
    pub vertex: StageReadBindings,
    pub fragment: StageReadBindings,
    pub vertex_uniform_offsets: [u32; 14],
    pub fragment_uniform_offsets: [u32; 14],
    pub vertex_buffers: ArrayVec<(vk::Buffer, vk::DeviceSize), 16>,
    pub index_buffer: Option<(vk::Buffer, vk::DeviceSize, IndexElementSize)>,
    pub viewport: Option<vk::Viewport>,
    pub scissor: Option<vk::Rect2D>,
    pub blend_constants: [f32; 4],
    pub stencil_reference: u32,
    pub sets: [Option<vk::DescriptorSet>; 4],
    pub dirty: [bool; 4],
}

/// Compute-side binding state. Slot order for `sets`/`dirty` is fixed:
/// `[read-only, read-write, uniforms]`.
#[derive(Default)]
pub struct ComputeState {
    pub pipeline: Option<Arc<super::ComputePipeline>>,
    pub read: StageReadBindings,
    pub write: ComputeWriteBindings,
    pub uniform_offsets: [u32; 14],
    pub sets: [Option<vk::DescriptorSet>; 3],
    pub dirty: [bool; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivePass {
    #[default]
    None,
    Render,
    Compute,
    Copy,
}

struct PendingImageTransition {
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    default_mode: UsageMode,
    active_mode: UsageMode,
}

struct PendingBufferTransition {
    buffer: vk::Buffer,
    offset: u64,
    size: u64,
    default_mode: UsageMode,
    active_mode: UsageMode,
}

/// Transitions entered at bind/pass-begin time that must be reversed at
/// pass end (§4.6: "compute-pass read-only bindings barrier on bind and on
/// pass end"; "compute read-write attachments barrier on pass begin and
/// end"; render-pass attachments similarly). Replayed and cleared by
/// `end_render_pass`/`end_compute_pass`.
#[derive(Default)]
struct PassTransitions {
    images: Vec<PendingImageTransition>,
    buffers: Vec<PendingBufferTransition>,
}

/// Per-submission present bookkeeping: which window/swapchain image (if
/// any) this command buffer is paired with, plus wait/signal semaphore
/// lists built up by the swapchain manager during acquire (§3).
#[derive(Default)]
pub struct PresentData {
    pub swapchain_image_index: Option<u32>,
}

/// One color render-target attachment (§4.6 `BeginRenderPass`).
pub struct ColorTargetInfo<'a> {
    pub texture: &'a TextureContainer,
    pub layer: u32,
    pub level: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
    pub cycle: bool,
}

/// The depth/stencil attachment (§4.6 `BeginRenderPass`).
pub struct DepthStencilTargetInfo<'a> {
    pub texture: &'a TextureContainer,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub cycle: bool,
}

/// A copy/blit source or destination region. `origin` addresses one
/// (layer, mip level) subresource plus a 3D offset within it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyRegion {
    pub layer: u32,
    pub level: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Per-thread recording context (§3). One exists per in-flight command
/// buffer; `CommandPoolRegistry` owns the pool each comes from.
pub struct CommandBuffer {
    pub(crate) raw: vk::CommandBuffer,
    pub(crate) pool: vk::CommandPool,
    pub(crate) owning_thread: std::thread::ThreadId,
    pub(crate) device: Arc<DeviceShared>,

    pub(crate) active_pass: ActivePass,
    pub(crate) graphics: GraphicsState,
    pub(crate) compute: ComputeState,
    pass_transitions: PassTransitions,

    pub(crate) uniform_buffer: Option<UniformBuffer>,
    pub(crate) descriptor_cache: Option<DescriptorSetCache>,

    pub(crate) present: PresentData,
    pub(crate) wait_semaphores: Vec<vk::Semaphore>,
    pub(crate) signal_semaphores: Vec<vk::Semaphore>,

    /// Refcounts of every `Buffer`/`Texture` instance this recording
    /// touched, decremented when the command buffer returns to its pool
    /// (§3, §4.7). Samplers/views carry no refcount of their own; see
    /// `BoundSampler`.
    pub(crate) tracked: Vec<Arc<AtomicUsize>>,

    pub(crate) fence: Option<FenceHandle>,
    pub(crate) is_defrag: bool,
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer").field("raw", &self.raw).finish()
    }
}

unsafe impl Send for CommandBuffer {}
unsafe impl Sync for CommandBuffer {}

/// Marker type satisfying `crate::CommandEncoder`; recording methods live
/// directly on [`CommandBuffer`] per the teacher's "encoder == buffer while
/// recording" convention for single-primary-buffer backends.
pub struct CommandEncoder {
    pub(crate) buffer: CommandBuffer,
}

impl crate::CommandEncoder for CommandEncoder {
    type A = super::Api;
}

struct ThreadPool {
    pool: vk::CommandPool,
    inactive: Vec<vk::CommandBuffer>,
}

/// Per-thread command pool registry (§4.6, §9). Acquisition checks a
/// thread-local slot first; a mutex-guarded fallback table exists for
/// threads that have not yet populated their thread-local (or that have
/// been torn down and recreated, since thread-locals do not survive thread
/// exit).
#[derive(Default)]
pub struct CommandPoolRegistry {
    fallback: Mutex<HashMap<std::thread::ThreadId, ThreadPool>>,
}

thread_local! {
    static LOCAL_POOL: RefCell<Option<vk::CommandPool>> = RefCell::new(None);
}

impl CommandPoolRegistry {
    /// Acquire a primary command buffer for the calling thread, creating a
    /// `VkCommandPool` with `RESET_COMMAND_BUFFER` on first use (§4.6).
    pub fn acquire(&self, device: &Arc<DeviceShared>, queue_family_index: u32) -> Result<CommandBuffer, DeviceError> {
        let thread_id = std::thread::current().id();

        let pool = LOCAL_POOL.with(|cell| *cell.borrow());
        let pool = match pool {
            Some(pool) => pool,
            None => {
                let mut fallback = self.fallback.lock();
                let entry = fallback.entry(thread_id).or_insert_with(|| {
                    let info = vk::CommandPoolCreateInfo::builder()
                        .queue_family_index(queue_family_index)
                        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                        .build();
                    let pool = unsafe { device.raw.create_command_pool(&info, None) }.expect("vkCreateCommandPool");
                    ThreadPool { pool, inactive: Vec::new() }
                });
                LOCAL_POOL.with(|cell| *cell.borrow_mut() = Some(entry.pool));
                entry.pool
            }
        };

        let raw = {
            let mut fallback = self.fallback.lock();
            let entry = fallback.get_mut(&thread_id).expect("pool registered above");
            match entry.inactive.pop() {
                Some(raw) => raw,
                None => {
                    let info = vk::CommandBufferAllocateInfo::builder()
                        .command_pool(pool)
                        .level(vk::CommandBufferLevel::PRIMARY)
                        .command_buffer_count(1)
                        .build();
                    unsafe { device.raw.allocate_command_buffers(&info) }?[0]
                }
            }
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .build();
        unsafe { device.raw.begin_command_buffer(raw, &begin_info) }?;

        Ok(CommandBuffer {
            raw,
            pool,
            owning_thread: thread_id,
            device: device.clone(),
            active_pass: ActivePass::None,
            graphics: GraphicsState::default(),
            compute: ComputeState::default(),
            pass_transitions: PassTransitions::default(),
            uniform_buffer: None,
            descriptor_cache: None,
            present: PresentData::default(),
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
            tracked: Vec::new(),
            fence: None,
            is_defrag: false,
        })
    }

    /// Return a completed (fence-signaled) or canceled command buffer to
    /// its owning pool's inactive list, after unpinning every tracked
    /// resource and returning its descriptor cache / uniform buffer to the
    /// device-wide pools (§3, §4.4, §4.7). No ping-pong across threads: a
    /// buffer always returns to the pool it came from, never another
    /// thread's (§4.6).
    pub fn release(&self, mut cmd: CommandBuffer) {
        for refcount in cmd.tracked.drain(..) {
            refcount.fetch_sub(1, Ordering::AcqRel);
        }
        if let Some(mut cache) = cmd.descriptor_cache.take() {
            if cache.reset_all(&cmd.device.raw).is_ok() {
                cmd.device.descriptor_cache_pool.lock().push(cache);
            }
        }
        if let Some(uniform_buffer) = cmd.uniform_buffer.take() {
            cmd.device.uniform_buffer_pool.lock().push(uniform_buffer);
        }

        let mut fallback = self.fallback.lock();
        if let Some(entry) = fallback.get_mut(&cmd.owning_thread) {
            entry.inactive.push(cmd.raw);
        }
    }

    /// # Safety
    /// No command buffer allocated from any pool may still be in use.
    pub unsafe fn destroy_all(&self, device: &ash::Device) {
        let mut fallback = self.fallback.lock();
        for (_, entry) in fallback.drain() {
            unsafe { device.destroy_command_pool(entry.pool, None) };
        }
    }
}

/// Decide whether cycling a container should select a fresh replacement:
/// true only when the active resource's refcount is greater than zero
/// (§3, §4.6 "Cycling").
pub fn should_cycle(active_refcount: usize) -> bool {
    active_refcount > 0
}

static NEXT_COMMAND_GENERATION: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_generation() -> u64 {
    NEXT_COMMAND_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Select (creating if necessary) the instance a cycled write should land
/// on: reuse an idle instance (refcount zero) before allocating a fresh one
/// (§3, §4.6 "Cycling"). Returns the selected instance's index; the caller
/// re-reads `container.instances` under its own lock afterward.
fn cycle_buffer(device: &DeviceShared, container: &BufferContainer) -> Result<usize, DeviceError> {
    let active = container.active.load(Ordering::Acquire);
    let active_refcount = container.instances.read()[active].refcount.load(Ordering::Acquire);
    if !should_cycle(active_refcount) {
        return Ok(active);
    }

    let mut instances = container.instances.write();
    if let Some(idle) = instances.iter().position(|b| b.refcount.load(Ordering::Acquire) == 0) {
        container.active.store(idle, Ordering::Release);
        return Ok(idle);
    }
    let fresh = unsafe { device.create_buffer_instance(container.kind, container.usage, container.size) }?;
    instances.push(fresh);
    let idx = instances.len() - 1;
    container.active.store(idx, Ordering::Release);
    Ok(idx)
}

fn cycle_texture(device: &DeviceShared, container: &TextureContainer) -> Result<usize, DeviceError> {
    if !container.cycleable {
        return Ok(container.active.load(Ordering::Acquire));
    }
    let active = container.active.load(Ordering::Acquire);
    let active_refcount = container.instances.read()[active].refcount.load(Ordering::Acquire);
    if !should_cycle(active_refcount) {
        return Ok(active);
    }

    let mut instances = container.instances.write();
    if let Some(idle) = instances.iter().position(|t| t.refcount.load(Ordering::Acquire) == 0) {
        container.active.store(idle, Ordering::Release);
        return Ok(idle);
    }
    let info = super::device::TextureCreateInfo {
        format: container.format,
        usage: container.usage,
        extent: container.extent,
        layer_count: container.layer_count,
        level_count: container.level_count,
        debug_name: container.debug_name.as_deref(),
    };
    let fresh = unsafe { device.create_texture_instance(&info) }?;
    instances.push(fresh);
    let idx = instances.len() - 1;
    container.active.store(idx, Ordering::Release);
    Ok(idx)
}

/// Aspect mask for a depth-stencil attachment view, unlike
/// `device::aspect_mask` (used for the eagerly-created sampled/read view),
/// which deliberately excludes stencil (§3).
fn full_aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    let aspect = format.aspect();
    let mut mask = vk::ImageAspectFlags::empty();
    if aspect.contains(gput::FormatAspect::COLOR) {
        mask |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(gput::FormatAspect::DEPTH) {
        mask |= vk::ImageAspectFlags::DEPTH;
    }
    if aspect.contains(gput::FormatAspect::STENCIL) {
        mask |= vk::ImageAspectFlags::STENCIL;
    }
    mask
}

/// Lazily create (or reuse) the render-target view for one color-attachment
/// use of `texture` (§4.2). For a 3D texture `layer_or_slice` addresses a
/// depth slice (views created with `TYPE_2D_ARRAY_COMPATIBLE` aliasing);
/// for a 2D array texture it addresses an actual array layer.
fn color_attachment_view(device: &DeviceShared, texture: &mut Texture, layer_or_slice: u32, level: u32) -> Result<vk::ImageView, DeviceError> {
    let is_3d = texture.depth > 1;
    let sub_index = texture.subresource_index(if is_3d { 0 } else { layer_or_slice }, level);
    let sub = &mut texture.subresources[sub_index];
    let slot = if is_3d { layer_or_slice as usize } else { 0 };
    if sub.render_target_views.len() <= slot {
        sub.render_target_views.resize(slot + 1, vk::ImageView::null());
    }
    if sub.render_target_views[slot] == vk::ImageView::null() {
        let view = unsafe {
            device.create_image_view(
                texture.raw,
                super::conv::texture_format(texture.format),
                super::device::aspect_mask(texture.format),
                level,
                1,
                layer_or_slice,
                1,
                vk::ImageViewType::TYPE_2D,
            )
        }?;
        sub.render_target_views[slot] = view;
    }
    Ok(sub.render_target_views[slot])
}

fn depth_stencil_attachment_view(device: &DeviceShared, texture: &mut Texture, layer: u32, level: u32) -> Result<vk::ImageView, DeviceError> {
    let idx = texture.subresource_index(layer, level);
    let sub = &mut texture.subresources[idx];
    if let Some(view) = sub.depth_stencil_view {
        return Ok(view);
    }
    let view = unsafe {
        device.create_image_view(
            texture.raw,
            super::conv::texture_format(texture.format),
            full_aspect_mask(texture.format),
            level,
            1,
            layer,
            1,
            vk::ImageViewType::TYPE_2D,
        )
    }?;
    sub.depth_stencil_view = Some(view);
    Ok(view)
}

fn compute_write_attachment_view(device: &DeviceShared, texture: &mut Texture, layer: u32, level: u32) -> Result<vk::ImageView, DeviceError> {
    let idx = texture.subresource_index(layer, level);
    let sub = &mut texture.subresources[idx];
    if let Some(view) = sub.compute_write_view {
        return Ok(view);
    }
    let view = unsafe {
        device.create_image_view(
            texture.raw,
            super::conv::texture_format(texture.format),
            super::device::aspect_mask(texture.format),
            level,
            1,
            layer,
            1,
            vk::ImageViewType::TYPE_2D,
        )
    }?;
    sub.compute_write_view = Some(view);
    Ok(view)
}

/// Barrier a resource from its steady-state default mode into `active_mode`
/// for the duration of one pass/use; a no-op when the two coincide (e.g. a
/// plain color-target-only texture, whose default mode already is
/// `ColorAttachment`) (§4.6).
fn enter_active_mode(device: &DeviceShared, cmd: vk::CommandBuffer, image: vk::Image, range: vk::ImageSubresourceRange, default_mode: UsageMode, active_mode: UsageMode) {
    if default_mode == active_mode {
        return;
    }
    let (src_stage, dst_stage, barrier) = super::state::image_barrier(default_mode, active_mode, image, range);
    unsafe { device.raw.cmd_pipeline_barrier(cmd, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[], &[barrier]) };
}

fn leave_active_mode(device: &DeviceShared, cmd: vk::CommandBuffer, image: vk::Image, range: vk::ImageSubresourceRange, default_mode: UsageMode, active_mode: UsageMode) {
    if default_mode == active_mode {
        return;
    }
    let (src_stage, dst_stage, barrier) = super::state::image_barrier(active_mode, default_mode, image, range);
    unsafe { device.raw.cmd_pipeline_barrier(cmd, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[], &[barrier]) };
}

fn buffer_enter_active(device: &DeviceShared, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: u64, size: u64, default_mode: UsageMode, active_mode: UsageMode) {
    if default_mode == active_mode {
        return;
    }
    let (src_stage, dst_stage, barrier) = super::state::buffer_barrier(default_mode, active_mode, buffer, offset, size);
    unsafe { device.raw.cmd_pipeline_barrier(cmd, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[barrier], &[]) };
}

fn buffer_leave_active(device: &DeviceShared, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: u64, size: u64, default_mode: UsageMode, active_mode: UsageMode) {
    if default_mode == active_mode {
        return;
    }
    let (src_stage, dst_stage, barrier) = super::state::buffer_barrier(active_mode, default_mode, buffer, offset, size);
    unsafe { device.raw.cmd_pipeline_barrier(cmd, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[barrier], &[]) };
}

/// Write one resource descriptor set from scratch. Bindings are assigned
/// contiguously, one binding per individual descriptor (not arrayed),
/// matching `DescriptorLayoutTable::get_or_create`'s category order:
/// samplers, storage textures (read), storage buffers (read), storage
/// textures (write), storage buffers (write), uniform buffers.
#[allow(clippy::too_many_arguments)]
fn write_resource_set(
    device: &DeviceShared,
    cache: &mut DescriptorSetCache,
    layout: &DescriptorSetLayout,
    samplers: &[BoundSampler],
    storage_textures: &[vk::ImageView],
    storage_buffers: &[BoundBuffer],
    write_storage_textures: &[vk::ImageView],
    write_storage_buffers: &[BoundBuffer],
    uniform_count: u32,
    uniform_buffer: vk::Buffer,
) -> Result<vk::DescriptorSet, DeviceError> {
    let set = cache.allocate(&device.raw, layout)?;

    let mut binding = 0u32;
    let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::new();
    let mut image_meta: Vec<(u32, vk::DescriptorType)> = Vec::new();
    let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::new();
    let mut buffer_meta: Vec<(u32, vk::DescriptorType)> = Vec::new();

    for b in samplers {
        image_infos.push(vk::DescriptorImageInfo {
            sampler: b.sampler,
            image_view: b.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });
        image_meta.push((binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
        binding += 1;
    }
    for &view in storage_textures {
        image_infos.push(vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });
        image_meta.push((binding, vk::DescriptorType::SAMPLED_IMAGE));
        binding += 1;
    }
    for b in storage_buffers {
        buffer_infos.push(vk::DescriptorBufferInfo { buffer: b.raw, offset: 0, range: b.size });
        buffer_meta.push((binding, vk::DescriptorType::STORAGE_BUFFER));
        binding += 1;
    }
    for &view in write_storage_textures {
        image_infos.push(vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::GENERAL,
        });
        image_meta.push((binding, vk::DescriptorType::STORAGE_IMAGE));
        binding += 1;
    }
    for b in write_storage_buffers {
        buffer_infos.push(vk::DescriptorBufferInfo { buffer: b.raw, offset: 0, range: b.size });
        buffer_meta.push((binding, vk::DescriptorType::STORAGE_BUFFER));
        binding += 1;
    }
    for _ in 0..uniform_count {
        buffer_infos.push(vk::DescriptorBufferInfo { buffer: uniform_buffer, offset: 0, range: UNIFORM_BINDING_RANGE });
        buffer_meta.push((binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC));
        binding += 1;
    }

    let mut writes = Vec::with_capacity(image_meta.len() + buffer_meta.len());
    for (i, &(dst_binding, ty)) in image_meta.iter().enumerate() {
        writes.push(
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(dst_binding)
                .descriptor_type(ty)
                .image_info(&image_infos[i..i + 1])
                .build(),
        );
    }
    for (i, &(dst_binding, ty)) in buffer_meta.iter().enumerate() {
        writes.push(
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(dst_binding)
                .descriptor_type(ty)
                .buffer_info(&buffer_infos[i..i + 1])
                .build(),
        );
    }

    if !writes.is_empty() {
        unsafe { device.raw.update_descriptor_sets(&writes, &[]) };
    }
    Ok(set)
}

impl CommandBuffer {
    fn ensure_descriptor_cache(&mut self) -> &mut DescriptorSetCache {
        if self.descriptor_cache.is_none() {
            let pooled = self.device.descriptor_cache_pool.lock().pop();
            self.descriptor_cache = Some(pooled.unwrap_or_default());
        }
        self.descriptor_cache.as_mut().unwrap()
    }

    fn ensure_uniform_buffer(&mut self) -> Result<&mut UniformBuffer, DeviceError> {
        if self.uniform_buffer.is_none() {
            let pooled = self.device.uniform_buffer_pool.lock().pop();
            let fresh = match pooled {
                Some(ub) => ub,
                None => allocate_uniform_buffer(&self.device)?,
            };
            self.uniform_buffer = Some(fresh);
        }
        Ok(self.uniform_buffer.as_mut().unwrap())
    }

    // -----------------------------------------------------------------
    // Pipeline binds
    // -----------------------------------------------------------------

    pub unsafe fn bind_graphics_pipeline(&mut self, pipeline: &Arc<super::GraphicsPipeline>) {
        unsafe { self.device.raw.cmd_bind_pipeline(self.raw, vk::PipelineBindPoint::GRAPHICS, pipeline.raw) };
        self.graphics.pipeline = Some(pipeline.clone());
        self.graphics.dirty = [true; 4];
    }

    pub unsafe fn bind_compute_pipeline(&mut self, pipeline: &Arc<super::ComputePipeline>) {
        unsafe { self.device.raw.cmd_bind_pipeline(self.raw, vk::PipelineBindPoint::COMPUTE, pipeline.raw) };
        self.compute.pipeline = Some(pipeline.clone());
        self.compute.dirty = [true; 3];
    }

    // -----------------------------------------------------------------
    // Resource binds
    // -----------------------------------------------------------------

    pub fn bind_vertex_sampler(&mut self, slot: u32, sampler: &Sampler, view: &TextureView) -> Result<(), DeviceError> {
        crate::validate::sampler_slot(slot).map_err(|_| DeviceError::Unknown)?;
        set_slot(&mut self.graphics.vertex.samplers, slot, BoundSampler { sampler: sampler.raw, view: view.raw });
        self.graphics.dirty[0] = true;
        Ok(())
    }

    pub fn bind_fragment_sampler(&mut self, slot: u32, sampler: &Sampler, view: &TextureView) -> Result<(), DeviceError> {
        crate::validate::sampler_slot(slot).map_err(|_| DeviceError::Unknown)?;
        set_slot(&mut self.graphics.fragment.samplers, slot, BoundSampler { sampler: sampler.raw, view: view.raw });
        self.graphics.dirty[2] = true;
        Ok(())
    }

    pub fn bind_compute_sampler(&mut self, slot: u32, sampler: &Sampler, view: &TextureView) -> Result<(), DeviceError> {
        crate::validate::sampler_slot(slot).map_err(|_| DeviceError::Unknown)?;
        set_slot(&mut self.compute.read.samplers, slot, BoundSampler { sampler: sampler.raw, view: view.raw });
        self.compute.dirty[0] = true;
        Ok(())
    }

    pub fn bind_vertex_storage_texture(&mut self, slot: u32, container: &TextureContainer) -> Result<(), DeviceError> {
        crate::validate::storage_texture_slot(slot).map_err(|_| DeviceError::Unknown)?;
        let view = self.active_full_view(container)?;
        set_slot(&mut self.graphics.vertex.storage_textures, slot, view);
        self.graphics.dirty[0] = true;
        Ok(())
    }

    pub fn bind_fragment_storage_texture(&mut self, slot: u32, container: &TextureContainer) -> Result<(), DeviceError> {
        crate::validate::storage_texture_slot(slot).map_err(|_| DeviceError::Unknown)?;
        let view = self.active_full_view(container)?;
        set_slot(&mut self.graphics.fragment.storage_textures, slot, view);
        self.graphics.dirty[2] = true;
        Ok(())
    }

    /// Bind a read-only storage texture for the active compute pass,
    /// barriering it from its steady-state default mode into
    /// `ComputeStorageReadTexture` for the duration of the pass (§4.6
    /// "compute-pass read-only bindings barrier on bind and on pass end").
    pub fn bind_compute_storage_texture(&mut self, slot: u32, container: &TextureContainer) -> Result<(), DeviceError> {
        crate::validate::storage_texture_slot(slot).map_err(|_| DeviceError::Unknown)?;
        debug_assert_eq!(self.active_pass, ActivePass::Compute);
        let view = self.active_full_view(container)?;
        self.enter_compute_texture_mode(container, UsageMode::ComputeStorageReadTexture)?;
        set_slot(&mut self.compute.read.storage_textures, slot, view);
        self.compute.dirty[0] = true;
        Ok(())
    }

    pub fn bind_compute_write_storage_texture(&mut self, slot: u32, container: &TextureContainer) -> Result<(), DeviceError> {
        crate::validate::compute_write_texture_slot(slot).map_err(|_| DeviceError::Unknown)?;
        debug_assert_eq!(self.active_pass, ActivePass::Compute);
        let device = self.device.clone();
        let idx = container.active.load(Ordering::Acquire);
        let mut instances = container.instances.write();
        let texture = &mut instances[idx];
        let view = compute_write_attachment_view(&device, texture, 0, 0)?;
        self.tracked.push(texture.refcount.clone());
        let default_mode = container.usage.default_mode().expect("texture created without usage bits");
        let range = full_subresource_range(texture);
        enter_active_mode(&device, self.raw, texture.raw, range, default_mode, UsageMode::ComputeStorageReadWriteTexture);
        self.pass_transitions.images.push(PendingImageTransition {
            image: texture.raw,
            range,
            default_mode,
            active_mode: UsageMode::ComputeStorageReadWriteTexture,
        });
        drop(instances);
        set_slot(&mut self.compute.write.storage_textures, slot, view);
        self.compute.dirty[1] = true;
        Ok(())
    }

    pub fn bind_vertex_storage_buffer(&mut self, slot: u32, container: &BufferContainer) -> Result<(), DeviceError> {
        crate::validate::storage_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        let bound = self.active_bound_buffer(container);
        set_slot(&mut self.graphics.vertex.storage_buffers, slot, bound);
        self.graphics.dirty[0] = true;
        Ok(())
    }

    pub fn bind_fragment_storage_buffer(&mut self, slot: u32, container: &BufferContainer) -> Result<(), DeviceError> {
        crate::validate::storage_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        let bound = self.active_bound_buffer(container);
        set_slot(&mut self.graphics.fragment.storage_buffers, slot, bound);
        self.graphics.dirty[2] = true;
        Ok(())
    }

    pub fn bind_compute_storage_buffer(&mut self, slot: u32, container: &BufferContainer) -> Result<(), DeviceError> {
        crate::validate::storage_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        debug_assert_eq!(self.active_pass, ActivePass::Compute);
        let bound = self.active_bound_buffer(container);
        let default_mode = container.usage.default_mode().expect("buffer created without usage bits");
        self.enter_compute_buffer_mode(bound.raw, bound.size, default_mode, UsageMode::ComputeStorageRead);
        set_slot(&mut self.compute.read.storage_buffers, slot, bound);
        self.compute.dirty[0] = true;
        Ok(())
    }

    pub fn bind_compute_write_storage_buffer(&mut self, slot: u32, container: &BufferContainer) -> Result<(), DeviceError> {
        crate::validate::compute_write_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        debug_assert_eq!(self.active_pass, ActivePass::Compute);
        let bound = self.active_bound_buffer(container);
        let default_mode = container.usage.default_mode().expect("buffer created without usage bits");
        self.enter_compute_buffer_mode(bound.raw, bound.size, default_mode, UsageMode::ComputeStorageReadWrite);
        set_slot(&mut self.compute.write.storage_buffers, slot, bound);
        self.compute.dirty[1] = true;
        Ok(())
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, container: &BufferContainer, offset: u64) -> Result<(), DeviceError> {
        crate::validate::vertex_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        let bound = self.active_bound_buffer(container);
        while self.graphics.vertex_buffers.len() <= slot as usize {
            self.graphics.vertex_buffers.push((vk::Buffer::null(), 0));
        }
        self.graphics.vertex_buffers[slot as usize] = (bound.raw, offset);
        unsafe { self.device.raw.cmd_bind_vertex_buffers(self.raw, slot, &[bound.raw], &[offset]) };
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, container: &BufferContainer, offset: u64, size: IndexElementSize) {
        let bound = self.active_bound_buffer(container);
        self.graphics.index_buffer = Some((bound.raw, offset, size));
        unsafe { self.device.raw.cmd_bind_index_buffer(self.raw, bound.raw, offset, size.to_vk()) };
    }

    fn active_bound_buffer(&mut self, container: &BufferContainer) -> BoundBuffer {
        let idx = container.active.load(Ordering::Acquire);
        let instances = container.instances.read();
        let buffer = &instances[idx];
        self.tracked.push(buffer.refcount.clone());
        BoundBuffer { raw: buffer.raw, size: buffer.size }
    }

    fn active_full_view(&mut self, container: &TextureContainer) -> Result<vk::ImageView, DeviceError> {
        let idx = container.active.load(Ordering::Acquire);
        let instances = container.instances.read();
        let texture = &instances[idx];
        self.tracked.push(texture.refcount.clone());
        texture.full_view.ok_or(DeviceError::Unknown)
    }

    fn enter_compute_texture_mode(&mut self, container: &TextureContainer, active_mode: UsageMode) -> Result<(), DeviceError> {
        let device = self.device.clone();
        let idx = container.active.load(Ordering::Acquire);
        let instances = container.instances.read();
        let texture = &instances[idx];
        let default_mode = container.usage.default_mode().expect("texture created without usage bits");
        let range = full_subresource_range(texture);
        enter_active_mode(&device, self.raw, texture.raw, range, default_mode, active_mode);
        self.pass_transitions.images.push(PendingImageTransition { image: texture.raw, range, default_mode, active_mode });
        Ok(())
    }

    fn enter_compute_buffer_mode(&mut self, buffer: vk::Buffer, size: u64, default_mode: UsageMode, active_mode: UsageMode) {
        let device = self.device.clone();
        buffer_enter_active(&device, self.raw, buffer, 0, size, default_mode, active_mode);
        self.pass_transitions.buffers.push(PendingBufferTransition { buffer, offset: 0, size, default_mode, active_mode });
    }

    // -----------------------------------------------------------------
    // Dynamic state
    // -----------------------------------------------------------------

    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe { self.device.raw.cmd_set_viewport(self.raw, 0, &[viewport]) };
        self.graphics.viewport = Some(viewport);
    }

    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe { self.device.raw.cmd_set_scissor(self.raw, 0, &[scissor]) };
        self.graphics.scissor = Some(scissor);
    }

    pub fn set_blend_constants(&mut self, constants: [f32; 4]) {
        unsafe { self.device.raw.cmd_set_blend_constants(self.raw, &constants) };
        self.graphics.blend_constants = constants;
    }

    pub fn set_stencil_reference(&mut self, reference: u32) {
        unsafe {
            self.device
                .raw
                .cmd_set_stencil_reference(self.raw, vk::StencilFaceFlags::FRONT_AND_BACK, reference)
        };
        self.graphics.stencil_reference = reference;
    }

    // -----------------------------------------------------------------
    // Push uniform data
    // -----------------------------------------------------------------

    fn push_uniform_data(&mut self, slot: u32, data: &[u8], dirty_slot_index: usize) -> Result<(), DeviceError> {
        let alignment = self.device.min_uniform_buffer_offset_alignment;
        let offset = loop {
            let buffer = self.ensure_uniform_buffer()?;
            if let Some(offset) = buffer.push(data, alignment) {
                break offset;
            }
            // Ring is full: cycle to a fresh pooled (or newly allocated)
            // uniform buffer and mark every uniform-bearing slot dirty,
            // since their descriptor writes reference the old `VkBuffer`.
            let fresh = allocate_uniform_buffer(&self.device)?;
            self.uniform_buffer = Some(fresh);
            self.graphics.dirty[1] = true;
            self.graphics.dirty[3] = true;
            self.compute.dirty[2] = true;
        };
        match dirty_slot_index {
            0 => {
                self.graphics.vertex_uniform_offsets[slot as usize] = offset as u32;
                self.graphics.dirty[1] = true;
            }
            1 => {
                self.graphics.fragment_uniform_offsets[slot as usize] = offset as u32;
                self.graphics.dirty[3] = true;
            }
            _ => {
                self.compute.uniform_offsets[slot as usize] = offset as u32;
                self.compute.dirty[2] = true;
            }
        }
        Ok(())
    }

    pub fn push_vertex_uniform_data(&mut self, slot: u32, data: &[u8]) -> Result<(), DeviceError> {
        crate::validate::uniform_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        self.push_uniform_data(slot, data, 0)
    }

    pub fn push_fragment_uniform_data(&mut self, slot: u32, data: &[u8]) -> Result<(), DeviceError> {
        crate::validate::uniform_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        self.push_uniform_data(slot, data, 1)
    }

    pub fn push_compute_uniform_data(&mut self, slot: u32, data: &[u8]) -> Result<(), DeviceError> {
        crate::validate::uniform_buffer_slot(slot).map_err(|_| DeviceError::Unknown)?;
        self.push_uniform_data(slot, data, 2)
    }

    // -----------------------------------------------------------------
    // Render passes
    // -----------------------------------------------------------------

    pub fn begin_render_pass(&mut self, colors: &[ColorTargetInfo], depth_stencil: Option<&DepthStencilTargetInfo>) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::None);
        crate::validate::color_target_count(colors.len() as u32).map_err(|_| DeviceError::Unknown)?;
        let device = self.device.clone();

        let mut color_keys: ArrayVec<ColorAttachmentKey, MAX_COLOR_ATTACHMENTS> = ArrayVec::new();
        let mut attachment_views: ArrayVec<vk::ImageView, { MAX_COLOR_ATTACHMENTS * 2 + 1 }> = ArrayVec::new();
        let mut clear_values: Vec<vk::ClearValue> = Vec::new();
        let mut width = 0u32;
        let mut height = 0u32;

        for target in colors {
            let container = target.texture;
            let default_mode = container.usage.default_mode().expect("texture created without usage bits");
            let idx = if target.cycle { cycle_texture(&device, container)? } else { container.active.load(Ordering::Acquire) };
            let (view, raw_image, range) = {
                let mut instances = container.instances.write();
                let texture = &mut instances[idx];
                let view = color_attachment_view(&device, texture, target.layer, target.level)?;
                self.tracked.push(texture.refcount.clone());
                let range = vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: target.level,
                    level_count: 1,
                    base_array_layer: target.layer,
                    layer_count: 1,
                };
                (view, texture.raw, range)
            };
            enter_active_mode(&device, self.raw, raw_image, range, default_mode, UsageMode::ColorAttachment);
            self.pass_transitions.images.push(PendingImageTransition { image: raw_image, range, default_mode, active_mode: UsageMode::ColorAttachment });

            color_keys.push(ColorAttachmentKey { format: container.format, load_op: target.load_op, store_op: target.store_op });
            attachment_views.push(view);
            clear_values.push(vk::ClearValue { color: vk::ClearColorValue { float32: target.clear_color } });
            width = container.extent.width;
            height = container.extent.height;
        }

        let depth_key = match depth_stencil {
            Some(ds) => {
                let container = ds.texture;
                let default_mode = container.usage.default_mode().expect("texture created without usage bits");
                let idx = if ds.cycle { cycle_texture(&device, container)? } else { container.active.load(Ordering::Acquire) };
                let (view, raw_image, range) = {
                    let mut instances = container.instances.write();
                    let texture = &mut instances[idx];
                    let view = depth_stencil_attachment_view(&device, texture, 0, 0)?;
                    self.tracked.push(texture.refcount.clone());
                    let range = full_subresource_range(texture);
                    (view, texture.raw, range)
                };
                enter_active_mode(&device, self.raw, raw_image, range, default_mode, UsageMode::DepthStencilAttachment);
                self.pass_transitions.images.push(PendingImageTransition { image: raw_image, range, default_mode, active_mode: UsageMode::DepthStencilAttachment });

                attachment_views.push(view);
                clear_values.push(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: ds.clear_depth, stencil: ds.clear_stencil },
                });
                width = container.extent.width;
                height = container.extent.height;
                Some(DepthStencilAttachmentKey {
                    format: container.format,
                    load_op: ds.load_op,
                    store_op: ds.store_op,
                    stencil_load_op: ds.stencil_load_op,
                    stencil_store_op: ds.stencil_store_op,
                })
            }
            None => None,
        };

        let render_pass = device.render_pass_for(RenderPassKey {
            colors: color_keys,
            resolve_formats: ArrayVec::new(),
            depth_stencil: depth_key,
            samples: gput::SampleCount::One,
        })?;
        let framebuffer = device.framebuffer_for(render_pass, FramebufferKey { attachments: attachment_views, width, height })?;

        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: vk::Extent2D { width, height } })
            .clear_values(&clear_values)
            .build();
        unsafe { self.device.raw.cmd_begin_render_pass(self.raw, &info, vk::SubpassContents::INLINE) };
        self.active_pass = ActivePass::Render;
        Ok(())
    }

    pub fn end_render_pass(&mut self) {
        debug_assert_eq!(self.active_pass, ActivePass::Render);
        unsafe { self.device.raw.cmd_end_render_pass(self.raw) };
        self.replay_pass_transitions();
        self.active_pass = ActivePass::None;
        self.graphics.pipeline = None;
        self.graphics.dirty = [true; 4];
    }

    // -----------------------------------------------------------------
    // Compute passes
    // -----------------------------------------------------------------

    pub fn begin_compute_pass(&mut self) {
        debug_assert_eq!(self.active_pass, ActivePass::None);
        self.active_pass = ActivePass::Compute;
    }

    pub fn end_compute_pass(&mut self) {
        debug_assert_eq!(self.active_pass, ActivePass::Compute);
        self.replay_pass_transitions();
        self.active_pass = ActivePass::None;
        self.compute.pipeline = None;
        self.compute.dirty = [true; 3];
    }

    // -----------------------------------------------------------------
    // Copy passes
    // -----------------------------------------------------------------

    /// Pure marker (§4.6): individual upload/download/copy/blit operations
    /// issue their own barrier immediately around themselves rather than
    /// deferring to pass end.
    pub fn begin_copy_pass(&mut self) {
        debug_assert_eq!(self.active_pass, ActivePass::None);
        self.active_pass = ActivePass::Copy;
    }

    pub fn end_copy_pass(&mut self) {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        self.active_pass = ActivePass::None;
    }

    fn replay_pass_transitions(&mut self) {
        let device = self.device.clone();
        for t in self.pass_transitions.images.drain(..) {
            leave_active_mode(&device, self.raw, t.image, t.range, t.default_mode, t.active_mode);
        }
        for t in self.pass_transitions.buffers.drain(..) {
            buffer_leave_active(&device, self.raw, t.buffer, t.offset, t.size, t.default_mode, t.active_mode);
        }
    }

    // -----------------------------------------------------------------
    // Descriptor set (re)binding
    // -----------------------------------------------------------------

    fn ensure_graphics_descriptor_sets(&mut self) -> Result<(), DeviceError> {
        let pipeline = self.graphics.pipeline.clone().expect("no graphics pipeline bound");
        let device = self.device.clone();
        let uniform_buffer = self.uniform_buffer.as_ref().map(|u| u.buffer.raw).unwrap_or(vk::Buffer::null());

        if self.graphics.dirty[0] {
            let cache = self.ensure_descriptor_cache();
            let set = write_resource_set(
                &device,
                cache,
                &pipeline.layout.set_layouts[0],
                &self.graphics.vertex.samplers,
                &self.graphics.vertex.storage_textures,
                &self.graphics.vertex.storage_buffers,
                &[],
                &[],
                0,
                vk::Buffer::null(),
            )?;
            self.graphics.sets[0] = Some(set);
            self.graphics.dirty[0] = false;
        }
        if self.graphics.dirty[1] {
            let count = pipeline.layout.set_layouts[1].key.uniform_buffers;
            let cache = self.ensure_descriptor_cache();
            let set = write_resource_set(&device, cache, &pipeline.layout.set_layouts[1], &[], &[], &[], &[], &[], count, uniform_buffer)?;
            self.graphics.sets[1] = Some(set);
            self.graphics.dirty[1] = false;
        }
        if self.graphics.dirty[2] {
            let cache = self.ensure_descriptor_cache();
            let set = write_resource_set(
                &device,
                cache,
                &pipeline.layout.set_layouts[2],
                &self.graphics.fragment.samplers,
                &self.graphics.fragment.storage_textures,
                &self.graphics.fragment.storage_buffers,
                &[],
                &[],
                0,
                vk::Buffer::null(),
            )?;
            self.graphics.sets[2] = Some(set);
            self.graphics.dirty[2] = false;
        }
        if self.graphics.dirty[3] {
            let count = pipeline.layout.set_layouts[3].key.uniform_buffers;
            let cache = self.ensure_descriptor_cache();
            let set = write_resource_set(&device, cache, &pipeline.layout.set_layouts[3], &[], &[], &[], &[], &[], count, uniform_buffer)?;
            self.graphics.sets[3] = Some(set);
            self.graphics.dirty[3] = false;
        }
        Ok(())
    }

    fn bind_graphics_descriptor_sets(&self) {
        let pipeline = self.graphics.pipeline.as_ref().expect("no graphics pipeline bound");
        let sets: Vec<vk::DescriptorSet> = self.graphics.sets.iter().map(|s| s.unwrap_or(vk::DescriptorSet::null())).collect();
        let mut offsets = Vec::new();
        let vcount = pipeline.layout.set_layouts[1].key.uniform_buffers as usize;
        offsets.extend_from_slice(&self.graphics.vertex_uniform_offsets[..vcount]);
        let fcount = pipeline.layout.set_layouts[3].key.uniform_buffers as usize;
        offsets.extend_from_slice(&self.graphics.fragment_uniform_offsets[..fcount]);
        unsafe {
            self.device
                .raw
                .cmd_bind_descriptor_sets(self.raw, vk::PipelineBindPoint::GRAPHICS, pipeline.layout.pipeline_layout, 0, &sets, &offsets)
        };
    }

    fn ensure_compute_descriptor_sets(&mut self) -> Result<(), DeviceError> {
        let pipeline = self.compute.pipeline.clone().expect("no compute pipeline bound");
        let device = self.device.clone();
        let uniform_buffer = self.uniform_buffer.as_ref().map(|u| u.buffer.raw).unwrap_or(vk::Buffer::null());

        if self.compute.dirty[0] {
            let cache = self.ensure_descriptor_cache();
            let set = write_resource_set(
                &device,
                cache,
                &pipeline.layout.set_layouts[0],
                &self.compute.read.samplers,
                &self.compute.read.storage_textures,
                &self.compute.read.storage_buffers,
                &[],
                &[],
                0,
                vk::Buffer::null(),
            )?;
            self.compute.sets[0] = Some(set);
            self.compute.dirty[0] = false;
        }
        if self.compute.dirty[1] {
            let cache = self.ensure_descriptor_cache();
            let set = write_resource_set(
                &device,
                cache,
                &pipeline.layout.set_layouts[1],
                &[],
                &[],
                &[],
                &self.compute.write.storage_textures,
                &self.compute.write.storage_buffers,
                0,
                vk::Buffer::null(),
            )?;
            self.compute.sets[1] = Some(set);
            self.compute.dirty[1] = false;
        }
        if self.compute.dirty[2] {
            let count = pipeline.layout.set_layouts[2].key.uniform_buffers;
            let cache = self.ensure_descriptor_cache();
            let set = write_resource_set(&device, cache, &pipeline.layout.set_layouts[2], &[], &[], &[], &[], &[], count, uniform_buffer)?;
            self.compute.sets[2] = Some(set);
            self.compute.dirty[2] = false;
        }
        Ok(())
    }

    fn bind_compute_descriptor_sets(&self) {
        let pipeline = self.compute.pipeline.as_ref().expect("no compute pipeline bound");
        let sets: Vec<vk::DescriptorSet> = self.compute.sets.iter().map(|s| s.unwrap_or(vk::DescriptorSet::null())).collect();
        let count = pipeline.layout.set_layouts[2].key.uniform_buffers as usize;
        let offsets = &self.compute.uniform_offsets[..count];
        unsafe {
            self.device
                .raw
                .cmd_bind_descriptor_sets(self.raw, vk::PipelineBindPoint::COMPUTE, pipeline.layout.pipeline_layout, 0, &sets, offsets)
        };
    }

    // -----------------------------------------------------------------
    // Draws
    // -----------------------------------------------------------------

    pub fn draw_primitives(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Render);
        self.ensure_graphics_descriptor_sets()?;
        self.bind_graphics_descriptor_sets();
        unsafe { self.device.raw.cmd_draw(self.raw, vertex_count, instance_count, first_vertex, first_instance) };
        Ok(())
    }

    pub fn draw_indexed_primitives(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Render);
        self.ensure_graphics_descriptor_sets()?;
        self.bind_graphics_descriptor_sets();
        unsafe {
            self.device
                .raw
                .cmd_draw_indexed(self.raw, index_count, instance_count, first_index, vertex_offset, first_instance)
        };
        Ok(())
    }

    /// Emulates `multiDrawIndirect` with `draw_count` single-draw commands
    /// when the device lacks the feature (§4.6).
    pub fn draw_primitives_indirect(&mut self, indirect: &BufferContainer, offset: u64, draw_count: u32, stride: u32) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Render);
        self.ensure_graphics_descriptor_sets()?;
        self.bind_graphics_descriptor_sets();
        let bound = self.active_bound_buffer(indirect);
        if self.device.private_caps.multi_draw_indirect {
            unsafe { self.device.raw.cmd_draw_indirect(self.raw, bound.raw, offset, draw_count, stride) };
        } else {
            for i in 0..draw_count {
                unsafe { self.device.raw.cmd_draw_indirect(self.raw, bound.raw, offset + (i as u64) * (stride as u64), 1, stride) };
            }
        }
        Ok(())
    }

    pub fn draw_indexed_primitives_indirect(&mut self, indirect: &BufferContainer, offset: u64, draw_count: u32, stride: u32) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Render);
        self.ensure_graphics_descriptor_sets()?;
        self.bind_graphics_descriptor_sets();
        let bound = self.active_bound_buffer(indirect);
        if self.device.private_caps.multi_draw_indirect {
            unsafe { self.device.raw.cmd_draw_indexed_indirect(self.raw, bound.raw, offset, draw_count, stride) };
        } else {
            for i in 0..draw_count {
                unsafe { self.device.raw.cmd_draw_indexed_indirect(self.raw, bound.raw, offset + (i as u64) * (stride as u64), 1, stride) };
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Dispatches
    // -----------------------------------------------------------------

    pub fn dispatch_compute(&mut self, group_x: u32, group_y: u32, group_z: u32) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Compute);
        self.ensure_compute_descriptor_sets()?;
        self.bind_compute_descriptor_sets();
        unsafe { self.device.raw.cmd_dispatch(self.raw, group_x, group_y, group_z) };
        Ok(())
    }

    pub fn dispatch_compute_indirect(&mut self, indirect: &BufferContainer, offset: u64) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Compute);
        self.ensure_compute_descriptor_sets()?;
        self.bind_compute_descriptor_sets();
        let bound = self.active_bound_buffer(indirect);
        unsafe { self.device.raw.cmd_dispatch_indirect(self.raw, bound.raw, offset) };
        Ok(())
    }

    // -----------------------------------------------------------------
    // Buffer copies
    // -----------------------------------------------------------------

    pub fn upload_to_buffer(&mut self, src: &BufferContainer, dst: &BufferContainer, dst_offset: u64, size: u64, cycle: bool) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        let device = self.device.clone();
        if cycle {
            cycle_buffer(&device, dst)?;
        }
        let src_bound = self.active_bound_buffer(src);
        let dst_bound = self.active_bound_buffer(dst);
        let dst_mode = dst.usage.default_mode().expect("buffer created without usage bits");

        let (src_stage, dst_stage, barrier) = super::state::buffer_barrier(dst_mode, UsageMode::TransferDestination, dst_bound.raw, dst_offset, size);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[barrier], &[]) };
        let region = vk::BufferCopy { src_offset: 0, dst_offset, size };
        unsafe { self.device.raw.cmd_copy_buffer(self.raw, src_bound.raw, dst_bound.raw, &[region]) };
        let (src_stage, dst_stage, barrier) = super::state::buffer_barrier(UsageMode::TransferDestination, dst_mode, dst_bound.raw, dst_offset, size);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[barrier], &[]) };
        Ok(())
    }

    pub fn download_from_buffer(&mut self, src: &BufferContainer, src_offset: u64, dst: &BufferContainer, size: u64) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        let src_bound = self.active_bound_buffer(src);
        let dst_bound = self.active_bound_buffer(dst);
        let src_mode = src.usage.default_mode().expect("buffer created without usage bits");

        let (src_stage, dst_stage, barrier) = super::state::buffer_barrier(src_mode, UsageMode::TransferSource, src_bound.raw, src_offset, size);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[barrier], &[]) };
        let region = vk::BufferCopy { src_offset, dst_offset: 0, size };
        unsafe { self.device.raw.cmd_copy_buffer(self.raw, src_bound.raw, dst_bound.raw, &[region]) };
        let (src_stage, dst_stage, barrier) = super::state::buffer_barrier(UsageMode::TransferSource, src_mode, src_bound.raw, src_offset, size);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[barrier], &[]) };
        Ok(())
    }

    pub fn copy_buffer_to_buffer(&mut self, src: &BufferContainer, src_offset: u64, dst: &BufferContainer, dst_offset: u64, size: u64, cycle: bool) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        let device = self.device.clone();
        if cycle {
            cycle_buffer(&device, dst)?;
        }
        let src_bound = self.active_bound_buffer(src);
        let dst_bound = self.active_bound_buffer(dst);
        let src_mode = src.usage.default_mode().expect("buffer created without usage bits");
        let dst_mode = dst.usage.default_mode().expect("buffer created without usage bits");

        let (s1, d1, b1) = super::state::buffer_barrier(src_mode, UsageMode::TransferSource, src_bound.raw, src_offset, size);
        let (s2, d2, b2) = super::state::buffer_barrier(dst_mode, UsageMode::TransferDestination, dst_bound.raw, dst_offset, size);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[b1, b2], &[]) };
        let region = vk::BufferCopy { src_offset, dst_offset, size };
        unsafe { self.device.raw.cmd_copy_buffer(self.raw, src_bound.raw, dst_bound.raw, &[region]) };
        let (s1, d1, b1) = super::state::buffer_barrier(UsageMode::TransferSource, src_mode, src_bound.raw, src_offset, size);
        let (s2, d2, b2) = super::state::buffer_barrier(UsageMode::TransferDestination, dst_mode, dst_bound.raw, dst_offset, size);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[b1, b2], &[]) };
        Ok(())
    }

    // -----------------------------------------------------------------
    // Texture copies, blits, mipmaps
    // -----------------------------------------------------------------

    pub fn upload_to_texture(&mut self, src: &BufferContainer, src_offset: u64, dst: &TextureContainer, region: CopyRegion, extent: CopyExtent, cycle: bool) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        let device = self.device.clone();
        let idx = if cycle { cycle_texture(&device, dst)? } else { dst.active.load(Ordering::Acquire) };
        let src_bound = self.active_bound_buffer(src);
        let default_mode = dst.usage.default_mode().expect("texture created without usage bits");

        let (dst_raw, range) = {
            let instances = dst.instances.read();
            let texture = &instances[idx];
            self.tracked.push(texture.refcount.clone());
            (texture.raw, subresource_range(texture, region.layer, region.level))
        };

        let (src_stage, dst_stage, barrier) = super::state::image_barrier(default_mode, UsageMode::TransferDestination, dst_raw, range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[], &[barrier]) };

        let copy = vk::BufferImageCopy::builder()
            .buffer_offset(src_offset)
            .image_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: region.level, base_array_layer: region.layer, layer_count: 1 })
            .image_offset(vk::Offset3D { x: region.x as i32, y: region.y as i32, z: region.z as i32 })
            .image_extent(vk::Extent3D { width: extent.width, height: extent.height, depth: extent.depth.max(1) })
            .build();
        unsafe { self.device.raw.cmd_copy_buffer_to_image(self.raw, src_bound.raw, dst_raw, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[copy]) };

        let (src_stage, dst_stage, barrier) = super::state::image_barrier(UsageMode::TransferDestination, default_mode, dst_raw, range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[], &[barrier]) };
        Ok(())
    }

    pub fn download_from_texture(&mut self, src: &TextureContainer, region: CopyRegion, extent: CopyExtent, dst: &BufferContainer, dst_offset: u64) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        let idx = src.active.load(Ordering::Acquire);
        let dst_bound = self.active_bound_buffer(dst);
        let default_mode = src.usage.default_mode().expect("texture created without usage bits");

        let (src_raw, range) = {
            let instances = src.instances.read();
            let texture = &instances[idx];
            self.tracked.push(texture.refcount.clone());
            (texture.raw, subresource_range(texture, region.layer, region.level))
        };

        let (src_stage, dst_stage, barrier) = super::state::image_barrier(default_mode, UsageMode::TransferSource, src_raw, range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[], &[barrier]) };

        let copy = vk::BufferImageCopy::builder()
            .buffer_offset(dst_offset)
            .image_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: region.level, base_array_layer: region.layer, layer_count: 1 })
            .image_offset(vk::Offset3D { x: region.x as i32, y: region.y as i32, z: region.z as i32 })
            .image_extent(vk::Extent3D { width: extent.width, height: extent.height, depth: extent.depth.max(1) })
            .build();
        unsafe { self.device.raw.cmd_copy_image_to_buffer(self.raw, src_raw, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, dst_bound.raw, &[copy]) };

        let (src_stage, dst_stage, barrier) = super::state::image_barrier(UsageMode::TransferSource, default_mode, src_raw, range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &[], &[barrier]) };
        Ok(())
    }

    pub fn copy_texture_to_texture(&mut self, src: &TextureContainer, src_region: CopyRegion, dst: &TextureContainer, dst_region: CopyRegion, extent: CopyExtent, cycle: bool) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        let device = self.device.clone();
        let dst_idx = if cycle { cycle_texture(&device, dst)? } else { dst.active.load(Ordering::Acquire) };
        let src_idx = src.active.load(Ordering::Acquire);
        let src_default = src.usage.default_mode().expect("texture created without usage bits");
        let dst_default = dst.usage.default_mode().expect("texture created without usage bits");

        let (src_raw, src_range) = {
            let instances = src.instances.read();
            let texture = &instances[src_idx];
            self.tracked.push(texture.refcount.clone());
            (texture.raw, subresource_range(texture, src_region.layer, src_region.level))
        };
        let (dst_raw, dst_range) = {
            let instances = dst.instances.read();
            let texture = &instances[dst_idx];
            self.tracked.push(texture.refcount.clone());
            (texture.raw, subresource_range(texture, dst_region.layer, dst_region.level))
        };

        let (s1, d1, b1) = super::state::image_barrier(src_default, UsageMode::TransferSource, src_raw, src_range);
        let (s2, d2, b2) = super::state::image_barrier(dst_default, UsageMode::TransferDestination, dst_raw, dst_range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[], &[b1, b2]) };

        let copy = vk::ImageCopy::builder()
            .src_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: src_region.level, base_array_layer: src_region.layer, layer_count: 1 })
            .src_offset(vk::Offset3D { x: src_region.x as i32, y: src_region.y as i32, z: src_region.z as i32 })
            .dst_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: dst_region.level, base_array_layer: dst_region.layer, layer_count: 1 })
            .dst_offset(vk::Offset3D { x: dst_region.x as i32, y: dst_region.y as i32, z: dst_region.z as i32 })
            .extent(vk::Extent3D { width: extent.width, height: extent.height, depth: extent.depth.max(1) })
            .build();
        unsafe {
            self.device
                .raw
                .cmd_copy_image(self.raw, src_raw, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, dst_raw, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[copy])
        };

        let (s1, d1, b1) = super::state::image_barrier(UsageMode::TransferSource, src_default, src_raw, src_range);
        let (s2, d2, b2) = super::state::image_barrier(UsageMode::TransferDestination, dst_default, dst_raw, dst_range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[], &[b1, b2]) };
        Ok(())
    }

    /// `BlitTexture` (§4.6): if `load_op` is `Clear`, a zero-op render pass
    /// is begun and ended on the destination first to issue the clear via
    /// attachment load; the copy itself is one `vkCmdBlitImage`, with an
    /// optional horizontal/vertical flip applied by swapping each region's
    /// `srcOffsets` pair.
    #[allow(clippy::too_many_arguments)]
    pub fn blit_texture(
        &mut self,
        src: &TextureContainer,
        src_region: CopyRegion,
        src_extent: CopyExtent,
        dst: &TextureContainer,
        dst_region: CopyRegion,
        dst_extent: CopyExtent,
        filter: vk::Filter,
        load_op: LoadOp,
        clear_color: [f32; 4],
        flip_x: bool,
        flip_y: bool,
        cycle: bool,
    ) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        if load_op == LoadOp::Clear {
            self.begin_render_pass(
                &[ColorTargetInfo {
                    texture: dst,
                    layer: dst_region.layer,
                    level: dst_region.level,
                    load_op: LoadOp::Clear,
                    store_op: StoreOp::Store,
                    clear_color,
                    cycle,
                }],
                None,
            )?;
            self.end_render_pass();
        }

        let device = self.device.clone();
        let dst_idx = if cycle && load_op != LoadOp::Clear { cycle_texture(&device, dst)? } else { dst.active.load(Ordering::Acquire) };
        let src_idx = src.active.load(Ordering::Acquire);
        let src_default = src.usage.default_mode().expect("texture created without usage bits");
        let dst_default = dst.usage.default_mode().expect("texture created without usage bits");

        let (src_raw, src_range) = {
            let instances = src.instances.read();
            let texture = &instances[src_idx];
            self.tracked.push(texture.refcount.clone());
            (texture.raw, subresource_range(texture, src_region.layer, src_region.level))
        };
        let (dst_raw, dst_range) = {
            let instances = dst.instances.read();
            let texture = &instances[dst_idx];
            self.tracked.push(texture.refcount.clone());
            (texture.raw, subresource_range(texture, dst_region.layer, dst_region.level))
        };

        let (s1, d1, b1) = super::state::image_barrier(src_default, UsageMode::TransferSource, src_raw, src_range);
        let (s2, d2, b2) = super::state::image_barrier(dst_default, UsageMode::TransferDestination, dst_raw, dst_range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[], &[b1, b2]) };

        let mut src_offsets = [
            vk::Offset3D { x: src_region.x as i32, y: src_region.y as i32, z: src_region.z as i32 },
            vk::Offset3D {
                x: src_region.x as i32 + src_extent.width as i32,
                y: src_region.y as i32 + src_extent.height as i32,
                z: src_region.z as i32 + src_extent.depth.max(1) as i32,
            },
        ];
        if flip_x {
            let (x0, x1) = (src_offsets[0].x, src_offsets[1].x);
            src_offsets[0].x = x1;
            src_offsets[1].x = x0;
        }
        if flip_y {
            let (y0, y1) = (src_offsets[0].y, src_offsets[1].y);
            src_offsets[0].y = y1;
            src_offsets[1].y = y0;
        }

        let blit = vk::ImageBlit::builder()
            .src_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: src_region.level, base_array_layer: src_region.layer, layer_count: 1 })
            .src_offsets(src_offsets)
            .dst_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: dst_region.level, base_array_layer: dst_region.layer, layer_count: 1 })
            .dst_offsets([
                vk::Offset3D { x: dst_region.x as i32, y: dst_region.y as i32, z: dst_region.z as i32 },
                vk::Offset3D {
                    x: dst_region.x as i32 + dst_extent.width as i32,
                    y: dst_region.y as i32 + dst_extent.height as i32,
                    z: dst_region.z as i32 + dst_extent.depth.max(1) as i32,
                },
            ])
            .build();
        unsafe {
            self.device.raw.cmd_blit_image(
                self.raw,
                src_raw,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_raw,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                filter,
            )
        };

        let (s1, d1, b1) = super::state::image_barrier(UsageMode::TransferSource, src_default, src_raw, src_range);
        let (s2, d2, b2) = super::state::image_barrier(UsageMode::TransferDestination, dst_default, dst_raw, dst_range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[], &[b1, b2]) };
        Ok(())
    }

    /// `GenerateMipmaps` (§4.6): a chain of linear blits, each level reading
    /// the previous one, halving extent at every step.
    pub fn generate_mipmaps(&mut self, texture: &TextureContainer, layer: u32) -> Result<(), DeviceError> {
        debug_assert_eq!(self.active_pass, ActivePass::Copy);
        let idx = texture.active.load(Ordering::Acquire);
        let default_mode = texture.usage.default_mode().expect("texture created without usage bits");
        let (raw_image, level_count, mut width, mut height) = {
            let instances = texture.instances.read();
            let t = &instances[idx];
            self.tracked.push(t.refcount.clone());
            (t.raw, t.level_count, t.extent.width, t.extent.height)
        };

        for level in 1..level_count {
            let src_level = level - 1;
            let src_range = vk::ImageSubresourceRange { aspect_mask: vk::ImageAspectFlags::COLOR, base_mip_level: src_level, level_count: 1, base_array_layer: layer, layer_count: 1 };
            let dst_range = vk::ImageSubresourceRange { aspect_mask: vk::ImageAspectFlags::COLOR, base_mip_level: level, level_count: 1, base_array_layer: layer, layer_count: 1 };
            let src_mode = if src_level == 0 { default_mode } else { UsageMode::TransferSource };

            let (s1, d1, b1) = super::state::image_barrier(src_mode, UsageMode::TransferSource, raw_image, src_range);
            let (s2, d2, b2) = super::state::image_barrier(default_mode, UsageMode::TransferDestination, raw_image, dst_range);
            unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[], &[b1, b2]) };

            let dst_width = (width / 2).max(1);
            let dst_height = (height / 2).max(1);
            let blit = vk::ImageBlit::builder()
                .src_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: src_level, base_array_layer: layer, layer_count: 1 })
                .src_offsets([vk::Offset3D::default(), vk::Offset3D { x: width as i32, y: height as i32, z: 1 }])
                .dst_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: level, base_array_layer: layer, layer_count: 1 })
                .dst_offsets([vk::Offset3D::default(), vk::Offset3D { x: dst_width as i32, y: dst_height as i32, z: 1 }])
                .build();
            unsafe {
                self.device.raw.cmd_blit_image(
                    self.raw,
                    raw_image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    raw_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                )
            };

            width = dst_width;
            height = dst_height;
        }

        // Every level but the last ends as TransferSource (read by the next
        // blit); bring all of them back to the texture's default mode now.
        let full_range = vk::ImageSubresourceRange { aspect_mask: vk::ImageAspectFlags::COLOR, base_mip_level: 0, level_count: level_count - 1, base_array_layer: layer, layer_count: 1 };
        let last_range = vk::ImageSubresourceRange { aspect_mask: vk::ImageAspectFlags::COLOR, base_mip_level: level_count - 1, level_count: 1, base_array_layer: layer, layer_count: 1 };
        let (s1, d1, b1) = super::state::image_barrier(UsageMode::TransferSource, default_mode, raw_image, full_range);
        let (s2, d2, b2) = super::state::image_barrier(UsageMode::TransferDestination, default_mode, raw_image, last_range);
        unsafe { self.device.raw.cmd_pipeline_barrier(self.raw, s1 | s2, d1 | d2, vk::DependencyFlags::empty(), &[], &[], &[b1, b2]) };
        Ok(())
    }

    // -----------------------------------------------------------------
    // Debug labels
    // -----------------------------------------------------------------

    pub fn insert_debug_label(&self, name: &std::ffi::CStr) {
        let Some(debug_utils) = &self.device.instance.debug_utils else { return };
        let info = vk::DebugUtilsLabelEXT::builder().label_name(name).build();
        unsafe { debug_utils.extension.cmd_insert_debug_utils_label(self.raw, &info) };
    }

    pub fn push_debug_group(&self, name: &std::ffi::CStr) {
        let Some(debug_utils) = &self.device.instance.debug_utils else { return };
        let info = vk::DebugUtilsLabelEXT::builder().label_name(name).build();
        unsafe { debug_utils.extension.cmd_begin_debug_utils_label(self.raw, &info) };
    }

    pub fn pop_debug_group(&self) {
        let Some(debug_utils) = &self.device.instance.debug_utils else { return };
        unsafe { debug_utils.extension.cmd_end_debug_utils_label(self.raw) };
    }
}

fn set_slot<T: Default + Copy, const N: usize>(slots: &mut ArrayVec<T, N>, slot: u32, value: T) {
    while slots.len() <= slot as usize {
        slots.push(T::default());
    }
    slots[slot as usize] = value;
}

fn full_subresource_range(texture: &Texture) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: super::device::aspect_mask(texture.format),
        base_mip_level: 0,
        level_count: texture.level_count,
        base_array_layer: 0,
        layer_count: texture.layer_count,
    }
}

fn subresource_range(texture: &Texture, layer: u32, level: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: level,
        level_count: 1,
        base_array_layer: layer,
        layer_count: 1,
    }
}

fn allocate_uniform_buffer(device: &DeviceShared) -> Result<UniformBuffer, DeviceError> {
    let buffer = unsafe { device.create_buffer_instance(gput::BufferKind::Uniform, gput::BufferUsage::UNIFORM, UNIFORM_BUFFER_SIZE) }?;
    let memory = buffer.region.as_ref().expect("uniform buffer always backed by a region").memory();
    let mapped_ptr = unsafe { device.raw.map_memory(memory, 0, UNIFORM_BUFFER_SIZE, vk::MemoryMapFlags::empty()) }? as *mut u8;
    Ok(UniformBuffer { buffer, mapped_ptr, capacity: UNIFORM_BUFFER_SIZE, write_offset: 0, draw_offset: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_buffer() -> super::super::Buffer {
        super::super::Buffer {
            raw: vk::Buffer::null(),
            region: None,
            kind: gput::BufferKind::Uniform,
            usage: gput::BufferUsage::UNIFORM,
            size: 256,
            refcount: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(1)),
            transitioned: std::sync::atomic::AtomicBool::new(false),
            marked_for_destroy: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[test]
    fn uniform_buffer_push_aligns_write_offset() {
        let mut backing = vec![0u8; 256];
        let mut ub = UniformBuffer {
            buffer: dummy_buffer(),
            mapped_ptr: backing.as_mut_ptr(),
            capacity: 256,
            write_offset: 10,
            draw_offset: 0,
        };
        let offset = ub.push(&[1, 2, 3, 4], 16).unwrap();
        assert_eq!(offset, 16);
        assert_eq!(ub.write_offset, 20);
    }

    #[test]
    fn uniform_buffer_push_returns_none_when_full() {
        let mut backing = vec![0u8; 16];
        let mut ub = UniformBuffer {
            buffer: dummy_buffer(),
            mapped_ptr: backing.as_mut_ptr(),
            capacity: 16,
            write_offset: 8,
            draw_offset: 0,
        };
        assert!(ub.push(&[0; 32], 4).is_none());
    }

    #[test]
    fn cycling_only_triggers_when_refcount_is_positive() {
        assert!(!should_cycle(0));
        assert!(should_cycle(1));
    }

    #[test]
    fn set_slot_grows_to_the_requested_index() {
        let mut slots: ArrayVec<BoundSampler, 4> = ArrayVec::new();
        set_slot(&mut slots, 2, BoundSampler { sampler: vk::Sampler::null(), view: vk::ImageView::null() });
        assert_eq!(slots.len(), 3);
    }
}
