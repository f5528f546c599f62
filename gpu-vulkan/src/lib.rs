//! Explicit-command-buffer GPU backend, Vulkan implementation.
//!
//! This crate presents a small trait-based dispatch surface (`Api` and its
//! associated `Instance`/`Adapter`/`Device`/`Queue`/`CommandEncoder`/
//! `Surface`/`Fence` traits — C10) and one implementation of it, `vulkan::Api`
//! (C1–C9). A trait rather than a dynamic vtable or a tagged enum because
//! there is exactly one backend in scope; see `DESIGN.md`.
//!
//! Parameter validation (null checks, slot-index range checks) lives in
//! [`validate`] and runs before a call ever reaches a backend trait method.
//! Semantic enforcement — usage-mode ambiguity, layout rules — lives in the
//! backend, per §4.10.

pub mod error;
pub mod validate;
pub mod vulkan;
pub mod window;

pub use error::{DeviceError, InitError, SurfaceError, ValidationError};
pub use gput as types;

use std::fmt;

/// Maximum simultaneously bound color attachments; also bounds the
/// `RenderPassKey`/`FramebufferKey` attachment arrays (C5).
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

/// An owned, type-erased "destroy this on drop" callback, used by backends
/// that wrap a caller-owned handle (e.g. a swapchain image) they must not
/// destroy themselves.
pub type DropGuard = Box<dyn std::any::Any + Send + Sync>;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u32 {
        /// Enable `VK_EXT_debug_utils` and forward debug names (§3.1).
        const DEBUG = 1 << 0;
        /// Enable `VK_LAYER_KHRONOS_validation`.
        const VALIDATION = 1 << 1;
    }
}

/// Extent of a copy or blit region; depth is 1 for 2D textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CopyExtent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// The type-level association between one backend's concrete resource types.
/// Mirrors the teacher's `crate::Api` associated-type trait.
pub trait Api: Clone + fmt::Debug + Sized + Send + Sync + 'static {
    type Instance: Instance<A = Self>;
    type Adapter: Send + Sync;
    type Device: Device<A = Self>;
    type Queue: Queue<A = Self>;
    type CommandEncoder: CommandEncoder<A = Self>;
    type CommandBuffer: Send + Sync + fmt::Debug;
    type Surface: Surface<A = Self>;
    type Fence: Send + Sync + fmt::Debug;

    type Buffer: Send + Sync + fmt::Debug;
    type Texture: Send + Sync + fmt::Debug;
    type TextureView: Send + Sync + fmt::Debug;
    type Sampler: Send + Sync + fmt::Debug;
    type SurfaceTexture: Send + Sync + fmt::Debug + std::borrow::Borrow<Self::Texture>;

    type DescriptorSetLayout: Send + Sync + fmt::Debug;
    type DescriptorSet: Send + Sync + fmt::Debug;
    type PipelineLayout: Send + Sync + fmt::Debug;
    type ShaderModule: Send + Sync + fmt::Debug;
    type GraphicsPipeline: Send + Sync + fmt::Debug;
    type ComputePipeline: Send + Sync + fmt::Debug;
}

pub trait Instance: Sized + Send + Sync {
    type A: Api;

    /// # Safety
    /// `window` must outlive the returned surface.
    unsafe fn create_surface(
        &self,
        window: &dyn window::ExternalWindow,
    ) -> Result<<Self::A as Api>::Surface, InitError>;

    unsafe fn enumerate_adapters(&self) -> Vec<<Self::A as Api>::Adapter>;
}

pub trait Device: Sized + Send + Sync {
    type A: Api;

    unsafe fn create_fence(&self) -> Result<<Self::A as Api>::Fence, DeviceError>;
    unsafe fn wait_for_fences(
        &self,
        fences: &[&<Self::A as Api>::Fence],
        wait_all: bool,
        timeout_ns: u64,
    ) -> Result<bool, DeviceError>;
    fn query_fence(&self, fence: &<Self::A as Api>::Fence) -> bool;
}

pub trait Queue: Sized + Send + Sync {
    type A: Api;

    /// Wait/signal semaphores come from each command buffer's own
    /// `present_data` (populated by the swapchain manager at acquire time,
    /// §3, §4.9), not a separate `surface_textures` argument.
    ///
    /// # Safety
    /// Every command buffer in `command_buffers` must have finished
    /// recording and must not be submitted again until its fence signals.
    unsafe fn submit(
        &self,
        command_buffers: &[&<Self::A as Api>::CommandBuffer],
        signal_fence: Option<&<Self::A as Api>::Fence>,
    ) -> Result<(), DeviceError>;

    /// # Safety
    /// `texture` must have come from a prior `Surface::acquire_texture` on
    /// `surface` and must not have been presented or discarded already.
    unsafe fn present(
        &self,
        surface: &<Self::A as Api>::Surface,
        texture: <Self::A as Api>::SurfaceTexture,
    ) -> Result<(), SurfaceError>;
}

pub trait CommandEncoder: Sized + Send + Sync {
    type A: Api;
}

/// Configuration requested of a surface by `Surface::configure`.
#[derive(Debug, Clone)]
pub struct SurfaceConfiguration {
    pub extent: gput::Extent3d,
    pub format: gput::TextureFormat,
    pub composition: gput::SwapchainComposition,
    pub present_mode: gput::PresentMode,
    pub frames_in_flight: u32,
}

#[derive(Debug)]
pub struct AcquiredSurfaceTexture<A: Api> {
    pub texture: A::SurfaceTexture,
    pub suboptimal: bool,
}

pub trait Surface: Sized + Send + Sync {
    type A: Api;

    /// # Safety
    /// No resources derived from a prior swapchain on this surface may
    /// still be in use.
    unsafe fn configure(
        &self,
        device: &<Self::A as Api>::Device,
        config: &SurfaceConfiguration,
    ) -> Result<(), SurfaceError>;

    /// # Safety
    /// No resources derived from the swapchain may still be in use.
    unsafe fn unconfigure(&self, device: &<Self::A as Api>::Device);

    /// Returns `Ok(None)` on timeout, not an error (§7).
    ///
    /// # Safety
    /// `timeout` aside, this may block.
    unsafe fn acquire_texture(
        &self,
        timeout_ns: u64,
    ) -> Result<Option<AcquiredSurfaceTexture<Self::A>>, SurfaceError>;
}
