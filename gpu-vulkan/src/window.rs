//! The two things this core consumes from the window/event subsystem (§1,
//! §6, SPEC_FULL §6.1): an opaque handle that can create a `VkSurfaceKHR`,
//! and a channel of resize notifications. Everything else about windowing
//! (creation, input, platform shims) is out of scope.

use ash::vk;
use std::ffi::CStr;

/// A window-size change. The swapchain manager (C9) reacts to this by
/// setting `needs_recreate` on the affected window and recreating on the
/// next acquire (§4.9, scenario 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSizeChanged {
    pub width: u32,
    pub height: u32,
}

/// The window collaborator this core requires. Implemented by whatever
/// windowing layer the embedding application uses; this crate never
/// constructs one itself.
pub trait ExternalWindow: Send + Sync {
    /// Instance extensions the loader must enable for `create_surface` to
    /// succeed on this platform (`Vulkan_GetInstanceExtensions`).
    fn required_instance_extensions(&self) -> Vec<&'static CStr>;

    /// # Safety
    /// `entry` and `instance` must be the same ones used to query
    /// `required_instance_extensions`.
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR, vk::Result>;

    /// Current client-area size in pixels, used when (re)creating a
    /// swapchain.
    fn pixel_size(&self) -> (u32, u32);

    /// A channel of resize notifications for this window, if the windowing
    /// layer supports one. `Acquire`/`WaitAndAcquire` drain it before
    /// deciding whether to recreate (§4.9).
    fn resize_events(&self) -> Option<crossbeam_channel::Receiver<PixelSizeChanged>> {
        None
    }
}
