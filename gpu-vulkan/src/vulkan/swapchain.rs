//! C9: swapchain lifecycle (§4.9). Grounded on the teacher's
//! `impl crate::Surface for super::Surface` (`configure`/`unconfigure`/
//! `acquire_texture`) and `Queue::present`, generalized to this spec's
//! explicit `WindowData` record (per-frame semaphore/fence rings,
//! `frameCounter`, composition-table format selection) rather than a single
//! `next_surface_index` ring.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use ash::vk;
use parking_lot::RwLock;

use super::{DeviceShared, InstanceShared, Texture, TextureContainer};
use crate::error::{DeviceError, SurfaceError};
use crate::window::ExternalWindow;
use gput::{Extent3d, PresentMode, SwapchainComposition, TextureFormat};

/// Maps a requested composition to a `(VkFormat, VkColorSpaceKHR)`
/// preference list, most to least desirable, per the composition table
/// named in §4.9.
fn composition_candidates(composition: SwapchainComposition) -> &'static [(vk::Format, vk::ColorSpaceKHR)] {
    match composition {
        SwapchainComposition::Sdr => &[
            (vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            (vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ],
        SwapchainComposition::SdrLinear => &[(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::PASS_THROUGH_EXT)],
        SwapchainComposition::HdrExtendedLinear => {
            &[(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT)]
        }
        SwapchainComposition::Hdr10St2084 => {
            &[(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT)]
        }
    }
}

struct Swapchain {
    raw: vk::SwapchainKHR,
    functor: ash::extensions::khr::Swapchain,
    extent: Extent3d,
    format: TextureFormat,
    images: Vec<vk::Image>,
    containers: Vec<std::sync::Arc<TextureContainer>>,
    /// One binary semaphore per in-flight frame, signaled by
    /// `vkAcquireNextImageKHR` ("image available") and waited on by the
    /// render-finished present ("render finished"), a ring of size
    /// `frames_in_flight` (§3).
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
    in_flight_fences: Vec<Option<vk::Fence>>,
    frames_in_flight: u32,
}

impl Swapchain {
    /// # Safety
    /// The device must already be idle.
    unsafe fn release_resources(mut self, device: &ash::Device) -> Self {
        let _ = unsafe { device.device_wait_idle() };
        for sem in self.image_available.drain(..).chain(self.render_finished.drain(..)) {
            unsafe { device.destroy_semaphore(sem, None) };
        }
        self
    }
}

/// Remembers the device and configuration a surface was last `configure`d
/// with, so the `crate::Surface::acquire_texture` trait method — which
/// takes only a timeout, not a device — can still reach the real
/// `Device::acquire_texture` recreate-on-resize path (§4.9).
#[derive(Clone)]
struct ConfiguredState {
    device: Arc<DeviceShared>,
    config: crate::SurfaceConfiguration,
}

/// A claimed window plus its current swapchain (§3 `WindowData`).
pub struct Surface {
    pub(crate) raw: vk::SurfaceKHR,
    pub(crate) surface_fn: ash::extensions::khr::Surface,
    swapchain: RwLock<Option<Swapchain>>,
    frame_counter: AtomicU32,
    needs_recreate: AtomicBool,
    instance: Arc<InstanceShared>,
    /// # Safety
    /// Valid for as long as the surface exists — guaranteed by the "window
    /// must outlive the returned surface" contract on `create_surface`/
    /// `claim_window`.
    window: *const (dyn ExternalWindow + 'static),
    configured: RwLock<Option<ConfiguredState>>,
}

impl Surface {
    /// Wrap a freshly created `VkSurfaceKHR` with no swapchain yet attached.
    /// Used by `Instance::create_surface` (§4.10); the swapchain itself is
    /// created lazily by `Device::claim_window`/`configure` (§4.9).
    pub(crate) fn from_raw(
        raw: vk::SurfaceKHR,
        surface_fn: ash::extensions::khr::Surface,
        instance: Arc<InstanceShared>,
        window: &dyn ExternalWindow,
    ) -> Self {
        Surface {
            raw,
            surface_fn,
            swapchain: RwLock::new(None),
            frame_counter: AtomicU32::new(0),
            needs_recreate: AtomicBool::new(false),
            instance,
            window: window as *const dyn ExternalWindow,
            configured: RwLock::new(None),
        }
    }

    /// # Safety
    /// Relies on the "window outlives surface" contract documented on
    /// `from_raw`'s callers.
    unsafe fn window(&self) -> &dyn ExternalWindow {
        unsafe { &*self.window }
    }

    pub(crate) fn mark_needs_recreate(&self) {
        self.needs_recreate.store(true, Ordering::Release);
    }

    pub(crate) fn current_swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain.read().as_ref().map(|sc| sc.raw).unwrap_or(vk::SwapchainKHR::null())
    }
}

unsafe impl Send for Surface {}
unsafe impl Sync for Surface {}

/// A single acquired swapchain image, wrapping a non-cycleable
/// `TextureContainer` over a driver-owned `VkImage` (§3, §4.6 "cycleable").
#[derive(Debug)]
pub struct SurfaceTexture {
    pub(crate) index: u32,
    pub(crate) container: std::sync::Arc<TextureContainer>,
    pub(crate) render_finished_semaphore: vk::Semaphore,
}

impl SurfaceTexture {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn render_finished_semaphore(&self) -> vk::Semaphore {
        self.render_finished_semaphore
    }

    pub(crate) fn texture(&self) -> &Texture {
        &self.container.instances.read()[0]
    }
}

impl super::Device {
    /// `ClaimWindow`: create a surface via the window system, query
    /// capabilities/formats/present-modes, pick format+colorspace from the
    /// composition table, create a swapchain, wrap images in non-cycleable
    /// containers, and create per-frame semaphores (§4.9).
    ///
    /// # Safety
    /// `window` must outlive the returned surface.
    pub unsafe fn claim_window(
        &self,
        instance: &super::Instance,
        window: &dyn ExternalWindow,
        config: &crate::SurfaceConfiguration,
    ) -> Result<Surface, SurfaceError> {
        let raw = unsafe { window.create_surface(&instance.shared.entry, &instance.shared.raw) }
            .map_err(|e| SurfaceError::Device(DeviceError::from(e)))?;
        let surface_fn = instance.shared.surface_fn.clone();

        let surface = Surface::from_raw(raw, surface_fn, instance.shared.clone(), window);
        unsafe { self.create_swapchain_locked(&surface, config, None) }?;
        *surface.configured.write() = Some(ConfiguredState {
            device: self.shared.clone(),
            config: config.clone(),
        });
        Ok(surface)
    }

    /// # Safety
    /// No resources derived from a prior swapchain on `surface` may still
    /// be in use.
    unsafe fn create_swapchain_locked(
        &self,
        surface: &Surface,
        config: &crate::SurfaceConfiguration,
        old: Option<Swapchain>,
    ) -> Result<(), SurfaceError> {
        let caps = unsafe {
            surface
                .surface_fn
                .get_physical_device_surface_capabilities(self.shared.physical_device, surface.raw)
        }
        .map_err(|e| SurfaceError::Device(DeviceError::from(e)))?;

        if caps.current_extent.width == 0 || caps.current_extent.height == 0 {
            // Zero-extent is "try again", not an error (§4.9, §7).
            return Err(SurfaceError::Device(DeviceError::Unknown));
        }

        let present_mode = match config.present_mode {
            PresentMode::Vsync => vk::PresentModeKHR::FIFO,
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        };

        let mut image_count = config.frames_in_flight.max(caps.min_image_count);
        if caps.max_image_count != 0 {
            image_count = image_count.min(caps.max_image_count);
        }
        if present_mode == vk::PresentModeKHR::MAILBOX {
            image_count = image_count.max(3);
        }

        let (format, color_space) = composition_candidates(config.composition)[0];

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.raw)
            .min_image_count(image_count)
            .image_format(format)
            .image_color_space(color_space)
            .image_extent(vk::Extent2D {
                width: config.extent.width,
                height: config.extent.height,
            })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.as_ref().map(|sc| sc.raw).unwrap_or(vk::SwapchainKHR::null()))
            .build();

        let functor = ash::extensions::khr::Swapchain::new(&self.shared.instance.raw, &self.shared.raw);
        let raw = unsafe { functor.create_swapchain(&create_info, None) }?;
        let images = unsafe { functor.get_swapchain_images(raw) }?;

        let containers = images
            .iter()
            .map(|&image| {
                std::sync::Arc::new(TextureContainer {
                    instances: RwLock::new(vec![Texture {
                        raw: image,
                        region: None,
                        format: config.format,
                        usage: gput::TextureUsage::COLOR_TARGET,
                        layer_count: 1,
                        level_count: 1,
                        depth: 1,
                        extent: config.extent,
                        subresources: vec![Default::default()],
                        full_view: None,
                        refcount: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
                        marked_for_destroy: std::sync::atomic::AtomicBool::new(false),
                        driver_owned: true,
                    }]),
                    active: std::sync::atomic::AtomicUsize::new(0),
                    format: config.format,
                    usage: gput::TextureUsage::COLOR_TARGET,
                    extent: config.extent,
                    layer_count: 1,
                    level_count: 1,
                    cycleable: false,
                    debug_name: None,
                })
            })
            .collect();

        let frames_in_flight = config.frames_in_flight;
        let mut image_available = Vec::with_capacity(frames_in_flight as usize);
        let mut render_finished = Vec::with_capacity(frames_in_flight as usize);
        for _ in 0..frames_in_flight {
            let info = vk::SemaphoreCreateInfo::builder().build();
            image_available.push(unsafe { self.shared.raw.create_semaphore(&info, None) }?);
            render_finished.push(unsafe { self.shared.raw.create_semaphore(&info, None) }?);
        }

        if let Some(old) = old {
            let old = unsafe { old.release_resources(&self.shared.raw) };
            unsafe { old.functor.destroy_swapchain(old.raw, None) };
        }

        *surface.swapchain.write() = Some(Swapchain {
            raw,
            functor,
            extent: config.extent,
            format: config.format,
            images,
            containers,
            image_available,
            render_finished,
            in_flight_fences: vec![None; frames_in_flight as usize],
            frames_in_flight,
        });
        surface.frame_counter.store(0, Ordering::Release);
        surface.needs_recreate.store(false, Ordering::Release);
        Ok(())
    }

    /// `Acquire`/`WaitAndAcquire` (§4.9). `timeout_ns` of `0` is
    /// non-blocking; `u64::MAX` is effectively infinite (`WaitAndAcquire`).
    ///
    /// # Safety
    /// May block up to `timeout_ns`.
    pub unsafe fn acquire_texture(
        &self,
        instance: &super::Instance,
        window: &dyn ExternalWindow,
        surface: &Surface,
        config: &crate::SurfaceConfiguration,
        timeout_ns: u64,
    ) -> Result<Option<crate::AcquiredSurfaceTexture<super::Api>>, SurfaceError> {
        if surface.needs_recreate.load(Ordering::Acquire) {
            let (w, h) = window.pixel_size();
            let mut recreate_config = config.clone();
            recreate_config.extent = Extent3d { width: w, height: h, depth: 1 };
            let old = surface.swapchain.write().take();
            match unsafe { self.create_swapchain_locked(surface, &recreate_config, old) } {
                Ok(()) => {}
                Err(_) => return Ok(None), // zero-extent: try again
            }
        }

        let frame = surface.frame_counter.load(Ordering::Acquire);
        let (raw, image_available, render_finished, frames_in_flight) = {
            let guard = surface.swapchain.read();
            let sc = guard.as_ref().unwrap();
            (sc.raw, sc.image_available[frame as usize], sc.render_finished[frame as usize], sc.frames_in_flight)
        };

        let acquired = unsafe {
            let guard = surface.swapchain.read();
            let sc = guard.as_ref().unwrap();
            sc.functor.acquire_next_image(raw, timeout_ns, image_available, vk::Fence::null())
        };

        let (index, suboptimal) = match acquired {
            Ok(pair) => pair,
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => return Ok(None),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                surface.mark_needs_recreate();
                return Ok(None);
            }
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => return Err(SurfaceError::Lost),
            Err(other) => return Err(SurfaceError::Device(DeviceError::from(other))),
        };

        let container = {
            let guard = surface.swapchain.read();
            guard.as_ref().unwrap().containers[index as usize].clone()
        };

        surface
            .frame_counter
            .store((frame + 1) % frames_in_flight, Ordering::Release);

        let texture = SurfaceTexture {
            index,
            container,
            render_finished_semaphore: render_finished,
        };
        Ok(Some(crate::AcquiredSurfaceTexture { texture, suboptimal }))
    }
}

impl crate::Surface for Surface {
    type A = super::Api;

    unsafe fn configure(&self, device: &super::Device, config: &crate::SurfaceConfiguration) -> Result<(), SurfaceError> {
        let old = self.swapchain.write().take();
        unsafe { device.create_swapchain_locked(self, config, old) }?;
        *self.configured.write() = Some(ConfiguredState {
            device: device.shared.clone(),
            config: config.clone(),
        });
        Ok(())
    }

    unsafe fn unconfigure(&self, device: &super::Device) {
        *self.configured.write() = None;
        if let Some(sc) = self.swapchain.write().take() {
            let sc = unsafe { sc.release_resources(&device.shared.raw) };
            unsafe { sc.functor.destroy_swapchain(sc.raw, None) };
        }
    }

    unsafe fn acquire_texture(
        &self,
        timeout_ns: u64,
    ) -> Result<Option<crate::AcquiredSurfaceTexture<Self::A>>, SurfaceError> {
        let Some(state) = self.configured.read().clone() else {
            return Err(SurfaceError::Device(DeviceError::Unknown));
        };
        let instance = super::Instance { shared: self.instance.clone() };
        let device = super::Device { shared: state.device };
        unsafe { device.acquire_texture(&instance, self.window(), self, &state.config, timeout_ns) }
    }
}
