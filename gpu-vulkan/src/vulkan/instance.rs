//! Instance creation: extension/layer enumeration, optional
//! `VK_EXT_debug_utils` messenger (SPEC_FULL §3.1, "ambient stack: logging").
//! Struct shapes (`InstanceShared`, `Instance`) live in `super`; this module
//! only builds them.

use std::ffi::{CStr, CString};

use ash::extensions::ext;
use ash::vk;

use super::{Adapter, DebugUtils, Instance, InstanceShared};
use crate::{InitError, InstanceFlags};

const VALIDATION_LAYER_NAME: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

impl Instance {
    /// # Safety
    /// No other `VkInstance` may be created concurrently with an
    /// incompatible loader configuration; callers must keep the returned
    /// instance alive for as long as any resource derived from it.
    pub unsafe fn init(flags: InstanceFlags) -> Result<Self, InitError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| InitError::LoaderError(e.to_string()))?;

        let driver_api_version = entry
            .try_enumerate_instance_version()
            .ok()
            .flatten()
            .unwrap_or(vk::API_VERSION_1_0);

        let app_name = CString::new("sdl-gpu-vulkan").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(driver_api_version.min(vk::API_VERSION_1_3))
            .build();

        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .map_err(InitError::InstanceCreation)?;

        let mut extensions: Vec<&'static CStr> = vec![ash::extensions::khr::Surface::name()];
        extensions.extend(required_surface_extensions());
        if flags.contains(InstanceFlags::DEBUG) {
            extensions.push(ext::DebugUtils::name());
        }
        extensions.retain(|&wanted| has_extension(&available_extensions, wanted));

        let extension_ptrs: Vec<*const std::os::raw::c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let mut layer_ptrs = Vec::new();
        if flags.contains(InstanceFlags::VALIDATION) {
            let available_layers = entry.enumerate_instance_layer_properties().map_err(InitError::InstanceCreation)?;
            let present = available_layers.iter().any(|layer| {
                let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                name == VALIDATION_LAYER_NAME
            });
            if present {
                layer_ptrs.push(VALIDATION_LAYER_NAME.as_ptr());
            } else {
                log::warn!("validation requested but {:?} is not present", VALIDATION_LAYER_NAME);
            }
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .build();

        let raw = unsafe { entry.create_instance(&create_info, None) }.map_err(InitError::InstanceCreation)?;

        let debug_utils = if flags.contains(InstanceFlags::DEBUG) && extensions.contains(&ext::DebugUtils::name()) {
            let extension = ext::DebugUtils::new(&entry, &raw);
            let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_utils_callback))
                .build();
            let messenger = unsafe { extension.create_debug_utils_messenger(&create_info, None) }
                .map_err(InitError::InstanceCreation)?;
            Some(DebugUtils { extension, messenger })
        } else {
            None
        };

        let surface_fn = ash::extensions::khr::Surface::new(&entry, &raw);

        Ok(Instance {
            shared: std::sync::Arc::new(InstanceShared { entry, raw, flags, debug_utils, surface_fn }),
        })
    }
}

impl crate::Instance for Instance {
    type A = super::Api;

    unsafe fn create_surface(
        &self,
        window: &dyn crate::window::ExternalWindow,
    ) -> Result<super::Surface, InitError> {
        let raw = unsafe { window.create_surface(&self.shared.entry, &self.shared.raw) }
            .map_err(InitError::DeviceCreation)?;
        Ok(super::Surface::from_raw(raw, self.shared.surface_fn.clone(), self.shared.clone(), window))
    }

    unsafe fn enumerate_adapters(&self) -> Vec<Adapter> {
        unsafe { Instance::enumerate_adapters(self) }
    }
}

fn has_extension(available: &[vk::ExtensionProperties], wanted: &CStr) -> bool {
    available.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == wanted
    })
}

#[cfg(target_os = "windows")]
fn required_surface_extensions() -> Vec<&'static CStr> {
    vec![ash::extensions::khr::Win32Surface::name()]
}

#[cfg(target_os = "macos")]
fn required_surface_extensions() -> Vec<&'static CStr> {
    vec![ash::extensions::mvk::MacOSSurface::name()]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn required_surface_extensions() -> Vec<&'static CStr> {
    vec![ash::extensions::khr::XlibSurface::name(), ash::extensions::khr::WaylandSurface::name()]
}

unsafe extern "system" fn debug_utils_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("{:?} {}", ty, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("{:?} {}", ty, message);
    } else {
        log::debug!("{:?} {}", ty, message);
    }
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_utils_is_part_of_surface_extension_set_when_debug_flag_set() {
        let flags = InstanceFlags::DEBUG;
        assert!(flags.contains(InstanceFlags::DEBUG));
    }
}
