//! Error taxonomy (§7). Every internal function returns one of these instead
//! of a thread-local error string: the source language needed a TLS string
//! because it had no sum-typed `Result`; Rust does not.

use ash::vk;

/// Failures that can occur while creating the instance or the logical
/// device, before there is anything else to report errors through.
#[derive(thiserror::Error, Debug, Clone)]
pub enum InitError {
    #[error("no suitable Vulkan physical device found")]
    NoSuitableAdapter,
    #[error("required Vulkan extension missing: {0}")]
    MissingExtension(&'static str),
    #[error("failed to load the Vulkan loader: {0}")]
    LoaderError(String),
    #[error("vkCreateInstance failed: {0:?}")]
    InstanceCreation(vk::Result),
    #[error("vkCreateDevice failed: {0:?}")]
    DeviceCreation(vk::Result),
}

/// Failures surfaced by the backend after init.
///
/// `OutOfMemory` is a distinct variant from every other kind of failure so
/// that the caller (or the suballocator itself) can decide to trigger a
/// defrag pass rather than simply propagating an opaque error (§4.1, §7).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("out of device memory")]
    OutOfMemory,
    #[error("device lost")]
    Lost,
    #[error("unrecognized Vulkan error")]
    Unknown,
}

impl From<vk::Result> for DeviceError {
    fn from(result: vk::Result) -> Self {
        #![allow(unreachable_code)]
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                #[cfg(feature = "oom-panic")]
                panic!("Out of memory ({result:?})");
                DeviceError::OutOfMemory
            }
            vk::Result::ERROR_DEVICE_LOST => {
                #[cfg(feature = "device-lost-panic")]
                panic!("Device lost");
                DeviceError::Lost
            }
            _ => {
                #[cfg(feature = "internal-error-panic")]
                panic!("Internal error: {result:?}");
                log::warn!("Unrecognized device error {result:?}");
                DeviceError::Unknown
            }
        }
    }
}

/// Surface/swapchain failures. `Outdated`/zero-extent are NOT represented
/// here: per §7 they are success values (`AcquiredTexture::TryAgain` /
/// `Option::None`), not errors, because the correct response is a silent
/// recreate-and-retry rather than surfacing anything to the caller.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("surface lost")]
    Lost,
}

impl From<vk::Result> for SurfaceError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_SURFACE_LOST_KHR => SurfaceError::Lost,
            other => SurfaceError::Device(DeviceError::from(other)),
        }
    }
}

/// User-facing validation failures (§7): null handles, out-of-range slot
/// indices, unrecognized enum values. These never reach the Vulkan driver —
/// they are caught by the frontend's `validate` module before a backend
/// trait method is ever called.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unexpected null handle for {0}")]
    NullHandle(&'static str),
    #[error("slot index {index} out of range (max {max}) for {kind}")]
    SlotOutOfRange {
        kind: &'static str,
        index: u32,
        max: u32,
    },
    #[error("unrecognized enum value for {0}")]
    UnrecognizedEnum(&'static str),
    #[error("ambiguous default usage mode for {0}: {1}")]
    AmbiguousUsage(&'static str, &'static str),
    #[error("{0} is zero-sized")]
    ZeroSize(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oom_result_maps_to_oom_error() {
        assert_eq!(
            DeviceError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            DeviceError::OutOfMemory
        );
        assert_eq!(
            DeviceError::from(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            DeviceError::OutOfMemory
        );
    }

    #[test]
    fn device_lost_result_maps_to_lost() {
        assert_eq!(
            DeviceError::from(vk::Result::ERROR_DEVICE_LOST),
            DeviceError::Lost
        );
    }

    #[test]
    fn surface_lost_is_distinguished_from_device_lost() {
        assert_eq!(
            SurfaceError::from(vk::Result::ERROR_SURFACE_LOST_KHR),
            SurfaceError::Lost
        );
        assert_eq!(
            SurfaceError::from(vk::Result::ERROR_DEVICE_LOST),
            SurfaceError::Device(DeviceError::Lost)
        );
    }
}
