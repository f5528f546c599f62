//! Parameter validation (§4.10): null checks, enum recognition, slot-index
//! range checks, size limits. This is the one place rules live that are
//! about the *call*, not about Vulkan *semantics* — usage-mode ambiguity and
//! layout rules are semantic and live in the backend (`vulkan::state`).

use crate::error::ValidationError;
use gput::{
    MAX_COLOR_TARGET_BINDINGS, MAX_COMPUTE_WRITE_BUFFERS, MAX_COMPUTE_WRITE_TEXTURES,
    MAX_STORAGE_BUFFERS_PER_STAGE, MAX_STORAGE_TEXTURES_PER_STAGE,
    MAX_TEXTURE_SAMPLERS_PER_STAGE, MAX_UNIFORM_BUFFERS_PER_STAGE, MAX_VERTEX_BUFFERS,
};

pub fn non_zero_size(kind: &'static str, size: u64) -> Result<(), ValidationError> {
    if size == 0 {
        Err(ValidationError::ZeroSize(kind))
    } else {
        Ok(())
    }
}

pub fn slot_index(kind: &'static str, index: u32, max: u32) -> Result<(), ValidationError> {
    if index >= max {
        Err(ValidationError::SlotOutOfRange { kind, index, max })
    } else {
        Ok(())
    }
}

pub fn sampler_slot(index: u32) -> Result<(), ValidationError> {
    slot_index("sampler", index, MAX_TEXTURE_SAMPLERS_PER_STAGE)
}

pub fn storage_texture_slot(index: u32) -> Result<(), ValidationError> {
    slot_index("storage texture", index, MAX_STORAGE_TEXTURES_PER_STAGE)
}

pub fn storage_buffer_slot(index: u32) -> Result<(), ValidationError> {
    slot_index("storage buffer", index, MAX_STORAGE_BUFFERS_PER_STAGE)
}

pub fn uniform_buffer_slot(index: u32) -> Result<(), ValidationError> {
    slot_index("uniform buffer", index, MAX_UNIFORM_BUFFERS_PER_STAGE)
}

pub fn vertex_buffer_slot(index: u32) -> Result<(), ValidationError> {
    slot_index("vertex buffer", index, MAX_VERTEX_BUFFERS)
}

pub fn color_target_count(count: u32) -> Result<(), ValidationError> {
    if count > MAX_COLOR_TARGET_BINDINGS {
        Err(ValidationError::SlotOutOfRange {
            kind: "color target",
            index: count,
            max: MAX_COLOR_TARGET_BINDINGS,
        })
    } else {
        Ok(())
    }
}

pub fn compute_write_texture_slot(index: u32) -> Result<(), ValidationError> {
    slot_index(
        "compute write texture",
        index,
        MAX_COMPUTE_WRITE_TEXTURES,
    )
}

pub fn compute_write_buffer_slot(index: u32) -> Result<(), ValidationError> {
    slot_index("compute write buffer", index, MAX_COMPUTE_WRITE_BUFFERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_in_range_is_accepted() {
        assert!(sampler_slot(MAX_TEXTURE_SAMPLERS_PER_STAGE - 1).is_ok());
    }

    #[test]
    fn slot_at_the_limit_is_rejected() {
        assert_eq!(
            sampler_slot(MAX_TEXTURE_SAMPLERS_PER_STAGE),
            Err(ValidationError::SlotOutOfRange {
                kind: "sampler",
                index: MAX_TEXTURE_SAMPLERS_PER_STAGE,
                max: MAX_TEXTURE_SAMPLERS_PER_STAGE,
            })
        );
    }

    #[test]
    fn zero_size_is_rejected() {
        assert_eq!(
            non_zero_size("buffer", 0),
            Err(ValidationError::ZeroSize("buffer"))
        );
        assert!(non_zero_size("buffer", 1).is_ok());
    }
}
