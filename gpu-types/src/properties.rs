use std::collections::HashMap;

/// Recognized debug-name property keys (§6, §10). Every creatable resource
/// kind has one; the frontend forwards whichever key matches the resource
/// kind being created to the backend, which in turn forwards it to
/// `VK_EXT_debug_utils` when the instance was created with debug utils
/// enabled.
pub const PROP_BUFFER_CREATE_NAME: &str = "GPU_BUFFER_CREATE_NAME_STRING";
pub const PROP_TEXTURE_CREATE_NAME: &str = "GPU_TEXTURE_CREATE_NAME_STRING";
pub const PROP_SAMPLER_CREATE_NAME: &str = "GPU_SAMPLER_CREATE_NAME_STRING";
pub const PROP_SHADER_CREATE_NAME: &str = "GPU_SHADER_CREATE_NAME_STRING";
pub const PROP_GRAPHICS_PIPELINE_CREATE_NAME: &str = "GPU_GRAPHICSPIPELINE_CREATE_NAME_STRING";
pub const PROP_COMPUTE_PIPELINE_CREATE_NAME: &str = "GPU_COMPUTEPIPELINE_CREATE_NAME_STRING";

/// A string-keyed property bag attached to a creation call.
///
/// Unrecognized keys are silently ignored by this core, matching §6: "the
/// only recognized entries by this core are debug-name strings". Carrying a
/// forward-compatible bag rather than a closed struct keeps resource
/// creation calls stable as unrelated property keys are added for other
/// subsystems outside this core's scope.
#[derive(Debug, Clone, Default)]
pub struct PropertyBag {
    entries: HashMap<String, String>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The debug name to use for a resource, if the caller supplied one
    /// under `key`.
    pub fn debug_name(&self, key: &str) -> Option<&str> {
        self.string(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_key_round_trips() {
        let bag = PropertyBag::new().with_string(PROP_BUFFER_CREATE_NAME, "my-vertex-buffer");
        assert_eq!(
            bag.debug_name(PROP_BUFFER_CREATE_NAME),
            Some("my-vertex-buffer")
        );
    }

    #[test]
    fn unset_key_is_none() {
        let bag = PropertyBag::new();
        assert_eq!(bag.debug_name(PROP_TEXTURE_CREATE_NAME), None);
    }
}
