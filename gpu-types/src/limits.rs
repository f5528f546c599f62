//! Compile-time binding-slot limits shared between the frontend and the
//! Vulkan backend (§6). Both sides of the API are compiled against the same
//! constants, so a slot index validated by the frontend is guaranteed to fit
//! the arrays the backend allocates for it.

/// Samplers (and combined sampler+texture bindings) per shader stage.
pub const MAX_TEXTURE_SAMPLERS_PER_STAGE: u32 = 16;
/// Read-only storage textures per shader stage.
pub const MAX_STORAGE_TEXTURES_PER_STAGE: u32 = 8;
/// Read-only storage buffers per shader stage.
pub const MAX_STORAGE_BUFFERS_PER_STAGE: u32 = 8;
/// Uniform buffers per shader stage.
pub const MAX_UNIFORM_BUFFERS_PER_STAGE: u32 = 14;
/// Simultaneously bound color target attachments.
pub const MAX_COLOR_TARGET_BINDINGS: u32 = 4;
/// Vertex buffer binding slots.
pub const MAX_VERTEX_BUFFERS: u32 = 16;
/// Vertex attribute slots across all bound vertex buffers.
pub const MAX_VERTEX_ATTRIBUTES: u32 = 16;
/// Compute shader read-write storage texture bindings.
pub const MAX_COMPUTE_WRITE_TEXTURES: u32 = 8;
/// Compute shader read-write storage buffer bindings.
pub const MAX_COMPUTE_WRITE_BUFFERS: u32 = 8;
/// Per-window in-flight frame count ceiling requested by an application;
/// the swapchain manager (C9) clamps this against the surface's reported
/// image-count capabilities.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;
