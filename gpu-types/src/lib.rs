//! Backend-agnostic GPU type surface: enums, bitflags, and limits shared
//! between the frontend API and whichever backend implements it.
//!
//! This crate defines *what* the shapes mean; it does not know how any
//! backend realizes them. See `gpu-vulkan` for the Vulkan backend.

mod format;
mod limits;
mod pass;
mod pipeline;
mod present;
mod properties;
mod usage;
mod vertex;

pub use format::{FormatAspect, TextureFormat};
pub use limits::*;
pub use pass::{AttachmentOps, LoadOp, StoreOp};
pub use pipeline::{BlendFactor, BlendOp, CompareOp, PrimitiveType, SampleCount, StencilOp};
pub use present::{PresentMode, SwapchainComposition};
pub use properties::{
    PropertyBag, PROP_BUFFER_CREATE_NAME, PROP_COMPUTE_PIPELINE_CREATE_NAME,
    PROP_GRAPHICS_PIPELINE_CREATE_NAME, PROP_SAMPLER_CREATE_NAME, PROP_SHADER_CREATE_NAME,
    PROP_TEXTURE_CREATE_NAME,
};
pub use usage::{BufferKind, BufferUsage, TextureUsage, UsageMode};
pub use vertex::VertexElementFormat;

/// Width/height/depth of a texture or a copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Shader stage a `Shader` was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Per-stage resource counts declared at shader-creation time (§6). These
/// drive descriptor-set-layout interning (C4) and the pipeline resource
/// layout cache (C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderResourceCounts {
    pub samplers: u32,
    pub storage_textures: u32,
    pub storage_buffers: u32,
    pub uniform_buffers: u32,
}
