bitflags::bitflags! {
    /// How a buffer may be used. Maps to Vulkan usage bits by the resource
    /// factory (C2); transfer-src/transfer-dst are always implied on top of
    /// whatever is requested here so that defrag copies (C8) are always legal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u16 {
        const VERTEX          = 1 << 0;
        const INDEX           = 1 << 1;
        const INDIRECT        = 1 << 2;
        const GRAPHICS_STORAGE_READ = 1 << 3;
        const COMPUTE_STORAGE_READ  = 1 << 4;
        const COMPUTE_STORAGE_WRITE = 1 << 5;
        const UNIFORM          = 1 << 6;
    }
}

bitflags::bitflags! {
    /// How a texture may be used. Combinations that would leave the default
    /// usage mode (§4.3) ambiguous are rejected at resource creation time;
    /// see `state::default_texture_mode`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u16 {
        const SAMPLER                   = 1 << 0;
        const COLOR_TARGET              = 1 << 1;
        const DEPTH_STENCIL_TARGET      = 1 << 2;
        const GRAPHICS_STORAGE_READ     = 1 << 3;
        const COMPUTE_STORAGE_READ      = 1 << 4;
        const COMPUTE_STORAGE_WRITE     = 1 << 5;
        const COMPUTE_SIMULTANEOUS_READ_WRITE = 1 << 6;
    }
}

/// Which memory-suballocator selection policy (§4.1) a buffer participates
/// in. Distinct from `BufferUsage`: a buffer has exactly one `BufferKind` but
/// may set several `BufferUsage` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BufferKind {
    /// Device-local working storage (vertex/index/storage/indirect).
    Gpu,
    /// Host-visible, host-coherent, small, ring-allocated push storage.
    Uniform,
    /// Host-visible, host-coherent staging storage for uploads/downloads.
    Transfer,
}

/// Abstract barrier state a resource can be in. Each mode maps to a fixed
/// `(stage, access, layout)` triple in the state tracker (C3); see
/// `state::BARRIER_TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UsageMode {
    /// Resting state of a freshly created resource, before its internal
    /// transition-to-default-mode barrier runs (§4.2, §4.3).
    #[default]
    Undefined,

    // Buffer-applicable
    VertexBuffer,
    IndexBuffer,
    IndirectBuffer,
    GraphicsStorageRead,
    ComputeStorageRead,
    ComputeStorageReadWrite,
    TransferSource,
    TransferDestination,

    // Texture-applicable
    Sampler,
    ColorAttachment,
    DepthStencilAttachment,
    ComputeStorageReadTexture,
    ComputeStorageReadWriteTexture,
    ComputeSimultaneousReadWrite,
    Present,
}

impl BufferUsage {
    /// Priority order from §4.3: "Vertex > Index > Indirect >
    /// GraphicsStorageRead > ComputeStorageRead > ComputeStorageReadWrite".
    /// Returns `None` only for a buffer created with no usage bits, which
    /// the resource factory rejects before this is ever called.
    pub const fn default_mode(self) -> Option<UsageMode> {
        if self.contains(BufferUsage::VERTEX) {
            Some(UsageMode::VertexBuffer)
        } else if self.contains(BufferUsage::INDEX) {
            Some(UsageMode::IndexBuffer)
        } else if self.contains(BufferUsage::INDIRECT) {
            Some(UsageMode::IndirectBuffer)
        } else if self.contains(BufferUsage::GRAPHICS_STORAGE_READ) {
            Some(UsageMode::GraphicsStorageRead)
        } else if self.contains(BufferUsage::COMPUTE_STORAGE_READ) {
            Some(UsageMode::ComputeStorageRead)
        } else if self.contains(BufferUsage::COMPUTE_STORAGE_WRITE) {
            Some(UsageMode::ComputeStorageReadWrite)
        } else {
            None
        }
    }
}

impl TextureUsage {
    /// Priority order from §4.3: "Sampler > GraphicsStorageRead >
    /// ColorAttachment > DepthStencil > ComputeStorageRead >
    /// ComputeStorageReadWrite/Simultaneous".
    ///
    /// Returns `None` when the combination is ambiguous (SAMPLER together
    /// with a graphics-storage bit) or empty; the resource factory surfaces
    /// that as a validation error rather than guessing.
    pub const fn default_mode(self) -> Option<UsageMode> {
        if self.contains(TextureUsage::SAMPLER) {
            if self.intersects(TextureUsage::GRAPHICS_STORAGE_READ) {
                return None;
            }
            Some(UsageMode::Sampler)
        } else if self.contains(TextureUsage::GRAPHICS_STORAGE_READ) {
            Some(UsageMode::GraphicsStorageRead)
        } else if self.contains(TextureUsage::COLOR_TARGET) {
            Some(UsageMode::ColorAttachment)
        } else if self.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
            Some(UsageMode::DepthStencilAttachment)
        } else if self.contains(TextureUsage::COMPUTE_STORAGE_READ) {
            Some(UsageMode::ComputeStorageReadTexture)
        } else if self.contains(TextureUsage::COMPUTE_STORAGE_WRITE) {
            Some(UsageMode::ComputeStorageReadWriteTexture)
        } else if self.contains(TextureUsage::COMPUTE_SIMULTANEOUS_READ_WRITE) {
            Some(UsageMode::ComputeSimultaneousReadWrite)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_priority_picks_vertex_over_everything_else() {
        let usage = BufferUsage::VERTEX | BufferUsage::COMPUTE_STORAGE_READ;
        assert_eq!(usage.default_mode(), Some(UsageMode::VertexBuffer));
    }

    #[test]
    fn buffer_with_no_usage_bits_has_no_default_mode() {
        assert_eq!(BufferUsage::empty().default_mode(), None);
    }

    #[test]
    fn texture_priority_picks_sampler_over_color_target() {
        let usage = TextureUsage::SAMPLER | TextureUsage::COLOR_TARGET;
        assert_eq!(usage.default_mode(), Some(UsageMode::Sampler));
    }

    #[test]
    fn sampler_with_graphics_storage_read_is_ambiguous() {
        let usage = TextureUsage::SAMPLER | TextureUsage::GRAPHICS_STORAGE_READ;
        assert_eq!(usage.default_mode(), None);
    }

    #[test]
    fn compute_read_write_texture_falls_through_to_its_own_mode() {
        let usage = TextureUsage::COMPUTE_STORAGE_WRITE;
        assert_eq!(
            usage.default_mode(),
            Some(UsageMode::ComputeStorageReadWriteTexture)
        );
    }
}
