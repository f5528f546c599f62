/// Texture pixel formats recognized by the abstraction layer.
///
/// This is a closed, bit-stable enum: new variants are never inserted in the
/// middle of the list, only appended before a future major version bump.
/// `INVALID` is index 0 so a zeroed `TextureFormat` is never accidentally a
/// valid format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum TextureFormat {
    Invalid = 0,

    // Unsigned normalized
    A8Unorm,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R16Unorm,
    R16G16Unorm,
    R16G16B16A16Unorm,
    R10G10B10A2Unorm,
    B5G6R5Unorm,
    B5G5R5A1Unorm,
    B4G4R4A4Unorm,
    B8G8R8A8Unorm,

    // Compressed: BC1-BC7
    Bc1RgbaUnorm,
    Bc2RgbaUnorm,
    Bc3RgbaUnorm,
    Bc4RUnorm,
    Bc5RgUnorm,
    Bc6hRgbFloat,
    Bc6hRgbUfloat,
    Bc7RgbaUnorm,

    // Signed normalized
    R8Snorm,
    R8G8Snorm,
    R8G8B8A8Snorm,
    R16Snorm,
    R16G16Snorm,
    R16G16B16A16Snorm,

    // Float
    R16Float,
    R16G16Float,
    R16G16B16A16Float,
    R32Float,
    R32G32Float,
    R32G32B32A32Float,
    R11G11B10Ufloat,

    // Integer
    R8Uint,
    R8G8Uint,
    R8G8B8A8Uint,
    R16Uint,
    R16G16Uint,
    R16G16B16A16Uint,
    R8Int,
    R8G8Int,
    R8G8B8A8Int,
    R16Int,
    R16G16Int,
    R16G16B16A16Int,
    R32Uint,
    R32G32Uint,
    R32G32B32A32Uint,
    R32Int,
    R32G32Int,
    R32G32B32A32Int,

    // sRGB
    R8G8B8A8UnormSrgb,
    B8G8R8A8UnormSrgb,
    Bc1RgbaUnormSrgb,
    Bc2RgbaUnormSrgb,
    Bc3RgbaUnormSrgb,
    Bc7RgbaUnormSrgb,

    // Depth / depth-stencil
    D16Unorm,
    D24Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,

    // ASTC, one set of (Unorm, Srgb, Float) per block footprint
    Astc4x4Unorm,
    Astc4x4UnormSrgb,
    Astc4x4Float,
    Astc5x4Unorm,
    Astc5x4UnormSrgb,
    Astc5x4Float,
    Astc5x5Unorm,
    Astc5x5UnormSrgb,
    Astc5x5Float,
    Astc6x5Unorm,
    Astc6x5UnormSrgb,
    Astc6x5Float,
    Astc6x6Unorm,
    Astc6x6UnormSrgb,
    Astc6x6Float,
    Astc8x5Unorm,
    Astc8x5UnormSrgb,
    Astc8x5Float,
    Astc8x6Unorm,
    Astc8x6UnormSrgb,
    Astc8x6Float,
    Astc8x8Unorm,
    Astc8x8UnormSrgb,
    Astc8x8Float,
    Astc10x5Unorm,
    Astc10x5UnormSrgb,
    Astc10x5Float,
    Astc10x6Unorm,
    Astc10x6UnormSrgb,
    Astc10x6Float,
    Astc10x8Unorm,
    Astc10x8UnormSrgb,
    Astc10x8Float,
    Astc10x10Unorm,
    Astc10x10UnormSrgb,
    Astc10x10Float,
    Astc12x10Unorm,
    Astc12x10UnormSrgb,
    Astc12x10Float,
    Astc12x12Unorm,
    Astc12x12UnormSrgb,
    Astc12x12Float,
}

impl Default for TextureFormat {
    fn default() -> Self {
        TextureFormat::Invalid
    }
}

bitflags::bitflags! {
    /// Which aspects of a format's pixel data exist (color, depth, stencil).
    ///
    /// Used by the resource factory (C2) to decide which subresource views a
    /// texture needs and by the state tracker (C3) to decide which aspect
    /// mask a barrier covers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatAspect: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl TextureFormat {
    /// Aspect flags implied by this format. Never includes more than one of
    /// COLOR/DEPTH-or-STENCIL: a format is either a color format or a
    /// depth/stencil format, never both.
    pub const fn aspect(self) -> FormatAspect {
        use TextureFormat::*;
        match self {
            D16Unorm | D24Unorm | D32Float => FormatAspect::DEPTH,
            D24UnormS8Uint | D32FloatS8Uint => {
                FormatAspect::from_bits_truncate(FormatAspect::DEPTH.bits() | FormatAspect::STENCIL.bits())
            }
            Invalid => FormatAspect::empty(),
            _ => FormatAspect::COLOR,
        }
    }

    pub const fn is_depth_stencil(self) -> bool {
        self.aspect().intersects(FormatAspect::DEPTH.union(FormatAspect::STENCIL))
    }

    pub const fn is_compressed(self) -> bool {
        use TextureFormat::*;
        matches!(
            self,
            Bc1RgbaUnorm
                | Bc2RgbaUnorm
                | Bc3RgbaUnorm
                | Bc4RUnorm
                | Bc5RgUnorm
                | Bc6hRgbFloat
                | Bc6hRgbUfloat
                | Bc7RgbaUnorm
                | Bc1RgbaUnormSrgb
                | Bc2RgbaUnormSrgb
                | Bc3RgbaUnormSrgb
                | Bc7RgbaUnormSrgb
                | Astc4x4Unorm
                | Astc4x4UnormSrgb
                | Astc4x4Float
                | Astc5x4Unorm
                | Astc5x4UnormSrgb
                | Astc5x4Float
                | Astc5x5Unorm
                | Astc5x5UnormSrgb
                | Astc5x5Float
                | Astc6x5Unorm
                | Astc6x5UnormSrgb
                | Astc6x5Float
                | Astc6x6Unorm
                | Astc6x6UnormSrgb
                | Astc6x6Float
                | Astc8x5Unorm
                | Astc8x5UnormSrgb
                | Astc8x5Float
                | Astc8x6Unorm
                | Astc8x6UnormSrgb
                | Astc8x6Float
                | Astc8x8Unorm
                | Astc8x8UnormSrgb
                | Astc8x8Float
                | Astc10x5Unorm
                | Astc10x5UnormSrgb
                | Astc10x5Float
                | Astc10x6Unorm
                | Astc10x6UnormSrgb
                | Astc10x6Float
                | Astc10x8Unorm
                | Astc10x8UnormSrgb
                | Astc10x8Float
                | Astc10x10Unorm
                | Astc10x10UnormSrgb
                | Astc10x10Float
                | Astc12x10Unorm
                | Astc12x10UnormSrgb
                | Astc12x10Float
                | Astc12x12Unorm
                | Astc12x12UnormSrgb
                | Astc12x12Float
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_stencil_formats_carry_both_aspects() {
        assert!(TextureFormat::D24UnormS8Uint.is_depth_stencil());
        assert!(TextureFormat::D32FloatS8Uint.is_depth_stencil());
        assert!(!TextureFormat::D16Unorm
            .aspect()
            .contains(FormatAspect::STENCIL));
    }

    #[test]
    fn color_formats_are_not_depth_stencil() {
        assert!(!TextureFormat::R8G8B8A8Unorm.is_depth_stencil());
        assert_eq!(TextureFormat::R8G8B8A8Unorm.aspect(), FormatAspect::COLOR);
    }

    #[test]
    fn invalid_is_the_default_and_has_no_aspect() {
        assert_eq!(TextureFormat::default(), TextureFormat::Invalid);
        assert!(TextureFormat::Invalid.aspect().is_empty());
    }

    #[test]
    fn compressed_formats_are_flagged() {
        assert!(TextureFormat::Bc7RgbaUnorm.is_compressed());
        assert!(TextureFormat::Astc12x12Float.is_compressed());
        assert!(!TextureFormat::R8G8B8A8Unorm.is_compressed());
    }
}
