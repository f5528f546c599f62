//! Enum conversions between `gput` and `ash::vk` (§4.2 "Textures map SDL
//! format -> Vulkan format via a fixed table and cube/3D create flags via
//! the type").

use ash::vk;
use gput::{BlendFactor, BlendOp, CompareOp, LoadOp, PrimitiveType, SampleCount, StencilOp, StoreOp, TextureFormat, VertexElementFormat};

pub fn texture_format(format: TextureFormat) -> vk::Format {
    use TextureFormat as F;
    match format {
        F::Invalid => vk::Format::UNDEFINED,

        F::A8Unorm => vk::Format::A8_UNORM_KHR,
        F::R8Unorm => vk::Format::R8_UNORM,
        F::R8G8Unorm => vk::Format::R8G8_UNORM,
        F::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        F::R16Unorm => vk::Format::R16_UNORM,
        F::R16G16Unorm => vk::Format::R16G16_UNORM,
        F::R16G16B16A16Unorm => vk::Format::R16G16B16A16_UNORM,
        F::R10G10B10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        F::B5G6R5Unorm => vk::Format::R5G6B5_UNORM_PACK16,
        F::B5G5R5A1Unorm => vk::Format::A1R5G5B5_UNORM_PACK16,
        F::B4G4R4A4Unorm => vk::Format::B4G4R4A4_UNORM_PACK16,
        F::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,

        F::Bc1RgbaUnorm => vk::Format::BC1_RGBA_UNORM_BLOCK,
        F::Bc2RgbaUnorm => vk::Format::BC2_UNORM_BLOCK,
        F::Bc3RgbaUnorm => vk::Format::BC3_UNORM_BLOCK,
        F::Bc4RUnorm => vk::Format::BC4_UNORM_BLOCK,
        F::Bc5RgUnorm => vk::Format::BC5_UNORM_BLOCK,
        F::Bc6hRgbFloat => vk::Format::BC6H_SFLOAT_BLOCK,
        F::Bc6hRgbUfloat => vk::Format::BC6H_UFLOAT_BLOCK,
        F::Bc7RgbaUnorm => vk::Format::BC7_UNORM_BLOCK,

        F::R8Snorm => vk::Format::R8_SNORM,
        F::R8G8Snorm => vk::Format::R8G8_SNORM,
        F::R8G8B8A8Snorm => vk::Format::R8G8B8A8_SNORM,
        F::R16Snorm => vk::Format::R16_SNORM,
        F::R16G16Snorm => vk::Format::R16G16_SNORM,
        F::R16G16B16A16Snorm => vk::Format::R16G16B16A16_SNORM,

        F::R16Float => vk::Format::R16_SFLOAT,
        F::R16G16Float => vk::Format::R16G16_SFLOAT,
        F::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        F::R32Float => vk::Format::R32_SFLOAT,
        F::R32G32Float => vk::Format::R32G32_SFLOAT,
        F::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        F::R11G11B10Ufloat => vk::Format::B10G11R11_UFLOAT_PACK32,

        F::R8Uint => vk::Format::R8_UINT,
        F::R8G8Uint => vk::Format::R8G8_UINT,
        F::R8G8B8A8Uint => vk::Format::R8G8B8A8_UINT,
        F::R16Uint => vk::Format::R16_UINT,
        F::R16G16Uint => vk::Format::R16G16_UINT,
        F::R16G16B16A16Uint => vk::Format::R16G16B16A16_UINT,
        F::R8Int => vk::Format::R8_SINT,
        F::R8G8Int => vk::Format::R8G8_SINT,
        F::R8G8B8A8Int => vk::Format::R8G8B8A8_SINT,
        F::R16Int => vk::Format::R16_SINT,
        F::R16G16Int => vk::Format::R16G16_SINT,
        F::R16G16B16A16Int => vk::Format::R16G16B16A16_SINT,
        F::R32Uint => vk::Format::R32_UINT,
        F::R32G32Uint => vk::Format::R32G32_UINT,
        F::R32G32B32A32Uint => vk::Format::R32G32B32A32_UINT,
        F::R32Int => vk::Format::R32_SINT,
        F::R32G32Int => vk::Format::R32G32_SINT,
        F::R32G32B32A32Int => vk::Format::R32G32B32A32_SINT,

        F::R8G8B8A8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        F::B8G8R8A8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        F::Bc1RgbaUnormSrgb => vk::Format::BC1_RGBA_SRGB_BLOCK,
        F::Bc2RgbaUnormSrgb => vk::Format::BC2_SRGB_BLOCK,
        F::Bc3RgbaUnormSrgb => vk::Format::BC3_SRGB_BLOCK,
        F::Bc7RgbaUnormSrgb => vk::Format::BC7_SRGB_BLOCK,

        F::D16Unorm => vk::Format::D16_UNORM,
        F::D24Unorm => vk::Format::X8_D24_UNORM_PACK32,
        F::D32Float => vk::Format::D32_SFLOAT,
        F::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        F::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,

        F::Astc4x4Unorm => vk::Format::ASTC_4X4_UNORM_BLOCK,
        F::Astc4x4UnormSrgb => vk::Format::ASTC_4X4_SRGB_BLOCK,
        F::Astc4x4Float => vk::Format::ASTC_4X4_SFLOAT_BLOCK_EXT,
        F::Astc5x4Unorm => vk::Format::ASTC_5X4_UNORM_BLOCK,
        F::Astc5x4UnormSrgb => vk::Format::ASTC_5X4_SRGB_BLOCK,
        F::Astc5x4Float => vk::Format::ASTC_5X4_SFLOAT_BLOCK_EXT,
        F::Astc5x5Unorm => vk::Format::ASTC_5X5_UNORM_BLOCK,
        F::Astc5x5UnormSrgb => vk::Format::ASTC_5X5_SRGB_BLOCK,
        F::Astc5x5Float => vk::Format::ASTC_5X5_SFLOAT_BLOCK_EXT,
        F::Astc6x5Unorm => vk::Format::ASTC_6X5_UNORM_BLOCK,
        F::Astc6x5UnormSrgb => vk::Format::ASTC_6X5_SRGB_BLOCK,
        F::Astc6x5Float => vk::Format::ASTC_6X5_SFLOAT_BLOCK_EXT,
        F::Astc6x6Unorm => vk::Format::ASTC_6X6_UNORM_BLOCK,
        F::Astc6x6UnormSrgb => vk::Format::ASTC_6X6_SRGB_BLOCK,
        F::Astc6x6Float => vk::Format::ASTC_6X6_SFLOAT_BLOCK_EXT,
        F::Astc8x5Unorm => vk::Format::ASTC_8X5_UNORM_BLOCK,
        F::Astc8x5UnormSrgb => vk::Format::ASTC_8X5_SRGB_BLOCK,
        F::Astc8x5Float => vk::Format::ASTC_8X5_SFLOAT_BLOCK_EXT,
        F::Astc8x6Unorm => vk::Format::ASTC_8X6_UNORM_BLOCK,
        F::Astc8x6UnormSrgb => vk::Format::ASTC_8X6_SRGB_BLOCK,
        F::Astc8x6Float => vk::Format::ASTC_8X6_SFLOAT_BLOCK_EXT,
        F::Astc8x8Unorm => vk::Format::ASTC_8X8_UNORM_BLOCK,
        F::Astc8x8UnormSrgb => vk::Format::ASTC_8X8_SRGB_BLOCK,
        F::Astc8x8Float => vk::Format::ASTC_8X8_SFLOAT_BLOCK_EXT,
        F::Astc10x5Unorm => vk::Format::ASTC_10X5_UNORM_BLOCK,
        F::Astc10x5UnormSrgb => vk::Format::ASTC_10X5_SRGB_BLOCK,
        F::Astc10x5Float => vk::Format::ASTC_10X5_SFLOAT_BLOCK_EXT,
        F::Astc10x6Unorm => vk::Format::ASTC_10X6_UNORM_BLOCK,
        F::Astc10x6UnormSrgb => vk::Format::ASTC_10X6_SRGB_BLOCK,
        F::Astc10x6Float => vk::Format::ASTC_10X6_SFLOAT_BLOCK_EXT,
        F::Astc10x8Unorm => vk::Format::ASTC_10X8_UNORM_BLOCK,
        F::Astc10x8UnormSrgb => vk::Format::ASTC_10X8_SRGB_BLOCK,
        F::Astc10x8Float => vk::Format::ASTC_10X8_SFLOAT_BLOCK_EXT,
        F::Astc10x10Unorm => vk::Format::ASTC_10X10_UNORM_BLOCK,
        F::Astc10x10UnormSrgb => vk::Format::ASTC_10X10_SRGB_BLOCK,
        F::Astc10x10Float => vk::Format::ASTC_10X10_SFLOAT_BLOCK_EXT,
        F::Astc12x10Unorm => vk::Format::ASTC_12X10_UNORM_BLOCK,
        F::Astc12x10UnormSrgb => vk::Format::ASTC_12X10_SRGB_BLOCK,
        F::Astc12x10Float => vk::Format::ASTC_12X10_SFLOAT_BLOCK_EXT,
        F::Astc12x12Unorm => vk::Format::ASTC_12X12_UNORM_BLOCK,
        F::Astc12x12UnormSrgb => vk::Format::ASTC_12X12_SRGB_BLOCK,
        F::Astc12x12Float => vk::Format::ASTC_12X12_SFLOAT_BLOCK_EXT,
    }
}

pub fn vertex_element_format(format: VertexElementFormat) -> vk::Format {
    use VertexElementFormat as V;
    match format {
        V::Invalid => vk::Format::UNDEFINED,
        V::Int1 => vk::Format::R32_SINT,
        V::Int2 => vk::Format::R32G32_SINT,
        V::Int3 => vk::Format::R32G32B32_SINT,
        V::Int4 => vk::Format::R32G32B32A32_SINT,
        V::Uint1 => vk::Format::R32_UINT,
        V::Uint2 => vk::Format::R32G32_UINT,
        V::Uint3 => vk::Format::R32G32B32_UINT,
        V::Uint4 => vk::Format::R32G32B32A32_UINT,
        V::Float1 => vk::Format::R32_SFLOAT,
        V::Float2 => vk::Format::R32G32_SFLOAT,
        V::Float3 => vk::Format::R32G32B32_SFLOAT,
        V::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        V::Byte2 => vk::Format::R8G8_SINT,
        V::Byte4 => vk::Format::R8G8B8A8_SINT,
        V::Ubyte2 => vk::Format::R8G8_UINT,
        V::Ubyte4 => vk::Format::R8G8B8A8_UINT,
        V::Byte2Norm => vk::Format::R8G8_SNORM,
        V::Byte4Norm => vk::Format::R8G8B8A8_SNORM,
        V::Ubyte2Norm => vk::Format::R8G8_UNORM,
        V::Ubyte4Norm => vk::Format::R8G8B8A8_UNORM,
        V::Short2 => vk::Format::R16G16_SINT,
        V::Short4 => vk::Format::R16G16B16A16_SINT,
        V::Ushort2 => vk::Format::R16G16_UINT,
        V::Ushort4 => vk::Format::R16G16B16A16_UINT,
        V::Short2Norm => vk::Format::R16G16_SNORM,
        V::Short4Norm => vk::Format::R16G16B16A16_SNORM,
        V::Ushort2Norm => vk::Format::R16G16_UNORM,
        V::Ushort4Norm => vk::Format::R16G16B16A16_UNORM,
        V::Half2 => vk::Format::R16G16_SFLOAT,
        V::Half4 => vk::Format::R16G16B16A16_SFLOAT,
    }
}

pub fn primitive_topology(ty: PrimitiveType) -> vk::PrimitiveTopology {
    match ty {
        PrimitiveType::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveType::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveType::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Invalid | CompareOp::Always => vk::CompareOp::ALWAYS,
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
    }
}

pub fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Invalid | BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
    }
}

pub fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Invalid | BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Invalid | StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

/// `Resolve`/`ResolveAndStore` govern a separate resolve attachment (§4.5);
/// the attachment this op is attached to is always stored as `STORE` or
/// `DONT_CARE` depending on whether the resolved data is also kept.
pub fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store | StoreOp::ResolveAndStore => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare | StoreOp::Resolve => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn sample_count(count: SampleCount) -> vk::SampleCountFlags {
    match count {
        SampleCount::One => vk::SampleCountFlags::TYPE_1,
        SampleCount::Two => vk::SampleCountFlags::TYPE_2,
        SampleCount::Four => vk::SampleCountFlags::TYPE_4,
        SampleCount::Eight => vk::SampleCountFlags::TYPE_8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_maps_to_undefined() {
        assert_eq!(texture_format(TextureFormat::Invalid), vk::Format::UNDEFINED);
    }

    #[test]
    fn srgb_variant_maps_to_srgb_vulkan_format() {
        assert_eq!(texture_format(TextureFormat::B8G8R8A8UnormSrgb), vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn triangle_list_is_the_common_case() {
        assert_eq!(primitive_topology(PrimitiveType::TriangleList), vk::PrimitiveTopology::TRIANGLE_LIST);
    }

    #[test]
    fn resolve_store_op_does_not_imply_storing_the_source_attachment() {
        assert_eq!(store_op(StoreOp::Resolve), vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(store_op(StoreOp::ResolveAndStore), vk::AttachmentStoreOp::STORE);
    }
}
