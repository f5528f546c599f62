/// Topology interpreted by the input assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PrimitiveType {
    TriangleList = 0,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

/// Depth/stencil comparison function. `Invalid` is index 0 so a zeroed value
/// is never silently treated as `Always`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CompareOp {
    Invalid = 0,
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BlendFactor {
    Invalid = 0,
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BlendOp {
    Invalid = 0,
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StencilOp {
    Invalid = 0,
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

impl Default for PrimitiveType {
    fn default() -> Self {
        PrimitiveType::TriangleList
    }
}
impl Default for CompareOp {
    fn default() -> Self {
        CompareOp::Invalid
    }
}
impl Default for BlendFactor {
    fn default() -> Self {
        BlendFactor::Invalid
    }
}
impl Default for BlendOp {
    fn default() -> Self {
        BlendOp::Invalid
    }
}
impl Default for StencilOp {
    fn default() -> Self {
        StencilOp::Invalid
    }
}

/// Sample counts supported for multisampled render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SampleCount {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl Default for SampleCount {
    fn default() -> Self {
        SampleCount::One
    }
}
