/// Per-attribute vertex element formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum VertexElementFormat {
    Invalid = 0,

    Int1,
    Int2,
    Int3,
    Int4,
    Uint1,
    Uint2,
    Uint3,
    Uint4,
    Float1,
    Float2,
    Float3,
    Float4,

    Byte2,
    Byte4,
    Ubyte2,
    Ubyte4,
    Byte2Norm,
    Byte4Norm,
    Ubyte2Norm,
    Ubyte4Norm,

    Short2,
    Short4,
    Ushort2,
    Ushort4,
    Short2Norm,
    Short4Norm,
    Ushort2Norm,
    Ushort4Norm,

    Half2,
    Half4,
}

impl Default for VertexElementFormat {
    fn default() -> Self {
        VertexElementFormat::Invalid
    }
}

impl VertexElementFormat {
    /// Size of one vertex element in bytes, used to compute default strides
    /// when an explicit pitch is not supplied.
    pub const fn size_bytes(self) -> u32 {
        use VertexElementFormat::*;
        match self {
            Invalid => 0,
            Int1 | Uint1 | Float1 => 4,
            Int2 | Uint2 | Float2 => 8,
            Int3 | Uint3 | Float3 => 12,
            Int4 | Uint4 | Float4 => 16,
            Byte2 | Ubyte2 | Byte2Norm | Ubyte2Norm | Short2 | Ushort2 | Short2Norm
            | Ushort2Norm | Half2 => 4,
            Byte4 | Ubyte4 | Byte4Norm | Ubyte4Norm => 4,
            Short4 | Ushort4 | Short4Norm | Ushort4Norm | Half4 => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_match_their_component_layout() {
        assert_eq!(VertexElementFormat::Float4.size_bytes(), 16);
        assert_eq!(VertexElementFormat::Half2.size_bytes(), 4);
        assert_eq!(VertexElementFormat::Ubyte4Norm.size_bytes(), 4);
        assert_eq!(VertexElementFormat::Invalid.size_bytes(), 0);
    }
}
