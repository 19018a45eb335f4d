//! Element types for operand descriptors and WGSL emission

use std::fmt;

use half::f16;

/// Element types this operator traffics in.
///
/// `F32`/`F16` are the WebGPU float types accepted for activations, scales and
/// output. `U8` describes packed quantized bytes (weights, zero-points) as the
/// caller holds them; the kernels always *access* packed data as `u32` words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F16,
    U8,
    U32,
}

impl DType {
    /// Size of one element in bytes
    pub const fn size_of(self) -> usize {
        match self {
            Self::F32 | Self::U32 => 4,
            Self::F16 => 2,
            Self::U8 => 1,
        }
    }

    /// WGSL scalar name. `U8` has no WGSL counterpart; packed bytes are
    /// addressed as `u32` words in shaders.
    pub const fn wgsl(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::U8 | Self::U32 => "u32",
        }
    }

    /// Whether this is a float type usable for activations/scales/output
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::U8 => "U8",
            Self::U32 => "U32",
        };
        f.write_str(name)
    }
}

/// Encode an f32 slice as little-endian bytes of the given float dtype.
///
/// Convenience for callers staging activations/scales for an `F16` kernel.
pub fn encode_floats(values: &[f32], dtype: DType) -> Vec<u8> {
    match dtype {
        DType::F16 => values
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect(),
        _ => values.iter().flat_map(|&v| v.to_le_bytes()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DType::F32.size_of(), 4);
        assert_eq!(DType::F16.size_of(), 2);
        assert_eq!(DType::U8.size_of(), 1);
    }

    #[test]
    fn test_wgsl_names() {
        assert_eq!(DType::F32.wgsl(), "f32");
        assert_eq!(DType::F16.wgsl(), "f16");
        assert_eq!(DType::U8.wgsl(), "u32");
    }

    #[test]
    fn test_encode_f16_roundtrip() {
        let bytes = encode_floats(&[1.0, -2.5], DType::F16);
        assert_eq!(bytes.len(), 4);
        let back = f16::from_le_bytes([bytes[0], bytes[1]]).to_f32();
        assert_eq!(back, 1.0);
    }
}
