//! Packed 4-bit layout math shared by the generators and the dispatcher
//!
//! Everything the kernels do with bits has a host-side mirror here, so the
//! same arithmetic that folds constants into WGSL is what the tests check.
//!
//! # Packing contract
//!
//! Weights are unsigned 4-bit, 8 nibbles per `u32` word, low nibble of each
//! byte first. A block of `block_size` values along K spans
//! `block_size / 8` words. Zero-points are one nibble per `(row, block)`,
//! rows padded to whole bytes. Absent zero-points mean the constant 8 (the
//! midpoint of the unsigned 4-bit range).

use crate::dtype::DType;

/// Bit width of the quantized weights. The only width this crate emits
/// kernels for.
pub const NBITS: u32 = 4;

/// Default zero-point when the operand is absent.
pub const DEFAULT_ZERO_POINT: u8 = 8;

/// Largest vector width that divides `size` evenly.
///
/// Widths are 1, 2 or 4; `vec3` is never chosen because its WGSL storage
/// layout pads to 16 bytes, which would break index arithmetic. `size == 0`
/// returns 4.
pub const fn max_components(size: u32) -> u32 {
    if size % 4 == 0 {
        4
    } else if size % 2 == 0 {
        2
    } else {
        1
    }
}

/// Aggregate WGSL shape holding the 8 dequantized values of one weight word.
///
/// Chosen so the unpacked values can be consumed with the same vector width
/// as the activation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantDataType {
    /// `array<elem, 8>` — scalar activations
    Array8,
    /// `mat4x2<elem>` — 2-wide activations
    Mat4x2,
    /// `mat2x4<elem>` — 4-wide activations
    Mat2x4,
}

/// Closed mapping from activation packing width to aggregate shape.
const QUANT_DATA_TYPES: [(u32, QuantDataType); 3] = [
    (1, QuantDataType::Array8),
    (2, QuantDataType::Mat4x2),
    (4, QuantDataType::Mat2x4),
];

impl QuantDataType {
    /// Look up the aggregate for an activation packing width. Any width
    /// outside the table falls back to the flat array form.
    pub fn for_components(components_a: u32) -> Self {
        QUANT_DATA_TYPES
            .iter()
            .find(|(c, _)| *c == components_a)
            .map(|(_, t)| *t)
            .unwrap_or(QuantDataType::Array8)
    }

    /// WGSL spelling with the given element type
    pub fn wgsl(self, elem: DType) -> String {
        match self {
            Self::Array8 => format!("array<{}, 8>", elem.wgsl()),
            Self::Mat4x2 => format!("mat4x2<{}>", elem.wgsl()),
            Self::Mat2x4 => format!("mat2x4<{}>", elem.wgsl()),
        }
    }

    /// Rows of the aggregate (vectors consumed per weight word)
    pub const fn rows(self) -> u32 {
        match self {
            Self::Array8 => 8,
            Self::Mat4x2 => 4,
            Self::Mat2x4 => 2,
        }
    }
}

/// Block geometry along the K dimension for one weight column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Values per quantization block
    pub block_size: u32,
    /// `ceil(K / block_size)`
    pub n_blocks_per_col: u32,
    /// Bytes per block: `nbits * block_size / 8`
    pub blob_size: u32,
    /// 32-bit words per block
    pub blob_size_in_words: u32,
}

impl BlockLayout {
    pub const fn new(k: u32, block_size: u32) -> Self {
        let n_blocks_per_col = k.div_ceil(block_size);
        let blob_size = NBITS * block_size / 8;
        Self {
            block_size,
            n_blocks_per_col,
            blob_size,
            blob_size_in_words: blob_size / 4,
        }
    }

    /// Zero-point row stride in bytes: `ceil((n_blocks_per_col + 1) / 2)`.
    ///
    /// One nibble per block, rounded up to whole bytes with one spare nibble
    /// of slack so rows never straddle a byte.
    pub const fn zero_point_bytes_per_col(&self) -> u32 {
        (self.n_blocks_per_col + 1).div_ceil(2)
    }
}

/// Location of one packed zero-point nibble inside the byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroPointSlot {
    pub byte_index: u32,
    pub word_index: u32,
    pub byte_offset: u32,
    pub nibble_offset: u32,
    /// Shift within the containing word: `byte_offset*8 + nibble_offset*4`
    pub bits_offset: u32,
}

impl ZeroPointSlot {
    /// Address the zero-point nibble for `(row, block)`.
    pub const fn locate(row: u32, block: u32, layout: &BlockLayout) -> Self {
        let byte_index = row * layout.zero_point_bytes_per_col() + (block >> 1);
        let byte_offset = byte_index & 3;
        let nibble_offset = block & 1;
        Self {
            byte_index,
            word_index: byte_index >> 2,
            byte_offset,
            nibble_offset,
            bits_offset: (byte_offset << 3) + (nibble_offset << 2),
        }
    }

    /// Extract the nibble from the packed word array.
    pub fn read(&self, words: &[u32]) -> u8 {
        ((words[self.word_index as usize] >> self.bits_offset) & 0xF) as u8
    }
}

/// Unpack one weight word into its 8 nibbles, in consumption order.
///
/// The kernels split a word into low nibbles (`word & 0x0F0F0F0F`) and high
/// nibbles (`(word >> 4) & 0x0F0F0F0F`) and interleave them per byte, so the
/// order is `[lo0, hi0, lo1, hi1, lo2, hi2, lo3, hi3]`.
pub fn unpack_nibbles(word: u32) -> [u8; 8] {
    let lower = word & 0x0F0F_0F0F;
    let upper = (word >> 4) & 0x0F0F_0F0F;
    let lo = lower.to_le_bytes();
    let hi = upper.to_le_bytes();
    [
        lo[0], hi[0], lo[1], hi[1], lo[2], hi[2], lo[3], hi[3],
    ]
}

/// Pack 8 nibbles (consumption order, values 0..=15) into one weight word.
pub fn pack_nibbles(vals: [u8; 8]) -> u32 {
    let mut word = 0u32;
    for byte in 0..4 {
        let lo = (vals[byte * 2] & 0xF) as u32;
        let hi = (vals[byte * 2 + 1] & 0xF) as u32;
        word |= (lo | (hi << 4)) << (byte * 8);
    }
    word
}

/// `(q - zero_point) * scale`
#[inline]
pub fn dequantize(q: u8, scale: f32, zero_point: u8) -> f32 {
    (q as f32 - zero_point as f32) * scale
}
