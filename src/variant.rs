//! Kernel variant selection
//!
//! One closed enum covers every kernel this operator can emit. Selection is
//! a pure function of shapes, quantization config and adapter identity, so
//! the choice is testable without a device.

use crate::adapter::AdapterProfile;
use crate::dtype::DType;
use crate::packing::{max_components, BlockLayout};

/// Sequence lengths below this stay on the general path even when the
/// prefill kernel's other conditions hold.
pub const MIN_PREFILL_SEQUENCE_LEN: u32 = 16;

/// Everything selection looks at.
#[derive(Debug, Clone)]
pub struct SelectionContext<'a> {
    pub batch_count: u32,
    pub m: u32,
    pub n: u32,
    pub k: u32,
    pub block_size: u32,
    pub dtype: DType,
    pub has_zero_points: bool,
    pub profile: &'a AdapterProfile,
}

/// Parameters of the generic-path kernel (arbitrary block size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneralParams {
    pub dtype: DType,
    pub layout: BlockLayout,
    /// Vector width of A loads
    pub components_a: u32,
    /// Vector width of B word loads
    pub components_b: u32,
    /// Vector width of output stores
    pub components_y: u32,
    /// Output elements produced per workgroup. Fixed at 1; larger unrolls
    /// read A out of bounds when M*N is not a multiple of the unroll.
    pub output_number: u32,
    pub has_zero_points: bool,
}

/// Parameters of the block32 sub-path (fixed block size 32, tiled staging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block32Params {
    pub dtype: DType,
    pub layout: BlockLayout,
    pub components_a: u32,
    pub components_b: u32,
    pub has_zero_points: bool,
    /// Output columns per workgroup (8, 4 or 1 depending on N)
    pub workgroup_y: u32,
    /// Threads along the reduction axis: `128 / workgroup_y`
    pub workgroup_x: u32,
}

impl Block32Params {
    /// Activation elements staged per K-tile
    pub const fn tile_size(&self) -> u32 {
        self.workgroup_x * self.components_b * 8
    }

    /// Staged vectors per tile
    pub const fn a_length_per_tile(&self) -> u32 {
        self.tile_size() / self.components_a
    }

    /// Quantization blocks consumed per tile
    pub const fn blocks_per_tile(&self) -> u32 {
        self.tile_size() / 32
    }
}

/// Parameters of the prefill kernel. Tile geometry is fixed; shapes travel
/// in uniforms, so the rendered source varies only with the element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefillParams {
    pub dtype: DType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    General(GeneralParams),
    GeneralBlock32(Block32Params),
    Prefill(PrefillParams),
}

impl KernelVariant {
    /// Pick the kernel for one dispatch.
    pub fn select(ctx: &SelectionContext<'_>) -> Self {
        let layout = BlockLayout::new(ctx.k, ctx.block_size);
        let components_a = max_components(ctx.k);
        let components_b = max_components(layout.blob_size_in_words);

        let use_block32 = ctx.profile.is_intel_gen12lp() && ctx.block_size == 32;
        let use_prefill = use_block32
            && ctx.batch_count == 1
            && components_a == 4
            && components_b == 4
            && !ctx.has_zero_points
            && ctx.m >= MIN_PREFILL_SEQUENCE_LEN;

        let variant = if use_prefill {
            Self::Prefill(PrefillParams { dtype: ctx.dtype })
        } else if use_block32 {
            let workgroup_y = if ctx.n % 8 == 0 {
                8
            } else if ctx.n % 4 == 0 {
                4
            } else {
                1
            };
            Self::GeneralBlock32(Block32Params {
                dtype: ctx.dtype,
                layout,
                components_a,
                components_b,
                has_zero_points: ctx.has_zero_points,
                workgroup_y,
                workgroup_x: 128 / workgroup_y,
            })
        } else {
            Self::General(GeneralParams {
                dtype: ctx.dtype,
                layout,
                components_a,
                components_b,
                components_y: max_components(ctx.n),
                output_number: 1,
                has_zero_points: ctx.has_zero_points,
            })
        };

        log::debug!(
            "matmul_nbits: {} for b={} m={} n={} k={} block_size={} zp={}",
            variant.label(),
            ctx.batch_count,
            ctx.m,
            ctx.n,
            ctx.k,
            ctx.block_size,
            ctx.has_zero_points
        );
        variant
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::General(_) => "matmul_nbits_general",
            Self::GeneralBlock32(_) => "matmul_nbits_block32",
            Self::Prefill(_) => "matmul_nbits_prefill",
        }
    }

    /// Pipeline cache key. Covers every parameter the generators fold into
    /// the rendered source; shapes travel in uniforms and stay out.
    pub fn cache_key(&self) -> String {
        match self {
            Self::General(p) => format!(
                "{}.{}.bs{}.ca{}.cb{}.cy{}.on{}.zp{}",
                self.label(),
                p.dtype,
                p.layout.block_size,
                p.components_a,
                p.components_b,
                p.components_y,
                p.output_number,
                u8::from(p.has_zero_points)
            ),
            Self::GeneralBlock32(p) => format!(
                "{}.{}.wy{}.ca{}.cb{}.zp{}",
                self.label(),
                p.dtype,
                p.workgroup_y,
                p.components_a,
                p.components_b,
                u8::from(p.has_zero_points)
            ),
            Self::Prefill(p) => format!("{}.{}", self.label(), p.dtype),
        }
    }

    pub fn workgroup_size(&self) -> [u32; 3] {
        match self {
            Self::General(_) => [64, 1, 1],
            Self::GeneralBlock32(p) => [p.workgroup_x, p.workgroup_y, 1],
            Self::Prefill(_) => [256, 1, 1],
        }
    }

    /// Workgroup grid for the given reconciled shape.
    pub fn dispatch(&self, batch_count: u32, m: u32, n: u32) -> [u32; 3] {
        let output_numel = batch_count * m * n;
        match self {
            Self::General(p) => {
                [output_numel / p.components_y / p.output_number, 1, 1]
            }
            Self::GeneralBlock32(p) => [output_numel / p.workgroup_y, 1, 1],
            Self::Prefill(_) => [m.div_ceil(16), n.div_ceil(16), 1],
        }
    }
}
