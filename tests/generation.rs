//! Structural checks on rendered kernel sources.

use nbitr::generate::{block32_source, build_plan, general_source, prefill_source};
use nbitr::packing::{dequantize, unpack_nibbles, BlockLayout};
use nbitr::variant::{
    Block32Params, GeneralParams, KernelVariant, PrefillParams, SelectionContext,
};
use nbitr::{AdapterProfile, DType, MatmulShape};

fn general(dtype: DType) -> GeneralParams {
    GeneralParams {
        dtype,
        layout: BlockLayout::new(128, 32),
        components_a: 4,
        components_b: 4,
        components_y: 4,
        output_number: 1,
        has_zero_points: false,
    }
}

#[test]
fn general_kernel_unpacks_with_nibble_masks() {
    let src = general_source(&general(DType::F32));
    assert!(src.contains("unpack4xU8(b_value & 0x0F0F0F0Fu)"));
    assert!(src.contains("unpack4xU8((b_value >> 4u) & 0x0F0F0F0Fu)"));
    // interleaved lower/upper per byte
    assert!(src.contains(
        "mat2x4<f32>(f32(b_value_lower[0u]), f32(b_value_upper[0u]), f32(b_value_lower[1u])"
    ));
}

#[test]
fn general_kernel_binds_operands_in_order() {
    let src = general_source(&general(DType::F32));
    assert!(src.contains("@group(0) @binding(0) var<storage, read> in_a: array<vec4<f32>>;"));
    assert!(src.contains("@group(0) @binding(1) var<storage, read> in_b: array<vec4<u32>>;"));
    assert!(src.contains("@group(0) @binding(2) var<storage, read> scales: array<f32>;"));
    assert!(src.contains("@group(0) @binding(3) var<storage, read_write> output: array<vec4<f32>>;"));
    assert!(src.contains("@group(0) @binding(4) var<uniform> params: Params;"));
}

#[test]
fn general_kernel_bounds_checks_activation_loads() {
    let src = general_source(&general(DType::F32));
    assert!(src.contains("if ((word_offset + j) < params.a_shape.z) {"));
    assert!(src.contains("a_data[j] = vec4<f32>(0);"));
}

#[test]
fn general_kernel_reduction_caps_at_block_count() {
    let src = general_source(&general(DType::F32));
    assert!(src.contains("let blocks_num = min(64u, n_blocks_per_col);"));
    assert!(src.contains("for (var block = local_id.x; block < n_blocks_per_col; block += 64u) {"));
}

#[test]
fn quantized_aggregate_follows_activation_width() {
    let mut p = general(DType::F32);
    p.components_a = 2;
    let src = general_source(&p);
    assert!(src.contains("var a_data: mat4x2<f32>;"));

    p.components_a = 1;
    let src = general_source(&p);
    assert!(src.contains("var a_data: array<f32, 8>;"));
}

#[test]
fn block32_kernel_stages_and_reduces() {
    let p = Block32Params {
        dtype: DType::F16,
        layout: BlockLayout::new(128, 32),
        components_a: 4,
        components_b: 4,
        has_zero_points: false,
        workgroup_y: 8,
        workgroup_x: 16,
    };
    let src = block32_source(&p);
    assert!(src.starts_with("enable f16;"));
    assert!(src.contains("var<workgroup> sub_a: array<vec4<f16>, 128>;"));
    assert!(src.contains("var<workgroup> inter_results: array<array<f16, 16>, 8>;"));
    assert!(src.contains("for (var a_offset = local_idx; a_offset < 128u; a_offset += 128u) {"));
    // staging/compute barrier pair inside the tile loop
    assert_eq!(src.matches("workgroupBarrier();").count(), 2);
}

#[test]
fn prefill_kernel_has_fixed_tile_geometry() {
    let src = prefill_source(&PrefillParams { dtype: DType::F32 });
    assert!(src.contains("const TILE_SIZE = 16u;"));
    assert!(src.contains("const BLOCKS_PER_CYCLE = 2u;"));
    assert!(src.contains("const INNER_DIMENSION_ITEMS_PER_CYCLE = 16u;"));
    assert!(src.contains("const VECTORIZED_QUANTIZATION_BLOCK_SIZE = 8u;"));
    assert!(src.contains("let idx = local_idx / TILE_SIZE;"));
    assert!(src.contains("let idy = local_idx % TILE_SIZE;"));
    assert_eq!(src.matches("workgroupBarrier();").count(), 3);
}

#[test]
fn prefill_dequantizes_against_the_midpoint() {
    let src = prefill_source(&PrefillParams { dtype: DType::F16 });
    assert!(src.contains("(f16(b_value_lower[0u]) - 8.0) * scale"));
    assert!(src.contains("(f16(b_value_upper[3u]) - 8.0) * scale"));
}

#[test]
fn plan_source_and_geometry_agree() {
    let profile = AdapterProfile::new("intel", "gen-12lp");
    let shape = MatmulShape::compute(&[40, 128], 16, 128).unwrap();
    let variant = KernelVariant::select(&SelectionContext {
        batch_count: 1,
        m: 40,
        n: 16,
        k: 128,
        block_size: 32,
        dtype: DType::F32,
        has_zero_points: false,
        profile: &profile,
    });
    let plan = build_plan(&variant, &shape);
    assert_eq!(plan.label, "matmul_nbits_prefill");
    assert_eq!(plan.dispatch, [3, 1, 1]);
    assert_eq!(plan.workgroup_size, [256, 1, 1]);
    assert!(plan.source.contains("@compute @workgroup_size(256, 1, 1)"));
    assert_eq!(plan.entry_point, "main");
}

// The host-side mirror in packing.rs and the generator must describe the
// same arithmetic; these assertions rebuild the kernel's expressions from
// the mirror's lane layout so the two cannot drift apart silently.
#[test]
fn general_kernel_matches_host_unpack_and_dequant() {
    // lane 2j is the low nibble of byte j, lane 2j+1 the high nibble
    let word: u32 = 0xDEADBEEF;
    let vals = unpack_nibbles(word);
    let lower = word & 0x0F0F0F0F;
    let upper = (word >> 4) & 0x0F0F0F0F;
    for j in 0..4 {
        assert_eq!(vals[2 * j], lower.to_le_bytes()[j]);
        assert_eq!(vals[2 * j + 1], upper.to_le_bytes()[j]);
    }

    // the kernel's constructor walks lanes in that same order
    let args: Vec<String> = (0..8)
        .map(|i| {
            let half = if i % 2 == 0 { "lower" } else { "upper" };
            format!("f32(b_value_{}[{}u])", half, i / 2)
        })
        .collect();
    let ctor = format!("b_quantized_values = mat2x4<f32>({});", args.join(", "));
    let mut p = general(DType::F32);
    p.has_zero_points = true;
    let src = general_source(&p);
    assert!(src.contains(&ctor));

    // subtract the zero point before scaling, as the mirror does
    assert_eq!(dequantize(11, 0.5, 8), (11.0f32 - 8.0) * 0.5);
    assert!(src.contains("(b_quantized_values - mat2x4<f32>(zero_point0,"));
    assert!(src.contains(") * scale0;"));
}

#[test]
fn general_kernel_zero_point_stride_matches_host_layout() {
    let mut p = general(DType::F32);
    p.has_zero_points = true;
    let src = general_source(&p);
    assert!(src.contains("let zero_point_bytes_per_col = (n_blocks_per_col + 2u) / 2u;"));
    // emitted integer expression and host layout agree for every block count
    for n_blocks in 1u32..=40 {
        let layout = BlockLayout::new(n_blocks * 32, 32);
        assert_eq!(layout.zero_point_bytes_per_col(), (n_blocks + 2) / 2);
    }
}

#[test]
fn rendered_source_is_deterministic() {
    let p = general(DType::F32);
    assert_eq!(general_source(&p), general_source(&p));
}
