//! Kernel source generation and program planning
//!
//! The generators fold variant parameters into WGSL; everything that varies
//! per dispatch (shapes) travels in uniforms so pipelines cache well.

mod general;
mod prefill;

pub use general::{block32_source, general_source};
pub use prefill::prefill_source;

use bytemuck::bytes_of;

use crate::program::{
    BindingDesc, GeneralUniforms, OperandRole, PrefillUniforms, ProgramPlan,
};
use crate::shape::MatmulShape;
use crate::variant::KernelVariant;

/// Bind-group layout shared by every variant: operands in argument order,
/// output after the inputs, uniforms last.
pub fn binding_layout(has_zero_points: bool) -> Vec<BindingDesc> {
    let mut bindings = vec![
        BindingDesc::storage(OperandRole::A, true),
        BindingDesc::storage(OperandRole::B, true),
        BindingDesc::storage(OperandRole::Scales, true),
    ];
    if has_zero_points {
        bindings.push(BindingDesc::storage(OperandRole::ZeroPoints, true));
    }
    bindings.push(BindingDesc::storage(OperandRole::Output, false));
    bindings.push(BindingDesc::uniforms());
    bindings
}

/// Assemble the full dispatch recipe for a selected variant.
pub fn build_plan(variant: &KernelVariant, shape: &MatmulShape) -> ProgramPlan {
    let batch = shape.batch_count as u32;
    let m = shape.m as u32;
    let n = shape.n as u32;
    let k = shape.k as u32;

    let (source, uniforms, has_zero_points) = match variant {
        KernelVariant::General(p) => {
            let u = GeneralUniforms {
                a_shape: [batch, m, k / p.components_a, 0],
                output_shape: [batch, m, n / p.components_y, 0],
                meta: [p.layout.block_size, p.layout.n_blocks_per_col, 0, 0],
            };
            (general_source(p), bytes_of(&u).to_vec(), p.has_zero_points)
        }
        KernelVariant::GeneralBlock32(p) => {
            let u = GeneralUniforms {
                a_shape: [batch, m, k / p.components_a, 0],
                output_shape: [batch, m, n, 0],
                meta: [p.layout.block_size, p.layout.n_blocks_per_col, 0, 0],
            };
            (block32_source(p), bytes_of(&u).to_vec(), p.has_zero_points)
        }
        KernelVariant::Prefill(p) => {
            let u = PrefillUniforms {
                m,
                n,
                k,
                k4: k / 4,
                k8: k / 8,
                _pad: [0; 3],
            };
            (prefill_source(p), bytes_of(&u).to_vec(), false)
        }
    };

    ProgramPlan {
        label: variant.label().to_string(),
        cache_key: variant.cache_key(),
        source,
        entry_point: "main",
        bindings: binding_layout(has_zero_points),
        uniforms,
        workgroup_size: variant.workgroup_size(),
        dispatch: variant.dispatch(batch, m, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterProfile;
    use crate::dtype::DType;
    use crate::variant::SelectionContext;

    fn plan_for(profile: &AdapterProfile, a_shape: &[usize], n: usize, k: usize) -> ProgramPlan {
        let shape = MatmulShape::compute(a_shape, n, k).unwrap();
        let variant = KernelVariant::select(&SelectionContext {
            batch_count: shape.batch_count as u32,
            m: shape.m as u32,
            n: n as u32,
            k: k as u32,
            block_size: 32,
            dtype: DType::F32,
            has_zero_points: false,
            profile,
        });
        build_plan(&variant, &shape)
    }

    #[test]
    fn test_binding_layout_order() {
        let with = binding_layout(true);
        let roles: Vec<_> = with.iter().map(|b| b.role).collect();
        assert_eq!(
            roles,
            vec![
                OperandRole::A,
                OperandRole::B,
                OperandRole::Scales,
                OperandRole::ZeroPoints,
                OperandRole::Output,
                OperandRole::Uniforms,
            ]
        );
        assert!(!with[4].read_only);

        let without = binding_layout(false);
        assert_eq!(without.len(), 5);
        assert_eq!(without[3].role, OperandRole::Output);
    }

    #[test]
    fn test_general_plan_uniforms() {
        let profile = AdapterProfile::vendor_only("amd");
        let plan = plan_for(&profile, &[2, 7, 64], 8, 64);
        assert_eq!(plan.workgroup_size, [64, 1, 1]);
        // 2*7*8 outputs packed 4-wide, one workgroup each
        assert_eq!(plan.dispatch, [28, 1, 1]);
        assert_eq!(plan.uniforms.len(), 48);
        let u: &GeneralUniforms = bytemuck::from_bytes(&plan.uniforms);
        assert_eq!(u.a_shape, [2, 7, 16, 0]);
        assert_eq!(u.output_shape, [2, 7, 2, 0]);
        assert_eq!(u.meta, [32, 2, 0, 0]);
    }

    #[test]
    fn test_prefill_plan_uniforms() {
        let profile = AdapterProfile::new("intel", "gen-12lp");
        let plan = plan_for(&profile, &[33, 64], 24, 64);
        assert!(plan.cache_key.contains("prefill"));
        assert_eq!(plan.workgroup_size, [256, 1, 1]);
        assert_eq!(plan.dispatch, [3, 2, 1]);
        let u: &PrefillUniforms = bytemuck::from_bytes(&plan.uniforms);
        assert_eq!((u.m, u.n, u.k, u.k4, u.k8), (33, 24, 64, 16, 8));
    }

    #[test]
    fn test_plan_source_matches_cache_key() {
        let profile = AdapterProfile::vendor_only("amd");
        let a = plan_for(&profile, &[2, 7, 64], 8, 64);
        let b = plan_for(&profile, &[4, 3, 64], 8, 64);
        // same parameters, different shapes: same pipeline, new uniforms
        assert_eq!(a.cache_key, b.cache_key);
        assert_eq!(a.source, b.source);
        assert_ne!(a.uniforms, b.uniforms);
    }
}
