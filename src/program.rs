//! Compute program plans
//!
//! A [`ProgramPlan`] is the full recipe for one dispatch: rendered WGSL,
//! binding order, packed uniform bytes and grid geometry. Backends execute
//! plans without knowing anything about quantization; the cache key lets
//! them reuse pipelines across dispatches that share a shader.

use bytemuck::{Pod, Zeroable};

/// Logical role of each bind-group entry, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandRole {
    A,
    B,
    Scales,
    ZeroPoints,
    Output,
    Uniforms,
}

/// One bind-group entry of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDesc {
    pub role: OperandRole,
    /// Read-only storage (or uniform) vs read-write storage
    pub read_only: bool,
}

impl BindingDesc {
    pub const fn storage(role: OperandRole, read_only: bool) -> Self {
        Self { role, read_only }
    }

    pub const fn uniforms() -> Self {
        Self {
            role: OperandRole::Uniforms,
            read_only: true,
        }
    }
}

/// Everything a backend needs to run one kernel once.
#[derive(Debug, Clone)]
pub struct ProgramPlan {
    /// Human-readable label for debug tooling and trace captures
    pub label: String,
    /// Pipeline cache key: variant name plus every parameter that changes
    /// the rendered source
    pub cache_key: String,
    /// Rendered WGSL module
    pub source: String,
    /// Always `"main"`
    pub entry_point: &'static str,
    /// Bind-group entries in binding order (uniforms last)
    pub bindings: Vec<BindingDesc>,
    /// Packed uniform buffer contents
    pub uniforms: Vec<u8>,
    pub workgroup_size: [u32; 3],
    /// Workgroup grid passed to `dispatch_workgroups`
    pub dispatch: [u32; 3],
}

/// Uniforms for both generic-path kernels.
///
/// Shape vectors are padded to `vec4<u32>` so the struct needs no WGSL-side
/// padding games. The fourth lane of each is unused.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GeneralUniforms {
    /// `[batch, M, K / components_a, 0]` in packed elements
    pub a_shape: [u32; 4],
    /// `[batch, M, N / components_y, 0]` in packed elements
    pub output_shape: [u32; 4],
    /// `[block_size, n_blocks_per_col, 0, 0]`
    pub meta: [u32; 4],
}

/// Uniforms for the prefill kernel. `k4`/`k8` pre-divide K by the vector
/// widths the kernel reads A and B with.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PrefillUniforms {
    pub m: u32,
    pub n: u32,
    pub k: u32,
    pub k4: u32,
    pub k8: u32,
    pub _pad: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_are_aligned() {
        assert_eq!(std::mem::size_of::<GeneralUniforms>(), 48);
        assert_eq!(std::mem::size_of::<PrefillUniforms>(), 32);
    }

    #[test]
    fn test_uniform_bytes() {
        let u = GeneralUniforms {
            a_shape: [1, 7, 8, 0],
            output_shape: [1, 7, 5, 0],
            meta: [32, 2, 0, 0],
        };
        let bytes = bytemuck::bytes_of(&u);
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[32..36], &32u32.to_le_bytes());
    }
}
