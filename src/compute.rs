//! Operator entry point and the backend seam
//!
//! [`MatmulNbits`] holds the static quantization config and turns one set of
//! operand handles into a selected, planned and submitted dispatch. The
//! substrate that owns devices and buffers implements [`ComputeBackend`];
//! this crate never touches raw memory.

use crate::adapter::AdapterProfile;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::generate::build_plan;
use crate::program::ProgramPlan;
use crate::shape::MatmulShape;
use crate::tensor::TensorDesc;
use crate::variant::{KernelVariant, SelectionContext};

/// Execution substrate: buffer allocation and plan submission.
///
/// `submit` receives buffers in the plan's binding order, uniforms excluded;
/// the backend stages `plan.uniforms` itself.
pub trait ComputeBackend {
    type Buffer;

    fn adapter(&self) -> &AdapterProfile;

    /// Allocate a zero-filled output buffer.
    fn output(&mut self, desc: &TensorDesc) -> Result<Self::Buffer>;

    fn submit(&mut self, plan: &ProgramPlan, buffers: &[&Self::Buffer]) -> Result<()>;
}

/// One operand: logical descriptor plus the backend's buffer handle.
pub struct OperandRef<'a, B: ComputeBackend + ?Sized> {
    pub desc: TensorDesc,
    pub buffer: &'a B::Buffer,
}

impl<'a, B: ComputeBackend + ?Sized> OperandRef<'a, B> {
    pub fn new(desc: TensorDesc, buffer: &'a B::Buffer) -> Self {
        Self { desc, buffer }
    }
}

/// The six logical operands of one dispatch. Group-index and bias are
/// accepted so callers can pass their full argument lists, but both are
/// rejected before any work happens.
pub struct MatmulNbitsInputs<'a, B: ComputeBackend + ?Sized> {
    pub a: OperandRef<'a, B>,
    pub b: OperandRef<'a, B>,
    pub scales: OperandRef<'a, B>,
    pub zero_points: Option<OperandRef<'a, B>>,
    pub g_idx: Option<OperandRef<'a, B>>,
    pub bias: Option<OperandRef<'a, B>>,
}

/// 4-bit block-quantized matmul: `Y = A × dequant(B)ᵀ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatmulNbits {
    bits: u32,
    block_size: u32,
    n: usize,
    k: usize,
}

impl MatmulNbits {
    /// # Errors
    ///
    /// `InvalidConfig` unless `bits == 4` and `block_size` is a power of two
    /// of at least 16.
    pub fn new(bits: u32, block_size: u32, n: usize, k: usize) -> Result<Self> {
        if bits != 4 {
            return Err(Error::InvalidConfig {
                attr: "bits",
                reason: format!("only 4-bit quantization is supported, got {}", bits),
            });
        }
        if block_size < 16 || !block_size.is_power_of_two() {
            return Err(Error::InvalidConfig {
                attr: "block_size",
                reason: format!("block_size must be a power of 2 and >= 16, got {}", block_size),
            });
        }
        Ok(Self {
            bits,
            block_size,
            n,
            k,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Run one dispatch and return the output buffer.
    pub fn compute<'a, B: ComputeBackend>(
        &self,
        backend: &mut B,
        inputs: MatmulNbitsInputs<'a, B>,
    ) -> Result<B::Buffer> {
        if inputs.g_idx.is_some() {
            return Err(Error::UnsupportedInput {
                input: "g_idx",
                reason: "group index remapping is not supported",
            });
        }
        if inputs.bias.is_some() {
            return Err(Error::UnsupportedInput {
                input: "bias",
                reason: "fused bias is not supported",
            });
        }

        let dtype = inputs.a.desc.dtype;
        if !dtype.is_float() {
            return Err(Error::DTypeMismatch {
                operand: "a",
                expected: DType::F32,
                got: dtype,
            });
        }
        if inputs.scales.desc.dtype != dtype {
            return Err(Error::DTypeMismatch {
                operand: "scales",
                expected: dtype,
                got: inputs.scales.desc.dtype,
            });
        }
        if inputs.b.desc.dtype != DType::U8 {
            return Err(Error::DTypeMismatch {
                operand: "b",
                expected: DType::U8,
                got: inputs.b.desc.dtype,
            });
        }
        if let Some(zp) = &inputs.zero_points {
            if zp.desc.dtype != DType::U8 {
                return Err(Error::DTypeMismatch {
                    operand: "zero_points",
                    expected: DType::U8,
                    got: zp.desc.dtype,
                });
            }
        }

        let shape = MatmulShape::compute(&inputs.a.desc.shape, self.n, self.k)?;
        let output_desc = TensorDesc::new(dtype, shape.output_shape.clone());
        let output = backend.output(&output_desc)?;
        if shape.output_numel() == 0 {
            return Ok(output);
        }

        let variant = KernelVariant::select(&SelectionContext {
            batch_count: shape.batch_count as u32,
            m: shape.m as u32,
            n: shape.n as u32,
            k: shape.k as u32,
            block_size: self.block_size,
            dtype,
            has_zero_points: inputs.zero_points.is_some(),
            profile: backend.adapter(),
        });
        let plan = build_plan(&variant, &shape);

        let mut buffers: Vec<&B::Buffer> = vec![
            inputs.a.buffer,
            inputs.b.buffer,
            inputs.scales.buffer,
        ];
        if let Some(zp) = &inputs.zero_points {
            buffers.push(zp.buffer);
        }
        buffers.push(&output);
        backend.submit(&plan, &buffers)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::BlockLayout;

    struct RecordingBackend {
        profile: AdapterProfile,
        submitted: Vec<ProgramPlan>,
        outputs: Vec<TensorDesc>,
    }

    impl RecordingBackend {
        fn new(profile: AdapterProfile) -> Self {
            Self {
                profile,
                submitted: Vec::new(),
                outputs: Vec::new(),
            }
        }
    }

    impl ComputeBackend for RecordingBackend {
        type Buffer = u32;

        fn adapter(&self) -> &AdapterProfile {
            &self.profile
        }

        fn output(&mut self, desc: &TensorDesc) -> Result<u32> {
            self.outputs.push(desc.clone());
            Ok(self.outputs.len() as u32)
        }

        fn submit(&mut self, plan: &ProgramPlan, buffers: &[&u32]) -> Result<()> {
            assert_eq!(buffers.len() + 1, plan.bindings.len());
            self.submitted.push(plan.clone());
            Ok(())
        }
    }

    fn weights_desc(n: usize, k: usize, block_size: u32) -> TensorDesc {
        let layout = BlockLayout::new(k as u32, block_size);
        TensorDesc::new(
            DType::U8,
            [n, layout.n_blocks_per_col as usize, layout.blob_size as usize],
        )
    }

    fn run(
        backend: &mut RecordingBackend,
        a_shape: &[usize],
        zero_points: bool,
    ) -> Result<u32> {
        let op = MatmulNbits::new(4, 32, 8, 64).unwrap();
        let a_buf = 100;
        let b_buf = 101;
        let s_buf = 102;
        let zp_buf = 103;
        op.compute(
            backend,
            MatmulNbitsInputs {
                a: OperandRef::new(TensorDesc::new(DType::F32, a_shape.to_vec()), &a_buf),
                b: OperandRef::new(weights_desc(8, 64, 32), &b_buf),
                scales: OperandRef::new(TensorDesc::new(DType::F32, [8 * 2]), &s_buf),
                zero_points: zero_points.then(|| {
                    OperandRef::new(TensorDesc::new(DType::U8, [8 * 1]), &zp_buf)
                }),
                g_idx: None,
                bias: None,
            },
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(MatmulNbits::new(4, 32, 8, 64).is_ok());
        assert!(MatmulNbits::new(8, 32, 8, 64).is_err());
        assert!(MatmulNbits::new(4, 24, 8, 64).is_err());
        assert!(MatmulNbits::new(4, 8, 8, 64).is_err());
        assert!(MatmulNbits::new(4, 16, 8, 64).is_ok());
    }

    #[test]
    fn test_unsupported_inputs_rejected_before_dispatch() {
        let mut backend = RecordingBackend::new(AdapterProfile::vendor_only("amd"));
        let op = MatmulNbits::new(4, 32, 8, 64).unwrap();
        let buf = 1;
        let err = op
            .compute(
                &mut backend,
                MatmulNbitsInputs {
                    a: OperandRef::new(TensorDesc::new(DType::F32, [2, 64]), &buf),
                    b: OperandRef::new(weights_desc(8, 64, 32), &buf),
                    scales: OperandRef::new(TensorDesc::new(DType::F32, [16]), &buf),
                    zero_points: None,
                    g_idx: Some(OperandRef::new(TensorDesc::new(DType::U32, [64]), &buf)),
                    bias: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput { input: "g_idx", .. }));
        assert!(backend.submitted.is_empty());
        assert!(backend.outputs.is_empty());
    }

    #[test]
    fn test_dispatch_records_plan() {
        let mut backend = RecordingBackend::new(AdapterProfile::vendor_only("amd"));
        run(&mut backend, &[3, 7, 64], false).unwrap();
        assert_eq!(backend.submitted.len(), 1);
        let plan = &backend.submitted[0];
        assert_eq!(plan.label, "matmul_nbits_general");
        assert_eq!(plan.bindings.len(), 5);
        assert_eq!(backend.outputs[0].shape, vec![3, 7, 8]);
    }

    #[test]
    fn test_zero_points_add_binding() {
        let mut backend = RecordingBackend::new(AdapterProfile::vendor_only("amd"));
        run(&mut backend, &[2, 64], true).unwrap();
        assert_eq!(backend.submitted[0].bindings.len(), 6);
    }

    #[test]
    fn test_zero_numel_skips_submission() {
        let mut backend = RecordingBackend::new(AdapterProfile::vendor_only("amd"));
        run(&mut backend, &[0, 64], false).unwrap();
        assert!(backend.submitted.is_empty());
        assert_eq!(backend.outputs.len(), 1);
    }

    #[test]
    fn test_prefill_path_on_tuned_adapter() {
        let mut backend = RecordingBackend::new(AdapterProfile::new("intel", "gen-12lp"));
        run(&mut backend, &[16, 64], false).unwrap();
        assert_eq!(backend.submitted[0].label, "matmul_nbits_prefill");

        let mut backend = RecordingBackend::new(AdapterProfile::new("intel", "gen-12lp"));
        run(&mut backend, &[16, 64], true).unwrap();
        assert_eq!(backend.submitted[0].label, "matmul_nbits_block32");
    }

    #[test]
    fn test_dtype_mismatch() {
        let mut backend = RecordingBackend::new(AdapterProfile::vendor_only("amd"));
        let op = MatmulNbits::new(4, 32, 8, 64).unwrap();
        let buf = 1;
        let err = op
            .compute(
                &mut backend,
                MatmulNbitsInputs {
                    a: OperandRef::new(TensorDesc::new(DType::F32, [2, 64]), &buf),
                    b: OperandRef::new(weights_desc(8, 64, 32), &buf),
                    scales: OperandRef::new(TensorDesc::new(DType::F16, [16]), &buf),
                    zero_points: None,
                    g_idx: None,
                    bias: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::DTypeMismatch { operand: "scales", .. }));
    }

    #[test]
    fn test_packed_operands_must_be_u8() {
        let mut backend = RecordingBackend::new(AdapterProfile::vendor_only("amd"));
        let op = MatmulNbits::new(4, 32, 8, 64).unwrap();
        let buf = 1;
        let layout = BlockLayout::new(64, 32);

        let err = op
            .compute(
                &mut backend,
                MatmulNbitsInputs {
                    a: OperandRef::new(TensorDesc::new(DType::F32, [2, 64]), &buf),
                    b: OperandRef::new(
                        TensorDesc::new(
                            DType::U32,
                            [8, layout.n_blocks_per_col as usize, layout.blob_size as usize],
                        ),
                        &buf,
                    ),
                    scales: OperandRef::new(TensorDesc::new(DType::F32, [16]), &buf),
                    zero_points: None,
                    g_idx: None,
                    bias: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::DTypeMismatch { operand: "b", expected: DType::U8, .. }));

        let err = op
            .compute(
                &mut backend,
                MatmulNbitsInputs {
                    a: OperandRef::new(TensorDesc::new(DType::F32, [2, 64]), &buf),
                    b: OperandRef::new(weights_desc(8, 64, 32), &buf),
                    scales: OperandRef::new(TensorDesc::new(DType::F32, [16]), &buf),
                    zero_points: Some(OperandRef::new(
                        TensorDesc::new(DType::F32, [8]),
                        &buf,
                    )),
                    g_idx: None,
                    bias: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::DTypeMismatch { operand: "zero_points", .. }));
        assert!(backend.submitted.is_empty());
    }
}
