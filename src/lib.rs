//! `nbitr` synthesizes WebGPU compute kernels for 4-bit block-quantized
//! matrix multiplication and plans their dispatch.
//!
//! Weights arrive packed two nibbles per byte with per-block scales and
//! optional packed zero-points. For each dispatch the crate reconciles
//! shapes, picks a kernel variant from the adapter identity and shape
//! heuristics, renders WGSL from a small assembly IR, and hands a
//! [`ProgramPlan`](program::ProgramPlan) to a [`ComputeBackend`]. A wgpu
//! backend ships behind the `wgpu` feature; any substrate that can allocate
//! buffers and run a compute pass can implement the trait instead.
//!
//! ```no_run
//! # #[cfg(feature = "wgpu")]
//! # fn demo(mut backend: nbitr::wgpu::WgpuBackend,
//! #         a: &wgpu::Buffer, b: &wgpu::Buffer, scales: &wgpu::Buffer)
//! #         -> nbitr::Result<()> {
//! use nbitr::{DType, MatmulNbits, MatmulNbitsInputs, OperandRef, TensorDesc};
//!
//! let op = MatmulNbits::new(4, 32, 4096, 4096)?;
//! let output = op.compute(&mut backend, MatmulNbitsInputs {
//!     a: OperandRef::new(TensorDesc::new(DType::F32, [1, 4096]), a),
//!     b: OperandRef::new(TensorDesc::new(DType::U8, [4096, 128, 16]), b),
//!     scales: OperandRef::new(TensorDesc::new(DType::F32, [4096 * 128]), scales),
//!     zero_points: None,
//!     g_idx: None,
//!     bias: None,
//! })?;
//! # let _ = output; Ok(())
//! # }
//! ```

pub mod adapter;
pub mod compute;
pub mod dtype;
pub mod error;
pub mod generate;
pub mod packing;
pub mod program;
pub mod shape;
pub mod tensor;
pub mod variant;
pub mod wgsl;

#[cfg(feature = "wgpu")]
pub mod wgpu;

pub use adapter::AdapterProfile;
pub use compute::{ComputeBackend, MatmulNbits, MatmulNbitsInputs, OperandRef};
pub use dtype::DType;
pub use error::{Error, Result};
pub use program::ProgramPlan;
pub use shape::MatmulShape;
pub use tensor::TensorDesc;
pub use variant::KernelVariant;
