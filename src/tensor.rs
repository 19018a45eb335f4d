//! Host-side operand metadata
//!
//! The substrate owns the actual buffers; this crate only sees logical shapes
//! and element types, enough to derive packing widths, binding views and
//! dispatch geometry.

use crate::dtype::DType;

/// Descriptor for one operand: element type plus logical shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    /// Element type
    pub dtype: DType,
    /// Logical shape in elements
    pub shape: Vec<usize>,
}

impl TensorDesc {
    pub fn new(dtype: DType, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    /// Total number of logical elements
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Total storage size in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.numel() * self.dtype.size_of()
    }
}
