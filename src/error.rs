//! nbitr error types

use crate::dtype::DType;

/// nbitr result type
pub type Result<T> = std::result::Result<T, Error>;

/// nbitr errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operand the operator does not support was supplied
    #[error("unsupported input '{input}': {reason}")]
    UnsupportedInput {
        /// Operand name
        input: &'static str,
        /// Why it is rejected
        reason: &'static str,
    },

    /// Operand shapes cannot be reconciled into a matmul
    #[error("shape mismatch: {reason}")]
    ShapeMismatch {
        /// Description of what went wrong
        reason: String,
    },

    /// DType mismatch between operands
    #[error("dtype mismatch for '{operand}': expected {expected}, got {got}")]
    DTypeMismatch {
        /// Operand name
        operand: &'static str,
        /// Expected dtype
        expected: DType,
        /// Actual dtype
        got: DType,
    },

    /// Invalid static configuration (attributes of the operator)
    #[error("invalid config '{attr}': {reason}")]
    InvalidConfig {
        /// Attribute name
        attr: &'static str,
        /// Why it's invalid
        reason: String,
    },

    /// Opaque failure from the execution substrate; propagated unchanged
    #[error("backend error: {reason}")]
    Backend {
        /// Description from the substrate
        reason: String,
    },
}
