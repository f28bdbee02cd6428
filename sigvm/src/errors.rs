use sigma::{CodecError, ProverError, VerificationError};
use thiserror::Error;

use crate::types::SType;

/// Represents an error in reducing a spending condition.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum ReductionError {
    /// Running cost would exceed the limit.
    #[error("Cost {cost} exceeds the limit of {limit}")]
    CostLimitExceeded {
        /// Cost the evaluation would reach.
        cost: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// Type mismatch or an unresolved reference.
    #[error("Malformed condition: {0}")]
    MalformedCondition(&'static str),

    /// The condition needs a script version that is not active.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A well-typed operation failed at runtime (overflow, index out of bounds, empty option).
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(&'static str),

    /// Boxes, ids or token amounts do not agree with the transaction.
    #[error("Inconsistent transaction: {0}")]
    InconsistentTransaction(&'static str),
}

/// Represents an error in a value or type check.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[error("Type mismatch: expected {expected}, found {found}")]
pub struct TypeError {
    /// Type required by the operation.
    pub expected: SType,
    /// Type of the value supplied.
    pub found: SType,
}

/// Represents an error in decoding a reduced transaction.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum EnvelopeError {
    /// Bytes do not form a reduced transaction.
    #[error("Reduced transaction deserialization failed: {0}")]
    DeserializationFailed(#[from] CodecError),

    /// Envelope was produced by an incompatible encoder.
    #[error("Reduced transaction version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version this library writes.
        expected: u8,
        /// Version found in the bytes.
        found: u8,
    },
}

/// Represents an error in assembling a transaction.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum TxError {
    /// One proof is required per input.
    #[error("Expected {expected} proofs, got {found}")]
    ProofCountMismatch {
        /// Number of inputs.
        expected: usize,
        /// Number of proofs supplied.
        found: usize,
    },

    /// Transaction bytes are malformed.
    #[error("Transaction codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Represents an error in a reduce/sign session.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Reduction(#[from] ReductionError),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl From<TypeError> for ReductionError {
    fn from(_: TypeError) -> Self {
        ReductionError::MalformedCondition("type mismatch")
    }
}
