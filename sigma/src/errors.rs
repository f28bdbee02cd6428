use thiserror::Error;

/// Structural defect in a proposition tree.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[error("Malformed proposition tree: {0}")]
pub struct MalformedTree(pub &'static str);

/// Represents an error in proof construction.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum ProverError {
    /// The held secrets do not satisfy the proposition.
    #[error("Secrets known to the prover do not satisfy the proposition")]
    SecretNotFound,

    /// The proposition tree violates a structural rule.
    #[error(transparent)]
    MalformedTree(#[from] MalformedTree),

    /// A point in the proposition failed to decompress or an interpolation
    /// could not be carried out.
    #[error("Group arithmetic failed: {0}")]
    CryptoFailure(&'static str),

    /// The proposition is trivially false.
    #[error("Proposition is unsatisfiable")]
    Unsatisfiable,
}

/// Represents an error in proof verification.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum VerificationError {
    /// The proof parsed but its equations do not hold.
    #[error("Proof verification failed")]
    InvalidProof,

    /// The proof bytes do not match the shape of the proposition.
    #[error("Malformed proof: {0}")]
    MalformedProof(#[from] CodecError),

    /// The proposition tree violates a structural rule.
    #[error(transparent)]
    MalformedTree(#[from] MalformedTree),

    /// The proposition is trivially false and has no proofs.
    #[error("Proposition is unsatisfiable")]
    Unsatisfiable,
}

/// Represents an error in assembling a secret store.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum SecretStoreError {
    /// Derived secrets were requested without a seed phrase.
    #[error("Derived secrets require a mnemonic")]
    MnemonicRequired,

    /// The DH tuple secret does not match its public points.
    #[error("DH tuple secret does not match u = g^x and v = h^x")]
    InconsistentDhTuple,

    /// Zero is never accepted as a secret.
    #[error("Secret must not be zero")]
    ZeroSecret,
}

/// Represents an error in decoding bytes.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum CodecError {
    /// Input ended before the value was complete.
    #[error("Unexpected end of input")]
    UnexpectedEnd,

    /// Bytes were left over after decoding.
    #[error("Trailing bytes after the encoded value")]
    TrailingBytes,

    /// A point encoding failed to decompress.
    #[error("Point decoding failed")]
    InvalidPoint,

    /// A scalar encoding was not canonical.
    #[error("Scalar is not canonical")]
    InvalidScalar,

    /// An opcode that the encoding's version does not provide.
    #[error("Opcode {0:#04x} is not available in this version")]
    UnsupportedOpcode(u8),

    /// Any other malformation.
    #[error("Invalid format: {0}")]
    InvalidFormat(&'static str),
}
