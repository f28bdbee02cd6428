use serde::{Deserialize, Serialize};

use crate::errors::CodecError;

/// Opaque proof bytes, laid out in pre-order of the proposition they prove.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(Vec<u8>);

impl Proof {
    /// Proof of a trivially true proposition.
    pub fn empty() -> Self {
        Proof(Vec::new())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Proof(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        hex::decode(s)
            .map(Proof)
            .map_err(|_| CodecError::InvalidFormat("proof is not valid hex"))
    }
}
