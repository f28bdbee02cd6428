//! Reduced transactions: the unsigned transaction plus the proposition each
//! input reduced to. This is what a signer needs, and it holds no secrets.
//!
//! Layout:
//! ```ascii
//! "RTX" || version || LE32(len) || unsigned_tx || LE32(n) || input* || LE64(total_cost)
//! input = proposition || LE64(cost) || extension
//! ```

use sigma::{CodecError, Decodable, Encodable, Proposition, SliceReader, Writer};

use crate::context::ContextExtension;
use crate::errors::{EnvelopeError, TxError};
use crate::tx::UnsignedTx;

/// Version of the envelope layout this library writes.
pub const ENVELOPE_VERSION: u8 = 1;

const MAGIC: &[u8; 3] = b"RTX";

/// One input after reduction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReducedInput {
    pub proposition: Proposition,
    pub cost: u64,
    pub extension: ContextExtension,
}

/// A transaction whose inputs have all been reduced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReducedTransaction {
    pub(crate) unsigned_tx: UnsignedTx,
    pub(crate) inputs: Vec<ReducedInput>,
    pub(crate) total_cost: u64,
}

impl ReducedTransaction {
    /// Assembles a reduced transaction, checking that there is one reduced
    /// input per transaction input, with the same extension.
    pub fn new(
        unsigned_tx: UnsignedTx,
        inputs: Vec<ReducedInput>,
        total_cost: u64,
    ) -> Result<Self, CodecError> {
        if unsigned_tx.inputs.len() != inputs.len() {
            return Err(CodecError::InvalidFormat(
                "reduced input count does not match the transaction",
            ));
        }
        let same_extensions = unsigned_tx
            .inputs
            .iter()
            .zip(&inputs)
            .all(|(i, r)| i.extension == r.extension);
        if !same_extensions {
            return Err(CodecError::InvalidFormat(
                "reduced input extension does not match the transaction",
            ));
        }
        Ok(ReducedTransaction {
            unsigned_tx,
            inputs,
            total_cost,
        })
    }

    pub fn unsigned_tx(&self) -> &UnsignedTx {
        &self.unsigned_tx
    }

    pub fn inputs(&self) -> &[ReducedInput] {
        &self.inputs
    }

    /// Cost of the whole transaction, including per-input and per-output charges.
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        SliceReader::parse(bytes, |r| {
            let magic = r.read(MAGIC.len())?;
            if magic != MAGIC {
                return Err(CodecError::InvalidFormat("not a reduced transaction").into());
            }
            let version = r.read_u8()?;
            if version != ENVELOPE_VERSION {
                return Err(EnvelopeError::VersionMismatch {
                    expected: ENVELOPE_VERSION,
                    found: version,
                });
            }
            let unsigned_tx = UnsignedTx::from_bytes(r.read_bytes()?).map_err(|e| match e {
                TxError::Codec(e) => e,
                TxError::ProofCountMismatch { .. } => {
                    CodecError::InvalidFormat("transaction proofs do not match its inputs")
                }
            })?;
            let n = r.read_size()?;
            let mut inputs = Vec::with_capacity(n.min(r.remaining()));
            for _ in 0..n {
                inputs.push(ReducedInput {
                    proposition: Proposition::decode(r)?,
                    cost: r.read_u64()?,
                    extension: ContextExtension::decode(r)?,
                });
            }
            let total_cost = r.read_u64()?;
            Ok(ReducedTransaction::new(unsigned_tx, inputs, total_cost)?)
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, EnvelopeError> {
        let bytes = hex::decode(s)
            .map_err(|_| CodecError::InvalidFormat("reduced transaction is not valid hex"))?;
        Self::from_bytes(&bytes)
    }
}

impl Encodable for ReducedTransaction {
    fn encode(&self, w: &mut impl Writer) {
        w.write(b"magic", MAGIC);
        w.write_u8(b"version", ENVELOPE_VERSION);
        w.write_bytes(b"unsigned_tx", &self.unsigned_tx.to_bytes());
        w.write_size(b"inputs", self.inputs.len());
        for input in &self.inputs {
            input.proposition.encode(w);
            w.write_u64(b"cost", input.cost);
            input.extension.encode(w);
        }
        w.write_u64(b"total_cost", self.total_cost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionTree;
    use crate::ops::Expr;
    use crate::tx::{BoxCandidate, BoxId, UnsignedInput};
    use crate::types::Value;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_COMPRESSED;

    fn envelope() -> ReducedTransaction {
        let ext = ContextExtension::new().with(1, Value::of_int(5));
        let tx = UnsignedTx::new(
            vec![UnsignedInput {
                box_id: BoxId([9; 32]),
                extension: ext.clone(),
            }],
            vec![],
            vec![BoxCandidate::new(10, ConditionTree::new(Expr::constant(true)), 1)],
        );
        let input = ReducedInput {
            proposition: Proposition::dlog(RISTRETTO_BASEPOINT_COMPRESSED),
            cost: 531,
            extension: ext,
        };
        ReducedTransaction::new(tx, vec![input], 2_731).unwrap()
    }

    #[test]
    fn envelope_roundtrip() {
        let env = envelope();
        let bytes = env.to_bytes();
        assert_eq!(&bytes[..4], b"RTX\x01");
        assert_eq!(ReducedTransaction::from_bytes(&bytes), Ok(env.clone()));
        assert_eq!(ReducedTransaction::from_hex(&env.to_hex()), Ok(env));
    }

    #[test]
    fn wrong_version_is_reported() {
        let mut bytes = envelope().to_bytes();
        bytes[3] = 7;
        assert_eq!(
            ReducedTransaction::from_bytes(&bytes),
            Err(EnvelopeError::VersionMismatch {
                expected: 1,
                found: 7
            })
        );
    }

    #[test]
    fn malformed_envelopes_fail_to_deserialize() {
        let bytes = envelope().to_bytes();
        assert!(matches!(
            ReducedTransaction::from_bytes(&bytes[..bytes.len() - 1]),
            Err(EnvelopeError::DeserializationFailed(_))
        ));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert_eq!(
            ReducedTransaction::from_bytes(&trailing),
            Err(EnvelopeError::DeserializationFailed(CodecError::TrailingBytes))
        );

        let mut magic = bytes;
        magic[0] = b'X';
        assert_eq!(
            ReducedTransaction::from_bytes(&magic),
            Err(EnvelopeError::DeserializationFailed(CodecError::InvalidFormat(
                "not a reduced transaction"
            )))
        );
    }

    #[test]
    fn inputs_must_match_the_transaction() {
        let env = envelope();
        let other = ReducedInput {
            extension: ContextExtension::new(),
            ..env.inputs[0].clone()
        };
        assert!(ReducedTransaction::new(env.unsigned_tx.clone(), vec![other], 0).is_err());
        assert!(ReducedTransaction::new(env.unsigned_tx, vec![], 0).is_err());
    }
}
