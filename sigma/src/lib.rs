//! Non-interactive proofs of knowledge for boolean combinations of
//! discrete-log and Diffie-Hellman tuple statements over Ristretto.
//!
//! A `Proposition` is a tree of `And`, `Or` and `Threshold` nodes over
//! `Statement` leaves. The prover holds the secrets of some leaves in a
//! `SecretStore`, proves the leaves it can, simulates the rest, and binds
//! everything to a message with a single Fiat-Shamir challenge.

mod encoding;
mod errors;
mod point_ops;
mod polynomial;
mod proof;
mod proposition;
mod prover;
mod secrets;
mod statement;
mod transcript;
mod tree;
mod verifier;


pub use self::encoding::{Decodable, Encodable, SliceReader, Writer};
pub use self::errors::{CodecError, MalformedTree, ProverError, SecretStoreError, VerificationError};
pub use self::point_ops::PointOp;
pub use self::polynomial::Polynomial;
pub use self::proof::Proof;
pub use self::proposition::{Proposition, MAX_CHILDREN, MAX_DEPTH};
pub use self::prover::{prove, prove_with_rng};
pub use self::secrets::{SecretResolver, SecretStore, SecretStoreBuilder, ACCOUNT};
pub use self::statement::{DhTuple, Fingerprint, LeafCommitment, Statement};
pub use self::transcript::TranscriptProtocol;
pub use self::verifier::{verify, verify_with_rng};
