#![deny(missing_docs)]
//! Implementation of the key tree protocol, a key blinding scheme for deriving hierarchies of keys.
//!
//! A master key is produced from a seed phrase and an optional password.
//! Child keys are addressed by index paths: every step mixes the parent's
//! public key and derivation key into a transcript, so the same path always
//! yields the same child, and the public side can follow the path without
//! learning any secret.

use crate::transcript::TranscriptProtocol;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use core::fmt;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};

mod serialization;
mod transcript;

#[cfg(test)]
mod tests;

/// Xprv represents an extended private key.
#[derive(Clone)]
pub struct Xprv {
    scalar: Scalar,
    xpub: Xpub,
}

/// Xpub represents an extended public key.
#[derive(Clone, PartialEq, Eq)]
pub struct Xpub {
    point: RistrettoPoint,
    precompressed_pubkey: CompressedRistretto,
    dk: [u8; 32],
}

impl Xprv {
    /// Returns a new Xprv, generated using the provided random number generator `rng`.
    pub fn random<T: RngCore + CryptoRng>(mut rng: T) -> Self {
        let scalar = Scalar::random(&mut rng);
        let mut dk = [0u8; 32];
        rng.fill_bytes(&mut dk);
        Self::from_parts(scalar, dk)
    }

    /// Creates the master key from arbitrary seed bytes.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut t = Transcript::new(b"Keytree.seed");
        t.append_message(b"seed", seed);
        let scalar = t.challenge_scalar(b"scalar");
        let mut dk = [0u8; 32];
        t.challenge_bytes(b"dk", &mut dk);
        Self::from_parts(scalar, dk)
    }

    /// Creates the master key from a seed phrase and a password.
    /// Runs of whitespace between the words are not significant.
    pub fn from_mnemonic(phrase: &str, password: &str) -> Self {
        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut t = Transcript::new(b"Keytree.mnemonic");
        t.append_message(b"phrase", normalized.as_bytes());
        t.append_message(b"password", password.as_bytes());
        let mut seed = [0u8; 64];
        t.challenge_bytes(b"seed", &mut seed);

        Self::from_seed(&seed)
    }

    fn from_parts(scalar: Scalar, dk: [u8; 32]) -> Self {
        let point = scalar * RISTRETTO_BASEPOINT_POINT;
        Xprv {
            scalar,
            xpub: Xpub {
                point,
                precompressed_pubkey: point.compress(),
                dk,
            },
        }
    }

    /// Returns a reference to the corresponding extended public key.
    pub fn as_xpub(&self) -> &Xpub {
        &self.xpub
    }

    /// Returns the corresponding extended public key.
    pub fn to_xpub(&self) -> Xpub {
        self.xpub.clone()
    }

    /// Returns the secret scalar of this key.
    pub fn as_scalar(&self) -> &Scalar {
        &self.scalar
    }

    /// Returns an intermediate child key. The `customize` closure separates
    /// sibling keys from one another (e.g. by committing an index).
    pub fn derive_intermediate_key(&self, customize: impl FnOnce(&mut Transcript)) -> Xprv {
        let (f, dk) = self.xpub.derivation_factor(customize, b"f.intermediate");
        Self::from_parts(self.scalar + f, dk)
    }

    /// Returns a leaf private key. Leaf keys cannot be derived any further.
    pub fn derive_key(&self, customize: impl FnOnce(&mut Transcript)) -> Scalar {
        let (f, _) = self.xpub.derivation_factor(customize, b"f.leaf");
        self.scalar + f
    }

    /// Derives an intermediate child key at a given index.
    pub fn derive_child(&self, index: u32) -> Xprv {
        self.derive_intermediate_key(|t| t.append_index(index))
    }

    /// Derives a key at the end of the index path, one step per index.
    pub fn derive_path(&self, path: &[u32]) -> Xprv {
        path.iter()
            .fold(self.clone(), |key, index| key.derive_child(*index))
    }

    /// Serializes this Xprv to a sequence of bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(self.scalar.as_bytes());
        buf[32..].copy_from_slice(&self.xpub.dk);
        buf
    }

    /// Decodes an Xprv from a 64-byte slice. Fails if the slice is not exactly
    /// 64 bytes or the scalar is not canonical.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 64 {
            return None;
        }
        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&bytes[..32]);
        let scalar = Scalar::from_canonical_bytes(scalar_bytes)?;
        let mut dk = [0u8; 32];
        dk.copy_from_slice(&bytes[32..]);
        Some(Self::from_parts(scalar, dk))
    }
}

impl Xpub {
    /// Returns an intermediate child pubkey matching `Xprv::derive_intermediate_key`
    /// called with the same `customize` closure.
    pub fn derive_intermediate_key(&self, customize: impl FnOnce(&mut Transcript)) -> Xpub {
        let (f, dk) = self.derivation_factor(customize, b"f.intermediate");
        let point = self.point + f * RISTRETTO_BASEPOINT_POINT;
        Xpub {
            point,
            precompressed_pubkey: point.compress(),
            dk,
        }
    }

    /// Returns a leaf public key matching `Xprv::derive_key`.
    pub fn derive_key(&self, customize: impl FnOnce(&mut Transcript)) -> CompressedRistretto {
        let (f, _) = self.derivation_factor(customize, b"f.leaf");
        (self.point + f * RISTRETTO_BASEPOINT_POINT).compress()
    }

    /// Derives an intermediate child pubkey at a given index.
    pub fn derive_child(&self, index: u32) -> Xpub {
        self.derive_intermediate_key(|t| t.append_index(index))
    }

    /// Derives a pubkey at the end of the index path.
    pub fn derive_path(&self, path: &[u32]) -> Xpub {
        path.iter()
            .fold(self.clone(), |key, index| key.derive_child(*index))
    }

    /// Returns the compressed public key.
    pub fn as_point(&self) -> &CompressedRistretto {
        &self.precompressed_pubkey
    }

    /// Serializes this Xpub to a sequence of bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(self.precompressed_pubkey.as_bytes());
        buf[32..].copy_from_slice(&self.dk);
        buf
    }

    /// Decodes an Xpub from a 64-byte slice. Fails if the slice is not exactly
    /// 64 bytes or the point fails to decompress.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 64 {
            return None;
        }
        let precompressed_pubkey = CompressedRistretto::from_slice(&bytes[..32]);
        let point = precompressed_pubkey.decompress()?;
        let mut dk = [0u8; 32];
        dk.copy_from_slice(&bytes[32..]);
        Some(Xpub {
            point,
            precompressed_pubkey,
            dk,
        })
    }

    fn derivation_factor(
        &self,
        customize: impl FnOnce(&mut Transcript),
        label: &'static [u8],
    ) -> (Scalar, [u8; 32]) {
        let mut t = Transcript::new(b"Keytree.derivation");
        t.append_point(b"pt", &self.precompressed_pubkey);
        t.append_message(b"dk", &self.dk);

        customize(&mut t);

        let f = t.challenge_scalar(label);
        let mut child_dk = [0u8; 32];
        t.challenge_bytes(b"dk", &mut child_dk);
        (f, child_dk)
    }
}

impl fmt::Debug for Xprv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // secret scalar stays out of logs
        f.debug_struct("Xprv").field("xpub", &self.xpub).finish()
    }
}

impl fmt::Debug for Xpub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Xpub")
            .field(&self.precompressed_pubkey)
            .finish()
    }
}
