//! Atomic statements: knowledge of a discrete log, and knowledge of a
//! Diffie-Hellman tuple exponent.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use crate::errors::ProverError;
use crate::point_ops::PointOp;

/// Public points of a DH tuple statement: knowledge of `x` with `u = g^x` and `v = h^x`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhTuple {
    pub g: CompressedRistretto,
    pub h: CompressedRistretto,
    pub u: CompressedRistretto,
    pub v: CompressedRistretto,
}

/// A leaf of a proposition tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// Knowledge of `x` with `y = B^x` for the Ristretto basepoint `B`.
    Dlog(CompressedRistretto),
    /// Knowledge of a DH tuple exponent.
    DhTuple(DhTuple),
}

/// Lookup key for the secret behind a statement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fingerprint {
    Dlog([u8; 32]),
    DhTuple([[u8; 32]; 4]),
}

/// First move of a leaf protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LeafCommitment {
    Dlog(CompressedRistretto),
    DhTuple(CompressedRistretto, CompressedRistretto),
}

impl DhTuple {
    fn decompress(&self) -> Result<[RistrettoPoint; 4], ProverError> {
        let d = |p: &CompressedRistretto| {
            p.decompress()
                .ok_or(ProverError::CryptoFailure("DH tuple point does not decompress"))
        };
        Ok([d(&self.g)?, d(&self.h)?, d(&self.u)?, d(&self.v)?])
    }
}

impl Statement {
    /// Public values of the statement, used to find its secret.
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Statement::Dlog(y) => Fingerprint::Dlog(y.to_bytes()),
            Statement::DhTuple(t) => Fingerprint::DhTuple([
                t.g.to_bytes(),
                t.h.to_bytes(),
                t.u.to_bytes(),
                t.v.to_bytes(),
            ]),
        }
    }

    /// Commitment for nonce `r`.
    pub(crate) fn commit(&self, r: &Scalar) -> Result<LeafCommitment, ProverError> {
        match self {
            Statement::Dlog(_) => Ok(LeafCommitment::Dlog(
                (r * RISTRETTO_BASEPOINT_POINT).compress(),
            )),
            Statement::DhTuple(t) => {
                let [g, h, _, _] = t.decompress()?;
                Ok(LeafCommitment::DhTuple((r * g).compress(), (r * h).compress()))
            }
        }
    }

    /// Solves the verification equation for the commitment, given a chosen
    /// challenge `e` and response `z`.
    pub(crate) fn simulate(&self, e: &Scalar, z: &Scalar) -> Result<LeafCommitment, ProverError> {
        match self {
            Statement::Dlog(y) => {
                let y = y
                    .decompress()
                    .ok_or(ProverError::CryptoFailure("public key does not decompress"))?;
                Ok(LeafCommitment::Dlog(
                    (z * RISTRETTO_BASEPOINT_POINT - e * y).compress(),
                ))
            }
            Statement::DhTuple(t) => {
                let [g, h, u, v] = t.decompress()?;
                Ok(LeafCommitment::DhTuple(
                    (z * g - e * u).compress(),
                    (z * h - e * v).compress(),
                ))
            }
        }
    }

    /// Point operations that hold for a valid `(commitment, e, z)` transcript.
    pub(crate) fn verification_ops(
        &self,
        commitment: &LeafCommitment,
        e: &Scalar,
        z: &Scalar,
    ) -> Option<Vec<PointOp>> {
        match (self, commitment) {
            // B^z - a - y^e == 0
            (Statement::Dlog(y), LeafCommitment::Dlog(a)) => Some(vec![PointOp {
                primary: Some(*z),
                arbitrary: vec![(-Scalar::one(), *a), (-e, *y)],
            }]),
            // g^z - a1 - u^e == 0 and h^z - a2 - v^e == 0
            (Statement::DhTuple(t), LeafCommitment::DhTuple(a1, a2)) => Some(vec![
                PointOp {
                    primary: None,
                    arbitrary: vec![(*z, t.g), (-Scalar::one(), *a1), (-e, t.u)],
                },
                PointOp {
                    primary: None,
                    arbitrary: vec![(*z, t.h), (-Scalar::one(), *a2), (-e, t.v)],
                },
            ]),
            _ => None,
        }
    }
}

impl LeafCommitment {
    pub(crate) fn points(&self) -> impl Iterator<Item = &CompressedRistretto> {
        let (first, second) = match self {
            LeafCommitment::Dlog(a) => (a, None),
            LeafCommitment::DhTuple(a1, a2) => (a1, Some(a2)),
        };
        core::iter::once(first).chain(second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn dlog_pair() -> (Scalar, Statement) {
        let x = Scalar::random(&mut thread_rng());
        (x, Statement::Dlog((x * RISTRETTO_BASEPOINT_POINT).compress()))
    }

    fn dh_pair() -> (Scalar, Statement) {
        let mut rng = thread_rng();
        let x = Scalar::random(&mut rng);
        let g = RISTRETTO_BASEPOINT_POINT;
        let h = Scalar::random(&mut rng) * g;
        let t = DhTuple {
            g: g.compress(),
            h: h.compress(),
            u: (x * g).compress(),
            v: (x * h).compress(),
        };
        (x, Statement::DhTuple(t))
    }

    fn check(stmt: &Statement, a: &LeafCommitment, e: &Scalar, z: &Scalar) -> bool {
        stmt.verification_ops(a, e, z)
            .unwrap()
            .into_iter()
            .all(|op| op.verify().is_ok())
    }

    #[test]
    fn honest_transcripts_verify() {
        for (x, stmt) in vec![dlog_pair(), dh_pair()] {
            let mut rng = thread_rng();
            let r = Scalar::random(&mut rng);
            let e = Scalar::random(&mut rng);
            let a = stmt.commit(&r).unwrap();
            let z = r + e * x;
            assert!(check(&stmt, &a, &e, &z));
            assert!(!check(&stmt, &a, &(e + Scalar::one()), &z));
        }
    }

    #[test]
    fn simulated_transcripts_verify() {
        for (_, stmt) in vec![dlog_pair(), dh_pair()] {
            let mut rng = thread_rng();
            let e = Scalar::random(&mut rng);
            let z = Scalar::random(&mut rng);
            let a = stmt.simulate(&e, &z).unwrap();
            assert!(check(&stmt, &a, &e, &z));
        }
    }

    #[test]
    fn mismatched_commitment_kind_is_rejected() {
        let (_, stmt) = dlog_pair();
        let a = LeafCommitment::DhTuple(CompressedRistretto::default(), CompressedRistretto::default());
        assert!(stmt
            .verification_ops(&a, &Scalar::one(), &Scalar::one())
            .is_none());
    }

    #[test]
    fn fingerprints_distinguish_statements() {
        let (_, a) = dlog_pair();
        let (_, b) = dlog_pair();
        let (_, c) = dh_pair();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
