use core::iter;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::{Identity, IsIdentity, VartimeMultiscalarMul};
use rand_core::{CryptoRng, RngCore};

use crate::errors::VerificationError;

/// Deferred point operation that must evaluate to the identity.
#[derive(Clone, Debug)]
pub struct PointOp {
    /// Weight for the Ristretto basepoint.
    /// None stands for zero.
    pub primary: Option<Scalar>,

    /// Weights for arbitrary points.
    pub arbitrary: Vec<(Scalar, CompressedRistretto)>,
}

impl PointOp {
    /// Compute an individual point operation.
    pub fn compute(self) -> Result<RistrettoPoint, VerificationError> {
        let (mut weights, points): (Vec<_>, Vec<_>) = self.arbitrary.into_iter().unzip();
        let mut points: Vec<_> = points.into_iter().map(|p| p.decompress()).collect();

        if let Some(w) = self.primary {
            weights.push(w);
            points.push(Some(RISTRETTO_BASEPOINT_POINT));
        }

        if points.is_empty() {
            return Ok(RistrettoPoint::identity());
        }

        RistrettoPoint::optional_multiscalar_mul(weights, points)
            .ok_or(VerificationError::InvalidProof)
    }

    /// Non-batched verification of an individual point operation.
    pub fn verify(self) -> Result<(), VerificationError> {
        if !self.compute()?.is_identity() {
            return Err(VerificationError::InvalidProof);
        }
        Ok(())
    }

    /// Verifies all operations at once. Each operation is scaled by an
    /// independent random weight so that no two can cancel each other out.
    pub fn verify_batch<R: RngCore + CryptoRng>(
        ops: impl IntoIterator<Item = PointOp>,
        rng: &mut R,
    ) -> Result<(), VerificationError> {
        let mut primary = Scalar::zero();
        let mut weights = Vec::new();
        let mut points = Vec::new();

        for op in ops {
            let r = Scalar::random(rng);
            if let Some(w) = op.primary {
                primary += r * w;
            }
            for (w, p) in op.arbitrary {
                weights.push(r * w);
                points.push(p.decompress());
            }
        }

        let result = RistrettoPoint::optional_multiscalar_mul(
            iter::once(primary).chain(weights),
            iter::once(Some(RISTRETTO_BASEPOINT_POINT)).chain(points),
        )
        .ok_or(VerificationError::InvalidProof)?;

        if result.is_identity() {
            Ok(())
        } else {
            Err(VerificationError::InvalidProof)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_COMPRESSED;

    fn times(n: u64) -> CompressedRistretto {
        (RISTRETTO_BASEPOINT_POINT * Scalar::from(n)).compress()
    }

    #[test]
    fn empty() {
        let op = PointOp {
            primary: None,
            arbitrary: Vec::new(),
        };
        assert!(op.verify().is_ok());
        assert!(PointOp::verify_batch(Vec::new(), &mut rand::thread_rng()).is_ok());
    }

    #[test]
    fn primary_generator() {
        let op = PointOp {
            primary: Some(Scalar::one()),
            arbitrary: vec![(-Scalar::one(), RISTRETTO_BASEPOINT_COMPRESSED)],
        };
        assert!(op.verify().is_ok());

        let op = PointOp {
            primary: Some(Scalar::one()),
            arbitrary: vec![(-Scalar::one(), times(4))],
        };
        assert!(op.verify().is_err());
    }

    #[test]
    fn undecodable_point_fails() {
        let op = PointOp {
            primary: None,
            arbitrary: vec![(Scalar::one(), CompressedRistretto([1u8; 32]))],
        };
        assert_eq!(op.verify(), Err(VerificationError::InvalidProof));
    }

    #[test]
    fn batch_detects_single_bad_op() {
        let good = PointOp {
            primary: Some(Scalar::from(3u64)),
            arbitrary: vec![(-Scalar::one(), times(3))],
        };
        let bad = PointOp {
            primary: Some(Scalar::from(2u64)),
            arbitrary: vec![(-Scalar::one(), times(3))],
        };
        let mut rng = rand::thread_rng();
        assert!(PointOp::verify_batch(vec![good.clone(), good.clone()], &mut rng).is_ok());
        assert!(PointOp::verify_batch(vec![good, bad], &mut rng).is_err());
    }
}
