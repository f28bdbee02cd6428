//! Proof verification.

use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};

use crate::encoding::SliceReader;
use crate::errors::{CodecError, MalformedTree, VerificationError};
use crate::point_ops::PointOp;
use crate::polynomial::{child_point, Polynomial};
use crate::proof::Proof;
use crate::proposition::Proposition;
use crate::transcript::TranscriptProtocol;
use crate::tree::{NodeKind, ProofTree};

/// Verifies `proof` of `prop` over `message`.
pub fn verify(prop: &Proposition, proof: &Proof, message: &[u8]) -> Result<(), VerificationError> {
    verify_with_rng(prop, proof, message, &mut rand::thread_rng())
}

/// Same as `verify`, drawing the batch weights from `rng`.
pub fn verify_with_rng<R: RngCore + CryptoRng>(
    prop: &Proposition,
    proof: &Proof,
    message: &[u8],
    rng: &mut R,
) -> Result<(), VerificationError> {
    match prop.as_trivial() {
        Some(true) if proof.is_empty() => return Ok(()),
        Some(true) => return Err(CodecError::TrailingBytes.into()),
        Some(false) => return Err(VerificationError::Unsatisfiable),
        None => {}
    }

    let mut tree = ProofTree::build(prop)?;
    SliceReader::parse(proof.as_bytes(), |r| tree.read_proof(r))?;

    let mut transcript = Transcript::sigma_proof(message);
    let e = tree.fiat_shamir(&mut transcript)?;
    propagate(&mut tree, e)?;

    let mut ops = Vec::new();
    for node in &tree.nodes {
        if let NodeKind::Leaf(s) = &node.kind {
            let (a, e, z) = match (&node.commitment, node.challenge, node.response) {
                (Some(a), Some(e), Some(z)) => (a, e, z),
                _ => return Err(MalformedTree("incomplete leaf").into()),
            };
            let leaf_ops = s
                .verification_ops(a, &e, &z)
                .ok_or(VerificationError::InvalidProof)?;
            ops.extend(leaf_ops);
        }
    }

    PointOp::verify_batch(ops, rng)
}

/// Derives every node's challenge from the root challenge, the explicit
/// disjunction challenges and the threshold coefficients.
pub(crate) fn propagate(tree: &mut ProofTree, root_challenge: Scalar) -> Result<(), MalformedTree> {
    tree.nodes[0].challenge = Some(root_challenge);

    for i in 0..tree.nodes.len() {
        let e = tree.nodes[i]
            .challenge
            .ok_or(MalformedTree("node without challenge"))?;
        let children = tree.nodes[i].children.clone();

        match tree.nodes[i].kind {
            NodeKind::Leaf(_) => {}
            NodeKind::And => {
                for c in children {
                    tree.nodes[c].challenge = Some(e);
                }
            }
            NodeKind::Or => {
                if let Some((last, init)) = children.split_last() {
                    let mut rest = e;
                    for c in init {
                        rest -= tree.nodes[*c]
                            .challenge
                            .ok_or(MalformedTree("disjunct without challenge"))?;
                    }
                    tree.nodes[*last].challenge = Some(rest);
                }
            }
            NodeKind::Threshold(_) => {
                let coefficients = core::iter::once(e)
                    .chain(tree.nodes[i].coefficients.iter().copied())
                    .collect();
                let p = Polynomial::from_coefficients(coefficients);
                for (j, c) in children.iter().enumerate() {
                    tree.nodes[*c].challenge = Some(p.evaluate(&child_point(j)));
                }
            }
        }
    }
    Ok(())
}
