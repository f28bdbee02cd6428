//! Proof construction.
//!
//! The prover works over the flattened tree in four passes:
//!
//! 1. mark nodes bottom-up as real when the held secrets can satisfy them;
//! 2. top-down, keep exactly as many real children per connective as it needs
//!    and turn the rest into simulations;
//! 3. top-down, commit real leaves, pick challenges for simulated subtrees and
//!    simulate their leaves;
//! 4. derive the root challenge from the transcript and push it down the real
//!    nodes, answering each real leaf.

use curve25519_dalek::scalar::Scalar;
use merlin::{Transcript, TranscriptRng};
use rand_core::{CryptoRng, RngCore};
use tracing::{trace, warn};

use crate::errors::{MalformedTree, ProverError};
use crate::polynomial::{child_point, Polynomial};
use crate::proof::Proof;
use crate::proposition::Proposition;
use crate::secrets::SecretResolver;
use crate::transcript::TranscriptProtocol;
use crate::tree::{NodeKind, ProofTree};

/// Proves `prop` over `message` with the secrets available from `secrets`.
pub fn prove(
    prop: &Proposition,
    secrets: &impl SecretResolver,
    message: &[u8],
) -> Result<Proof, ProverError> {
    prove_with_rng(prop, secrets, message, &mut rand::thread_rng())
}

/// Same as `prove`, with an explicit source of external randomness. The
/// nonces are derived from the transcript and the secrets, rekeyed with `rng`.
pub fn prove_with_rng<R: RngCore + CryptoRng>(
    prop: &Proposition,
    secrets: &impl SecretResolver,
    message: &[u8],
    rng: &mut R,
) -> Result<Proof, ProverError> {
    match prop.as_trivial() {
        Some(true) => return Ok(Proof::empty()),
        Some(false) => return Err(ProverError::Unsatisfiable),
        None => {}
    }

    let mut tree = ProofTree::build(prop)?;
    let known = mark(&mut tree, secrets);
    if !tree.nodes[0].real {
        warn!(
            leaves = prop.leaves().len(),
            "held secrets do not satisfy the proposition"
        );
        return Err(ProverError::SecretNotFound);
    }
    polish(&mut tree);

    let mut transcript = Transcript::sigma_proof(message);
    let mut rng = known
        .iter()
        .zip(tree.nodes.iter())
        .filter(|(_, node)| node.real)
        .filter_map(|(x, _)| x.as_ref())
        .fold(transcript.build_rng(), |builder, x| {
            builder.rekey_with_witness_bytes(b"x", x.as_bytes())
        })
        .finalize(rng);

    let nonces = commit(&mut tree, &mut rng)?;
    let e = tree.fiat_shamir(&mut transcript)?;
    respond(&mut tree, e, &known, &nonces)?;

    let mut bytes = Vec::new();
    tree.write_proof(&mut bytes)?;
    Ok(Proof::from_bytes(bytes))
}

/// Marks nodes real bottom-up and returns the secret of each real leaf.
fn mark(tree: &mut ProofTree, secrets: &impl SecretResolver) -> Vec<Option<Scalar>> {
    let mut known = vec![None; tree.nodes.len()];
    for i in (0..tree.nodes.len()).rev() {
        let real = match &tree.nodes[i].kind {
            NodeKind::Leaf(s) => {
                known[i] = secrets.resolve(&s.fingerprint());
                known[i].is_some()
            }
            _ => {
                let node = &tree.nodes[i];
                let real_children = node
                    .children
                    .iter()
                    .filter(|c| tree.nodes[**c].real)
                    .count();
                real_children >= node.required()
            }
        };
        tree.nodes[i].real = real;
    }
    trace!(
        real_leaves = known.iter().filter(|x| x.is_some()).count(),
        root = tree.nodes[0].real,
        "marked proposition"
    );
    known
}

/// Keeps the first `required` real children of each real connective and
/// turns everything else into simulations.
fn polish(tree: &mut ProofTree) {
    for i in 0..tree.nodes.len() {
        let node = &tree.nodes[i];
        if let NodeKind::Leaf(_) = node.kind {
            continue;
        }
        let children = node.children.clone();
        let mut budget = if node.real { node.required() } else { 0 };
        for c in children {
            let child = &mut tree.nodes[c];
            if child.real && budget > 0 {
                budget -= 1;
            } else {
                child.real = false;
            }
        }
    }
}

/// Commits real leaves and lays out every simulated subtree.
/// Returns the nonce of each real leaf.
fn commit(
    tree: &mut ProofTree,
    rng: &mut TranscriptRng,
) -> Result<Vec<Option<Scalar>>, ProverError> {
    let mut nonces = vec![None; tree.nodes.len()];

    for i in 0..tree.nodes.len() {
        let kind = tree.nodes[i].kind;
        let real = tree.nodes[i].real;
        let children = tree.nodes[i].children.clone();

        if real {
            match kind {
                NodeKind::Leaf(s) => {
                    let r = Scalar::random(rng);
                    tree.nodes[i].commitment = Some(s.commit(&r)?);
                    nonces[i] = Some(r);
                }
                NodeKind::And => {}
                NodeKind::Or | NodeKind::Threshold(_) => {
                    // simulated alternatives get their challenges up front
                    for c in children {
                        if !tree.nodes[c].real {
                            tree.nodes[c].challenge = Some(Scalar::random(rng));
                        }
                    }
                }
            }
            continue;
        }

        let e = tree.nodes[i]
            .challenge
            .ok_or(MalformedTree("simulated node without challenge"))?;
        match kind {
            NodeKind::Leaf(s) => {
                let z = Scalar::random(rng);
                tree.nodes[i].commitment = Some(s.simulate(&e, &z)?);
                tree.nodes[i].response = Some(z);
            }
            NodeKind::And => {
                for c in children {
                    tree.nodes[c].challenge = Some(e);
                }
            }
            NodeKind::Or => {
                let mut rest = e;
                if let Some((last, init)) = children.split_last() {
                    for c in init {
                        let ec = Scalar::random(rng);
                        rest -= ec;
                        tree.nodes[*c].challenge = Some(ec);
                    }
                    tree.nodes[*last].challenge = Some(rest);
                }
            }
            NodeKind::Threshold(_) => {
                let degree = tree.nodes[i].share_degree();
                let p = Polynomial::random_with_constant(e, degree, rng);
                for (j, c) in children.iter().enumerate() {
                    tree.nodes[*c].challenge = Some(p.evaluate(&child_point(j)));
                }
                tree.nodes[i].coefficients = p.coefficients()[1..].to_vec();
            }
        }
    }

    Ok(nonces)
}

/// Pushes the root challenge down the real nodes and answers real leaves.
fn respond(
    tree: &mut ProofTree,
    root_challenge: Scalar,
    known: &[Option<Scalar>],
    nonces: &[Option<Scalar>],
) -> Result<(), ProverError> {
    tree.nodes[0].challenge = Some(root_challenge);

    for i in 0..tree.nodes.len() {
        if !tree.nodes[i].real {
            continue;
        }
        let e = tree.nodes[i]
            .challenge
            .ok_or(MalformedTree("real node without challenge"))?;
        let children = tree.nodes[i].children.clone();

        match tree.nodes[i].kind {
            NodeKind::Leaf(_) => {
                let (x, r) = known[i]
                    .zip(nonces[i])
                    .ok_or(MalformedTree("real leaf without secret"))?;
                tree.nodes[i].response = Some(r + e * x);
            }
            NodeKind::And => {
                for c in children {
                    tree.nodes[c].challenge = Some(e);
                }
            }
            NodeKind::Or => {
                let mut rest = e;
                let mut real_child = None;
                for c in children {
                    if tree.nodes[c].real {
                        real_child = Some(c);
                    } else {
                        rest -= simulated_challenge(tree, c)?;
                    }
                }
                let c = real_child.ok_or(MalformedTree("real disjunction without real child"))?;
                tree.nodes[c].challenge = Some(rest);
            }
            NodeKind::Threshold(_) => {
                let mut points = vec![(Scalar::zero(), e)];
                for (j, c) in children.iter().enumerate() {
                    if !tree.nodes[*c].real {
                        points.push((child_point(j), simulated_challenge(tree, *c)?));
                    }
                }
                let p = Polynomial::interpolate(&points)
                    .ok_or(ProverError::CryptoFailure("challenge interpolation failed"))?;
                for (j, c) in children.iter().enumerate() {
                    if tree.nodes[*c].real {
                        tree.nodes[*c].challenge = Some(p.evaluate(&child_point(j)));
                    }
                }
                tree.nodes[i].coefficients = p.coefficients()[1..].to_vec();
            }
        }
    }
    Ok(())
}

fn simulated_challenge(tree: &ProofTree, index: usize) -> Result<Scalar, MalformedTree> {
    tree.nodes[index]
        .challenge
        .ok_or(MalformedTree("simulated node without challenge"))
}
