//! Flattened proposition tree carrying proof state. Nodes are stored in
//! pre-order, so every child has a larger index than its parent.

use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

use crate::encoding::{SliceReader, Writer};
use crate::errors::{CodecError, MalformedTree};
use crate::proposition::{Proposition, MAX_CHILDREN, MAX_DEPTH, TAG_AND, TAG_OR, TAG_THRESHOLD};
use crate::statement::{LeafCommitment, Statement};
use crate::transcript::TranscriptProtocol;

#[derive(Copy, Clone, Debug)]
pub(crate) enum NodeKind {
    Leaf(Statement),
    And,
    Or,
    Threshold(usize),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub real: bool,
    pub challenge: Option<Scalar>,
    /// Threshold nodes: coefficients of `x^1..x^(n-k)`.
    pub coefficients: Vec<Scalar>,
    pub commitment: Option<LeafCommitment>,
    pub response: Option<Scalar>,
}

#[derive(Clone, Debug)]
pub(crate) struct ProofTree {
    pub nodes: Vec<Node>,
}

impl Node {
    /// Number of children that must be real for the node to be real.
    pub fn required(&self) -> usize {
        match self.kind {
            NodeKind::Leaf(_) => 0,
            NodeKind::And => self.children.len(),
            NodeKind::Or => 1,
            NodeKind::Threshold(k) => k,
        }
    }

    /// Secret-sharing polynomial degree among the children.
    pub fn share_degree(&self) -> usize {
        self.children.len() - self.required().min(self.children.len())
    }
}

impl ProofTree {
    /// Flattens a non-trivial proposition. `Trivial` anywhere is rejected;
    /// callers handle a trivial root before building.
    pub fn build(prop: &Proposition) -> Result<Self, MalformedTree> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<(&Proposition, Option<usize>, usize)> = vec![(prop, None, 0)];

        while let Some((p, parent, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(MalformedTree("proposition nested too deeply"));
            }
            let (kind, children) = match p {
                Proposition::Trivial(_) => {
                    return Err(MalformedTree("trivial proposition inside a tree"))
                }
                Proposition::Leaf(s) => (NodeKind::Leaf(*s), &[][..]),
                Proposition::And(c) => (NodeKind::And, &c[..]),
                Proposition::Or(c) => (NodeKind::Or, &c[..]),
                Proposition::Threshold(k, c) => {
                    if *k > c.len() {
                        return Err(MalformedTree("threshold exceeds number of children"));
                    }
                    (NodeKind::Threshold(*k), &c[..])
                }
            };
            let is_leaf = matches!(kind, NodeKind::Leaf(_));
            if !is_leaf && children.is_empty() {
                return Err(MalformedTree("connective without children"));
            }
            if children.len() > MAX_CHILDREN {
                return Err(MalformedTree("too many children"));
            }

            let index = nodes.len();
            if let Some(parent) = parent {
                nodes[parent].children.push(index);
            }
            nodes.push(Node {
                kind,
                parent,
                children: Vec::with_capacity(children.len()),
                real: false,
                challenge: None,
                coefficients: Vec::new(),
                commitment: None,
                response: None,
            });
            stack.extend(children.iter().rev().map(|c| (c, Some(index), depth + 1)));
        }

        Ok(ProofTree { nodes })
    }

    /// True if the node is a child of an `Or` other than its last child.
    /// Such nodes carry their challenge explicitly in the proof.
    pub fn has_explicit_challenge(&self, index: usize) -> bool {
        match self.nodes[index].parent {
            Some(p) => {
                let parent = &self.nodes[p];
                matches!(parent.kind, NodeKind::Or) && parent.children.last() != Some(&index)
            }
            None => false,
        }
    }

    /// Absorbs the tree shape, public points and commitments in pre-order
    /// and squeezes the root challenge.
    pub fn fiat_shamir(&self, transcript: &mut Transcript) -> Result<Scalar, MalformedTree> {
        transcript.write_size(b"nodes", self.nodes.len());
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Leaf(s) => {
                    transcript.write_u8(b"tag", s.tag());
                    s.encode_points(transcript);
                    let commitment = node
                        .commitment
                        .as_ref()
                        .ok_or(MalformedTree("leaf without commitment"))?;
                    for a in commitment.points() {
                        transcript.write_point(b"a", a);
                    }
                }
                NodeKind::And => {
                    transcript.write_u8(b"tag", TAG_AND);
                    transcript.write_size(b"n", node.children.len());
                }
                NodeKind::Or => {
                    transcript.write_u8(b"tag", TAG_OR);
                    transcript.write_size(b"n", node.children.len());
                }
                NodeKind::Threshold(k) => {
                    transcript.write_u8(b"tag", TAG_THRESHOLD);
                    transcript.write_size(b"k", *k);
                    transcript.write_size(b"n", node.children.len());
                }
            }
        }
        Ok(transcript.challenge_scalar(b"e"))
    }

    /// Serializes explicit challenges, threshold coefficients and leaf
    /// transcripts in pre-order.
    pub fn write_proof(&self, w: &mut impl Writer) -> Result<(), MalformedTree> {
        for (index, node) in self.nodes.iter().enumerate() {
            if self.has_explicit_challenge(index) {
                let e = node
                    .challenge
                    .ok_or(MalformedTree("missing challenge"))?;
                w.write_scalar(b"e", &e);
            }
            match &node.kind {
                NodeKind::Threshold(_) => {
                    for c in &node.coefficients {
                        w.write_scalar(b"c", c);
                    }
                }
                NodeKind::Leaf(_) => {
                    let commitment = node
                        .commitment
                        .as_ref()
                        .ok_or(MalformedTree("leaf without commitment"))?;
                    for a in commitment.points() {
                        w.write_point(b"a", a);
                    }
                    let z = node.response.ok_or(MalformedTree("leaf without response"))?;
                    w.write_scalar(b"z", &z);
                }
                NodeKind::And | NodeKind::Or => {}
            }
        }
        Ok(())
    }

    /// Fills the tree from proof bytes written by `write_proof`.
    pub fn read_proof(&mut self, r: &mut SliceReader) -> Result<(), CodecError> {
        for index in 0..self.nodes.len() {
            if self.has_explicit_challenge(index) {
                self.nodes[index].challenge = Some(r.read_scalar()?);
            }
            let node = &mut self.nodes[index];
            match &node.kind {
                NodeKind::Threshold(_) => {
                    let degree = node.share_degree();
                    node.coefficients = (0..degree)
                        .map(|_| r.read_scalar())
                        .collect::<Result<_, _>>()?;
                }
                NodeKind::Leaf(s) => {
                    let commitment = match s {
                        Statement::Dlog(_) => LeafCommitment::Dlog(r.read_compressed()?),
                        Statement::DhTuple(_) => {
                            let a1 = r.read_compressed()?;
                            let a2 = r.read_compressed()?;
                            LeafCommitment::DhTuple(a1, a2)
                        }
                    };
                    node.commitment = Some(commitment);
                    node.response = Some(r.read_scalar()?);
                }
                NodeKind::And | NodeKind::Or => {}
            }
        }
        Ok(())
    }
}
