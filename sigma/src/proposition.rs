//! Boolean combinations of statements.

use curve25519_dalek::ristretto::CompressedRistretto;
use serde::{Deserialize, Serialize};

use crate::encoding::{Decodable, Encodable, SliceReader, Writer};
use crate::errors::{CodecError, MalformedTree};
use crate::statement::{DhTuple, Statement};

/// Most children a connective may have.
pub const MAX_CHILDREN: usize = 255;

/// Deepest nesting of connectives. The root is at depth zero.
pub const MAX_DEPTH: usize = 110;

pub(crate) const TAG_FALSE: u8 = 0x00;
pub(crate) const TAG_TRUE: u8 = 0x01;
pub(crate) const TAG_DLOG: u8 = 0x02;
pub(crate) const TAG_DH_TUPLE: u8 = 0x03;
pub(crate) const TAG_AND: u8 = 0x04;
pub(crate) const TAG_OR: u8 = 0x05;
pub(crate) const TAG_THRESHOLD: u8 = 0x06;

/// Proposition tree. Child order is part of the proposition's identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proposition {
    /// Trivially true or unsatisfiable; only meaningful at the root.
    Trivial(bool),
    Leaf(Statement),
    And(Vec<Proposition>),
    Or(Vec<Proposition>),
    /// At least `k` of the children.
    Threshold(usize, Vec<Proposition>),
}

impl Proposition {
    /// Knowledge of the discrete log of `y`.
    pub fn dlog(y: CompressedRistretto) -> Self {
        Proposition::Leaf(Statement::Dlog(y))
    }

    /// Knowledge of `x` with `u = g^x` and `v = h^x`.
    pub fn dh_tuple(
        g: CompressedRistretto,
        h: CompressedRistretto,
        u: CompressedRistretto,
        v: CompressedRistretto,
    ) -> Self {
        Proposition::Leaf(Statement::DhTuple(DhTuple { g, h, u, v }))
    }

    /// Conjunction with trivial children folded away.
    pub fn and(children: Vec<Proposition>) -> Self {
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Proposition::Trivial(true) => {}
                Proposition::Trivial(false) => return Proposition::Trivial(false),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Proposition::Trivial(true),
            1 => kept.remove(0),
            _ => Proposition::And(kept),
        }
    }

    /// Disjunction with trivial children folded away.
    pub fn or(children: Vec<Proposition>) -> Self {
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Proposition::Trivial(true) => return Proposition::Trivial(true),
                Proposition::Trivial(false) => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Proposition::Trivial(false),
            1 => kept.remove(0),
            _ => Proposition::Or(kept),
        }
    }

    /// At least `k` of `children`, with trivial children folded into `k`.
    pub fn threshold(k: usize, children: Vec<Proposition>) -> Self {
        let mut k = k;
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Proposition::Trivial(true) => k = k.saturating_sub(1),
                Proposition::Trivial(false) => {}
                other => kept.push(other),
            }
        }
        let n = kept.len();
        if k == 0 {
            Proposition::Trivial(true)
        } else if k > n {
            Proposition::Trivial(false)
        } else if k == n {
            Proposition::and(kept)
        } else if k == 1 {
            Proposition::or(kept)
        } else {
            Proposition::Threshold(k, kept)
        }
    }

    /// Checks the structural rules: `Trivial` only at the root, no empty
    /// connectives, at most `MAX_CHILDREN` children, `k ≤ n`, and no node
    /// deeper than `MAX_DEPTH`.
    pub fn validate(&self) -> Result<(), MalformedTree> {
        if let Proposition::Trivial(_) = self {
            return Ok(());
        }
        let mut stack = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(MalformedTree("proposition nested too deeply"));
            }
            let children = match node {
                Proposition::Trivial(_) => return Err(MalformedTree("nested trivial proposition")),
                Proposition::Leaf(_) => continue,
                Proposition::And(c) | Proposition::Or(c) => c,
                Proposition::Threshold(k, c) => {
                    if *k > c.len() {
                        return Err(MalformedTree("threshold exceeds number of children"));
                    }
                    c
                }
            };
            if children.is_empty() {
                return Err(MalformedTree("connective without children"));
            }
            if children.len() > MAX_CHILDREN {
                return Err(MalformedTree("too many children"));
            }
            stack.extend(children.iter().map(|c| (c, depth + 1)));
        }
        Ok(())
    }

    /// Depth of the deepest node; a leaf or trivial root has depth zero.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            if let Proposition::And(c) | Proposition::Or(c) | Proposition::Threshold(_, c) = node {
                stack.extend(c.iter().map(|c| (c, depth + 1)));
            }
        }
        max
    }

    /// Leaf statements in pre-order.
    pub fn leaves(&self) -> Vec<&Statement> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Proposition::Trivial(_) => {}
                Proposition::Leaf(s) => out.push(s),
                Proposition::And(c) | Proposition::Or(c) | Proposition::Threshold(_, c) => {
                    stack.extend(c.iter().rev())
                }
            }
        }
        out
    }

    /// Returns the truth value of a trivial proposition.
    pub fn as_trivial(&self) -> Option<bool> {
        match self {
            Proposition::Trivial(b) => Some(*b),
            _ => None,
        }
    }

    /// Serializes the proposition to its canonical bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decodes a proposition, failing on trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::decode_exact(bytes)
    }

    fn decode_nested(r: &mut SliceReader, depth: usize) -> Result<Self, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::InvalidFormat("proposition nested too deeply"));
        }
        match r.read_u8()? {
            TAG_FALSE => Ok(Proposition::Trivial(false)),
            TAG_TRUE => Ok(Proposition::Trivial(true)),
            TAG_DLOG => Ok(Proposition::dlog(r.read_point()?)),
            TAG_DH_TUPLE => {
                let g = r.read_point()?;
                let h = r.read_point()?;
                let u = r.read_point()?;
                let v = r.read_point()?;
                Ok(Proposition::dh_tuple(g, h, u, v))
            }
            TAG_AND => Ok(Proposition::And(Self::decode_children(r, depth)?)),
            TAG_OR => Ok(Proposition::Or(Self::decode_children(r, depth)?)),
            TAG_THRESHOLD => {
                let k = r.read_size()?;
                Ok(Proposition::Threshold(k, Self::decode_children(r, depth)?))
            }
            _ => Err(CodecError::InvalidFormat("unknown proposition tag")),
        }
    }
}

impl Proposition {
    fn decode_children(r: &mut SliceReader, depth: usize) -> Result<Vec<Self>, CodecError> {
        let n = r.read_size()?;
        if n > MAX_CHILDREN {
            return Err(CodecError::InvalidFormat("too many children"));
        }
        (0..n).map(|_| Self::decode_nested(r, depth + 1)).collect()
    }
}

impl Statement {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Statement::Dlog(_) => TAG_DLOG,
            Statement::DhTuple(_) => TAG_DH_TUPLE,
        }
    }

    /// Writes the public points in encoding order.
    pub(crate) fn encode_points(&self, w: &mut impl Writer) {
        match self {
            Statement::Dlog(y) => w.write_point(b"y", y),
            Statement::DhTuple(t) => {
                w.write_point(b"g", &t.g);
                w.write_point(b"h", &t.h);
                w.write_point(b"u", &t.u);
                w.write_point(b"v", &t.v);
            }
        }
    }
}

impl Encodable for Proposition {
    fn encode(&self, w: &mut impl Writer) {
        match self {
            Proposition::Trivial(false) => w.write_u8(b"tag", TAG_FALSE),
            Proposition::Trivial(true) => w.write_u8(b"tag", TAG_TRUE),
            Proposition::Leaf(s) => {
                w.write_u8(b"tag", s.tag());
                s.encode_points(w);
            }
            Proposition::And(c) | Proposition::Or(c) => {
                let tag = if let Proposition::And(_) = self {
                    TAG_AND
                } else {
                    TAG_OR
                };
                w.write_u8(b"tag", tag);
                w.write_size(b"n", c.len());
                for child in c {
                    child.encode(w);
                }
            }
            Proposition::Threshold(k, c) => {
                w.write_u8(b"tag", TAG_THRESHOLD);
                w.write_size(b"k", *k);
                w.write_size(b"n", c.len());
                for child in c {
                    child.encode(w);
                }
            }
        }
    }
}

impl Decodable for Proposition {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        Self::decode_nested(r, 0)
    }
}
