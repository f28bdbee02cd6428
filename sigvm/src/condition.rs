//! Compiled spending conditions.
//!
//! Encoding: a header byte, then (if the has-size flag is set) the LE32
//! length of the rest, then (if constants are segregated) the constants
//! table, then the root expression.
//!
//! Header layout:
//! ```ascii
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |0 0 0|c|s| ver |
//! +-+-+-+-+-+-+-+-+
//! ```
//! `ver` is the script version, `s` the has-size flag and `c` the
//! constant-segregation flag.

use sigma::{CodecError, Decodable, Encodable, Proposition, SliceReader, Writer};

use crate::ops::Expr;
use crate::types::Value;

/// Highest script version this library can parse.
pub const MAX_SCRIPT_VERSION: u8 = 2;

pub const VERSION_MASK: u8 = 0x07;
pub const HAS_SIZE_FLAG: u8 = 0x08;
pub const CONSTANT_SEGREGATION_FLAG: u8 = 0x10;
const RESERVED_BITS: u8 = 0xe0;

/// A compiled condition attached to a box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionTree {
    /// Condition this library understands.
    Parsed(ParsedTree),
    /// Condition that uses a newer version or opcode than this library knows.
    /// Kept byte for byte so boxes guarded by it can still be carried around.
    Unparsed { bytes: Vec<u8>, error: CodecError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTree {
    header: u8,
    constants: Vec<Value>,
    root: Expr,
}

impl ConditionTree {
    /// Tree over `root` at the lowest version its opcodes allow.
    pub fn new(root: Expr) -> Self {
        let version = root.required_version();
        ConditionTree::Parsed(ParsedTree {
            header: Self::header_for(version, false),
            constants: Vec::new(),
            root,
        })
    }

    /// Tree whose constants are kept in a table and referenced by
    /// `ConstPlaceholder` from `root`.
    pub fn with_constants(constants: Vec<Value>, root: Expr) -> Self {
        let version = root.required_version();
        ConditionTree::Parsed(ParsedTree {
            header: Self::header_for(version, true),
            constants,
            root,
        })
    }

    /// Tree at an explicit version, which must cover every opcode in `root`.
    pub fn versioned(version: u8, constants: Vec<Value>, root: Expr) -> Result<Self, CodecError> {
        if version > MAX_SCRIPT_VERSION {
            return Err(CodecError::InvalidFormat("script version not supported"));
        }
        let mut newer = None;
        root.visit(&mut |e| {
            let op = e.opcode();
            if newer.is_none() && op.min_version() > version {
                newer = Some(op);
            }
        });
        if let Some(op) = newer {
            return Err(CodecError::UnsupportedOpcode(op.to_u8()));
        }
        Ok(ConditionTree::Parsed(ParsedTree {
            header: Self::header_for(version, !constants.is_empty()),
            constants,
            root,
        }))
    }

    /// Condition that reduces to `prop` in any context.
    pub fn from_proposition(prop: Proposition) -> Self {
        Self::new(Expr::Const(Value::SigmaProp(prop)))
    }

    fn header_for(version: u8, segregated: bool) -> u8 {
        let mut header = version & VERSION_MASK;
        // versions above zero always carry their size
        if version > 0 {
            header |= HAS_SIZE_FLAG;
        }
        if segregated {
            header |= CONSTANT_SEGREGATION_FLAG;
        }
        header
    }

    pub fn header(&self) -> u8 {
        match self {
            ConditionTree::Parsed(t) => t.header,
            ConditionTree::Unparsed { bytes, .. } => bytes.first().copied().unwrap_or(0),
        }
    }

    pub fn version(&self) -> u8 {
        self.header() & VERSION_MASK
    }

    pub fn has_size(&self) -> bool {
        self.header() & HAS_SIZE_FLAG != 0
    }

    pub fn is_constant_segregation(&self) -> bool {
        self.header() & CONSTANT_SEGREGATION_FLAG != 0
    }

    /// Segregated constants; empty for unparsed trees.
    pub fn constants(&self) -> &[Value] {
        match self {
            ConditionTree::Parsed(t) => &t.constants,
            ConditionTree::Unparsed { .. } => &[],
        }
    }

    pub fn root(&self) -> Option<&Expr> {
        match self {
            ConditionTree::Parsed(t) => Some(&t.root),
            ConditionTree::Unparsed { .. } => None,
        }
    }

    /// Encoding of the root expression alone. Trees differing only in their
    /// segregated constants share a template.
    pub fn template_bytes(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            ConditionTree::Parsed(t) => Ok(t.root.encode_to_vec()),
            ConditionTree::Unparsed { error, .. } => Err(error.clone()),
        }
    }

    /// Proposition the tree reduces to without evaluation,
    /// if its root is a sigma-proposition constant.
    pub fn as_proposition(&self) -> Option<&Proposition> {
        let t = match self {
            ConditionTree::Parsed(t) => t,
            ConditionTree::Unparsed { .. } => return None,
        };
        let value = match &t.root {
            Expr::Const(v) => v,
            Expr::ConstPlaceholder(i) => t.constants.get(*i as usize)?,
            _ => return None,
        };
        match value {
            Value::SigmaProp(p) => Some(p),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decodes a tree. Trees that carry their size but need a newer version
    /// or opcode decode to `Unparsed`; any other defect is an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = SliceReader::new(bytes);
        let header = r.read_u8()?;
        let has_size = header & HAS_SIZE_FLAG != 0;
        if has_size {
            let size = r.read_size()?;
            if size != r.remaining() {
                return Err(CodecError::InvalidFormat("tree size does not match its body"));
            }
        }
        match Self::decode_body(&mut r, header) {
            Ok(tree) => Ok(tree),
            Err(error) if has_size => Ok(ConditionTree::Unparsed {
                bytes: bytes.to_vec(),
                error,
            }),
            Err(error) => Err(error),
        }
    }

    fn decode_body(r: &mut SliceReader, header: u8) -> Result<Self, CodecError> {
        let version = header & VERSION_MASK;
        if header & RESERVED_BITS != 0 {
            return Err(CodecError::InvalidFormat("reserved header bits are set"));
        }
        if version > MAX_SCRIPT_VERSION {
            return Err(CodecError::InvalidFormat("script version not supported"));
        }
        if version > 0 && header & HAS_SIZE_FLAG == 0 {
            return Err(CodecError::InvalidFormat("versioned tree must carry its size"));
        }
        let constants = if header & CONSTANT_SEGREGATION_FLAG != 0 {
            let n = r.read_size()?;
            if n > r.remaining() {
                return Err(CodecError::UnexpectedEnd);
            }
            (0..n)
                .map(|_| Value::decode(r))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };
        let root = Expr::decode_versioned(r, version)?;
        if r.remaining() != 0 {
            return Err(CodecError::TrailingBytes);
        }
        Ok(ConditionTree::Parsed(ParsedTree {
            header,
            constants,
            root,
        }))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes =
            hex::decode(s).map_err(|_| CodecError::InvalidFormat("condition is not valid hex"))?;
        Self::from_bytes(&bytes)
    }
}

impl ParsedTree {
    fn encode_body(&self, w: &mut impl Writer) {
        if self.header & CONSTANT_SEGREGATION_FLAG != 0 {
            w.write_size(b"n", self.constants.len());
            for c in &self.constants {
                c.encode(w);
            }
        }
        self.root.encode(w);
    }
}

impl Encodable for ConditionTree {
    fn encode(&self, w: &mut impl Writer) {
        match self {
            ConditionTree::Unparsed { bytes, .. } => w.write(b"tree", bytes),
            ConditionTree::Parsed(t) => {
                w.write_u8(b"header", t.header);
                if t.header & HAS_SIZE_FLAG != 0 {
                    let mut body = Vec::new();
                    t.encode_body(&mut body);
                    w.write_bytes(b"body", &body);
                } else {
                    t.encode_body(w);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{CmpOp, ContextField, Opcode};
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_COMPRESSED;

    fn height_lock(h: i32) -> (Expr, Vec<Value>) {
        let root = Expr::BoolToSigma(Box::new(Expr::Compare(
            CmpOp::Ge,
            Box::new(Expr::Context(ContextField::Height)),
            Box::new(Expr::ConstPlaceholder(0)),
        )));
        (root, vec![Value::of_int(h)])
    }

    #[test]
    fn version_zero_tree_has_no_size() {
        let tree = ConditionTree::from_proposition(Proposition::dlog(RISTRETTO_BASEPOINT_COMPRESSED));
        assert_eq!(tree.version(), 0);
        assert!(!tree.has_size());
        assert!(!tree.is_constant_segregation());
        let bytes = tree.to_bytes();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(ConditionTree::from_bytes(&bytes).unwrap(), tree);
        assert_eq!(
            tree.as_proposition(),
            Some(&Proposition::dlog(RISTRETTO_BASEPOINT_COMPRESSED))
        );
    }

    #[test]
    fn segregated_constants_roundtrip() {
        let (root, constants) = height_lock(500);
        let tree = ConditionTree::with_constants(constants.clone(), root.clone());
        assert!(tree.is_constant_segregation());
        assert_eq!(tree.constants(), &constants[..]);
        assert_eq!(ConditionTree::from_hex(&tree.to_hex()).unwrap(), tree);

        // the template does not depend on the constants
        let other = ConditionTree::with_constants(vec![Value::of_int(7)], root);
        assert_eq!(tree.template_bytes(), other.template_bytes());
        assert_ne!(tree.to_bytes(), other.to_bytes());
    }

    #[test]
    fn newer_opcodes_raise_the_version() {
        let root = Expr::BoolToSigma(Box::new(Expr::Compare(
            CmpOp::Eq,
            Box::new(Expr::Blake3(Box::new(Expr::constant(Value::of_bytes(vec![1u8]))))),
            Box::new(Expr::constant(Value::of_bytes(vec![2u8]))),
        )));
        let tree = ConditionTree::new(root.clone());
        assert_eq!(tree.version(), 2);
        assert!(tree.has_size());
        assert_eq!(ConditionTree::from_bytes(&tree.to_bytes()).unwrap(), tree);
        assert_eq!(
            ConditionTree::versioned(1, vec![], root),
            Err(CodecError::UnsupportedOpcode(Opcode::Blake3.to_u8()))
        );
    }

    #[test]
    fn unknown_versions_decode_to_unparsed() {
        let tree = ConditionTree::versioned(1, vec![], Expr::constant(true)).unwrap();
        let mut bytes = tree.to_bytes();
        bytes[0] = (bytes[0] & !VERSION_MASK) | 5;

        let decoded = ConditionTree::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.version(), 5);
        assert!(decoded.root().is_none());
        assert_eq!(
            decoded,
            ConditionTree::Unparsed {
                bytes: bytes.clone(),
                error: CodecError::InvalidFormat("script version not supported"),
            }
        );
        assert_eq!(decoded.to_bytes(), bytes);
    }

    #[test]
    fn opcode_newer_than_tree_version_decodes_to_unparsed() {
        let root = Expr::Blake3(Box::new(Expr::constant(Value::of_bytes(vec![1u8]))));
        let tree = ConditionTree::new(root);
        let mut bytes = tree.to_bytes();
        // claim version 1 while keeping a version 2 opcode
        bytes[0] = (bytes[0] & !VERSION_MASK) | 1;
        match ConditionTree::from_bytes(&bytes).unwrap() {
            ConditionTree::Unparsed { error, .. } => assert_eq!(
                error,
                CodecError::UnsupportedOpcode(Opcode::Blake3.to_u8())
            ),
            other => panic!("expected an unparsed tree, got {:?}", other),
        }
    }

    #[test]
    fn unsized_trees_fail_hard() {
        // version 0 without size, unknown opcode
        assert_eq!(
            ConditionTree::from_bytes(&[0x00, 0xee]),
            Err(CodecError::InvalidFormat("unknown opcode"))
        );
        // versioned tree without a size
        assert!(ConditionTree::from_bytes(&[0x01, 0x10]).is_err());
        // size that disagrees with the body
        assert!(ConditionTree::from_bytes(&[0x09, 0x05, 0, 0, 0, 0x10]).is_err());
    }
}
