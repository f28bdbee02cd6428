//! Types and values of the condition language.

use core::fmt;
use std::sync::Arc;

use alloy_primitives::I256;
use curve25519_dalek::ristretto::CompressedRistretto;
use sigma::{CodecError, Decodable, Encodable, Proposition, SliceReader, Writer};

use crate::context::{AvlTreeData, Header, PreHeader};
use crate::errors::TypeError;
use crate::tx::TxBox;

/// Deepest type nesting accepted by the decoder.
pub const MAX_TYPE_DEPTH: usize = 32;

/// Largest tuple arity, checked by the decoder and by tuple construction.
pub const MAX_TUPLE_ARITY: usize = 255;

const TYPE_BOOL: u8 = 0x01;
const TYPE_BYTE: u8 = 0x02;
const TYPE_SHORT: u8 = 0x03;
const TYPE_INT: u8 = 0x04;
const TYPE_LONG: u8 = 0x05;
const TYPE_BIG_INT: u8 = 0x06;
const TYPE_GROUP_ELEMENT: u8 = 0x07;
const TYPE_SIGMA_PROP: u8 = 0x08;
const TYPE_COLL: u8 = 0x0c;
const TYPE_OPTION: u8 = 0x24;
const TYPE_TUPLE: u8 = 0x60;
const TYPE_BOX: u8 = 0x63;
const TYPE_AVL_TREE: u8 = 0x64;
const TYPE_HEADER: u8 = 0x68;
const TYPE_PRE_HEADER: u8 = 0x69;

/// Type of a value or expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SType {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    BigInt,
    GroupElement,
    SigmaProp,
    Box,
    AvlTree,
    Header,
    PreHeader,
    Coll(Box<SType>),
    Tuple(Vec<SType>),
    Option(Box<SType>),
}

/// Collection value. Byte collections keep a flat representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Coll {
    Bytes(Vec<u8>),
    Values(SType, Vec<Value>),
}

/// Value of the condition language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    /// 256-bit signed integer.
    BigInt(I256),
    GroupElement(CompressedRistretto),
    SigmaProp(Proposition),
    Box(Arc<TxBox>),
    AvlTree(AvlTreeData),
    Header(Arc<Header>),
    PreHeader(Arc<PreHeader>),
    Coll(Coll),
    Tuple(Vec<Value>),
    Opt(SType, Option<Box<Value>>),
}

impl SType {
    /// Shorthand for `Coll[Byte]`.
    pub fn bytes() -> Self {
        SType::Coll(Box::new(SType::Byte))
    }

    /// Collection of `elem`.
    pub fn coll(elem: SType) -> Self {
        SType::Coll(Box::new(elem))
    }

    /// Optional `elem`.
    pub fn option(elem: SType) -> Self {
        SType::Option(Box::new(elem))
    }

    /// True for the numeric types that widen to `Long`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, SType::Byte | SType::Short | SType::Int | SType::Long)
    }

    pub(crate) fn decode_nested(r: &mut SliceReader, depth: usize) -> Result<Self, CodecError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(CodecError::InvalidFormat("type nested too deeply"));
        }
        Ok(match r.read_u8()? {
            TYPE_BOOL => SType::Bool,
            TYPE_BYTE => SType::Byte,
            TYPE_SHORT => SType::Short,
            TYPE_INT => SType::Int,
            TYPE_LONG => SType::Long,
            TYPE_BIG_INT => SType::BigInt,
            TYPE_GROUP_ELEMENT => SType::GroupElement,
            TYPE_SIGMA_PROP => SType::SigmaProp,
            TYPE_BOX => SType::Box,
            TYPE_AVL_TREE => SType::AvlTree,
            TYPE_HEADER => SType::Header,
            TYPE_PRE_HEADER => SType::PreHeader,
            TYPE_COLL => SType::coll(Self::decode_nested(r, depth + 1)?),
            TYPE_OPTION => SType::option(Self::decode_nested(r, depth + 1)?),
            TYPE_TUPLE => {
                let n = r.read_size()?;
                if n < 2 {
                    return Err(CodecError::InvalidFormat("tuple must have at least two items"));
                }
                if n > MAX_TUPLE_ARITY {
                    return Err(CodecError::InvalidFormat("tuple has too many items"));
                }
                let items = (0..n)
                    .map(|_| Self::decode_nested(r, depth + 1))
                    .collect::<Result<_, _>>()?;
                SType::Tuple(items)
            }
            _ => return Err(CodecError::InvalidFormat("unknown type code")),
        })
    }
}

impl Encodable for SType {
    fn encode(&self, w: &mut impl Writer) {
        match self {
            SType::Bool => w.write_u8(b"type", TYPE_BOOL),
            SType::Byte => w.write_u8(b"type", TYPE_BYTE),
            SType::Short => w.write_u8(b"type", TYPE_SHORT),
            SType::Int => w.write_u8(b"type", TYPE_INT),
            SType::Long => w.write_u8(b"type", TYPE_LONG),
            SType::BigInt => w.write_u8(b"type", TYPE_BIG_INT),
            SType::GroupElement => w.write_u8(b"type", TYPE_GROUP_ELEMENT),
            SType::SigmaProp => w.write_u8(b"type", TYPE_SIGMA_PROP),
            SType::Box => w.write_u8(b"type", TYPE_BOX),
            SType::AvlTree => w.write_u8(b"type", TYPE_AVL_TREE),
            SType::Header => w.write_u8(b"type", TYPE_HEADER),
            SType::PreHeader => w.write_u8(b"type", TYPE_PRE_HEADER),
            SType::Coll(elem) => {
                w.write_u8(b"type", TYPE_COLL);
                elem.encode(w);
            }
            SType::Option(elem) => {
                w.write_u8(b"type", TYPE_OPTION);
                elem.encode(w);
            }
            SType::Tuple(items) => {
                w.write_u8(b"type", TYPE_TUPLE);
                w.write_size(b"n", items.len());
                for t in items {
                    t.encode(w);
                }
            }
        }
    }
}

impl Decodable for SType {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        Self::decode_nested(r, 0)
    }
}

impl fmt::Display for SType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SType::Bool => write!(f, "Boolean"),
            SType::Byte => write!(f, "Byte"),
            SType::Short => write!(f, "Short"),
            SType::Int => write!(f, "Int"),
            SType::Long => write!(f, "Long"),
            SType::BigInt => write!(f, "BigInt"),
            SType::GroupElement => write!(f, "GroupElement"),
            SType::SigmaProp => write!(f, "SigmaProp"),
            SType::Box => write!(f, "Box"),
            SType::AvlTree => write!(f, "AvlTree"),
            SType::Header => write!(f, "Header"),
            SType::PreHeader => write!(f, "PreHeader"),
            SType::Coll(elem) => write!(f, "Coll[{}]", elem),
            SType::Option(elem) => write!(f, "Option[{}]", elem),
            SType::Tuple(items) => {
                write!(f, "(")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Coll {
    /// Element type.
    pub fn elem_type(&self) -> SType {
        match self {
            Coll::Bytes(_) => SType::Byte,
            Coll::Values(t, _) => t.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Coll::Bytes(b) => b.len(),
            Coll::Values(_, v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `i`, materialized as a value.
    pub fn get(&self, i: usize) -> Option<Value> {
        match self {
            Coll::Bytes(b) => b.get(i).map(|x| Value::Byte(*x as i8)),
            Coll::Values(_, v) => v.get(i).cloned(),
        }
    }

    /// Items materialized as values.
    pub fn to_values(&self) -> Vec<Value> {
        match self {
            Coll::Bytes(b) => b.iter().map(|x| Value::Byte(*x as i8)).collect(),
            Coll::Values(_, v) => v.clone(),
        }
    }

    /// Collection with the same element type holding `items[from..until]`.
    pub fn slice(&self, from: usize, until: usize) -> Coll {
        match self {
            Coll::Bytes(b) => Coll::Bytes(b[from..until].to_vec()),
            Coll::Values(t, v) => Coll::Values(t.clone(), v[from..until].to_vec()),
        }
    }

    /// Builds a collection of values already checked to be of type `elem`.
    pub(crate) fn from_values(elem: SType, items: Vec<Value>) -> Coll {
        if elem == SType::Byte {
            let bytes = items
                .iter()
                .filter_map(|v| match v {
                    Value::Byte(x) => Some(*x as u8),
                    _ => None,
                })
                .collect();
            Coll::Bytes(bytes)
        } else {
            Coll::Values(elem, items)
        }
    }
}

impl Value {
    pub fn of_bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn of_byte(x: i8) -> Self {
        Value::Byte(x)
    }

    pub fn of_short(x: i16) -> Self {
        Value::Short(x)
    }

    pub fn of_int(x: i32) -> Self {
        Value::Int(x)
    }

    pub fn of_long(x: i64) -> Self {
        Value::Long(x)
    }

    pub fn of_big_int(x: I256) -> Self {
        Value::BigInt(x)
    }

    pub fn of_avl_tree(tree: AvlTreeData) -> Self {
        Value::AvlTree(tree)
    }

    pub fn of_group_element(p: CompressedRistretto) -> Self {
        Value::GroupElement(p)
    }

    pub fn of_sigma_prop(p: Proposition) -> Self {
        Value::SigmaProp(p)
    }

    /// Byte collection.
    pub fn of_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Coll(Coll::Bytes(bytes.into()))
    }

    /// Pair of two values.
    pub fn pair_of(a: Value, b: Value) -> Self {
        Value::Tuple(vec![a, b])
    }

    /// Collection of `items`, each of which must have type `elem`.
    pub fn coll_of(items: Vec<Value>, elem: SType) -> Result<Self, TypeError> {
        if let Some(bad) = items.iter().find(|v| v.tpe() != elem) {
            return Err(TypeError {
                expected: elem,
                found: bad.tpe(),
            });
        }
        Ok(Value::Coll(Coll::from_values(elem, items)))
    }

    /// Optional value of type `elem`.
    pub fn opt_of(value: Option<Value>, elem: SType) -> Result<Self, TypeError> {
        if let Some(v) = &value {
            if v.tpe() != elem {
                return Err(TypeError {
                    expected: elem,
                    found: v.tpe(),
                });
            }
        }
        Ok(Value::Opt(elem, value.map(Box::new)))
    }

    /// Type of this value.
    pub fn tpe(&self) -> SType {
        match self {
            Value::Bool(_) => SType::Bool,
            Value::Byte(_) => SType::Byte,
            Value::Short(_) => SType::Short,
            Value::Int(_) => SType::Int,
            Value::Long(_) => SType::Long,
            Value::BigInt(_) => SType::BigInt,
            Value::GroupElement(_) => SType::GroupElement,
            Value::SigmaProp(_) => SType::SigmaProp,
            Value::Box(_) => SType::Box,
            Value::AvlTree(_) => SType::AvlTree,
            Value::Header(_) => SType::Header,
            Value::PreHeader(_) => SType::PreHeader,
            Value::Coll(c) => SType::coll(c.elem_type()),
            Value::Tuple(items) => SType::Tuple(items.iter().map(Value::tpe).collect()),
            Value::Opt(t, _) => SType::option(t.clone()),
        }
    }

    /// Widens a numeric value to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(x) => Some(*x as i64),
            Value::Short(x) => Some(*x as i64),
            Value::Int(x) => Some(*x as i64),
            Value::Long(x) => Some(*x),
            _ => None,
        }
    }

    /// Narrows `n` to a value of numeric type `t`, failing if it does not fit.
    pub fn from_i64(t: &SType, n: i64) -> Option<Value> {
        use std::convert::TryFrom;
        match t {
            SType::Byte => i8::try_from(n).ok().map(Value::Byte),
            SType::Short => i16::try_from(n).ok().map(Value::Short),
            SType::Int => i32::try_from(n).ok().map(Value::Int),
            SType::Long => Some(Value::Long(n)),
            _ => None,
        }
    }

    /// Type-tagged hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode_to_vec())
    }

    /// Decodes a type-tagged hex encoding.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes =
            hex::decode(s).map_err(|_| CodecError::InvalidFormat("value is not valid hex"))?;
        Self::decode_exact(&bytes)
    }

    /// Writes the data of this value without its type.
    pub(crate) fn encode_data(&self, w: &mut impl Writer) {
        match self {
            Value::Bool(b) => w.write_u8(b"bool", *b as u8),
            Value::Byte(x) => w.write_u8(b"byte", *x as u8),
            Value::Short(x) => w.write(b"short", &x.to_le_bytes()),
            Value::Int(x) => w.write(b"int", &x.to_le_bytes()),
            Value::Long(x) => w.write(b"long", &x.to_le_bytes()),
            Value::BigInt(x) => w.write(b"bigint", &x.to_be_bytes::<32>()),
            Value::GroupElement(p) => w.write_point(b"point", p),
            Value::SigmaProp(p) => p.encode(w),
            Value::Box(b) => b.encode(w),
            Value::AvlTree(t) => t.encode(w),
            Value::Header(h) => h.encode(w),
            Value::PreHeader(h) => h.encode(w),
            Value::Coll(Coll::Bytes(b)) => w.write_bytes(b"bytes", b),
            Value::Coll(Coll::Values(_, items)) => {
                w.write_size(b"n", items.len());
                for v in items {
                    v.encode_data(w);
                }
            }
            Value::Tuple(items) => {
                for v in items {
                    v.encode_data(w);
                }
            }
            Value::Opt(_, None) => w.write_u8(b"some", 0),
            Value::Opt(_, Some(v)) => {
                w.write_u8(b"some", 1);
                v.encode_data(w);
            }
        }
    }

    /// Reads the data of a value of type `t`.
    pub(crate) fn decode_data(r: &mut SliceReader, t: &SType) -> Result<Self, CodecError> {
        Ok(match t {
            SType::Bool => match r.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return Err(CodecError::InvalidFormat("boolean must be 0 or 1")),
            },
            SType::Byte => Value::Byte(r.read_u8()? as i8),
            SType::Short => {
                let mut buf = [0u8; 2];
                buf.copy_from_slice(r.read(2)?);
                Value::Short(i16::from_le_bytes(buf))
            }
            SType::Int => Value::Int(r.read_u32()? as i32),
            SType::Long => Value::Long(r.read_u64()? as i64),
            SType::BigInt => Value::BigInt(I256::from_be_bytes(r.read_u8x32()?)),
            SType::GroupElement => Value::GroupElement(r.read_point()?),
            SType::SigmaProp => Value::SigmaProp(Proposition::decode(r)?),
            SType::Box => Value::Box(Arc::new(TxBox::decode(r)?)),
            SType::AvlTree => Value::AvlTree(AvlTreeData::decode(r)?),
            SType::Header => Value::Header(Arc::new(Header::decode(r)?)),
            SType::PreHeader => Value::PreHeader(Arc::new(PreHeader::decode(r)?)),
            SType::Coll(elem) if **elem == SType::Byte => Value::of_bytes(r.read_bytes()?),
            SType::Coll(elem) => {
                let n = r.read_size()?;
                // every item takes at least one byte
                if n > r.remaining() {
                    return Err(CodecError::UnexpectedEnd);
                }
                let items = (0..n)
                    .map(|_| Self::decode_data(r, elem))
                    .collect::<Result<_, _>>()?;
                Value::Coll(Coll::Values((**elem).clone(), items))
            }
            SType::Tuple(types) => Value::Tuple(
                types
                    .iter()
                    .map(|t| Self::decode_data(r, t))
                    .collect::<Result<_, _>>()?,
            ),
            SType::Option(elem) => match r.read_u8()? {
                0 => Value::Opt((**elem).clone(), None),
                1 => Value::Opt(
                    (**elem).clone(),
                    Some(Box::new(Self::decode_data(r, elem)?)),
                ),
                _ => return Err(CodecError::InvalidFormat("option flag must be 0 or 1")),
            },
        })
    }
}

impl Encodable for Value {
    fn encode(&self, w: &mut impl Writer) {
        self.tpe().encode(w);
        self.encode_data(w);
    }
}

impl Decodable for Value {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        let t = SType::decode(r)?;
        Self::decode_data(r, &t)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Value::Int(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Long(x)
    }
}

impl From<I256> for Value {
    fn from(x: I256) -> Self {
        Value::BigInt(x)
    }
}

impl From<Proposition> for Value {
    fn from(p: Proposition) -> Self {
        Value::SigmaProp(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_COMPRESSED;

    #[test]
    fn byte_collections_stay_flat() {
        let v = Value::coll_of(vec![Value::Byte(1), Value::Byte(-1)], SType::Byte).unwrap();
        assert_eq!(v, Value::of_bytes(vec![1u8, 0xff]));
        assert_eq!(v.tpe(), SType::bytes());
        assert_eq!(v.to_hex(), "0c020200000001ff");
    }

    #[test]
    fn coll_of_checks_element_types() {
        let err = Value::coll_of(vec![Value::Int(1), Value::Long(2)], SType::Int).unwrap_err();
        assert_eq!(err.expected, SType::Int);
        assert_eq!(err.found, SType::Long);
    }

    #[test]
    fn values_survive_hex() {
        let values = vec![
            Value::of_long(-5),
            Value::of_short(i16::MIN),
            Value::pair_of(Value::of_int(7), Value::of_bytes(b"abc".to_vec())),
            Value::opt_of(Some(Value::Bool(true)), SType::Bool).unwrap(),
            Value::opt_of(None, SType::Long).unwrap(),
            Value::of_sigma_prop(Proposition::dlog(RISTRETTO_BASEPOINT_COMPRESSED)),
            Value::of_big_int(I256::MIN),
            Value::of_avl_tree(AvlTreeData::new([9; 33], 32)),
            Value::coll_of(
                vec![Value::of_group_element(RISTRETTO_BASEPOINT_COMPRESSED)],
                SType::GroupElement,
            )
            .unwrap(),
        ];
        for v in values {
            assert_eq!(Value::from_hex(&v.to_hex()).unwrap(), v);
        }
    }

    #[test]
    fn rejects_bad_encodings() {
        assert!(Value::from_hex("zz").is_err());
        // unknown type code
        assert!(Value::from_hex("f0").is_err());
        // boolean out of range
        assert_eq!(
            Value::from_hex("0102"),
            Err(CodecError::InvalidFormat("boolean must be 0 or 1"))
        );
        // trailing bytes
        assert_eq!(Value::from_hex("050100000000000000ff"), Err(CodecError::TrailingBytes));
    }

    #[test]
    fn big_ints_are_big_endian_twos_complement() {
        let minus_one = Value::of_big_int(I256::MINUS_ONE);
        assert_eq!(minus_one.to_hex(), format!("06{}", "ff".repeat(32)));
        assert_eq!(minus_one.tpe().to_string(), "BigInt");
        assert_eq!(minus_one.as_i64(), None);
    }

    #[test]
    fn tuple_arity_is_bounded() {
        let wide = SType::Tuple(vec![SType::Bool; MAX_TUPLE_ARITY]);
        assert_eq!(SType::decode_exact(&wide.encode_to_vec()).unwrap(), wide);

        let too_wide = SType::Tuple(vec![SType::Bool; MAX_TUPLE_ARITY + 1]);
        assert_eq!(
            SType::decode_exact(&too_wide.encode_to_vec()),
            Err(CodecError::InvalidFormat("tuple has too many items"))
        );
    }

    #[test]
    fn narrowing_is_range_checked() {
        assert_eq!(Value::from_i64(&SType::Byte, 127), Some(Value::Byte(127)));
        assert_eq!(Value::from_i64(&SType::Byte, 128), None);
        assert_eq!(Value::from_i64(&SType::Short, -32769), None);
        assert_eq!(Value::from_i64(&SType::Bool, 0), None);
    }

    #[test]
    fn types_display_readably() {
        let t = SType::Tuple(vec![SType::bytes(), SType::option(SType::Long)]);
        assert_eq!(t.to_string(), "(Coll[Byte], Option[Long])");
    }
}
