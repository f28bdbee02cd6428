//! Expressions of the condition language,
//! their opcodes and decoding/encoding utility functions.

use sigma::{CodecError, Decodable, Encodable, SliceReader, Writer};

use crate::types::{SType, Value};

/// Deepest expression nesting, with the root at depth zero. Both the
/// decoder and the evaluator stop past it, and evaluation at this depth
/// fits in a 2 MiB thread stack.
pub const MAX_EXPR_DEPTH: usize = 40;

/// A decoded expression.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Expr {
    Const(Value),
    ConstPlaceholder(u32), // index into the constants table
    ValUse(u32),
    BlockValue(Vec<(u32, Expr)>, Box<Expr>),
    Tuple(Vec<Expr>),
    CollOf(SType, Vec<Expr>),
    Context(ContextField),
    GetVar(u8, SType),
    Extract(BoxField, Box<Expr>),
    Register(Box<Expr>, u8, SType), // register index 4..=9
    HeaderField(HeaderField, Box<Expr>),
    PreHeaderField(PreHeaderField, Box<Expr>),
    AvlTreeField(AvlTreeField, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    ToBigInt(Box<Expr>), // widens Byte, Short, Int or Long
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    BinAnd(Box<Expr>, Box<Expr>),
    BinOr(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    AllOf(Box<Expr>),
    AnyOf(Box<Expr>),
    SizeOf(Box<Expr>),
    ByIndex(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Slice(Box<Expr>, Box<Expr>, Box<Expr>),
    Map(Box<Expr>, Lambda),
    Filter(Box<Expr>, Lambda),
    Exists(Box<Expr>, Lambda),
    ForAll(Box<Expr>, Lambda),
    Fold(Box<Expr>, Box<Expr>, Lambda),
    SelectField(Box<Expr>, u8), // 1-based
    OptionGet(Box<Expr>),
    OptionIsDefined(Box<Expr>),
    OptionGetOrElse(Box<Expr>, Box<Expr>),
    Sha256(Box<Expr>),
    Blake3(Box<Expr>),
    ProveDlog(Box<Expr>),
    ProveDhTuple(Box<Expr>, Box<Expr>, Box<Expr>, Box<Expr>),
    SigmaAnd(Vec<Expr>),
    SigmaOr(Vec<Expr>),
    AtLeast(Box<Expr>, Box<Expr>),
    BoolToSigma(Box<Expr>),
    DeserializeContext(u8, SType),
}

/// Function literal passed to a collection operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lambda {
    /// Argument ids bound in the body, with their types.
    pub args: Vec<(u32, SType)>,
    pub ret: SType,
    pub body: Box<Expr>,
}

macro_rules! opcodes {
    ($($name:ident = $code:literal, since $version:literal;)*) => {
        /// A bytecode representation of the expression node.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum Opcode {
            $($name = $code,)*
        }

        impl Opcode {
            /// Every opcode, in code order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Converts the opcode to `u8`.
            pub fn to_u8(self) -> u8 {
                self as u8
            }

            /// Instantiates the opcode from `u8`.
            pub fn from_u8(code: u8) -> Option<Opcode> {
                match code {
                    $($code => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Earliest script version the opcode may appear in.
            pub fn min_version(self) -> u8 {
                match self {
                    $(Opcode::$name => $version,)*
                }
            }
        }
    };
}

opcodes! {
    Const = 0x01, since 0;
    ConstPlaceholder = 0x02, since 0;
    ValUse = 0x03, since 0;
    BlockValue = 0x04, since 0;
    Tuple = 0x06, since 0;
    CollOf = 0x07, since 0;
    Height = 0x10, since 0;
    SelfBox = 0x11, since 0;
    Inputs = 0x12, since 0;
    Outputs = 0x13, since 0;
    DataInputs = 0x14, since 0;
    Headers = 0x15, since 0;
    PreHeader = 0x16, since 0;
    MinerPubKey = 0x17, since 0;
    LastBlockUtxoRoot = 0x18, since 0;
    GetVar = 0x19, since 0;
    ExtractAmount = 0x20, since 0;
    ExtractScriptBytes = 0x21, since 0;
    ExtractId = 0x22, since 0;
    ExtractCreationHeight = 0x23, since 0;
    ExtractTokens = 0x24, since 0;
    ExtractRegister = 0x25, since 0;
    HeaderField = 0x26, since 0;
    PreHeaderField = 0x27, since 0;
    AvlTreeField = 0x28, since 1;
    Plus = 0x30, since 0;
    Minus = 0x31, since 0;
    Multiply = 0x32, since 0;
    Division = 0x33, since 0;
    Modulo = 0x34, since 0;
    Min = 0x35, since 0;
    Max = 0x36, since 0;
    Negation = 0x37, since 0;
    ToBigInt = 0x38, since 0;
    Lt = 0x40, since 0;
    Le = 0x41, since 0;
    Gt = 0x42, since 0;
    Ge = 0x43, since 0;
    Eq = 0x44, since 0;
    Neq = 0x45, since 0;
    BinAnd = 0x48, since 0;
    BinOr = 0x49, since 0;
    Not = 0x4a, since 0;
    If = 0x4b, since 0;
    AllOf = 0x4c, since 0;
    AnyOf = 0x4d, since 0;
    SizeOf = 0x50, since 0;
    ByIndex = 0x51, since 0;
    Slice = 0x52, since 0;
    Map = 0x53, since 0;
    Filter = 0x54, since 1;
    Exists = 0x55, since 0;
    ForAll = 0x56, since 0;
    Fold = 0x57, since 1;
    SelectField = 0x58, since 0;
    OptionGet = 0x60, since 0;
    OptionIsDefined = 0x61, since 0;
    OptionGetOrElse = 0x62, since 0;
    Sha256 = 0x68, since 0;
    Blake3 = 0x69, since 2;
    ProveDlog = 0x70, since 0;
    ProveDhTuple = 0x71, since 0;
    SigmaAnd = 0x72, since 0;
    SigmaOr = 0x73, since 0;
    AtLeast = 0x74, since 0;
    BoolToSigma = 0x75, since 0;
    DeserializeContext = 0x78, since 1;
}

/// Fields of the execution context readable without arguments.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ContextField {
    Height,
    SelfBox,
    Inputs,
    Outputs,
    DataInputs,
    Headers,
    PreHeader,
    MinerPubKey,
    LastBlockUtxoRoot,
}

/// Fields of a box.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BoxField {
    Value,
    ScriptBytes,
    Id,
    CreationHeight,
    Tokens,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ArithOp {
    Plus,
    Minus,
    Multiply,
    Division,
    Modulo,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
}

macro_rules! field_codes {
    ($(#[$meta:meta])* $ty:ident { $($name:ident = $code:literal,)* }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        #[allow(missing_docs)]
        pub enum $ty {
            $($name,)*
        }

        impl $ty {
            fn to_u8(self) -> u8 {
                match self {
                    $($ty::$name => $code,)*
                }
            }

            fn from_u8(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($ty::$name),)*
                    _ => None,
                }
            }
        }
    };
}

field_codes! {
    /// Fields of a block header.
    HeaderField {
        Id = 0,
        Version = 1,
        ParentId = 2,
        AdProofsRoot = 3,
        StateRoot = 4,
        TransactionsRoot = 5,
        Timestamp = 6,
        NBits = 7,
        Height = 8,
        ExtensionRoot = 9,
        MinerPk = 10,
        PowOnetimePk = 11,
        PowNonce = 12,
        PowDistance = 13,
        Votes = 14,
    }
}

field_codes! {
    /// Fields of an authenticated state tree.
    AvlTreeField {
        Digest = 0,
        EnabledOperations = 1,
        KeyLength = 2,
        ValueLengthOpt = 3,
    }
}

field_codes! {
    /// Fields of a pre-header.
    PreHeaderField {
        Version = 0,
        ParentId = 1,
        Timestamp = 2,
        NBits = 3,
        Height = 4,
        MinerPk = 5,
        Votes = 6,
    }
}

impl ContextField {
    fn opcode(self) -> Opcode {
        match self {
            ContextField::Height => Opcode::Height,
            ContextField::SelfBox => Opcode::SelfBox,
            ContextField::Inputs => Opcode::Inputs,
            ContextField::Outputs => Opcode::Outputs,
            ContextField::DataInputs => Opcode::DataInputs,
            ContextField::Headers => Opcode::Headers,
            ContextField::PreHeader => Opcode::PreHeader,
            ContextField::MinerPubKey => Opcode::MinerPubKey,
            ContextField::LastBlockUtxoRoot => Opcode::LastBlockUtxoRoot,
        }
    }
}

impl BoxField {
    fn opcode(self) -> Opcode {
        match self {
            BoxField::Value => Opcode::ExtractAmount,
            BoxField::ScriptBytes => Opcode::ExtractScriptBytes,
            BoxField::Id => Opcode::ExtractId,
            BoxField::CreationHeight => Opcode::ExtractCreationHeight,
            BoxField::Tokens => Opcode::ExtractTokens,
        }
    }
}

impl ArithOp {
    fn opcode(self) -> Opcode {
        match self {
            ArithOp::Plus => Opcode::Plus,
            ArithOp::Minus => Opcode::Minus,
            ArithOp::Multiply => Opcode::Multiply,
            ArithOp::Division => Opcode::Division,
            ArithOp::Modulo => Opcode::Modulo,
            ArithOp::Min => Opcode::Min,
            ArithOp::Max => Opcode::Max,
        }
    }
}

impl CmpOp {
    fn opcode(self) -> Opcode {
        match self {
            CmpOp::Lt => Opcode::Lt,
            CmpOp::Le => Opcode::Le,
            CmpOp::Gt => Opcode::Gt,
            CmpOp::Ge => Opcode::Ge,
            CmpOp::Eq => Opcode::Eq,
            CmpOp::Neq => Opcode::Neq,
        }
    }
}

impl Expr {
    /// Constant expression.
    pub fn constant(v: impl Into<Value>) -> Self {
        Expr::Const(v.into())
    }

    /// Opcode this node is encoded with.
    pub fn opcode(&self) -> Opcode {
        match self {
            Expr::Const(_) => Opcode::Const,
            Expr::ConstPlaceholder(_) => Opcode::ConstPlaceholder,
            Expr::ValUse(_) => Opcode::ValUse,
            Expr::BlockValue(..) => Opcode::BlockValue,
            Expr::Tuple(_) => Opcode::Tuple,
            Expr::CollOf(..) => Opcode::CollOf,
            Expr::Context(f) => f.opcode(),
            Expr::GetVar(..) => Opcode::GetVar,
            Expr::Extract(f, _) => f.opcode(),
            Expr::Register(..) => Opcode::ExtractRegister,
            Expr::HeaderField(..) => Opcode::HeaderField,
            Expr::PreHeaderField(..) => Opcode::PreHeaderField,
            Expr::AvlTreeField(..) => Opcode::AvlTreeField,
            Expr::Arith(op, ..) => op.opcode(),
            Expr::Negate(_) => Opcode::Negation,
            Expr::ToBigInt(_) => Opcode::ToBigInt,
            Expr::Compare(op, ..) => op.opcode(),
            Expr::BinAnd(..) => Opcode::BinAnd,
            Expr::BinOr(..) => Opcode::BinOr,
            Expr::Not(_) => Opcode::Not,
            Expr::If(..) => Opcode::If,
            Expr::AllOf(_) => Opcode::AllOf,
            Expr::AnyOf(_) => Opcode::AnyOf,
            Expr::SizeOf(_) => Opcode::SizeOf,
            Expr::ByIndex(..) => Opcode::ByIndex,
            Expr::Slice(..) => Opcode::Slice,
            Expr::Map(..) => Opcode::Map,
            Expr::Filter(..) => Opcode::Filter,
            Expr::Exists(..) => Opcode::Exists,
            Expr::ForAll(..) => Opcode::ForAll,
            Expr::Fold(..) => Opcode::Fold,
            Expr::SelectField(..) => Opcode::SelectField,
            Expr::OptionGet(_) => Opcode::OptionGet,
            Expr::OptionIsDefined(_) => Opcode::OptionIsDefined,
            Expr::OptionGetOrElse(..) => Opcode::OptionGetOrElse,
            Expr::Sha256(_) => Opcode::Sha256,
            Expr::Blake3(_) => Opcode::Blake3,
            Expr::ProveDlog(_) => Opcode::ProveDlog,
            Expr::ProveDhTuple(..) => Opcode::ProveDhTuple,
            Expr::SigmaAnd(_) => Opcode::SigmaAnd,
            Expr::SigmaOr(_) => Opcode::SigmaOr,
            Expr::AtLeast(..) => Opcode::AtLeast,
            Expr::BoolToSigma(_) => Opcode::BoolToSigma,
            Expr::DeserializeContext(..) => Opcode::DeserializeContext,
        }
    }

    /// Highest `min_version` of any opcode in the expression.
    pub fn required_version(&self) -> u8 {
        let mut max = 0;
        self.visit(&mut |e| max = max.max(e.opcode().min_version()));
        max
    }

    /// Calls `f` on every node, parents before children.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Const(_)
            | Expr::ConstPlaceholder(_)
            | Expr::ValUse(_)
            | Expr::Context(_)
            | Expr::GetVar(..)
            | Expr::DeserializeContext(..) => {}
            Expr::BlockValue(defs, body) => {
                for (_, rhs) in defs {
                    rhs.visit(f);
                }
                body.visit(f);
            }
            Expr::Tuple(items)
            | Expr::CollOf(_, items)
            | Expr::SigmaAnd(items)
            | Expr::SigmaOr(items) => {
                for e in items {
                    e.visit(f);
                }
            }
            Expr::Extract(_, e)
            | Expr::Register(e, ..)
            | Expr::HeaderField(_, e)
            | Expr::PreHeaderField(_, e)
            | Expr::AvlTreeField(_, e)
            | Expr::Negate(e)
            | Expr::ToBigInt(e)
            | Expr::Not(e)
            | Expr::AllOf(e)
            | Expr::AnyOf(e)
            | Expr::SizeOf(e)
            | Expr::SelectField(e, _)
            | Expr::OptionGet(e)
            | Expr::OptionIsDefined(e)
            | Expr::Sha256(e)
            | Expr::Blake3(e)
            | Expr::ProveDlog(e)
            | Expr::BoolToSigma(e) => e.visit(f),
            Expr::Arith(_, a, b)
            | Expr::Compare(_, a, b)
            | Expr::BinAnd(a, b)
            | Expr::BinOr(a, b)
            | Expr::OptionGetOrElse(a, b)
            | Expr::AtLeast(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::If(c, t, e) | Expr::Slice(c, t, e) => {
                c.visit(f);
                t.visit(f);
                e.visit(f);
            }
            Expr::ByIndex(c, i, default) => {
                c.visit(f);
                i.visit(f);
                if let Some(d) = default {
                    d.visit(f);
                }
            }
            Expr::Map(c, l) | Expr::Filter(c, l) | Expr::Exists(c, l) | Expr::ForAll(c, l) => {
                c.visit(f);
                l.body.visit(f);
            }
            Expr::Fold(c, zero, l) => {
                c.visit(f);
                zero.visit(f);
                l.body.visit(f);
            }
            Expr::ProveDhTuple(g, h, u, v) => {
                g.visit(f);
                h.visit(f);
                u.visit(f);
                v.visit(f);
            }
        }
    }

    /// Decodes an expression that may only use opcodes available in `version`.
    pub fn decode_versioned(r: &mut SliceReader, version: u8) -> Result<Self, CodecError> {
        Self::decode_nested(r, version, 0)
    }

    fn decode_nested(r: &mut SliceReader, version: u8, depth: usize) -> Result<Self, CodecError> {
        if depth > MAX_EXPR_DEPTH {
            return Err(CodecError::InvalidFormat("expression nested too deeply"));
        }
        let op = Opcode::from_u8(r.read_u8()?)
            .ok_or(CodecError::InvalidFormat("unknown opcode"))?;
        if op.min_version() > version {
            return Err(CodecError::UnsupportedOpcode(op.to_u8()));
        }

        let d = depth + 1;
        let sub = |r: &mut SliceReader| Self::decode_nested(r, version, d).map(Box::new);

        let expr = match op {
            Opcode::Const => Expr::Const(Value::decode(r)?),
            Opcode::ConstPlaceholder => Expr::ConstPlaceholder(r.read_u32()?),
            Opcode::ValUse => Expr::ValUse(r.read_u32()?),
            Opcode::BlockValue => {
                let n = read_count(r)?;
                let mut defs = Vec::with_capacity(n);
                for _ in 0..n {
                    let id = r.read_u32()?;
                    defs.push((id, *sub(r)?));
                }
                Expr::BlockValue(defs, sub(r)?)
            }
            Opcode::Tuple => Expr::Tuple(Self::decode_list(r, version, d)?),
            Opcode::CollOf => {
                let elem = SType::decode(r)?;
                Expr::CollOf(elem, Self::decode_list(r, version, d)?)
            }
            Opcode::Height => Expr::Context(ContextField::Height),
            Opcode::SelfBox => Expr::Context(ContextField::SelfBox),
            Opcode::Inputs => Expr::Context(ContextField::Inputs),
            Opcode::Outputs => Expr::Context(ContextField::Outputs),
            Opcode::DataInputs => Expr::Context(ContextField::DataInputs),
            Opcode::Headers => Expr::Context(ContextField::Headers),
            Opcode::PreHeader => Expr::Context(ContextField::PreHeader),
            Opcode::MinerPubKey => Expr::Context(ContextField::MinerPubKey),
            Opcode::LastBlockUtxoRoot => Expr::Context(ContextField::LastBlockUtxoRoot),
            Opcode::GetVar => {
                let id = r.read_u8()?;
                Expr::GetVar(id, SType::decode(r)?)
            }
            Opcode::ExtractAmount => Expr::Extract(BoxField::Value, sub(r)?),
            Opcode::ExtractScriptBytes => Expr::Extract(BoxField::ScriptBytes, sub(r)?),
            Opcode::ExtractId => Expr::Extract(BoxField::Id, sub(r)?),
            Opcode::ExtractCreationHeight => Expr::Extract(BoxField::CreationHeight, sub(r)?),
            Opcode::ExtractTokens => Expr::Extract(BoxField::Tokens, sub(r)?),
            Opcode::ExtractRegister => {
                let b = sub(r)?;
                let reg = r.read_u8()?;
                if !(4..=9).contains(&reg) {
                    return Err(CodecError::InvalidFormat("register index out of range"));
                }
                Expr::Register(b, reg, SType::decode(r)?)
            }
            Opcode::HeaderField => {
                let field = HeaderField::from_u8(r.read_u8()?)
                    .ok_or(CodecError::InvalidFormat("unknown header field"))?;
                Expr::HeaderField(field, sub(r)?)
            }
            Opcode::PreHeaderField => {
                let field = PreHeaderField::from_u8(r.read_u8()?)
                    .ok_or(CodecError::InvalidFormat("unknown pre-header field"))?;
                Expr::PreHeaderField(field, sub(r)?)
            }
            Opcode::AvlTreeField => {
                let field = AvlTreeField::from_u8(r.read_u8()?)
                    .ok_or(CodecError::InvalidFormat("unknown state tree field"))?;
                Expr::AvlTreeField(field, sub(r)?)
            }
            Opcode::Plus => Expr::Arith(ArithOp::Plus, sub(r)?, sub(r)?),
            Opcode::Minus => Expr::Arith(ArithOp::Minus, sub(r)?, sub(r)?),
            Opcode::Multiply => Expr::Arith(ArithOp::Multiply, sub(r)?, sub(r)?),
            Opcode::Division => Expr::Arith(ArithOp::Division, sub(r)?, sub(r)?),
            Opcode::Modulo => Expr::Arith(ArithOp::Modulo, sub(r)?, sub(r)?),
            Opcode::Min => Expr::Arith(ArithOp::Min, sub(r)?, sub(r)?),
            Opcode::Max => Expr::Arith(ArithOp::Max, sub(r)?, sub(r)?),
            Opcode::Negation => Expr::Negate(sub(r)?),
            Opcode::ToBigInt => Expr::ToBigInt(sub(r)?),
            Opcode::Lt => Expr::Compare(CmpOp::Lt, sub(r)?, sub(r)?),
            Opcode::Le => Expr::Compare(CmpOp::Le, sub(r)?, sub(r)?),
            Opcode::Gt => Expr::Compare(CmpOp::Gt, sub(r)?, sub(r)?),
            Opcode::Ge => Expr::Compare(CmpOp::Ge, sub(r)?, sub(r)?),
            Opcode::Eq => Expr::Compare(CmpOp::Eq, sub(r)?, sub(r)?),
            Opcode::Neq => Expr::Compare(CmpOp::Neq, sub(r)?, sub(r)?),
            Opcode::BinAnd => Expr::BinAnd(sub(r)?, sub(r)?),
            Opcode::BinOr => Expr::BinOr(sub(r)?, sub(r)?),
            Opcode::Not => Expr::Not(sub(r)?),
            Opcode::If => Expr::If(sub(r)?, sub(r)?, sub(r)?),
            Opcode::AllOf => Expr::AllOf(sub(r)?),
            Opcode::AnyOf => Expr::AnyOf(sub(r)?),
            Opcode::SizeOf => Expr::SizeOf(sub(r)?),
            Opcode::ByIndex => {
                let coll = sub(r)?;
                let index = sub(r)?;
                let default = match r.read_u8()? {
                    0 => None,
                    1 => Some(sub(r)?),
                    _ => return Err(CodecError::InvalidFormat("default flag must be 0 or 1")),
                };
                Expr::ByIndex(coll, index, default)
            }
            Opcode::Slice => Expr::Slice(sub(r)?, sub(r)?, sub(r)?),
            Opcode::Map => Expr::Map(sub(r)?, Lambda::decode(r, version, d)?),
            Opcode::Filter => Expr::Filter(sub(r)?, Lambda::decode(r, version, d)?),
            Opcode::Exists => Expr::Exists(sub(r)?, Lambda::decode(r, version, d)?),
            Opcode::ForAll => Expr::ForAll(sub(r)?, Lambda::decode(r, version, d)?),
            Opcode::Fold => {
                let coll = sub(r)?;
                let zero = sub(r)?;
                Expr::Fold(coll, zero, Lambda::decode(r, version, d)?)
            }
            Opcode::SelectField => {
                let t = sub(r)?;
                Expr::SelectField(t, r.read_u8()?)
            }
            Opcode::OptionGet => Expr::OptionGet(sub(r)?),
            Opcode::OptionIsDefined => Expr::OptionIsDefined(sub(r)?),
            Opcode::OptionGetOrElse => Expr::OptionGetOrElse(sub(r)?, sub(r)?),
            Opcode::Sha256 => Expr::Sha256(sub(r)?),
            Opcode::Blake3 => Expr::Blake3(sub(r)?),
            Opcode::ProveDlog => Expr::ProveDlog(sub(r)?),
            Opcode::ProveDhTuple => Expr::ProveDhTuple(sub(r)?, sub(r)?, sub(r)?, sub(r)?),
            Opcode::SigmaAnd => Expr::SigmaAnd(Self::decode_list(r, version, d)?),
            Opcode::SigmaOr => Expr::SigmaOr(Self::decode_list(r, version, d)?),
            Opcode::AtLeast => Expr::AtLeast(sub(r)?, sub(r)?),
            Opcode::BoolToSigma => Expr::BoolToSigma(sub(r)?),
            Opcode::DeserializeContext => {
                let id = r.read_u8()?;
                Expr::DeserializeContext(id, SType::decode(r)?)
            }
        };
        Ok(expr)
    }

    fn decode_list(r: &mut SliceReader, version: u8, depth: usize) -> Result<Vec<Self>, CodecError> {
        let n = read_count(r)?;
        (0..n).map(|_| Self::decode_nested(r, version, depth)).collect()
    }
}

impl Lambda {
    fn decode(r: &mut SliceReader, version: u8, depth: usize) -> Result<Self, CodecError> {
        let n = read_count(r)?;
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            let id = r.read_u32()?;
            args.push((id, SType::decode(r)?));
        }
        let ret = SType::decode(r)?;
        let body = Box::new(Expr::decode_nested(r, version, depth + 1)?);
        Ok(Lambda { args, ret, body })
    }

    fn encode(&self, w: &mut impl Writer) {
        w.write_size(b"n", self.args.len());
        for (id, t) in &self.args {
            w.write_u32(b"id", *id);
            t.encode(w);
        }
        self.ret.encode(w);
        self.body.encode(w);
    }
}

// Every item takes at least one byte, so a count beyond the input is malformed.
fn read_count(r: &mut SliceReader) -> Result<usize, CodecError> {
    let n = r.read_size()?;
    if n > r.remaining() {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(n)
}

fn encode_list(items: &[Expr], w: &mut impl Writer) {
    w.write_size(b"n", items.len());
    for e in items {
        e.encode(w);
    }
}

impl Encodable for Expr {
    fn encode(&self, w: &mut impl Writer) {
        w.write_u8(b"op", self.opcode().to_u8());
        match self {
            Expr::Const(v) => v.encode(w),
            Expr::ConstPlaceholder(i) => w.write_u32(b"index", *i),
            Expr::ValUse(id) => w.write_u32(b"id", *id),
            Expr::BlockValue(defs, body) => {
                w.write_size(b"n", defs.len());
                for (id, rhs) in defs {
                    w.write_u32(b"id", *id);
                    rhs.encode(w);
                }
                body.encode(w);
            }
            Expr::Tuple(items) => encode_list(items, w),
            Expr::CollOf(elem, items) => {
                elem.encode(w);
                encode_list(items, w);
            }
            Expr::Context(_) => {}
            Expr::GetVar(id, t) | Expr::DeserializeContext(id, t) => {
                w.write_u8(b"id", *id);
                t.encode(w);
            }
            Expr::Extract(_, e)
            | Expr::Negate(e)
            | Expr::ToBigInt(e)
            | Expr::Not(e)
            | Expr::AllOf(e)
            | Expr::AnyOf(e)
            | Expr::SizeOf(e)
            | Expr::OptionGet(e)
            | Expr::OptionIsDefined(e)
            | Expr::Sha256(e)
            | Expr::Blake3(e)
            | Expr::ProveDlog(e)
            | Expr::BoolToSigma(e) => e.encode(w),
            Expr::Register(e, reg, t) => {
                e.encode(w);
                w.write_u8(b"reg", *reg);
                t.encode(w);
            }
            Expr::HeaderField(field, e) => {
                w.write_u8(b"field", field.to_u8());
                e.encode(w);
            }
            Expr::PreHeaderField(field, e) => {
                w.write_u8(b"field", field.to_u8());
                e.encode(w);
            }
            Expr::AvlTreeField(field, e) => {
                w.write_u8(b"field", field.to_u8());
                e.encode(w);
            }
            Expr::Arith(_, a, b)
            | Expr::Compare(_, a, b)
            | Expr::BinAnd(a, b)
            | Expr::BinOr(a, b)
            | Expr::OptionGetOrElse(a, b)
            | Expr::AtLeast(a, b) => {
                a.encode(w);
                b.encode(w);
            }
            Expr::If(a, b, c) | Expr::Slice(a, b, c) => {
                a.encode(w);
                b.encode(w);
                c.encode(w);
            }
            Expr::ByIndex(coll, index, default) => {
                coll.encode(w);
                index.encode(w);
                match default {
                    None => w.write_u8(b"default", 0),
                    Some(d) => {
                        w.write_u8(b"default", 1);
                        d.encode(w);
                    }
                }
            }
            Expr::Map(c, l) | Expr::Filter(c, l) | Expr::Exists(c, l) | Expr::ForAll(c, l) => {
                c.encode(w);
                l.encode(w);
            }
            Expr::Fold(c, zero, l) => {
                c.encode(w);
                zero.encode(w);
                l.encode(w);
            }
            Expr::SelectField(e, i) => {
                e.encode(w);
                w.write_u8(b"field", *i);
            }
            Expr::ProveDhTuple(g, h, u, v) => {
                g.encode(w);
                h.encode(w);
                u.encode(w);
                v.encode(w);
            }
            Expr::SigmaAnd(items) | Expr::SigmaOr(items) => encode_list(items, w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn height_above(h: i32) -> Expr {
        Expr::Compare(
            CmpOp::Gt,
            Box::new(Expr::Context(ContextField::Height)),
            Box::new(Expr::constant(h)),
        )
    }

    fn decode(bytes: &[u8], version: u8) -> Result<Expr, CodecError> {
        SliceReader::parse(bytes, |r| Expr::decode_versioned(r, version))
    }

    #[test]
    fn opcodes_roundtrip_through_u8() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_u8(op.to_u8()), Some(*op));
        }
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(0xff), None);
    }

    #[test]
    fn minimum_versions() {
        assert_eq!(Opcode::Fold.min_version(), 1);
        assert_eq!(Opcode::Filter.min_version(), 1);
        assert_eq!(Opcode::DeserializeContext.min_version(), 1);
        assert_eq!(Opcode::Blake3.min_version(), 2);
        assert_eq!(Opcode::Sha256.min_version(), 0);
        assert_eq!(Opcode::Map.min_version(), 0);
    }

    #[test]
    fn encodes_compactly() {
        let e = height_above(100);
        // Gt, Height, Const(Int 100)
        assert_eq!(hex::encode(e.encode_to_vec()), "4210010464000000");
        assert_eq!(decode(&e.encode_to_vec(), 0).unwrap(), e);
    }

    #[test]
    fn newer_opcodes_need_newer_versions() {
        let e = Expr::Blake3(Box::new(Expr::constant(Value::of_bytes(b"x".to_vec()))));
        let bytes = e.encode_to_vec();
        assert_eq!(
            decode(&bytes, 1),
            Err(CodecError::UnsupportedOpcode(Opcode::Blake3.to_u8()))
        );
        assert_eq!(decode(&bytes, 2).unwrap(), e);
        assert_eq!(e.required_version(), 2);
    }

    #[test]
    fn nested_expressions_roundtrip() {
        let e = Expr::BlockValue(
            vec![(1, Expr::Context(ContextField::Outputs))],
            Box::new(Expr::Fold(
                Box::new(Expr::ValUse(1)),
                Box::new(Expr::constant(0i64)),
                Lambda {
                    args: vec![(2, SType::Tuple(vec![SType::Long, SType::Box]))],
                    ret: SType::Long,
                    body: Box::new(Expr::Arith(
                        ArithOp::Plus,
                        Box::new(Expr::SelectField(Box::new(Expr::ValUse(2)), 1)),
                        Box::new(Expr::Extract(
                            BoxField::Value,
                            Box::new(Expr::SelectField(Box::new(Expr::ValUse(2)), 2)),
                        )),
                    )),
                },
            )),
        );
        assert_eq!(e.required_version(), 1);
        assert_eq!(decode(&e.encode_to_vec(), 1).unwrap(), e);
        assert!(decode(&e.encode_to_vec(), 0).is_err());
    }

    #[test]
    fn rejects_unknown_opcodes_and_fields() {
        assert_eq!(decode(&[0xee], 2), Err(CodecError::InvalidFormat("unknown opcode")));
        let bad_field = [Opcode::HeaderField.to_u8(), 99];
        assert!(decode(&bad_field, 2).is_err());
        let bad_register = [
            Opcode::ExtractRegister.to_u8(),
            Opcode::SelfBox.to_u8(),
            3,
            0x04,
        ];
        assert!(decode(&bad_register, 2).is_err());
    }

    #[test]
    fn rejects_deep_nesting() {
        let nots = |n: usize| {
            let mut bytes = vec![Opcode::Not.to_u8(); n];
            bytes.push(Opcode::Height.to_u8());
            bytes
        };
        // The leaf sits at depth `n`.
        assert!(decode(&nots(MAX_EXPR_DEPTH), 0).is_ok());
        assert_eq!(
            decode(&nots(MAX_EXPR_DEPTH + 1), 0),
            Err(CodecError::InvalidFormat("expression nested too deeply"))
        );
    }

    #[test]
    fn lambda_arity_is_bounded_by_input() {
        let l = Lambda {
            args: vec![(1, SType::Int), (2, SType::Long)],
            ret: SType::Long,
            body: Box::new(Expr::ValUse(2)),
        };
        let e = Expr::Map(Box::new(Expr::Context(ContextField::Outputs)), l);
        let bytes = e.encode_to_vec();
        assert_eq!(decode(&bytes, 0).unwrap(), e);

        // Map, Outputs, then an argument count far past the input.
        let mut bad = vec![Opcode::Map.to_u8(), Opcode::Outputs.to_u8()];
        bad.extend_from_slice(&1000u32.to_le_bytes());
        assert_eq!(decode(&bad, 0), Err(CodecError::UnexpectedEnd));
    }

    #[test]
    fn state_tree_fields_roundtrip() {
        let e = Expr::AvlTreeField(
            AvlTreeField::KeyLength,
            Box::new(Expr::HeaderField(
                HeaderField::StateRoot,
                Box::new(Expr::ByIndex(
                    Box::new(Expr::Context(ContextField::Headers)),
                    Box::new(Expr::constant(0)),
                    None,
                )),
            )),
        );
        assert_eq!(e.required_version(), 1);
        assert_eq!(decode(&e.encode_to_vec(), 1).unwrap(), e);
        assert_eq!(
            decode(&e.encode_to_vec(), 0),
            Err(CodecError::UnsupportedOpcode(Opcode::AvlTreeField.to_u8()))
        );
    }
}
