use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use merlin::Transcript;
use sigma::{CodecError, Decodable, Encodable, Proof, SliceReader, Writer};

use crate::condition::ConditionTree;
use crate::context::ContextExtension;
use crate::errors::{ReductionError, TxError};
use crate::types::Value;

/// Most tokens a box may hold.
pub const MAX_TOKENS: usize = 255;

/// Number of additional registers (R4 to R9).
pub const MAX_REGISTERS: usize = 6;

/// Most outputs a transaction may create; output indices are 16 bits.
pub const MAX_OUTPUTS: usize = u16::MAX as usize + 1;

/// Index of the first additional register.
pub const FIRST_REGISTER: u8 = 4;

/// Identifier of a box: the hash of its encoding.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoxId(pub [u8; 32]);

/// Identifier of a transaction: the hash of its bytes to sign.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub [u8; 32]);

/// Identifier of a token: the id of the first input of the minting transaction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(pub [u8; 32]);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub id: TokenId,
    pub amount: u64,
}

/// An output before the id of its transaction is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxCandidate {
    pub value: u64,
    pub condition: ConditionTree,
    pub tokens: Vec<Token>,
    /// Values of R4, R5, ... in order, without gaps.
    pub registers: Vec<Value>,
    pub creation_height: u32,
}

/// A box created by a transaction, spendable by a later one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxBox {
    pub candidate: BoxCandidate,
    pub transaction_id: TxId,
    pub index: u16,
}

/// Input of an unsigned transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedInput {
    pub box_id: BoxId,
    pub extension: ContextExtension,
}

/// Box read, but not spent, by a transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DataInput {
    pub box_id: BoxId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTx {
    pub inputs: Vec<UnsignedInput>,
    pub data_inputs: Vec<DataInput>,
    pub outputs: Vec<BoxCandidate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedInput {
    pub box_id: BoxId,
    pub proof: Proof,
    pub extension: ContextExtension,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    pub inputs: Vec<SignedInput>,
    pub data_inputs: Vec<DataInput>,
    pub outputs: Vec<BoxCandidate>,
}

/// 32-byte domain-separated hash.
pub(crate) fn hash(label: &'static [u8], data: &[u8]) -> [u8; 32] {
    let mut t = Transcript::new(b"SigVM.hash");
    t.append_message(b"dom-sep", label);
    t.append_message(b"data", data);
    let mut buf = [0u8; 32];
    t.challenge_bytes(b"hash", &mut buf);
    buf
}

macro_rules! hex_id {
    ($ty:ident) => {
        impl $ty {
            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, CodecError> {
                let bytes =
                    hex::decode(s).map_err(|_| CodecError::InvalidFormat("id is not valid hex"))?;
                if bytes.len() != 32 {
                    return Err(CodecError::InvalidFormat("id must be 32 bytes"));
                }
                let mut buf = [0u8; 32];
                buf.copy_from_slice(&bytes);
                Ok($ty(buf))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

hex_id!(BoxId);
hex_id!(TxId);
hex_id!(TokenId);

impl From<BoxId> for TokenId {
    fn from(id: BoxId) -> Self {
        TokenId(id.0)
    }
}

impl Token {
    pub fn new(id: TokenId, amount: u64) -> Self {
        Token { id, amount }
    }
}

impl BoxCandidate {
    pub fn new(value: u64, condition: ConditionTree, creation_height: u32) -> Self {
        BoxCandidate {
            value,
            condition,
            tokens: Vec::new(),
            registers: Vec::new(),
            creation_height,
        }
    }

    pub fn with_token(mut self, id: TokenId, amount: u64) -> Self {
        self.tokens.push(Token::new(id, amount));
        self
    }

    /// Appends a value to the next free register.
    pub fn with_register(mut self, value: Value) -> Self {
        self.registers.push(value);
        self
    }

    /// The box this candidate becomes as output `index` of transaction `tx_id`.
    pub fn to_box(&self, transaction_id: TxId, index: u16) -> TxBox {
        TxBox {
            candidate: self.clone(),
            transaction_id,
            index,
        }
    }
}

impl TxBox {
    pub fn id(&self) -> BoxId {
        BoxId(hash(b"box", &self.encode_to_vec()))
    }

    pub fn value(&self) -> u64 {
        self.candidate.value
    }

    pub fn condition(&self) -> &ConditionTree {
        &self.candidate.condition
    }

    pub fn tokens(&self) -> &[Token] {
        &self.candidate.tokens
    }

    /// Value of register `n` (4 to 9), if set.
    pub fn register(&self, n: u8) -> Option<&Value> {
        let i = n.checked_sub(FIRST_REGISTER)? as usize;
        self.candidate.registers.get(i)
    }
}

impl UnsignedTx {
    pub fn new(
        inputs: Vec<UnsignedInput>,
        data_inputs: Vec<DataInput>,
        outputs: Vec<BoxCandidate>,
    ) -> Self {
        UnsignedTx {
            inputs,
            data_inputs,
            outputs,
        }
    }

    /// Canonical encoding with empty proofs. This is the message every input proof signs.
    pub fn bytes_to_sign(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn id(&self) -> TxId {
        TxId(hash(b"tx", &self.bytes_to_sign()))
    }

    /// Outputs as boxes of this transaction, up to `MAX_OUTPUTS`.
    pub fn output_boxes(&self) -> Vec<TxBox> {
        let id = self.id();
        self.outputs
            .iter()
            .zip(0..=u16::MAX)
            .map(|(c, i)| c.to_box(id, i))
            .collect()
    }

    /// Attaches one proof per input, in input order.
    pub fn sign(self, proofs: Vec<Proof>) -> Result<SignedTx, TxError> {
        if proofs.len() != self.inputs.len() {
            return Err(TxError::ProofCountMismatch {
                expected: self.inputs.len(),
                found: proofs.len(),
            });
        }
        let inputs = self
            .inputs
            .into_iter()
            .zip(proofs)
            .map(|(input, proof)| SignedInput {
                box_id: input.box_id,
                proof,
                extension: input.extension,
            })
            .collect();
        Ok(SignedTx {
            inputs,
            data_inputs: self.data_inputs,
            outputs: self.outputs,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes_to_sign()
    }

    /// Decodes an unsigned transaction. Every proof slot must be empty.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TxError> {
        let signed = SignedTx::from_bytes(bytes)?;
        if signed.inputs.iter().any(|i| !i.proof.is_empty()) {
            return Err(CodecError::InvalidFormat("unsigned transaction carries proofs").into());
        }
        Ok(signed.to_unsigned())
    }
}

impl SignedTx {
    /// Same as the id of the unsigned transaction: proofs are not hashed.
    pub fn id(&self) -> TxId {
        self.to_unsigned().id()
    }

    pub fn to_unsigned(&self) -> UnsignedTx {
        UnsignedTx {
            inputs: self
                .inputs
                .iter()
                .map(|i| UnsignedInput {
                    box_id: i.box_id,
                    extension: i.extension.clone(),
                })
                .collect(),
            data_inputs: self.data_inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TxError> {
        Ok(Self::decode_exact(bytes)?)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// Checks that the outputs hold exactly the input tokens minus the burned
/// ones. One new token may be minted, with the id of the first input.
pub fn check_token_balance(
    inputs: &[Arc<TxBox>],
    outputs: &[BoxCandidate],
    tokens_to_burn: &[Token],
) -> Result<(), ReductionError> {
    let available = totals(inputs.iter().flat_map(|b| b.tokens().iter()))?;
    let produced = totals(outputs.iter().flat_map(|c| c.tokens.iter()))?;
    let burned = totals(tokens_to_burn.iter())?;
    let mint_id = inputs.first().map(|b| TokenId::from(b.id()));

    if produced
        .keys()
        .any(|id| !available.contains_key(id) && Some(*id) != mint_id)
    {
        return Err(ReductionError::InconsistentTransaction(
            "output token is neither spent nor minted",
        ));
    }
    if burned.keys().any(|id| !available.contains_key(id)) {
        return Err(ReductionError::InconsistentTransaction(
            "burned token is not among the inputs",
        ));
    }
    for (id, have) in available.iter() {
        let out = produced.get(id).copied().unwrap_or(0);
        let burn = burned.get(id).copied().unwrap_or(0);
        let spent = out
            .checked_add(burn)
            .ok_or(ReductionError::InconsistentTransaction("token amount overflow"))?;
        if spent > *have {
            return Err(ReductionError::InconsistentTransaction(if burn > 0 {
                "burning more tokens than available"
            } else {
                "outputs hold more tokens than the inputs"
            }));
        }
        if spent < *have {
            return Err(ReductionError::InconsistentTransaction(
                "token surplus is neither spent nor burned",
            ));
        }
    }
    Ok(())
}

fn totals<'a>(tokens: impl Iterator<Item = &'a Token>) -> Result<BTreeMap<TokenId, u64>, ReductionError> {
    let mut map = BTreeMap::new();
    for t in tokens {
        let entry = map.entry(t.id).or_insert(0u64);
        *entry = entry
            .checked_add(t.amount)
            .ok_or(ReductionError::InconsistentTransaction("token amount overflow"))?;
    }
    Ok(map)
}

impl Encodable for Token {
    fn encode(&self, w: &mut impl Writer) {
        w.write(b"token_id", &self.id.0);
        w.write_u64(b"amount", self.amount);
    }
}

impl Decodable for Token {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        Ok(Token {
            id: TokenId(r.read_u8x32()?),
            amount: r.read_u64()?,
        })
    }
}

impl Encodable for BoxCandidate {
    fn encode(&self, w: &mut impl Writer) {
        w.write_u64(b"value", self.value);
        w.write_bytes(b"condition", &self.condition.to_bytes());
        w.write_u32(b"creation_height", self.creation_height);
        w.write_size(b"tokens", self.tokens.len());
        for t in &self.tokens {
            t.encode(w);
        }
        w.write_size(b"registers", self.registers.len());
        for v in &self.registers {
            v.encode(w);
        }
    }
}

impl Decodable for BoxCandidate {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        let value = r.read_u64()?;
        let condition = ConditionTree::from_bytes(r.read_bytes()?)?;
        let creation_height = r.read_u32()?;
        let n = r.read_size()?;
        if n > MAX_TOKENS {
            return Err(CodecError::InvalidFormat("too many tokens"));
        }
        let tokens = (0..n)
            .map(|_| Token::decode(r))
            .collect::<Result<Vec<_>, _>>()?;
        let n = r.read_size()?;
        if n > MAX_REGISTERS {
            return Err(CodecError::InvalidFormat("too many registers"));
        }
        let registers = (0..n)
            .map(|_| Value::decode(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BoxCandidate {
            value,
            condition,
            tokens,
            registers,
            creation_height,
        })
    }
}

impl Encodable for TxBox {
    fn encode(&self, w: &mut impl Writer) {
        self.candidate.encode(w);
        w.write(b"tx_id", &self.transaction_id.0);
        w.write_u32(b"index", self.index as u32);
    }
}

impl Decodable for TxBox {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        let candidate = BoxCandidate::decode(r)?;
        let transaction_id = TxId(r.read_u8x32()?);
        let index = r.read_u32()?;
        if index > u16::MAX as u32 {
            return Err(CodecError::InvalidFormat("output index out of range"));
        }
        Ok(TxBox {
            candidate,
            transaction_id,
            index: index as u16,
        })
    }
}

fn encode_tail(data_inputs: &[DataInput], outputs: &[BoxCandidate], w: &mut impl Writer) {
    w.write_size(b"data_inputs", data_inputs.len());
    for d in data_inputs {
        w.write(b"box_id", &d.box_id.0);
    }
    w.write_size(b"outputs", outputs.len());
    for o in outputs {
        o.encode(w);
    }
}

impl Encodable for UnsignedTx {
    fn encode(&self, w: &mut impl Writer) {
        w.write_size(b"inputs", self.inputs.len());
        for i in &self.inputs {
            w.write(b"box_id", &i.box_id.0);
            w.write_bytes(b"proof", &[]);
            i.extension.encode(w);
        }
        encode_tail(&self.data_inputs, &self.outputs, w);
    }
}

impl Encodable for SignedTx {
    fn encode(&self, w: &mut impl Writer) {
        w.write_size(b"inputs", self.inputs.len());
        for i in &self.inputs {
            w.write(b"box_id", &i.box_id.0);
            w.write_bytes(b"proof", i.proof.as_bytes());
            i.extension.encode(w);
        }
        encode_tail(&self.data_inputs, &self.outputs, w);
    }
}

impl Decodable for SignedTx {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        let n = r.read_size()?;
        let mut inputs = Vec::new();
        for _ in 0..n {
            inputs.push(SignedInput {
                box_id: BoxId(r.read_u8x32()?),
                proof: Proof::from_bytes(r.read_bytes()?),
                extension: ContextExtension::decode(r)?,
            });
        }
        let n = r.read_size()?;
        let mut data_inputs = Vec::new();
        for _ in 0..n {
            data_inputs.push(DataInput {
                box_id: BoxId(r.read_u8x32()?),
            });
        }
        let n = r.read_size()?;
        if n > MAX_OUTPUTS {
            return Err(CodecError::InvalidFormat("too many outputs"));
        }
        let mut outputs = Vec::new();
        for _ in 0..n {
            outputs.push(BoxCandidate::decode(r)?);
        }
        Ok(SignedTx {
            inputs,
            data_inputs,
            outputs,
        })
    }
}
