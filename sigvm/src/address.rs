//! Addresses: a network prefix plus one of three ways of naming a condition.
//!
//! Encoding:
//! ```ascii
//! prefix || content || checksum
//! prefix   = network | address type
//! content  = point (P2PK) | condition bytes (P2S) | 24-byte script hash (P2SH)
//! checksum = blake3(prefix || content)[0..4]
//! ```
//! The string form is the base58 (Bitcoin alphabet) of the encoding.

use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

use curve25519_dalek::ristretto::CompressedRistretto;
use sigma::{CodecError, Encodable, Proposition, SecretStore, SliceReader, Statement};

use crate::condition::ConditionTree;
use crate::ops::{CmpOp, Expr};
use crate::types::{SType, Value};

/// Length of a P2SH script hash.
pub const SCRIPT_HASH_LEN: usize = 24;

const CHECKSUM_LEN: usize = 4;

/// Context variable a P2SH spender puts the script bytes in.
pub const P2SH_SCRIPT_VAR: u8 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NetworkPrefix {
    Mainnet = 0x00,
    Testnet = 0x10,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    /// Pay to the holder of the discrete log of a point.
    P2PK(CompressedRistretto),
    /// Pay to an arbitrary condition, carried as its bytes.
    P2S(Vec<u8>),
    /// Pay to whoever reveals a script with this hash and satisfies it.
    P2SH([u8; SCRIPT_HASH_LEN]),
}

/// An address bound to a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkAddress {
    network: NetworkPrefix,
    address: Address,
}

impl NetworkPrefix {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(NetworkPrefix::Mainnet),
            0x10 => Some(NetworkPrefix::Testnet),
            _ => None,
        }
    }
}

impl Address {
    const P2PK_TYPE: u8 = 0x01;
    const P2SH_TYPE: u8 = 0x02;
    const P2S_TYPE: u8 = 0x03;

    /// P2PK when `condition` is a bare discrete-log proposition, P2S otherwise.
    pub fn from_condition(condition: &ConditionTree) -> Self {
        match condition.as_proposition() {
            Some(Proposition::Leaf(Statement::Dlog(y))) => Address::P2PK(*y),
            _ => Address::P2S(condition.to_bytes()),
        }
    }

    pub fn from_proposition(prop: &Proposition) -> Self {
        match prop {
            Proposition::Leaf(Statement::Dlog(y)) => Address::P2PK(*y),
            _ => Address::P2S(ConditionTree::from_proposition(prop.clone()).to_bytes()),
        }
    }

    /// P2SH address of `script`. A spender supplies the encoding of
    /// `script` in context variable `P2SH_SCRIPT_VAR`.
    pub fn p2sh(script: &Expr) -> Self {
        Address::P2SH(script_hash(&script.encode_to_vec()))
    }

    /// Condition a box paying to this address is locked by.
    pub fn to_condition(&self) -> Result<ConditionTree, CodecError> {
        match self {
            Address::P2PK(y) => Ok(ConditionTree::from_proposition(Proposition::dlog(*y))),
            Address::P2S(bytes) => ConditionTree::from_bytes(bytes),
            Address::P2SH(hash) => Ok(ConditionTree::new(p2sh_condition(hash))),
        }
    }

    pub fn to_proposition_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.to_condition()?.to_bytes())
    }

    pub fn is_p2pk(&self) -> bool {
        matches!(self, Address::P2PK(_))
    }

    pub fn is_p2s(&self) -> bool {
        matches!(self, Address::P2S(_))
    }

    pub fn is_p2sh(&self) -> bool {
        matches!(self, Address::P2SH(_))
    }

    fn type_byte(&self) -> u8 {
        match self {
            Address::P2PK(_) => Self::P2PK_TYPE,
            Address::P2SH(_) => Self::P2SH_TYPE,
            Address::P2S(_) => Self::P2S_TYPE,
        }
    }

    fn content(&self) -> &[u8] {
        match self {
            Address::P2PK(y) => y.as_bytes(),
            Address::P2S(bytes) => bytes,
            Address::P2SH(hash) => hash,
        }
    }
}

fn script_hash(bytes: &[u8]) -> [u8; SCRIPT_HASH_LEN] {
    let mut hash = [0u8; SCRIPT_HASH_LEN];
    hash.copy_from_slice(&blake3::hash(bytes).as_bytes()[..SCRIPT_HASH_LEN]);
    hash
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut sum = [0u8; CHECKSUM_LEN];
    sum.copy_from_slice(&blake3::hash(data).as_bytes()[..CHECKSUM_LEN]);
    sum
}

// `sigmaProp(blake3(getVar[Coll[Byte]](1).get).slice(0, 24) == hash) && deserializeContext(1)`
fn p2sh_condition(hash: &[u8; SCRIPT_HASH_LEN]) -> Expr {
    let script = Expr::OptionGet(Box::new(Expr::GetVar(P2SH_SCRIPT_VAR, SType::bytes())));
    let prefix = Expr::Slice(
        Box::new(Expr::Blake3(Box::new(script))),
        Box::new(Expr::constant(0)),
        Box::new(Expr::constant(SCRIPT_HASH_LEN as i32)),
    );
    let matches = Expr::Compare(
        CmpOp::Eq,
        Box::new(prefix),
        Box::new(Expr::constant(Value::of_bytes(hash.to_vec()))),
    );
    Expr::SigmaAnd(vec![
        Expr::BoolToSigma(Box::new(matches)),
        Expr::DeserializeContext(P2SH_SCRIPT_VAR, SType::SigmaProp),
    ])
}

impl NetworkAddress {
    pub fn new(network: NetworkPrefix, address: Address) -> Self {
        NetworkAddress { network, address }
    }

    pub fn network(&self) -> NetworkPrefix {
        self.network
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// P2PK address of the master key of `store`.
    pub fn master_p2pk(network: NetworkPrefix, store: &SecretStore) -> Option<Self> {
        store
            .master_public_key()
            .map(|y| NetworkAddress::new(network, Address::P2PK(*y)))
    }

    /// P2PK addresses of the keys derived at `[ACCOUNT, index]`, in the
    /// order the store derived them.
    pub fn derived_p2pk(network: NetworkPrefix, store: &SecretStore) -> Vec<Self> {
        store
            .derived_public_keys()
            .iter()
            .map(|(_, y)| NetworkAddress::new(network, Address::P2PK(*y)))
            .collect()
    }

    pub fn is_mainnet(&self) -> bool {
        self.network == NetworkPrefix::Mainnet
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let content = self.address.content();
        let mut bytes = Vec::with_capacity(1 + content.len() + CHECKSUM_LEN);
        bytes.push(self.network as u8 | self.address.type_byte());
        bytes.extend_from_slice(content);
        let sum = checksum(&bytes);
        bytes.extend_from_slice(&sum);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < 1 + CHECKSUM_LEN {
            return Err(CodecError::UnexpectedEnd);
        }
        let (body, sum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if checksum(body) != sum {
            return Err(CodecError::InvalidFormat("address checksum mismatch"));
        }
        let prefix = body[0];
        let content = &body[1..];
        let network = NetworkPrefix::from_u8(prefix & 0xf0)
            .ok_or(CodecError::InvalidFormat("unknown network prefix"))?;
        let address = match prefix & 0x0f {
            Address::P2PK_TYPE => Address::P2PK(SliceReader::parse(content, |r| r.read_point())?),
            Address::P2SH_TYPE => Address::P2SH(
                content
                    .try_into()
                    .map_err(|_| CodecError::InvalidFormat("script hash must be 24 bytes"))?,
            ),
            Address::P2S_TYPE => Address::P2S(content.to_vec()),
            _ => return Err(CodecError::InvalidFormat("unknown address type")),
        };
        Ok(NetworkAddress { network, address })
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.to_bytes()).into_string())
    }
}

impl FromStr for NetworkAddress {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| CodecError::InvalidFormat("address is not valid base58"))?;
        Self::from_bytes(&bytes)
    }
}
