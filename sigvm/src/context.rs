//! Blockchain and transaction context visible to a spending condition.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::I256;
use curve25519_dalek::ristretto::CompressedRistretto;
use sigma::{CodecError, Decodable, Encodable, SliceReader, Writer};

use crate::params::BlockchainParameters;
use crate::tx::TxBox;
use crate::types::Value;

/// Number of recent headers a state context carries.
pub const LAST_HEADERS: usize = 10;

/// Length of a state digest: a 32-byte root plus the tree height.
pub const STATE_DIGEST_LEN: usize = 33;

const INSERT_ALLOWED: u8 = 0x01;
const UPDATE_ALLOWED: u8 = 0x02;
const REMOVE_ALLOWED: u8 = 0x04;

/// Authenticated state tree, as seen by a condition: its digest and the
/// operations a proof against it may perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvlTreeData {
    pub digest: [u8; STATE_DIGEST_LEN],
    pub insert_allowed: bool,
    pub update_allowed: bool,
    pub remove_allowed: bool,
    pub key_length: u32,
    /// Length of every value, when values have a fixed length.
    pub value_length_opt: Option<u32>,
}

impl AvlTreeData {
    /// Tree with `digest` allowing every operation on keys of `key_length` bytes.
    pub fn new(digest: [u8; STATE_DIGEST_LEN], key_length: u32) -> Self {
        AvlTreeData {
            digest,
            insert_allowed: true,
            update_allowed: true,
            remove_allowed: true,
            key_length,
            value_length_opt: None,
        }
    }

    /// Allowed operations as flag bits: insert, update, remove.
    pub fn enabled_operations(&self) -> u8 {
        let mut flags = 0;
        if self.insert_allowed {
            flags |= INSERT_ALLOWED;
        }
        if self.update_allowed {
            flags |= UPDATE_ALLOWED;
        }
        if self.remove_allowed {
            flags |= REMOVE_ALLOWED;
        }
        flags
    }
}

impl Encodable for AvlTreeData {
    fn encode(&self, w: &mut impl Writer) {
        w.write(b"digest", &self.digest);
        w.write_u8(b"flags", self.enabled_operations());
        w.write_u32(b"key_length", self.key_length);
        match self.value_length_opt {
            None => w.write_u8(b"some", 0),
            Some(n) => {
                w.write_u8(b"some", 1);
                w.write_u32(b"value_length", n);
            }
        }
    }
}

impl Decodable for AvlTreeData {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        let digest = read_array(r)?;
        let flags = r.read_u8()?;
        if flags & !(INSERT_ALLOWED | UPDATE_ALLOWED | REMOVE_ALLOWED) != 0 {
            return Err(CodecError::InvalidFormat("unknown state tree operation flags"));
        }
        let key_length = r.read_u32()?;
        let value_length_opt = match r.read_u8()? {
            0 => None,
            1 => Some(r.read_u32()?),
            _ => return Err(CodecError::InvalidFormat("option flag must be 0 or 1")),
        };
        Ok(AvlTreeData {
            digest,
            insert_allowed: flags & INSERT_ALLOWED != 0,
            update_allowed: flags & UPDATE_ALLOWED != 0,
            remove_allowed: flags & REMOVE_ALLOWED != 0,
            key_length,
            value_length_opt,
        })
    }
}

/// Fields of the block being assembled, known before it is mined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreHeader {
    pub version: u8,
    pub parent_id: [u8; 32],
    pub timestamp: u64,
    pub n_bits: u64,
    pub height: u32,
    pub miner_pk: CompressedRistretto,
    pub votes: [u8; 3],
}

/// Header of a mined block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub id: [u8; 32],
    pub version: u8,
    pub parent_id: [u8; 32],
    pub ad_proofs_root: [u8; 32],
    pub state_root: AvlTreeData,
    pub transactions_root: [u8; 32],
    pub timestamp: u64,
    pub n_bits: u64,
    pub height: u32,
    pub extension_root: [u8; 32],
    pub miner_pk: CompressedRistretto,
    pub pow_onetime_pk: CompressedRistretto,
    pub pow_nonce: [u8; 8],
    pub pow_distance: I256,
    pub votes: [u8; 3],
}

/// Recent chain state a transaction is evaluated against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockchainStateContext {
    /// Most recent first, at most `LAST_HEADERS`.
    pub last_headers: Vec<Header>,
    pub previous_state_digest: [u8; STATE_DIGEST_LEN],
    pub pre_header: PreHeader,
}

/// Prover-supplied variables, read by `GetVar` and `DeserializeContext`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextExtension {
    values: BTreeMap<u8, Value>,
}

/// Data shared by the inputs of one transaction.
#[derive(Clone, Debug)]
pub struct TransactionContext {
    pub inputs: Vec<Arc<TxBox>>,
    pub data_inputs: Vec<Arc<TxBox>>,
    pub outputs: Vec<Arc<TxBox>>,
    pub state: BlockchainStateContext,
    pub parameters: BlockchainParameters,
}

/// Everything a condition sees while one input is reduced.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionContext<'a> {
    pub tx: &'a TransactionContext,
    pub self_index: usize,
    pub extension: &'a ContextExtension,
    /// Highest script version the network accepts.
    pub activated_version: u8,
}

impl PreHeader {
    /// Script version activated by a block of this version.
    pub fn activated_script_version(&self) -> u8 {
        self.version.saturating_sub(1)
    }
}

impl ContextExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: u8, value: Value) -> Self {
        self.values.insert(id, value);
        self
    }

    pub fn insert(&mut self, id: u8, value: Value) -> Option<Value> {
        self.values.insert(id, value)
    }

    pub fn get(&self, id: u8) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

impl TransactionContext {
    /// Context for reducing input `self_index`.
    pub fn for_input<'a>(
        &'a self,
        self_index: usize,
        extension: &'a ContextExtension,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            tx: self,
            self_index,
            extension,
            activated_version: self.state.pre_header.activated_script_version(),
        }
    }
}

impl<'a> ExecutionContext<'a> {
    pub fn self_box(&self) -> Option<&'a Arc<TxBox>> {
        self.tx.inputs.get(self.self_index)
    }

    pub fn height(&self) -> u32 {
        self.tx.state.pre_header.height
    }
}

fn read_array<const N: usize>(r: &mut SliceReader) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(r.read(N)?);
    Ok(buf)
}

impl Encodable for PreHeader {
    fn encode(&self, w: &mut impl Writer) {
        w.write_u8(b"version", self.version);
        w.write(b"parent_id", &self.parent_id);
        w.write_u64(b"timestamp", self.timestamp);
        w.write_u64(b"n_bits", self.n_bits);
        w.write_u32(b"height", self.height);
        w.write_point(b"miner_pk", &self.miner_pk);
        w.write(b"votes", &self.votes);
    }
}

impl Decodable for PreHeader {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        Ok(PreHeader {
            version: r.read_u8()?,
            parent_id: r.read_u8x32()?,
            timestamp: r.read_u64()?,
            n_bits: r.read_u64()?,
            height: r.read_u32()?,
            miner_pk: r.read_point()?,
            votes: read_array(r)?,
        })
    }
}

impl Encodable for Header {
    fn encode(&self, w: &mut impl Writer) {
        w.write(b"id", &self.id);
        w.write_u8(b"version", self.version);
        w.write(b"parent_id", &self.parent_id);
        w.write(b"ad_proofs_root", &self.ad_proofs_root);
        self.state_root.encode(w);
        w.write(b"transactions_root", &self.transactions_root);
        w.write_u64(b"timestamp", self.timestamp);
        w.write_u64(b"n_bits", self.n_bits);
        w.write_u32(b"height", self.height);
        w.write(b"extension_root", &self.extension_root);
        w.write_point(b"miner_pk", &self.miner_pk);
        w.write_point(b"pow_onetime_pk", &self.pow_onetime_pk);
        w.write(b"pow_nonce", &self.pow_nonce);
        w.write(b"pow_distance", &self.pow_distance.to_be_bytes::<32>());
        w.write(b"votes", &self.votes);
    }
}

impl Decodable for Header {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        Ok(Header {
            id: r.read_u8x32()?,
            version: r.read_u8()?,
            parent_id: r.read_u8x32()?,
            ad_proofs_root: r.read_u8x32()?,
            state_root: AvlTreeData::decode(r)?,
            transactions_root: r.read_u8x32()?,
            timestamp: r.read_u64()?,
            n_bits: r.read_u64()?,
            height: r.read_u32()?,
            extension_root: r.read_u8x32()?,
            miner_pk: r.read_point()?,
            pow_onetime_pk: r.read_point()?,
            pow_nonce: read_array(r)?,
            pow_distance: I256::from_be_bytes(r.read_u8x32()?),
            votes: read_array(r)?,
        })
    }
}

impl Encodable for ContextExtension {
    fn encode(&self, w: &mut impl Writer) {
        w.write_size(b"n", self.values.len());
        for (id, v) in self.values.iter() {
            w.write_u8(b"id", *id);
            v.encode(w);
        }
    }
}

impl Decodable for ContextExtension {
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError> {
        let n = r.read_size()?;
        let mut values = BTreeMap::new();
        for _ in 0..n {
            let id = r.read_u8()?;
            let v = Value::decode(r)?;
            if values.insert(id, v).is_some() {
                return Err(CodecError::InvalidFormat("duplicate context variable"));
            }
        }
        Ok(ContextExtension { values })
    }
}
