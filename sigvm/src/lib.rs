//! Spending conditions for a box-based ledger.
//!
//! A box is locked by a compiled `ConditionTree`. To spend it, the
//! condition is reduced against the transaction context to a sigma
//! `Proposition`, with every step charged against a cost limit. The
//! reduced transaction carries no secrets and can be handed to a separate
//! signer, which proves each proposition over the transaction's bytes.

mod address;
mod condition;
mod context;
mod cost;
mod envelope;
mod errors;
mod ops;
mod params;
mod reducer;
mod session;
mod tx;
mod types;

pub use self::address::{Address, NetworkAddress, NetworkPrefix, P2SH_SCRIPT_VAR, SCRIPT_HASH_LEN};
pub use self::condition::{ConditionTree, ParsedTree, MAX_SCRIPT_VERSION};
pub use self::context::{
    AvlTreeData, BlockchainStateContext, ContextExtension, ExecutionContext, Header, PreHeader,
    TransactionContext, LAST_HEADERS, STATE_DIGEST_LEN,
};
pub use self::cost::{CostAccumulator, DH_TUPLE_VERIFY_COST, DLOG_VERIFY_COST};
pub use self::envelope::{ReducedInput, ReducedTransaction, ENVELOPE_VERSION};
pub use self::errors::{EnvelopeError, ReductionError, SessionError, TxError, TypeError};
pub use self::ops::{
    ArithOp, AvlTreeField, BoxField, CmpOp, ContextField, Expr, HeaderField, Lambda, Opcode,
    PreHeaderField, MAX_EXPR_DEPTH,
};
pub use self::params::BlockchainParameters;
pub use self::reducer::{reduce, ReductionResult};
pub use self::session::{BuiltTransaction, SignedTransaction};
pub use self::tx::{
    check_token_balance, BoxCandidate, BoxId, DataInput, SignedInput, SignedTx, Token, TokenId,
    TxBox, TxId, UnsignedInput, UnsignedTx, MAX_OUTPUTS, MAX_REGISTERS, MAX_TOKENS,
};
pub use self::types::{Coll, SType, Value, MAX_TUPLE_ARITY};
