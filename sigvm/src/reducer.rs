//! Reduction of a spending condition to a sigma proposition.
//!
//! The condition is evaluated as an expression over the execution context.
//! Every node charges its fixed cost before it runs, collection and hash
//! operations charge per item or per chunk, and the verification cost of
//! the produced proposition is charged last. Evaluation stops at the first
//! charge that would cross the limit. Both the expression and the produced
//! proposition are bounded in depth.

use std::convert::TryFrom;
use std::sync::Arc;

use alloy_primitives::I256;
use curve25519_dalek::ristretto::CompressedRistretto;
use sha2::{Digest, Sha256};
use sigma::{CodecError, Proposition, SliceReader, MAX_CHILDREN, MAX_DEPTH};

use crate::condition::ConditionTree;
use crate::context::{AvlTreeData, ExecutionContext, Header, PreHeader};
use crate::cost::{self, CostAccumulator};
use crate::errors::ReductionError;
use crate::ops::{
    ArithOp, AvlTreeField, BoxField, CmpOp, ContextField, Expr, HeaderField, Lambda,
    PreHeaderField, MAX_EXPR_DEPTH,
};
use crate::tx::TxBox;
use crate::types::{Coll, SType, Value, MAX_TUPLE_ARITY};

/// Proposition produced by a condition, with the cost of producing and checking it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReductionResult {
    pub proposition: Proposition,
    pub cost: u64,
}

/// Reduces `condition` in `ctx`, failing once the cost would exceed `cost_limit`.
pub fn reduce(
    condition: &ConditionTree,
    ctx: &ExecutionContext,
    cost_limit: u64,
) -> Result<ReductionResult, ReductionError> {
    let root = condition.root().ok_or(ReductionError::UnsupportedOperation(
        "condition uses a script version or opcode this library does not know",
    ))?;
    if condition.version() > ctx.activated_version {
        return Err(ReductionError::UnsupportedOperation(
            "script version is not activated",
        ));
    }

    let mut ev = Evaluator {
        ctx: *ctx,
        constants: condition.constants(),
        env: Vec::new(),
        cost: CostAccumulator::new(cost_limit),
        version: condition.version(),
        nested: false,
        depth: 0,
    };
    let proposition = match ev.eval(root)? {
        Value::Bool(b) => Proposition::Trivial(b),
        Value::SigmaProp(p) => p,
        _ => {
            return Err(ReductionError::MalformedCondition(
                "condition must evaluate to a boolean or a sigma proposition",
            ))
        }
    };
    if proposition.depth() > MAX_DEPTH {
        return Err(ReductionError::MalformedCondition(
            "proposition nested too deeply",
        ));
    }
    ev.cost.add(cost::verification_cost(&proposition))?;
    Ok(ReductionResult {
        proposition,
        cost: ev.cost.accumulated(),
    })
}

struct Evaluator<'a> {
    ctx: ExecutionContext<'a>,
    constants: &'a [Value],
    env: Vec<(u32, Value)>,
    cost: CostAccumulator,
    version: u8,
    // inside a script read from a context variable
    nested: bool,
    // depth of the node being evaluated, counting into nested scripts
    depth: usize,
}

fn malformed(msg: &'static str) -> ReductionError {
    ReductionError::MalformedCondition(msg)
}

fn failed(msg: &'static str) -> ReductionError {
    ReductionError::EvaluationFailed(msg)
}

enum Operands {
    Small(SType, i64, i64),
    Big(I256, I256),
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, e: &Expr) -> Result<Value, ReductionError> {
        if self.depth > MAX_EXPR_DEPTH {
            return Err(malformed("condition nested too deeply"));
        }
        self.depth += 1;
        let result = self.eval_node(e);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, e: &Expr) -> Result<Value, ReductionError> {
        self.cost.add(cost::opcode_cost(e.opcode()))?;
        match e {
            Expr::Const(v) => Ok(v.clone()),
            Expr::ConstPlaceholder(i) => self
                .constants
                .get(*i as usize)
                .cloned()
                .ok_or_else(|| malformed("constant placeholder out of range")),
            Expr::ValUse(id) => self
                .env
                .iter()
                .rev()
                .find(|(k, _)| k == id)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| malformed("unbound variable")),
            Expr::BlockValue(defs, body) => {
                let mark = self.env.len();
                for (id, rhs) in defs {
                    let v = self.eval(rhs)?;
                    self.env.push((*id, v));
                }
                let result = self.eval(body);
                self.env.truncate(mark);
                result
            }
            Expr::Tuple(items) => {
                if items.len() > MAX_TUPLE_ARITY {
                    return Err(malformed("tuple has too many items"));
                }
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Tuple(values))
            }
            Expr::CollOf(elem, items) => {
                self.cost.add_per(items.len(), cost::PER_ITEM_COST)?;
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::coll_of(values, elem.clone())?)
            }
            Expr::Context(field) => self.context_field(*field),
            Expr::GetVar(id, t) => match self.ctx.extension.get(*id) {
                None => Ok(Value::Opt(t.clone(), None)),
                Some(v) if v.tpe() == *t => Ok(Value::Opt(t.clone(), Some(Box::new(v.clone())))),
                Some(_) => Err(malformed("context variable has a different type")),
            },
            Expr::Extract(field, b) => {
                let b = self.eval_box(b)?;
                self.box_field(&b, *field)
            }
            Expr::Register(b, reg, t) => {
                let b = self.eval_box(b)?;
                match b.register(*reg) {
                    None => Ok(Value::Opt(t.clone(), None)),
                    Some(v) if v.tpe() == *t => {
                        Ok(Value::Opt(t.clone(), Some(Box::new(v.clone()))))
                    }
                    Some(_) => Err(malformed("register holds a different type")),
                }
            }
            Expr::HeaderField(field, h) => match self.eval(h)? {
                Value::Header(h) => header_field(&h, *field),
                _ => Err(malformed("expected a header")),
            },
            Expr::PreHeaderField(field, h) => match self.eval(h)? {
                Value::PreHeader(h) => pre_header_field(&h, *field),
                _ => Err(malformed("expected a pre-header")),
            },
            Expr::AvlTreeField(field, t) => match self.eval(t)? {
                Value::AvlTree(t) => avl_tree_field(&t, *field),
                _ => Err(malformed("expected a state tree")),
            },
            Expr::Arith(op, a, b) => match self.eval_numeric_pair(a, b)? {
                Operands::Small(t, x, y) => Value::from_i64(&t, small_arith(*op, x, y)?)
                    .ok_or_else(|| failed("arithmetic overflow")),
                Operands::Big(x, y) => big_arith(*op, x, y).map(Value::BigInt),
            },
            Expr::Negate(a) => match self.eval(a)? {
                Value::BigInt(x) => x
                    .checked_neg()
                    .map(Value::BigInt)
                    .ok_or_else(|| failed("arithmetic overflow")),
                v => {
                    let t = v.tpe();
                    let n = v.as_i64().ok_or_else(|| malformed("expected a number"))?;
                    n.checked_neg()
                        .and_then(|n| Value::from_i64(&t, n))
                        .ok_or_else(|| failed("arithmetic overflow"))
                }
            },
            Expr::ToBigInt(a) => match self.eval(a)? {
                v @ Value::BigInt(_) => Ok(v),
                v => {
                    let n = v.as_i64().ok_or_else(|| malformed("expected a number"))?;
                    I256::try_from(n)
                        .map(Value::BigInt)
                        .map_err(|_| failed("arithmetic overflow"))
                }
            },
            Expr::Compare(CmpOp::Eq, a, b) => self.eval_equal(a, b).map(Value::Bool),
            Expr::Compare(CmpOp::Neq, a, b) => self.eval_equal(a, b).map(|eq| Value::Bool(!eq)),
            Expr::Compare(op, a, b) => Ok(Value::Bool(match self.eval_numeric_pair(a, b)? {
                Operands::Small(_, x, y) => compare(*op, x, y),
                Operands::Big(x, y) => compare(*op, x, y),
            })),
            Expr::BinAnd(a, b) => Ok(Value::Bool(self.eval_bool(a)? && self.eval_bool(b)?)),
            Expr::BinOr(a, b) => Ok(Value::Bool(self.eval_bool(a)? || self.eval_bool(b)?)),
            Expr::Not(a) => Ok(Value::Bool(!self.eval_bool(a)?)),
            Expr::If(c, t, e) => {
                if self.eval_bool(c)? {
                    self.eval(t)
                } else {
                    self.eval(e)
                }
            }
            Expr::AllOf(c) => {
                let bools = self.eval_bools(c)?;
                Ok(Value::Bool(bools.into_iter().all(|b| b)))
            }
            Expr::AnyOf(c) => {
                let bools = self.eval_bools(c)?;
                Ok(Value::Bool(bools.into_iter().any(|b| b)))
            }
            Expr::SizeOf(c) => {
                let c = self.eval_coll(c)?;
                int_of(c.len())
            }
            Expr::ByIndex(c, i, default) => {
                let c = self.eval_coll(c)?;
                let i = self.eval_int(i)?;
                let item = usize::try_from(i).ok().and_then(|i| c.get(i));
                match (item, default) {
                    (Some(v), _) => Ok(v),
                    (None, Some(d)) => self.eval(d),
                    (None, None) => Err(failed("index out of bounds")),
                }
            }
            Expr::Slice(c, from, until) => {
                let c = self.eval_coll(c)?;
                let from = self.eval_int(from)?;
                let until = self.eval_int(until)?;
                let len = c.len();
                let until = clamp(until, len);
                let from = clamp(from, len).min(until);
                self.cost.add_per(until - from, cost::PER_ITEM_COST)?;
                Ok(Value::Coll(c.slice(from, until)))
            }
            Expr::Map(c, l) => {
                let c = self.eval_coll(c)?;
                self.cost.add_per(c.len(), cost::PER_ITEM_COST)?;
                let mut out = Vec::with_capacity(c.len());
                for item in c.to_values() {
                    out.push(self.apply(l, item)?);
                }
                Ok(Value::coll_of(out, l.ret.clone())?)
            }
            Expr::Filter(c, l) => {
                let c = self.eval_coll(c)?;
                self.cost.add_per(c.len(), cost::PER_ITEM_COST)?;
                let elem = c.elem_type();
                let mut kept = Vec::new();
                for item in c.to_values() {
                    if self.apply_bool(l, item.clone())? {
                        kept.push(item);
                    }
                }
                Ok(Value::Coll(Coll::from_values(elem, kept)))
            }
            Expr::Exists(c, l) => {
                let c = self.eval_coll(c)?;
                for item in c.to_values() {
                    self.cost.add(cost::PER_ITEM_COST)?;
                    if self.apply_bool(l, item)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::ForAll(c, l) => {
                let c = self.eval_coll(c)?;
                for item in c.to_values() {
                    self.cost.add(cost::PER_ITEM_COST)?;
                    if !self.apply_bool(l, item)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Fold(c, zero, l) => {
                let c = self.eval_coll(c)?;
                let mut acc = self.eval(zero)?;
                self.cost.add_per(c.len(), cost::PER_ITEM_COST)?;
                for item in c.to_values() {
                    acc = self.apply(l, Value::pair_of(acc, item))?;
                }
                Ok(acc)
            }
            Expr::SelectField(t, i) => match self.eval(t)? {
                Value::Tuple(mut items) => {
                    let i = (*i as usize)
                        .checked_sub(1)
                        .filter(|i| *i < items.len())
                        .ok_or_else(|| malformed("tuple field out of range"))?;
                    Ok(items.swap_remove(i))
                }
                _ => Err(malformed("expected a tuple")),
            },
            Expr::OptionGet(o) => self
                .eval_option(o)?
                .ok_or_else(|| failed("get on an empty option")),
            Expr::OptionIsDefined(o) => Ok(Value::Bool(self.eval_option(o)?.is_some())),
            Expr::OptionGetOrElse(o, default) => match self.eval_option(o)? {
                Some(v) => Ok(v),
                None => self.eval(default),
            },
            Expr::Sha256(b) => {
                let bytes = self.eval_bytes(b)?;
                self.cost.add_per(cost::hash_chunks(bytes.len()), cost::HASH_CHUNK_COST)?;
                Ok(Value::of_bytes(Sha256::digest(&bytes).to_vec()))
            }
            Expr::Blake3(b) => {
                let bytes = self.eval_bytes(b)?;
                self.cost.add_per(cost::hash_chunks(bytes.len()), cost::HASH_CHUNK_COST)?;
                Ok(Value::of_bytes(blake3::hash(&bytes).as_bytes().to_vec()))
            }
            Expr::ProveDlog(p) => {
                let y = self.eval_point(p)?;
                Ok(Value::SigmaProp(Proposition::dlog(y)))
            }
            Expr::ProveDhTuple(g, h, u, v) => {
                let g = self.eval_point(g)?;
                let h = self.eval_point(h)?;
                let u = self.eval_point(u)?;
                let v = self.eval_point(v)?;
                Ok(Value::SigmaProp(Proposition::dh_tuple(g, h, u, v)))
            }
            Expr::SigmaAnd(items) => {
                let props = self.eval_props(items)?;
                Ok(Value::SigmaProp(Proposition::and(props)))
            }
            Expr::SigmaOr(items) => {
                let props = self.eval_props(items)?;
                Ok(Value::SigmaProp(Proposition::or(props)))
            }
            Expr::AtLeast(k, c) => {
                let k = self.eval_int(k)?;
                let props = match self.eval_coll(c)? {
                    Coll::Values(SType::SigmaProp, items) => items
                        .into_iter()
                        .map(|v| match v {
                            Value::SigmaProp(p) => Ok(p),
                            _ => Err(malformed("expected a sigma proposition")),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => return Err(malformed("expected a collection of sigma propositions")),
                };
                if props.len() > MAX_CHILDREN {
                    return Err(malformed("too many children in a threshold"));
                }
                self.cost.add_per(props.len(), cost::PER_ITEM_COST)?;
                // a bound of zero or less is always met
                let k = usize::try_from(k).unwrap_or(0);
                Ok(Value::SigmaProp(Proposition::threshold(k, props)))
            }
            Expr::BoolToSigma(b) => Ok(Value::SigmaProp(Proposition::Trivial(self.eval_bool(b)?))),
            Expr::DeserializeContext(id, t) => self.deserialize_context(*id, t),
        }
    }

    fn context_field(&mut self, field: ContextField) -> Result<Value, ReductionError> {
        let tx = self.ctx.tx;
        Ok(match field {
            ContextField::Height => int_of(self.ctx.height() as usize)?,
            ContextField::SelfBox => Value::Box(
                self.ctx
                    .self_box()
                    .cloned()
                    .ok_or(ReductionError::InconsistentTransaction("self index out of range"))?,
            ),
            ContextField::Inputs => self.boxes(&tx.inputs)?,
            ContextField::Outputs => self.boxes(&tx.outputs)?,
            ContextField::DataInputs => self.boxes(&tx.data_inputs)?,
            ContextField::Headers => {
                let headers = &tx.state.last_headers;
                self.cost.add_per(headers.len(), cost::PER_ITEM_COST)?;
                let items = headers
                    .iter()
                    .map(|h| Value::Header(Arc::new(h.clone())))
                    .collect();
                Value::Coll(Coll::Values(SType::Header, items))
            }
            ContextField::PreHeader => Value::PreHeader(Arc::new(tx.state.pre_header.clone())),
            ContextField::MinerPubKey => {
                Value::of_bytes(tx.state.pre_header.miner_pk.as_bytes().to_vec())
            }
            ContextField::LastBlockUtxoRoot => {
                Value::of_bytes(tx.state.previous_state_digest.to_vec())
            }
        })
    }

    fn boxes(&mut self, boxes: &[Arc<TxBox>]) -> Result<Value, ReductionError> {
        self.cost.add_per(boxes.len(), cost::PER_ITEM_COST)?;
        let items = boxes.iter().cloned().map(Value::Box).collect();
        Ok(Value::Coll(Coll::Values(SType::Box, items)))
    }

    fn box_field(&mut self, b: &TxBox, field: BoxField) -> Result<Value, ReductionError> {
        Ok(match field {
            BoxField::Value => long_of(b.value())?,
            BoxField::ScriptBytes => Value::of_bytes(b.condition().to_bytes()),
            BoxField::Id => Value::of_bytes(b.id().0.to_vec()),
            BoxField::CreationHeight => int_of(b.candidate.creation_height as usize)?,
            BoxField::Tokens => {
                self.cost.add_per(b.tokens().len(), cost::PER_ITEM_COST)?;
                let items = b
                    .tokens()
                    .iter()
                    .map(|t| Ok(Value::pair_of(Value::of_bytes(t.id.0.to_vec()), long_of(t.amount)?)))
                    .collect::<Result<Vec<_>, ReductionError>>()?;
                Value::Coll(Coll::Values(
                    SType::Tuple(vec![SType::bytes(), SType::Long]),
                    items,
                ))
            }
        })
    }

    fn deserialize_context(&mut self, id: u8, t: &SType) -> Result<Value, ReductionError> {
        if self.nested {
            return Err(malformed("scripts read from the context cannot read further scripts"));
        }
        let extension = self.ctx.extension;
        let bytes = match extension.get(id) {
            Some(Value::Coll(Coll::Bytes(b))) => b,
            Some(_) => return Err(malformed("context variable does not hold bytes")),
            None => return Err(failed("context variable is missing")),
        };
        self.cost.add_per(bytes.len(), cost::DESERIALIZE_BYTE_COST)?;
        let version = self.version;
        let script = SliceReader::parse(bytes, |r| Expr::decode_versioned(r, version)).map_err(
            |e| match e {
                CodecError::UnsupportedOpcode(_) => ReductionError::UnsupportedOperation(
                    "script in the context uses an opcode that is not active",
                ),
                _ => malformed("context variable does not hold a script"),
            },
        )?;

        // The nested script sees neither the outer constants nor its bindings.
        let constants = std::mem::replace(&mut self.constants, &[]);
        let env = std::mem::take(&mut self.env);
        self.nested = true;
        let result = self.eval(&script);
        self.nested = false;
        self.constants = constants;
        self.env = env;
        let value = result?;
        if value.tpe() != *t {
            return Err(malformed("script in the context has a different type"));
        }
        Ok(value)
    }

    fn apply(&mut self, l: &Lambda, arg: Value) -> Result<Value, ReductionError> {
        let (id, t) = match l.args.as_slice() {
            [single] => single,
            _ => return Err(malformed("collection lambdas take one argument")),
        };
        if arg.tpe() != *t {
            return Err(malformed("lambda argument has a different type"));
        }
        self.env.push((*id, arg));
        let result = self.eval(&l.body);
        self.env.pop();
        let value = result?;
        if value.tpe() != l.ret {
            return Err(malformed("lambda result has a different type"));
        }
        Ok(value)
    }

    fn apply_bool(&mut self, l: &Lambda, arg: Value) -> Result<bool, ReductionError> {
        match self.apply(l, arg)? {
            Value::Bool(b) => Ok(b),
            _ => Err(malformed("predicate must return a boolean")),
        }
    }

    fn eval_bool(&mut self, e: &Expr) -> Result<bool, ReductionError> {
        match self.eval(e)? {
            Value::Bool(b) => Ok(b),
            _ => Err(malformed("expected a boolean")),
        }
    }

    fn eval_int(&mut self, e: &Expr) -> Result<i32, ReductionError> {
        match self.eval(e)? {
            Value::Int(i) => Ok(i),
            _ => Err(malformed("expected an Int")),
        }
    }

    fn eval_point(&mut self, e: &Expr) -> Result<CompressedRistretto, ReductionError> {
        match self.eval(e)? {
            Value::GroupElement(p) => Ok(p),
            _ => Err(malformed("expected a group element")),
        }
    }

    fn eval_box(&mut self, e: &Expr) -> Result<Arc<TxBox>, ReductionError> {
        match self.eval(e)? {
            Value::Box(b) => Ok(b),
            _ => Err(malformed("expected a box")),
        }
    }

    fn eval_coll(&mut self, e: &Expr) -> Result<Coll, ReductionError> {
        match self.eval(e)? {
            Value::Coll(c) => Ok(c),
            _ => Err(malformed("expected a collection")),
        }
    }

    fn eval_bytes(&mut self, e: &Expr) -> Result<Vec<u8>, ReductionError> {
        match self.eval(e)? {
            Value::Coll(Coll::Bytes(b)) => Ok(b),
            _ => Err(malformed("expected a byte collection")),
        }
    }

    fn eval_option(&mut self, e: &Expr) -> Result<Option<Value>, ReductionError> {
        match self.eval(e)? {
            Value::Opt(_, v) => Ok(v.map(|v| *v)),
            _ => Err(malformed("expected an option")),
        }
    }

    fn eval_bools(&mut self, e: &Expr) -> Result<Vec<bool>, ReductionError> {
        let c = self.eval_coll(e)?;
        self.cost.add_per(c.len(), cost::PER_ITEM_COST)?;
        match c {
            Coll::Values(SType::Bool, items) => Ok(items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Bool(b) => Some(b),
                    _ => None,
                })
                .collect()),
            _ => Err(malformed("expected a collection of booleans")),
        }
    }

    fn eval_props(&mut self, items: &[Expr]) -> Result<Vec<Proposition>, ReductionError> {
        if items.len() > MAX_CHILDREN {
            return Err(malformed("too many children in a sigma connective"));
        }
        items
            .iter()
            .map(|item| match self.eval(item)? {
                Value::SigmaProp(p) => Ok(p),
                Value::Bool(b) => Ok(Proposition::Trivial(b)),
                _ => Err(malformed("expected a sigma proposition")),
            })
            .collect()
    }

    fn eval_numeric_pair(&mut self, a: &Expr, b: &Expr) -> Result<Operands, ReductionError> {
        let x = self.eval(a)?;
        let y = self.eval(b)?;
        let t = x.tpe();
        if t != y.tpe() {
            return Err(malformed("operands have different types"));
        }
        if let (Value::BigInt(x), Value::BigInt(y)) = (&x, &y) {
            return Ok(Operands::Big(*x, *y));
        }
        match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Ok(Operands::Small(t, x, y)),
            _ => Err(malformed("expected numbers")),
        }
    }

    fn eval_equal(&mut self, a: &Expr, b: &Expr) -> Result<bool, ReductionError> {
        let x = self.eval(a)?;
        let y = self.eval(b)?;
        if x.tpe() != y.tpe() {
            return Err(malformed("operands have different types"));
        }
        Ok(x == y)
    }
}

fn small_arith(op: ArithOp, x: i64, y: i64) -> Result<i64, ReductionError> {
    let n = match op {
        ArithOp::Plus => x.checked_add(y),
        ArithOp::Minus => x.checked_sub(y),
        ArithOp::Multiply => x.checked_mul(y),
        ArithOp::Division | ArithOp::Modulo if y == 0 => return Err(failed("division by zero")),
        ArithOp::Division => x.checked_div(y),
        ArithOp::Modulo => x.checked_rem(y),
        ArithOp::Min => Some(x.min(y)),
        ArithOp::Max => Some(x.max(y)),
    };
    n.ok_or_else(|| failed("arithmetic overflow"))
}

fn big_arith(op: ArithOp, x: I256, y: I256) -> Result<I256, ReductionError> {
    let n = match op {
        ArithOp::Plus => x.checked_add(y),
        ArithOp::Minus => x.checked_sub(y),
        ArithOp::Multiply => x.checked_mul(y),
        ArithOp::Division | ArithOp::Modulo if y.is_zero() => {
            return Err(failed("division by zero"))
        }
        ArithOp::Division => x.checked_div(y),
        ArithOp::Modulo => x.checked_rem(y),
        ArithOp::Min => Some(x.min(y)),
        ArithOp::Max => Some(x.max(y)),
    };
    n.ok_or_else(|| failed("arithmetic overflow"))
}

fn compare<T: Ord>(op: CmpOp, x: T, y: T) -> bool {
    match op {
        CmpOp::Lt => x < y,
        CmpOp::Le => x <= y,
        CmpOp::Gt => x > y,
        CmpOp::Ge => x >= y,
        CmpOp::Eq => x == y,
        CmpOp::Neq => x != y,
    }
}

fn clamp(i: i32, len: usize) -> usize {
    usize::try_from(i).map(|i| i.min(len)).unwrap_or(0)
}

fn int_of(n: usize) -> Result<Value, ReductionError> {
    i32::try_from(n)
        .map(Value::Int)
        .map_err(|_| failed("value does not fit in an Int"))
}

fn long_of(n: u64) -> Result<Value, ReductionError> {
    i64::try_from(n)
        .map(Value::Long)
        .map_err(|_| failed("value does not fit in a Long"))
}

fn header_field(h: &Header, field: HeaderField) -> Result<Value, ReductionError> {
    Ok(match field {
        HeaderField::Id => Value::of_bytes(h.id.to_vec()),
        HeaderField::Version => Value::Byte(h.version as i8),
        HeaderField::ParentId => Value::of_bytes(h.parent_id.to_vec()),
        HeaderField::AdProofsRoot => Value::of_bytes(h.ad_proofs_root.to_vec()),
        HeaderField::StateRoot => Value::AvlTree(h.state_root.clone()),
        HeaderField::TransactionsRoot => Value::of_bytes(h.transactions_root.to_vec()),
        HeaderField::Timestamp => long_of(h.timestamp)?,
        HeaderField::NBits => long_of(h.n_bits)?,
        HeaderField::Height => int_of(h.height as usize)?,
        HeaderField::ExtensionRoot => Value::of_bytes(h.extension_root.to_vec()),
        HeaderField::MinerPk => Value::GroupElement(h.miner_pk),
        HeaderField::PowOnetimePk => Value::GroupElement(h.pow_onetime_pk),
        HeaderField::PowNonce => Value::of_bytes(h.pow_nonce.to_vec()),
        HeaderField::PowDistance => Value::BigInt(h.pow_distance),
        HeaderField::Votes => Value::of_bytes(h.votes.to_vec()),
    })
}

fn avl_tree_field(t: &AvlTreeData, field: AvlTreeField) -> Result<Value, ReductionError> {
    Ok(match field {
        AvlTreeField::Digest => Value::of_bytes(t.digest.to_vec()),
        AvlTreeField::EnabledOperations => Value::Byte(t.enabled_operations() as i8),
        AvlTreeField::KeyLength => int_of(t.key_length as usize)?,
        AvlTreeField::ValueLengthOpt => Value::Opt(
            SType::Int,
            t.value_length_opt
                .map(|n| int_of(n as usize).map(Box::new))
                .transpose()?,
        ),
    })
}

fn pre_header_field(h: &PreHeader, field: PreHeaderField) -> Result<Value, ReductionError> {
    Ok(match field {
        PreHeaderField::Version => Value::Byte(h.version as i8),
        PreHeaderField::ParentId => Value::of_bytes(h.parent_id.to_vec()),
        PreHeaderField::Timestamp => long_of(h.timestamp)?,
        PreHeaderField::NBits => long_of(h.n_bits)?,
        PreHeaderField::Height => int_of(h.height as usize)?,
        PreHeaderField::MinerPk => Value::GroupElement(h.miner_pk),
        PreHeaderField::Votes => Value::of_bytes(h.votes.to_vec()),
    })
}
