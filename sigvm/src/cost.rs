//! Cost accounting for condition evaluation.

use sigma::Proposition;

use crate::errors::ReductionError;
use crate::ops::Opcode;

/// Cost of checking one discrete-log leaf.
pub const DLOG_VERIFY_COST: u64 = 500;

/// Cost of checking one DH-tuple leaf.
pub const DH_TUPLE_VERIFY_COST: u64 = 900;

/// Cost per child of a connective in the produced proposition.
pub const CONNECTIVE_CHILD_COST: u64 = 10;

/// Cost per item visited by a collection operation.
pub const PER_ITEM_COST: u64 = 2;

/// Cost per 64-byte chunk hashed.
pub const HASH_CHUNK_COST: u64 = 10;

/// Cost per byte of a script decoded from a context variable.
pub const DESERIALIZE_BYTE_COST: u64 = 1;

/// Running cost of an evaluation, bounded by a limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CostAccumulator {
    accumulated: u64,
    limit: u64,
}

impl CostAccumulator {
    pub fn new(limit: u64) -> Self {
        CostAccumulator {
            accumulated: 0,
            limit,
        }
    }

    /// Adds `cost`, failing without changing the total if the limit would be exceeded.
    pub fn add(&mut self, cost: u64) -> Result<(), ReductionError> {
        let next = self.accumulated.saturating_add(cost);
        if next > self.limit {
            return Err(ReductionError::CostLimitExceeded {
                cost: next,
                limit: self.limit,
            });
        }
        self.accumulated = next;
        Ok(())
    }

    /// Adds `per_unit` for each of `units`.
    pub fn add_per(&mut self, units: usize, per_unit: u64) -> Result<(), ReductionError> {
        self.add((units as u64).saturating_mul(per_unit))
    }

    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

/// Fixed cost of evaluating one node with the given opcode.
pub fn opcode_cost(op: Opcode) -> u64 {
    match op {
        Opcode::Const | Opcode::ConstPlaceholder | Opcode::ValUse => 1,
        Opcode::BlockValue | Opcode::Tuple | Opcode::CollOf => 2,
        Opcode::Height
        | Opcode::SelfBox
        | Opcode::Inputs
        | Opcode::Outputs
        | Opcode::DataInputs
        | Opcode::Headers
        | Opcode::PreHeader
        | Opcode::MinerPubKey
        | Opcode::LastBlockUtxoRoot => 5,
        Opcode::GetVar => 10,
        Opcode::ExtractAmount
        | Opcode::ExtractScriptBytes
        | Opcode::ExtractId
        | Opcode::ExtractCreationHeight
        | Opcode::ExtractTokens
        | Opcode::HeaderField
        | Opcode::PreHeaderField
        | Opcode::AvlTreeField => 10,
        Opcode::ExtractRegister => 15,
        Opcode::Plus
        | Opcode::Minus
        | Opcode::Min
        | Opcode::Max
        | Opcode::Negation
        | Opcode::ToBigInt => 15,
        Opcode::Multiply | Opcode::Division | Opcode::Modulo => 20,
        Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => 15,
        Opcode::Eq | Opcode::Neq => 20,
        Opcode::BinAnd | Opcode::BinOr | Opcode::Not | Opcode::If => 10,
        Opcode::AllOf | Opcode::AnyOf => 10,
        Opcode::SizeOf | Opcode::ByIndex | Opcode::SelectField => 10,
        Opcode::Slice => 10,
        Opcode::Map | Opcode::Filter | Opcode::Exists | Opcode::ForAll | Opcode::Fold => 20,
        Opcode::OptionGet | Opcode::OptionIsDefined | Opcode::OptionGetOrElse => 10,
        Opcode::Sha256 | Opcode::Blake3 => 20,
        Opcode::ProveDlog | Opcode::ProveDhTuple => 10,
        Opcode::SigmaAnd | Opcode::SigmaOr | Opcode::AtLeast | Opcode::BoolToSigma => 10,
        Opcode::DeserializeContext => 50,
    }
}

/// Number of 64-byte chunks needed for `len` bytes (at least one).
pub fn hash_chunks(len: usize) -> usize {
    ((len + 63) / 64).max(1)
}

/// Cost of verifying a proof of `prop`.
pub fn verification_cost(prop: &Proposition) -> u64 {
    let mut cost = 0u64;
    let mut stack = vec![prop];
    while let Some(node) = stack.pop() {
        match node {
            Proposition::Trivial(_) => {}
            Proposition::Leaf(sigma::Statement::Dlog(_)) => cost += DLOG_VERIFY_COST,
            Proposition::Leaf(sigma::Statement::DhTuple(_)) => cost += DH_TUPLE_VERIFY_COST,
            Proposition::And(c) | Proposition::Or(c) | Proposition::Threshold(_, c) => {
                cost += CONNECTIVE_CHILD_COST * c.len() as u64;
                stack.extend(c.iter());
            }
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_COMPRESSED;

    #[test]
    fn accumulator_stops_at_the_limit() {
        let mut acc = CostAccumulator::new(100);
        acc.add(60).unwrap();
        acc.add(40).unwrap();
        assert_eq!(
            acc.add(1),
            Err(ReductionError::CostLimitExceeded {
                cost: 101,
                limit: 100
            })
        );
        assert_eq!(acc.accumulated(), 100);
    }

    #[test]
    fn per_unit_costs_saturate() {
        let mut acc = CostAccumulator::new(u64::MAX - 1);
        assert!(acc.add_per(usize::MAX, u64::MAX).is_err());
        assert_eq!(acc.accumulated(), 0);
    }

    #[test]
    fn every_opcode_has_a_cost() {
        for op in Opcode::ALL {
            assert!(opcode_cost(*op) > 0, "{:?}", op);
        }
    }

    #[test]
    fn verification_cost_counts_leaves_and_children() {
        let y = Proposition::dlog(RISTRETTO_BASEPOINT_COMPRESSED);
        assert_eq!(verification_cost(&Proposition::Trivial(true)), 0);
        assert_eq!(verification_cost(&y), DLOG_VERIFY_COST);
        let two = Proposition::Or(vec![y.clone(), y.clone()]);
        assert_eq!(
            verification_cost(&two),
            2 * DLOG_VERIFY_COST + 2 * CONNECTIVE_CHILD_COST
        );
    }

    #[test]
    fn hash_chunks_round_up() {
        assert_eq!(hash_chunks(0), 1);
        assert_eq!(hash_chunks(1), 1);
        assert_eq!(hash_chunks(64), 1);
        assert_eq!(hash_chunks(65), 2);
        assert_eq!(hash_chunks(128), 2);
    }
}
