//! Reduce and sign sessions.
//!
//! A transaction moves through three states, each a distinct type:
//! `BuiltTransaction` (assembled, nothing computed), `ReducedTransaction`
//! (every input reduced, safe to hand to a signer) and `SignedTransaction`
//! (every input proved). Reduction consumes the built transaction. Signing
//! borrows the reduced one, so a failed attempt can be retried with more
//! secrets.

use std::sync::Arc;

use rayon::prelude::*;
use sigma::{Proof, ProverError, SecretStore, VerificationError};
use tracing::{debug, warn};

use crate::context::{BlockchainStateContext, ContextExtension, TransactionContext};
use crate::envelope::{ReducedInput, ReducedTransaction};
use crate::errors::{ReductionError, SessionError};
use crate::params::BlockchainParameters;
use crate::reducer;
use crate::tx::{
    check_token_balance, SignedTx, Token, TxBox, TxId, UnsignedTx, MAX_OUTPUTS, MAX_REGISTERS,
    MAX_TOKENS,
};

/// An unsigned transaction with the boxes it spends and reads.
#[derive(Clone, Debug)]
pub struct BuiltTransaction {
    tx: UnsignedTx,
    boxes_to_spend: Vec<TxBox>,
    data_boxes: Vec<TxBox>,
    tokens_to_burn: Vec<Token>,
    state: BlockchainStateContext,
    parameters: BlockchainParameters,
    base_cost: u64,
}

/// A transaction with a proof for every input. No further transitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: SignedTx,
    id: TxId,
}

impl BuiltTransaction {
    /// `boxes_to_spend` and `data_boxes` must be given in the order of the
    /// transaction's inputs and data inputs.
    pub fn new(
        tx: UnsignedTx,
        boxes_to_spend: Vec<TxBox>,
        data_boxes: Vec<TxBox>,
        state: BlockchainStateContext,
    ) -> Self {
        BuiltTransaction {
            tx,
            boxes_to_spend,
            data_boxes,
            tokens_to_burn: Vec::new(),
            state,
            parameters: BlockchainParameters::default(),
            base_cost: 0,
        }
    }

    pub fn with_tokens_to_burn(mut self, tokens: Vec<Token>) -> Self {
        self.tokens_to_burn = tokens;
        self
    }

    pub fn with_parameters(mut self, parameters: BlockchainParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Cost charged before any input is reduced.
    pub fn with_base_cost(mut self, base_cost: u64) -> Self {
        self.base_cost = base_cost;
        self
    }

    pub fn unsigned_tx(&self) -> &UnsignedTx {
        &self.tx
    }

    /// Reduces every input, in parallel, and checks the total against the block cost limit.
    #[tracing::instrument(skip_all, fields(inputs = self.tx.inputs.len(), outputs = self.tx.outputs.len()))]
    pub fn reduce(self) -> Result<ReducedTransaction, ReductionError> {
        let (ctx, initial) = self.prepare()?;
        let max = self.parameters.max_block_cost;
        let limit = max - initial;

        let inputs = self
            .tx
            .inputs
            .par_iter()
            .enumerate()
            .map(|(i, input)| reduce_one(&ctx, i, &input.extension, limit))
            .collect::<Result<Vec<ReducedInput>, ReductionError>>()?;

        let total_cost = inputs
            .iter()
            .fold(initial, |acc, i| acc.saturating_add(i.cost));
        if total_cost > max {
            warn!(cost = total_cost, limit = max, "transaction exceeds the block cost limit");
            return Err(ReductionError::CostLimitExceeded {
                cost: total_cost,
                limit: max,
            });
        }
        debug!(total_cost, "reduced transaction");

        ReducedTransaction::new(self.tx, inputs, total_cost).map_err(|_| {
            ReductionError::InconsistentTransaction("reduced inputs do not match the transaction")
        })
    }

    /// Reduces one input under an explicit cost limit, without the
    /// transaction-wide total check.
    pub fn reduce_input(&self, index: usize, cost_limit: u64) -> Result<ReducedInput, ReductionError> {
        let input = self
            .tx
            .inputs
            .get(index)
            .ok_or(ReductionError::InconsistentTransaction("input index out of range"))?;
        let (ctx, _) = self.prepare()?;
        reduce_one(&ctx, index, &input.extension, cost_limit)
    }

    /// Checks the boxes against the transaction and computes the cost
    /// charged before any input is reduced.
    fn prepare(&self) -> Result<(TransactionContext, u64), ReductionError> {
        let spends_listed = self.boxes_to_spend.len() == self.tx.inputs.len()
            && self
                .boxes_to_spend
                .iter()
                .zip(&self.tx.inputs)
                .all(|(b, i)| b.id() == i.box_id);
        if !spends_listed {
            return Err(ReductionError::InconsistentTransaction(
                "boxes to spend do not match the inputs",
            ));
        }
        let reads_listed = self.data_boxes.len() == self.tx.data_inputs.len()
            && self
                .data_boxes
                .iter()
                .zip(&self.tx.data_inputs)
                .all(|(b, d)| b.id() == d.box_id);
        if !reads_listed {
            return Err(ReductionError::InconsistentTransaction(
                "data boxes do not match the data inputs",
            ));
        }
        if self.tx.outputs.len() > MAX_OUTPUTS {
            return Err(ReductionError::InconsistentTransaction("too many outputs"));
        }
        for out in &self.tx.outputs {
            if out.tokens.len() > MAX_TOKENS {
                return Err(ReductionError::InconsistentTransaction("output holds too many tokens"));
            }
            if out.registers.len() > MAX_REGISTERS {
                return Err(ReductionError::InconsistentTransaction(
                    "output sets too many registers",
                ));
            }
        }

        let inputs: Vec<Arc<TxBox>> = self.boxes_to_spend.iter().cloned().map(Arc::new).collect();
        check_token_balance(&inputs, &self.tx.outputs, &self.tokens_to_burn)?;

        let p = &self.parameters;
        let token_entries = inputs.iter().map(|b| b.tokens().len()).sum::<usize>()
            + self.tx.outputs.iter().map(|o| o.tokens.len()).sum::<usize>();
        let initial = [
            self.base_cost,
            charge(self.tx.inputs.len(), p.input_cost),
            charge(self.tx.data_inputs.len(), p.data_input_cost),
            charge(self.tx.outputs.len(), p.output_cost),
            charge(token_entries, p.token_access_cost),
        ]
        .iter()
        .fold(0u64, |acc, c| acc.saturating_add(*c));
        if initial > p.max_block_cost {
            warn!(cost = initial, limit = p.max_block_cost, "transaction exceeds the block cost limit");
            return Err(ReductionError::CostLimitExceeded {
                cost: initial,
                limit: p.max_block_cost,
            });
        }

        let outputs = self.tx.output_boxes().into_iter().map(Arc::new).collect();
        let ctx = TransactionContext {
            inputs,
            data_inputs: self.data_boxes.iter().cloned().map(Arc::new).collect(),
            outputs,
            state: self.state.clone(),
            parameters: self.parameters.clone(),
        };
        Ok((ctx, initial))
    }
}

fn charge(units: usize, per_unit: u64) -> u64 {
    (units as u64).saturating_mul(per_unit)
}

fn reduce_one(
    ctx: &TransactionContext,
    index: usize,
    extension: &ContextExtension,
    cost_limit: u64,
) -> Result<ReducedInput, ReductionError> {
    let spent = ctx
        .inputs
        .get(index)
        .ok_or(ReductionError::InconsistentTransaction("input index out of range"))?;
    let exec = ctx.for_input(index, extension);
    match reducer::reduce(spent.condition(), &exec, cost_limit) {
        Ok(r) => {
            debug!(input = index, cost = r.cost, "reduced input");
            Ok(ReducedInput {
                proposition: r.proposition,
                cost: r.cost,
                extension: extension.clone(),
            })
        }
        Err(e) => {
            if let ReductionError::CostLimitExceeded { cost, limit } = e {
                warn!(input = index, cost, limit, "input exceeds its cost limit");
            }
            Err(e)
        }
    }
}

impl ReducedTransaction {
    /// Proves every input over the transaction's bytes to sign.
    /// Borrows `self`, so it can be called again after a failure.
    #[tracing::instrument(skip_all, fields(tx_id = %self.unsigned_tx.id()))]
    pub fn sign(&self, secrets: &SecretStore) -> Result<SignedTransaction, SessionError> {
        let message = self.unsigned_tx.bytes_to_sign();
        let proofs = self
            .inputs
            .par_iter()
            .enumerate()
            .map(|(i, input)| prove_one(i, input, secrets, &message))
            .collect::<Result<Vec<Proof>, ProverError>>()?;
        let tx = self.unsigned_tx.clone().sign(proofs)?;
        Ok(SignedTransaction::new(tx))
    }

    /// Proves one input.
    pub fn prove_input(&self, index: usize, secrets: &SecretStore) -> Result<Proof, SessionError> {
        let input = self.inputs.get(index).ok_or(ReductionError::InconsistentTransaction(
            "input index out of range",
        ))?;
        Ok(prove_one(
            index,
            input,
            secrets,
            &self.unsigned_tx.bytes_to_sign(),
        )?)
    }

    /// Checks that `signed` is this transaction with a valid proof for every input.
    pub fn verify_signed(&self, signed: &SignedTransaction) -> Result<(), SessionError> {
        if signed.tx.to_unsigned() != self.unsigned_tx {
            return Err(VerificationError::InvalidProof.into());
        }
        let message = self.unsigned_tx.bytes_to_sign();
        self.inputs
            .par_iter()
            .zip(signed.tx.inputs.par_iter())
            .try_for_each(|(reduced, input)| {
                sigma::verify(&reduced.proposition, &input.proof, &message)
            })?;
        Ok(())
    }
}

fn prove_one(
    index: usize,
    input: &ReducedInput,
    secrets: &SecretStore,
    message: &[u8],
) -> Result<Proof, ProverError> {
    let proof = sigma::prove(&input.proposition, secrets, message)?;
    debug!(input = index, proof_len = proof.len(), "proved input");
    Ok(proof)
}

impl SignedTransaction {
    fn new(tx: SignedTx) -> Self {
        let id = tx.id();
        SignedTransaction { tx, id }
    }

    pub fn tx(&self) -> &SignedTx {
        &self.tx
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn into_inner(self) -> SignedTx {
        self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionTree;
    use crate::context::PreHeader;
    use crate::ops::{CmpOp, ContextField, Expr};
    use crate::tx::{BoxCandidate, TokenId, UnsignedInput};
    use crate::types::Value;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
    use curve25519_dalek::scalar::Scalar;

    fn state(height: u32) -> BlockchainStateContext {
        BlockchainStateContext {
            last_headers: vec![],
            previous_state_digest: [0; 33],
            pre_header: PreHeader {
                version: 3,
                parent_id: [0; 32],
                timestamp: 0,
                n_bits: 0,
                height,
                miner_pk: RISTRETTO_BASEPOINT_POINT.compress(),
                votes: [0; 3],
            },
        }
    }

    fn spendable(candidate: BoxCandidate) -> TxBox {
        candidate.to_box(TxId([7; 32]), 0)
    }

    fn built(spent: Vec<TxBox>, outputs: Vec<BoxCandidate>) -> BuiltTransaction {
        let inputs = spent
            .iter()
            .map(|b| UnsignedInput {
                box_id: b.id(),
                extension: ContextExtension::new(),
            })
            .collect();
        BuiltTransaction::new(UnsignedTx::new(inputs, vec![], outputs), spent, vec![], state(500))
    }

    fn key(n: u64) -> (Scalar, Expr) {
        let x = Scalar::from(n);
        let y = (x * RISTRETTO_BASEPOINT_POINT).compress();
        (x, Expr::ProveDlog(Box::new(Expr::Const(Value::GroupElement(y)))))
    }

    fn output() -> BoxCandidate {
        BoxCandidate::new(100, ConditionTree::new(Expr::constant(true)), 500)
    }

    #[test]
    fn reduce_then_sign_then_verify() {
        let (x, lock) = key(11);
        let spent = spendable(BoxCandidate::new(100, ConditionTree::new(lock), 1));
        let reduced = built(vec![spent], vec![output()]).reduce().unwrap();
        let secrets = SecretStore::builder().with_dlog_secret(x).build().unwrap();

        let signed = reduced.sign(&secrets).unwrap();
        assert_eq!(signed.id(), reduced.unsigned_tx().id());
        assert_eq!(reduced.verify_signed(&signed), Ok(()));

        let params = BlockchainParameters::default();
        assert_eq!(
            reduced.total_cost(),
            params.input_cost + params.output_cost + reduced.inputs()[0].cost
        );
    }

    #[test]
    fn signing_can_be_retried() {
        let (x, lock) = key(12);
        let spent = spendable(BoxCandidate::new(100, ConditionTree::new(lock), 1));
        let reduced = built(vec![spent], vec![output()]).reduce().unwrap();

        let empty = SecretStore::builder().build().unwrap();
        assert_eq!(
            reduced.sign(&empty),
            Err(SessionError::Prover(ProverError::SecretNotFound))
        );
        let secrets = SecretStore::builder().with_dlog_secret(x).build().unwrap();
        let first = reduced.sign(&secrets).unwrap();
        let second = reduced.sign(&secrets).unwrap();
        assert_eq!(first.id(), second.id());
        assert!(reduced.verify_signed(&first).is_ok());
        assert!(reduced.verify_signed(&second).is_ok());
    }

    #[test]
    fn boxes_must_match_inputs() {
        let a = spendable(BoxCandidate::new(1, ConditionTree::new(Expr::constant(true)), 1));
        let b = spendable(BoxCandidate::new(2, ConditionTree::new(Expr::constant(true)), 1));
        let mut session = built(vec![a.clone(), b.clone()], vec![output()]);
        session.boxes_to_spend = vec![b, a];
        assert_eq!(
            session.reduce().map(|_| ()),
            Err(ReductionError::InconsistentTransaction(
                "boxes to spend do not match the inputs"
            ))
        );
    }

    #[test]
    fn token_balance_is_checked() {
        let token = TokenId([5; 32]);
        let spent = spendable(
            BoxCandidate::new(1, ConditionTree::new(Expr::constant(true)), 1).with_token(token, 10),
        );
        let keeps_some = output().with_token(token, 4);

        let unbalanced = built(vec![spent.clone()], vec![keeps_some.clone()]);
        assert_eq!(
            unbalanced.reduce().map(|_| ()),
            Err(ReductionError::InconsistentTransaction(
                "token surplus is neither spent nor burned"
            ))
        );
        let burning = built(vec![spent], vec![keeps_some]).with_tokens_to_burn(vec![Token::new(token, 6)]);
        assert!(burning.reduce().is_ok());
    }

    #[test]
    fn block_cost_limit_applies_to_the_whole_transaction() {
        let (_, lock) = key(13);
        let spent: Vec<TxBox> = (0..3)
            .map(|i| spendable(BoxCandidate::new(100 + i, ConditionTree::new(lock.clone()), 1)))
            .collect();
        let single = built(vec![spent[0].clone()], vec![output()])
            .reduce()
            .unwrap()
            .inputs()[0]
            .cost;

        let params = BlockchainParameters {
            max_block_cost: 3 * BlockchainParameters::default().input_cost + 100 + 2 * single,
            ..BlockchainParameters::default()
        };
        match built(spent, vec![output()]).with_parameters(params).reduce() {
            Err(ReductionError::CostLimitExceeded { .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reduce_input_uses_the_given_limit() {
        let lock = Expr::Compare(
            CmpOp::Ge,
            Box::new(Expr::Context(ContextField::Height)),
            Box::new(Expr::constant(100)),
        );
        let spent = spendable(BoxCandidate::new(1, ConditionTree::new(lock), 1));
        let session = built(vec![spent], vec![output()]);
        let r = session.reduce_input(0, 1_000).unwrap();
        assert_eq!(r.proposition, sigma::Proposition::Trivial(true));
        assert!(matches!(
            session.reduce_input(0, r.cost - 1),
            Err(ReductionError::CostLimitExceeded { .. })
        ));
        assert!(session.reduce_input(1, 1_000).is_err());
    }

    #[test]
    fn verify_rejects_a_different_transaction() {
        let spent = spendable(BoxCandidate::new(1, ConditionTree::new(Expr::constant(true)), 1));
        let reduced = built(vec![spent.clone()], vec![output()]).reduce().unwrap();
        let other = built(vec![spent], vec![output(), output()]).reduce().unwrap();
        let secrets = SecretStore::builder().build().unwrap();
        let signed = other.sign(&secrets).unwrap();
        assert_eq!(
            reduced.verify_signed(&signed),
            Err(SessionError::Verification(VerificationError::InvalidProof))
        );
    }
}
