use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use sigma::{Encodable, Proposition, ProverError, SecretStore, VerificationError};

use sigvm::*;

fn secret(i: u64) -> Scalar {
    Scalar::from(5000 + i)
}

fn pubkey(i: u64) -> CompressedRistretto {
    (secret(i) * RISTRETTO_BASEPOINT_POINT).compress()
}

fn pk(i: u64) -> Expr {
    Expr::ProveDlog(Box::new(Expr::Const(Value::GroupElement(pubkey(i)))))
}

fn store(keys: &[u64]) -> SecretStore {
    keys.iter()
        .fold(SecretStore::builder(), |b, i| b.with_dlog_secret(secret(*i)))
        .build()
        .unwrap()
}

fn state(block_version: u8, height: u32) -> BlockchainStateContext {
    BlockchainStateContext {
        last_headers: vec![],
        previous_state_digest: [0; STATE_DIGEST_LEN],
        pre_header: PreHeader {
            version: block_version,
            parent_id: [1; 32],
            timestamp: 1_650_000_000_000,
            n_bits: 117_500_000,
            height,
            miner_pk: pubkey(99),
            votes: [0; 3],
        },
    }
}

fn payout() -> BoxCandidate {
    BoxCandidate::new(1_000, ConditionTree::from_proposition(Proposition::dlog(pubkey(50))), 800)
}

/// One input per condition, each with its own extension, paying to a single output.
fn session_with(block_version: u8, locks: Vec<(ConditionTree, ContextExtension)>) -> BuiltTransaction {
    let spent: Vec<TxBox> = locks
        .iter()
        .enumerate()
        .map(|(i, (cond, _))| {
            BoxCandidate::new(1_000 + i as u64, cond.clone(), 700).to_box(TxId([3; 32]), i as u16)
        })
        .collect();
    let inputs = spent
        .iter()
        .zip(locks)
        .map(|(b, (_, extension))| UnsignedInput {
            box_id: b.id(),
            extension,
        })
        .collect();
    let tx = UnsignedTx::new(inputs, vec![], vec![payout()]);
    BuiltTransaction::new(tx, spent, vec![], state(block_version, 800))
}

fn session(roots: Vec<Expr>) -> BuiltTransaction {
    session_with(
        3,
        roots
            .into_iter()
            .map(|r| (ConditionTree::new(r), ContextExtension::new()))
            .collect(),
    )
}

#[test]
fn dlog_condition_is_signed_and_verified() {
    let reduced = session(vec![pk(1)]).reduce().unwrap();
    assert_eq!(reduced.inputs()[0].proposition, Proposition::dlog(pubkey(1)));

    let signed = reduced.sign(&store(&[1])).unwrap();
    assert!(reduced.verify_signed(&signed).is_ok());

    assert_eq!(
        reduced.sign(&store(&[])),
        Err(SessionError::Prover(ProverError::SecretNotFound))
    );
}

#[test]
fn conjunction_with_one_secret_cannot_be_signed() {
    let reduced = session(vec![Expr::SigmaAnd(vec![pk(1), pk(2)])])
        .reduce()
        .unwrap();
    assert_eq!(
        reduced.sign(&store(&[1])),
        Err(SessionError::Prover(ProverError::SecretNotFound))
    );
    assert!(reduced.sign(&store(&[1, 2])).is_ok());
}

#[test]
fn two_of_three_threshold() {
    let keys = Expr::CollOf(SType::SigmaProp, vec![pk(1), pk(2), pk(3)]);
    let root = Expr::AtLeast(Box::new(Expr::constant(2)), Box::new(keys));
    let reduced = session(vec![root]).reduce().unwrap();
    let prop = reduced.inputs()[0].proposition.clone();
    assert!(matches!(prop, Proposition::Threshold(2, _)));

    let signed = reduced.sign(&store(&[1, 3])).unwrap();
    assert!(reduced.verify_signed(&signed).is_ok());

    let message = reduced.unsigned_tx().bytes_to_sign();
    let proof = &signed.tx().inputs[0].proof;
    assert_eq!(sigma::verify(&prop, proof, &message), Ok(()));
    for i in 0..message.len() {
        let mut tampered = message.clone();
        tampered[i] ^= 0x01;
        assert_eq!(
            sigma::verify(&prop, proof, &tampered),
            Err(VerificationError::InvalidProof),
            "byte {} of the message",
            i
        );
    }
}

#[test]
fn inputs_are_reduced_and_signed_in_order() {
    let roots = vec![pk(1), pk(2), Expr::constant(true), pk(3)];
    let reduced = session(roots).reduce().unwrap();
    let props: Vec<_> = reduced.inputs().iter().map(|i| i.proposition.clone()).collect();
    assert_eq!(
        props,
        vec![
            Proposition::dlog(pubkey(1)),
            Proposition::dlog(pubkey(2)),
            Proposition::Trivial(true),
            Proposition::dlog(pubkey(3)),
        ]
    );
    let signed = reduced.sign(&store(&[1, 2, 3])).unwrap();
    assert!(signed.tx().inputs[2].proof.is_empty());
    assert!(reduced.verify_signed(&signed).is_ok());
}

#[test]
fn envelope_can_cross_to_a_separate_signer() {
    let reduced = session(vec![pk(4), pk(5)]).reduce().unwrap();
    let hex = reduced.to_hex();

    let received = ReducedTransaction::from_hex(&hex).unwrap();
    assert_eq!(received, reduced);
    let signed = received.sign(&store(&[4, 5])).unwrap();
    assert!(reduced.verify_signed(&signed).is_ok());

    let bytes = signed.tx().to_bytes();
    let decoded = SignedTx::from_bytes(&bytes).unwrap();
    assert_eq!(&decoded, signed.tx());
    assert_eq!(decoded.id(), signed.id());
}

/// `SigmaAnd` chain whose deepest node sits at `depth`.
fn and_chain(depth: usize) -> Expr {
    // pk(i) is a ProveDlog above its constant
    let links = depth - 1;
    let mut e = pk(links as u64);
    for i in (0..links).rev() {
        e = Expr::SigmaAnd(vec![pk(i as u64), e]);
    }
    e
}

fn sign_across_envelope(reduced: &ReducedTransaction, secrets: &SecretStore) {
    let received = ReducedTransaction::from_bytes(&reduced.to_bytes()).unwrap();
    assert_eq!(&received, reduced);
    let signed = received.sign(secrets).unwrap();
    assert!(reduced.verify_signed(&signed).is_ok());
}

#[test]
fn deepest_condition_is_signed_across_the_envelope() {
    let keys: Vec<u64> = (0..MAX_EXPR_DEPTH as u64).collect();
    let root = and_chain(MAX_EXPR_DEPTH);
    let tree = ConditionTree::new(root.clone());
    assert_eq!(ConditionTree::from_bytes(&tree.to_bytes()).unwrap(), tree);

    let reduced = session(vec![root]).reduce().unwrap();
    assert_eq!(reduced.inputs()[0].proposition.depth(), MAX_EXPR_DEPTH - 1);
    sign_across_envelope(&reduced, &store(&keys));

    let too_deep = and_chain(MAX_EXPR_DEPTH + 1);
    assert!(ConditionTree::from_bytes(&ConditionTree::new(too_deep.clone()).to_bytes()).is_err());
    assert_eq!(
        session(vec![too_deep]).reduce().map(|_| ()),
        Err(ReductionError::MalformedCondition("condition nested too deeply"))
    );
}

#[test]
fn deepest_proposition_is_signed_across_the_envelope() {
    let mut deep = Proposition::dlog(pubkey(0));
    for i in 0..sigma::MAX_DEPTH as u64 {
        deep = Proposition::Or(vec![Proposition::dlog(pubkey(i + 1)), deep]);
    }
    let root = Expr::Const(Value::SigmaProp(deep.clone()));
    let reduced = session(vec![root.clone()]).reduce().unwrap();
    assert_eq!(reduced.inputs()[0].proposition, deep);
    sign_across_envelope(&reduced, &store(&[0]));

    let wrapped = Expr::SigmaAnd(vec![root, pk(0)]);
    assert_eq!(
        session(vec![wrapped]).reduce().map(|_| ()),
        Err(ReductionError::MalformedCondition("proposition nested too deeply"))
    );
}

#[test]
fn envelope_version_is_checked() {
    let mut bytes = session(vec![pk(1)]).reduce().unwrap().to_bytes();
    bytes[3] = ENVELOPE_VERSION + 1;
    assert_eq!(
        ReducedTransaction::from_bytes(&bytes),
        Err(EnvelopeError::VersionMismatch {
            expected: ENVELOPE_VERSION,
            found: ENVELOPE_VERSION + 1
        })
    );
}

#[test]
fn signing_may_be_replayed() {
    let reduced = session(vec![pk(6)]).reduce().unwrap();
    assert!(reduced.sign(&store(&[7])).is_err());
    let a = reduced.sign(&store(&[6])).unwrap();
    let b = reduced.sign(&store(&[6, 7])).unwrap();
    // the proofs differ in their randomness but sign the same transaction
    assert_eq!(a.id(), b.id());
    assert!(reduced.verify_signed(&a).is_ok());
    assert!(reduced.verify_signed(&b).is_ok());
}

#[test]
fn reduction_cost_is_deterministic() {
    let root = Expr::SigmaOr(vec![
        pk(1),
        Expr::SigmaAnd(vec![
            pk(2),
            Expr::BoolToSigma(Box::new(Expr::Compare(
                CmpOp::Ge,
                Box::new(Expr::Context(ContextField::Height)),
                Box::new(Expr::constant(700)),
            ))),
        ]),
    ]);
    let a = session(vec![root.clone()]).reduce().unwrap();
    let b = session(vec![root]).reduce().unwrap();
    assert_eq!(a.inputs(), b.inputs());
    assert_eq!(a.total_cost(), b.total_cost());
    assert_eq!(
        a.inputs()[0].proposition,
        Proposition::or(vec![Proposition::dlog(pubkey(1)), Proposition::dlog(pubkey(2))])
    );
}

#[test]
fn cost_limit_aborts_reduction() {
    let keys: Vec<Expr> = (0..20).map(pk).collect();
    let root = Expr::AtLeast(
        Box::new(Expr::constant(10)),
        Box::new(Expr::CollOf(SType::SigmaProp, keys)),
    );
    let params = BlockchainParameters::from_toml_str("max_block_cost = 6000").unwrap();
    match session(vec![root]).with_parameters(params).reduce() {
        Err(ReductionError::CostLimitExceeded { limit, .. }) => {
            assert_eq!(limit, 6000 - BlockchainParameters::default().input_cost - 100)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn inactive_script_version_is_unsupported() {
    let root = Expr::BoolToSigma(Box::new(Expr::Compare(
        CmpOp::Eq,
        Box::new(Expr::Blake3(Box::new(Expr::constant(Value::of_bytes(vec![1u8]))))),
        Box::new(Expr::constant(Value::of_bytes(vec![1u8]))),
    )));
    let tree = ConditionTree::new(root);
    assert_eq!(tree.version(), 2);

    let old_network = session_with(2, vec![(tree.clone(), ContextExtension::new())]);
    assert_eq!(
        old_network.reduce().map(|_| ()),
        Err(ReductionError::UnsupportedOperation("script version is not activated"))
    );
    assert!(session_with(3, vec![(tree, ContextExtension::new())]).reduce().is_ok());
}

#[test]
fn unknown_trees_are_carried_but_not_reduced() {
    // version 7 with a size and an opaque body
    let bytes = vec![0x0f, 2, 0, 0, 0, 0xaa, 0xbb];
    let tree = ConditionTree::from_bytes(&bytes).unwrap();
    assert!(tree.root().is_none());
    assert_eq!(tree.to_bytes(), bytes);
    assert!(matches!(
        session_with(3, vec![(tree, ContextExtension::new())]).reduce(),
        Err(ReductionError::UnsupportedOperation(_))
    ));
}

#[test]
fn p2sh_spend_reveals_the_script() {
    let script = pk(8);
    let address = NetworkAddress::new(NetworkPrefix::Mainnet, Address::p2sh(&script));
    let parsed: NetworkAddress = address.to_string().parse().unwrap();
    let condition = parsed.address().to_condition().unwrap();

    let revealed = ContextExtension::new().with(P2SH_SCRIPT_VAR, Value::of_bytes(script.encode_to_vec()));
    let reduced = session_with(3, vec![(condition.clone(), revealed)]).reduce().unwrap();
    assert_eq!(reduced.inputs()[0].proposition, Proposition::dlog(pubkey(8)));
    let signed = reduced.sign(&store(&[8])).unwrap();
    assert!(reduced.verify_signed(&signed).is_ok());

    // a different script does not match the hash
    let other = ContextExtension::new().with(P2SH_SCRIPT_VAR, Value::of_bytes(pk(9).encode_to_vec()));
    let reduced = session_with(3, vec![(condition, other)]).reduce().unwrap();
    assert_eq!(reduced.inputs()[0].proposition, Proposition::Trivial(false));
    assert_eq!(
        reduced.sign(&store(&[9])),
        Err(SessionError::Prover(ProverError::Unsatisfiable))
    );
}

#[test]
fn derived_key_spends_a_p2pk_box() {
    let phrase = "slot fresh vendor coral drama ocean shrug fiscal brand guide toddler umbrella";
    let secrets = SecretStore::builder()
        .with_mnemonic(phrase, "")
        .with_derived_secret(3)
        .build()
        .unwrap();
    let xpub = keytree::Xprv::from_mnemonic(phrase, "")
        .derive_path(&[sigma::ACCOUNT, 3])
        .to_xpub();
    let (index, y) = secrets.derived_public_keys()[0];
    assert_eq!(index, 3);
    assert_eq!(&y, xpub.as_point());

    let address = Address::P2PK(y);
    let condition = address.to_condition().unwrap();
    assert_eq!(Address::from_condition(&condition), address);

    let reduced = session_with(3, vec![(condition, ContextExtension::new())])
        .reduce()
        .unwrap();
    let signed = reduced.sign(&secrets).unwrap();
    assert!(reduced.verify_signed(&signed).is_ok());
}

#[test]
fn token_mismatch_is_inconsistent() {
    let token = TokenId([0x42; 32]);
    let spent = BoxCandidate::new(10, ConditionTree::new(Expr::constant(true)), 1)
        .with_token(token, 5)
        .to_box(TxId([3; 32]), 0);
    let inputs = vec![UnsignedInput {
        box_id: spent.id(),
        extension: ContextExtension::new(),
    }];
    let outputs = vec![payout().with_token(token, 6)];
    let session = BuiltTransaction::new(
        UnsignedTx::new(inputs, vec![], outputs),
        vec![spent],
        vec![],
        state(3, 800),
    );
    assert_eq!(
        session.reduce().map(|_| ()),
        Err(ReductionError::InconsistentTransaction(
            "outputs hold more tokens than the inputs"
        ))
    );
}

#[test]
fn data_inputs_are_readable() {
    let oracle = BoxCandidate::new(1, ConditionTree::new(Expr::constant(false)), 1)
        .with_register(Value::of_long(12_345))
        .to_box(TxId([4; 32]), 0);
    let rate = Expr::OptionGet(Box::new(Expr::Register(
        Box::new(Expr::ByIndex(
            Box::new(Expr::Context(ContextField::DataInputs)),
            Box::new(Expr::constant(0)),
            None,
        )),
        4,
        SType::Long,
    )));
    let root = Expr::SigmaAnd(vec![
        Expr::BoolToSigma(Box::new(Expr::Compare(
            CmpOp::Gt,
            Box::new(rate),
            Box::new(Expr::constant(10_000i64)),
        ))),
        pk(1),
    ]);
    let spent = BoxCandidate::new(10, ConditionTree::new(root), 1).to_box(TxId([3; 32]), 0);
    let tx = UnsignedTx::new(
        vec![UnsignedInput {
            box_id: spent.id(),
            extension: ContextExtension::new(),
        }],
        vec![DataInput { box_id: oracle.id() }],
        vec![payout()],
    );

    let missing = BuiltTransaction::new(tx.clone(), vec![spent.clone()], vec![], state(3, 800));
    assert_eq!(
        missing.reduce().map(|_| ()),
        Err(ReductionError::InconsistentTransaction(
            "data boxes do not match the data inputs"
        ))
    );

    let reduced = BuiltTransaction::new(tx, vec![spent], vec![oracle], state(3, 800))
        .reduce()
        .unwrap();
    assert_eq!(reduced.inputs()[0].proposition, Proposition::dlog(pubkey(1)));
}
