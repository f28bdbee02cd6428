#[macro_use]
extern crate criterion;
use criterion::Criterion;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::scalar::Scalar;

use sigma::{prove, verify, Proposition, SecretStore};

const MESSAGE: &[u8] = b"benchmark transaction bytes";

fn threshold_setup(k: usize, n: usize) -> (Proposition, SecretStore) {
    let mut rng = rand::thread_rng();
    let secrets: Vec<Scalar> = (0..n).map(|_| Scalar::random(&mut rng)).collect();
    let prop = Proposition::Threshold(
        k,
        secrets
            .iter()
            .map(|x| Proposition::dlog((x * RISTRETTO_BASEPOINT_POINT).compress()))
            .collect(),
    );
    let store = secrets
        .iter()
        .take(k)
        .fold(SecretStore::builder(), |b, x| b.with_dlog_secret(*x))
        .build()
        .unwrap();
    (prop, store)
}

fn prove_threshold_helper(k: usize, n: usize, c: &mut Criterion) {
    let label = format!("Threshold {}-of-{} proof creation", k, n);
    let (prop, store) = threshold_setup(k, n);

    c.bench_function(&label, move |b| {
        b.iter(|| {
            prove(&prop, &store, MESSAGE).unwrap();
        })
    });
}

fn verify_threshold_helper(k: usize, n: usize, c: &mut Criterion) {
    let label = format!("Threshold {}-of-{} proof verification", k, n);
    let (prop, store) = threshold_setup(k, n);
    let proof = prove(&prop, &store, MESSAGE).unwrap();

    c.bench_function(&label, move |b| {
        b.iter(|| {
            verify(&prop, &proof, MESSAGE).unwrap();
        })
    });
}

fn prove_threshold(c: &mut Criterion) {
    prove_threshold_helper(2, 3, c);
    prove_threshold_helper(5, 10, c);
    prove_threshold_helper(16, 32, c);
}

fn verify_threshold(c: &mut Criterion) {
    verify_threshold_helper(2, 3, c);
    verify_threshold_helper(5, 10, c);
    verify_threshold_helper(16, 32, c);
}

criterion_group! {
    name = sigma_threshold;
    config = Criterion::default().sample_size(20);
    targets = prove_threshold, verify_threshold,
}

criterion_main!(sigma_threshold);
