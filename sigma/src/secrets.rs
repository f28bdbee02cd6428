//! Secrets held by a prover, addressed by the public values they open.

use core::fmt;
use std::collections::BTreeMap;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use keytree::Xprv;
use subtle::ConstantTimeEq;

use crate::errors::SecretStoreError;
use crate::statement::{DhTuple, Fingerprint, Statement};

/// Account index of the derivation path `[ACCOUNT, index]`.
pub const ACCOUNT: u32 = 0;

/// Lookup of a secret by the fingerprint of its statement.
pub trait SecretResolver {
    /// Returns the secret exponent for the statement, if held.
    fn resolve(&self, fingerprint: &Fingerprint) -> Option<Scalar>;
}

/// Read-only set of secrets built once per proving session.
#[derive(Clone)]
pub struct SecretStore {
    secrets: BTreeMap<Fingerprint, Scalar>,
    statements: Vec<Statement>,
    master: Option<CompressedRistretto>,
    derived: Vec<(u32, CompressedRistretto)>,
}

/// Accumulates secret sources for a `SecretStore`.
#[derive(Clone, Default)]
pub struct SecretStoreBuilder {
    mnemonic: Option<(String, String)>,
    derived: Vec<u32>,
    dlog: Vec<Scalar>,
    dh_tuples: Vec<(DhTuple, Scalar)>,
}

impl SecretStore {
    pub fn builder() -> SecretStoreBuilder {
        SecretStoreBuilder::default()
    }

    /// Public key of the master secret derived from the mnemonic.
    pub fn master_public_key(&self) -> Option<&CompressedRistretto> {
        self.master.as_ref()
    }

    /// Master secret derived from the mnemonic.
    pub fn secret_key(&self) -> Option<Scalar> {
        let master = self.master?;
        self.resolve(&Statement::Dlog(master).fingerprint())
    }

    /// Derivation indices with their public keys, in the order requested.
    pub fn derived_public_keys(&self) -> &[(u32, CompressedRistretto)] {
        &self.derived
    }

    /// Every statement the store can prove, in insertion order.
    pub fn public_statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    fn insert(&mut self, statement: Statement, secret: Scalar) {
        if self
            .secrets
            .insert(statement.fingerprint(), secret)
            .is_none()
        {
            self.statements.push(statement);
        }
    }

    fn insert_dlog(&mut self, secret: Scalar) -> CompressedRistretto {
        let y = (secret * RISTRETTO_BASEPOINT_POINT).compress();
        self.insert(Statement::Dlog(y), secret);
        y
    }
}

impl SecretResolver for SecretStore {
    fn resolve(&self, fingerprint: &Fingerprint) -> Option<Scalar> {
        self.secrets.get(fingerprint).copied()
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // secrets stay out of logs
        f.debug_struct("SecretStore")
            .field("len", &self.secrets.len())
            .field("master", &self.master)
            .field("derived", &self.derived.len())
            .finish()
    }
}

impl SecretStoreBuilder {
    /// Seed phrase and password for the master key.
    pub fn with_mnemonic(mut self, phrase: &str, password: &str) -> Self {
        self.mnemonic = Some((phrase.to_string(), password.to_string()));
        self
    }

    /// Child key at `[ACCOUNT, index]` from the master key.
    pub fn with_derived_secret(mut self, index: u32) -> Self {
        self.derived.push(index);
        self
    }

    /// Raw discrete-log secret.
    pub fn with_dlog_secret(mut self, x: Scalar) -> Self {
        self.dlog.push(x);
        self
    }

    /// Secret `x` of the tuple `(g, h, u = g^x, v = h^x)`.
    pub fn with_dh_tuple_secret(
        mut self,
        g: CompressedRistretto,
        h: CompressedRistretto,
        u: CompressedRistretto,
        v: CompressedRistretto,
        x: Scalar,
    ) -> Self {
        self.dh_tuples.push((DhTuple { g, h, u, v }, x));
        self
    }

    pub fn build(self) -> Result<SecretStore, SecretStoreError> {
        if !self.derived.is_empty() && self.mnemonic.is_none() {
            return Err(SecretStoreError::MnemonicRequired);
        }

        let mut store = SecretStore {
            secrets: BTreeMap::new(),
            statements: Vec::new(),
            master: None,
            derived: Vec::with_capacity(self.derived.len()),
        };

        if let Some((phrase, password)) = &self.mnemonic {
            let master = Xprv::from_mnemonic(phrase, password);
            store.master = Some(store.insert_dlog(*master.as_scalar()));
            for index in &self.derived {
                let child = master.derive_path(&[ACCOUNT, *index]);
                let y = store.insert_dlog(*child.as_scalar());
                store.derived.push((*index, y));
            }
        }

        for x in self.dlog {
            ensure_nonzero(&x)?;
            store.insert_dlog(x);
        }

        for (tuple, x) in self.dh_tuples {
            ensure_nonzero(&x)?;
            check_dh_tuple(&tuple, &x)?;
            store.insert(Statement::DhTuple(tuple), x);
        }

        Ok(store)
    }
}

fn ensure_nonzero(x: &Scalar) -> Result<(), SecretStoreError> {
    if bool::from(x.ct_eq(&Scalar::zero())) {
        return Err(SecretStoreError::ZeroSecret);
    }
    Ok(())
}

fn check_dh_tuple(t: &DhTuple, x: &Scalar) -> Result<(), SecretStoreError> {
    let decompress = |p: &CompressedRistretto| -> Result<RistrettoPoint, SecretStoreError> {
        p.decompress().ok_or(SecretStoreError::InconsistentDhTuple)
    };
    let u = (x * decompress(&t.g)?).compress();
    let v = (x * decompress(&t.h)?).compress();
    let ok = u.as_bytes()[..].ct_eq(&t.u.as_bytes()[..])
        & v.as_bytes()[..].ct_eq(&t.v.as_bytes()[..]);
    if !bool::from(ok) {
        return Err(SecretStoreError::InconsistentDhTuple);
    }
    Ok(())
}
