use super::*;
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

const PHRASE: &str = "abandon cradle lunar orbit spice tunnel";

fn seeded_xprv() -> Xprv {
    let mut rng = ChaChaRng::from_seed([0u8; 32]);
    Xprv::random(&mut rng)
}

#[test]
fn mnemonic_is_deterministic() {
    let a = Xprv::from_mnemonic(PHRASE, "");
    let b = Xprv::from_mnemonic(PHRASE, "");
    assert_eq!(a.to_bytes()[..], b.to_bytes()[..]);
    assert_eq!(a.as_xpub(), b.as_xpub());
}

#[test]
fn mnemonic_ignores_extra_whitespace() {
    let a = Xprv::from_mnemonic(PHRASE, "pw");
    let b = Xprv::from_mnemonic("  abandon cradle\tlunar   orbit spice\ntunnel ", "pw");
    assert_eq!(a.as_xpub(), b.as_xpub());
}

#[test]
fn password_changes_master_key() {
    let a = Xprv::from_mnemonic(PHRASE, "");
    let b = Xprv::from_mnemonic(PHRASE, "secret");
    assert_ne!(a.as_xpub(), b.as_xpub());
    assert_ne!(a.as_scalar(), b.as_scalar());
}

#[test]
fn master_pubkey_matches_scalar() {
    let xprv = Xprv::from_mnemonic(PHRASE, "");
    let expected = (xprv.as_scalar() * RISTRETTO_BASEPOINT_POINT).compress();
    assert_eq!(xprv.as_xpub().as_point(), &expected);
}

#[test]
fn child_derivation_is_consistent_between_xprv_and_xpub() {
    let xprv = seeded_xprv();
    for index in &[0u32, 1, 7, u32::max_value()] {
        let child_prv = xprv.derive_child(*index);
        let child_pub = xprv.to_xpub().derive_child(*index);
        assert_eq!(child_prv.as_xpub(), &child_pub);

        let point = (child_prv.as_scalar() * RISTRETTO_BASEPOINT_POINT).compress();
        assert_eq!(child_pub.as_point(), &point);
    }
}

#[test]
fn sibling_keys_differ() {
    let xprv = seeded_xprv();
    assert_ne!(xprv.derive_child(0).as_xpub(), xprv.derive_child(1).as_xpub());
    assert_ne!(xprv.derive_child(0).as_xpub(), xprv.as_xpub());
}

#[test]
fn path_derivation_matches_stepwise_derivation() {
    let xprv = Xprv::from_mnemonic(PHRASE, "");
    let stepwise = xprv.derive_child(0).derive_child(3);
    let by_path = xprv.derive_path(&[0, 3]);
    assert_eq!(stepwise.as_xpub(), by_path.as_xpub());

    let pub_path = xprv.to_xpub().derive_path(&[0, 3]);
    assert_eq!(by_path.as_xpub(), &pub_path);

    // empty path is the key itself
    assert_eq!(xprv.derive_path(&[]).as_xpub(), xprv.as_xpub());
}

#[test]
fn path_order_matters() {
    let xprv = seeded_xprv();
    assert_ne!(
        xprv.derive_path(&[0, 1]).as_xpub(),
        xprv.derive_path(&[1, 0]).as_xpub()
    );
}

#[test]
fn leaf_key_matches_leaf_pubkey() {
    let xprv = seeded_xprv();
    let leaf_prv = xprv.derive_key(|t| t.append_u64(b"invoice_id", 10034));
    let leaf_pub = xprv
        .to_xpub()
        .derive_key(|t| t.append_u64(b"invoice_id", 10034));
    assert_eq!((leaf_prv * RISTRETTO_BASEPOINT_POINT).compress(), leaf_pub);

    // leaf and intermediate derivations are domain separated
    let intermediate = xprv.derive_intermediate_key(|t| t.append_u64(b"invoice_id", 10034));
    assert_ne!(intermediate.as_scalar(), &leaf_prv);
}

#[test]
fn xprv_bytes_roundtrip() {
    let xprv = seeded_xprv();
    let restored = Xprv::from_bytes(&xprv.to_bytes()).expect("valid xprv bytes");
    assert_eq!(restored.as_scalar(), xprv.as_scalar());
    assert_eq!(restored.as_xpub(), xprv.as_xpub());
}

#[test]
fn xpub_bytes_roundtrip() {
    let xpub = seeded_xprv().to_xpub();
    let bytes = xpub.to_bytes();
    assert_eq!(&bytes[..32], xpub.as_point().as_bytes());
    let restored = Xpub::from_bytes(&bytes).expect("valid xpub bytes");
    assert_eq!(restored, xpub);
}

#[test]
fn malformed_bytes_are_rejected() {
    assert!(Xprv::from_bytes(&[0u8; 63]).is_none());
    assert!(Xpub::from_bytes(&[0u8; 65]).is_none());

    // non-canonical scalar
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&[0xffu8; 32]);
    assert!(Xprv::from_bytes(&bytes).is_none());

    // not a ristretto encoding
    let bad_point = hex::decode("0100000000000000000000000000000000000000000000000000000000000000")
        .unwrap();
    bytes[..32].copy_from_slice(&bad_point);
    assert!(Xpub::from_bytes(&bytes).is_none());
}

#[test]
fn debug_output_hides_secret_scalar() {
    let xprv = seeded_xprv();
    let debug = format!("{:?}", xprv);
    let scalar_hex = hex::encode(xprv.as_scalar().as_bytes());
    assert!(debug.starts_with("Xprv"));
    assert!(!debug.contains(&scalar_hex));
}
