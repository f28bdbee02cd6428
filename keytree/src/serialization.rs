//! Serde support for Xprv/Xpub types. Both serialize as their 64-byte form.

use super::{Xprv, Xpub};
use core::fmt;
use core::marker::PhantomData;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Keys that round-trip through a fixed 64-byte encoding.
trait KeyBytes: Sized {
    const WHAT: &'static str;
    fn encode(&self) -> [u8; 64];
    fn decode(bytes: &[u8]) -> Option<Self>;
}

impl KeyBytes for Xprv {
    const WHAT: &'static str = "a 64-byte extended private key";
    fn encode(&self) -> [u8; 64] {
        self.to_bytes()
    }
    fn decode(bytes: &[u8]) -> Option<Self> {
        Xprv::from_bytes(bytes)
    }
}

impl KeyBytes for Xpub {
    const WHAT: &'static str = "a 64-byte extended public key";
    fn encode(&self) -> [u8; 64] {
        self.to_bytes()
    }
    fn decode(bytes: &[u8]) -> Option<Self> {
        Xpub::from_bytes(bytes)
    }
}

struct KeyVisitor<K>(PhantomData<K>);

impl<'de, K: KeyBytes> Visitor<'de> for KeyVisitor<K> {
    type Value = K;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(K::WHAT)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<K, E> {
        if v.len() != 64 {
            return Err(E::invalid_length(v.len(), &self));
        }
        K::decode(v).ok_or_else(|| E::custom("malformed key bytes"))
    }
}

impl Serialize for Xprv {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.encode()[..])
    }
}

impl<'de> Deserialize<'de> for Xprv {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(KeyVisitor::<Xprv>(PhantomData))
    }
}

impl Serialize for Xpub {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.encode()[..])
    }
}

impl<'de> Deserialize<'de> for Xpub {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(KeyVisitor::<Xpub>(PhantomData))
    }
}
