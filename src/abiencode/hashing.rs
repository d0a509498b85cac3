//! Keccak-256 over ABI encodings, without materializing the encoded bytes.

use serde::Serialize;
use sha3::{Digest, Keccak256};

use super::{
    error::Result,
    ser::{to_fnargs_writer, to_writer, Writer},
    types::Hash,
};

/// Writer that feeds every slot straight into a running Keccak-256 state.
pub struct Keccak256Writer<'a> {
    hasher: &'a mut Keccak256,
}

impl<'a> Keccak256Writer<'a> {
    pub fn new(hasher: &'a mut Keccak256) -> Self {
        Keccak256Writer { hasher }
    }
}

impl<'a> Writer for Keccak256Writer<'a> {
    fn write(&mut self, slot: &[u8]) {
        self.hasher.update(slot);
    }
}

/// `keccak256(abi.encode(value))`.
pub fn to_hash<T: Serialize>(value: &T) -> Result<Hash> {
    let mut hasher = Keccak256::new();
    to_writer(value, &mut Keccak256Writer::new(&mut hasher))?;
    Ok(Hash(hasher.finalize().into()))
}

/// `keccak256(abi.encode(a, b, c))` for `value = (a, b, c)`.
///
/// All of the protocol's hash preimages are argument tuples, so this is the
/// workhorse: channel ids, state hashes and storage hashes all come through
/// here.
pub fn to_fnargs_hash<T: Serialize>(value: &T) -> Result<Hash> {
    let mut hasher = Keccak256::new();
    to_fnargs_writer(value, &mut Keccak256Writer::new(&mut hasher))?;
    Ok(Hash(hasher.finalize().into()))
}

/// Plain `keccak256(bytes)`, for preimages that are already encoded.
pub fn keccak256(bytes: &[u8]) -> Hash {
    Hash(Keccak256::digest(bytes).into())
}
