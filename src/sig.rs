//! Creation and verification of Ethereum signatures over protocol hashes.
//!
//! Participants sign the keccak256 of an ABI encoding, wrapped in the
//! `\x19Ethereum Signed Message:\n32` prefix. Verification is done by
//! recovering the signer address from the 65-byte `r || s || v` signature,
//! so no public key ever has to be exchanged.

use crate::abiencode::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as K256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha3::{Digest, Keccak256};

pub use k256::ecdsa::Error;

/// Add the `\x19Ethereum Signed Message:\n32` prefix and re-hash.
///
/// This is the format the on-chain verifier expects. Packed encoding, so the
/// slot serializer does not apply here.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

impl From<VerifyingKey> for Address {
    fn from(key: VerifyingKey) -> Self {
        // Convert the key into an EncodedPoint (on the curve), which has the
        // data we need in bytes [1..]. This panics if the bytes
        // representation of EncodedPoint is not 65 bytes, which is unlikely
        // to change in the dependency.
        let pk_bytes: [u8; 65] = key.to_encoded_point(false).as_bytes().try_into().unwrap();

        // Throw away the first byte, which is not part of the public key. It
        // is the tag added by the uncompressed SEC1 encoding.
        let hash: [u8; 32] = Keccak256::digest(&pk_bytes[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

/// Recover the address that signed `msg` (applying the Ethereum prefix).
///
/// Rejects signatures whose `v` is not 27 or 28.
pub fn recover_signer(msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(msg);

    // Undo adding the 27, to go back to the recovery id the curve math uses.
    let mut sig_bytes: [u8; 65] = eth_sig.0;
    if !(27..=28).contains(&sig_bytes[64]) {
        return Err(Error::new());
    }
    sig_bytes[64] -= 27;

    let sig = recoverable::Signature::from_bytes(&sig_bytes)?;
    let verifying_key = sig.recover_verifying_key_from_digest_bytes(&hash.0.into())?;
    Ok(verifying_key.into())
}

/// Holds a private signing key and the address derived from it.
#[derive(Debug)]
pub struct Signer {
    key: SigningKey,
    addr: Address,
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let key = SigningKey::random(rng);
        let addr = key.verifying_key().into();
        Self { key, addr }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Sign `msg` in the `\x19Ethereum Signed Message:\n32` format.
    pub fn sign_eth(&self, msg: Hash) -> Signature {
        let hash = hash_to_eth_signed_msg_hash(msg);

        // Signing a 32-byte prehash with a valid key cannot fail.
        let sig: recoverable::Signature = self
            .key
            .sign_prehash(&hash.0)
            .expect("prehash has the right length");

        // This Signature type already has the 65-byte r || s || v layout we
        // need, but v still has to be shifted by 27 for the signature to be
        // valid in the EVM.
        let mut sig_bytes: [u8; 65] = sig
            .as_bytes()
            .try_into()
            .expect("recoverable signatures are 65 bytes");
        debug_assert!(sig_bytes[32] & 0x80 == 0);
        sig_bytes[64] += 27;

        Signature(sig_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn sign_and_recover() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let signer = Signer::new(&mut rng);
        let msg: Hash = rng.gen();

        let sig = signer.sign_eth(msg);
        assert!(sig.v() == 27 || sig.v() == 28);
        assert_eq!(recover_signer(msg, sig).unwrap(), signer.address());
    }

    #[test]
    fn recover_other_message_gives_other_address() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let signer = Signer::new(&mut rng);
        let msg: Hash = rng.gen();
        let other: Hash = rng.gen();

        let sig = signer.sign_eth(msg);
        // Recovery over a different message yields some address, just not
        // ours.
        if let Ok(addr) = recover_signer(other, sig) {
            assert_ne!(addr, signer.address());
        }
    }

    #[test]
    fn invalid_v_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let signer = Signer::new(&mut rng);
        let msg: Hash = rng.gen();

        let mut sig = signer.sign_eth(msg);
        sig.0[64] = 0x05;
        assert!(recover_signer(msg, sig).is_err());
    }
}
