//! Value types shared by every ABI-encoded structure: fixed-size byte strings,
//! 20-byte addresses and the 256-bit unsigned integer used for amounts, chain
//! ids and nonces.

use core::fmt::Debug;

use rand::{distributions::Standard, prelude::Distribution};
use serde::Serialize;
use uint::construct_uint;

macro_rules! impl_hex_debug {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }
    };
}

macro_rules! bytes32 {
    ( $T:ident ) => {
        #[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
        pub struct $T(pub [u8; 32]);

        impl Serialize for $T {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                // Exactly one slot, written as-is (bytes32 is left aligned).
                serializer.serialize_bytes(&self.0)
            }
        }

        impl Distribution<$T> for Standard {
            fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> $T {
                $T(rng.gen())
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self([0; 32])
            }
        }

        impl_hex_debug!($T);
    };
}

bytes32!(Bytes32);
bytes32!(Hash);

impl Hash {
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl From<Hash> for Bytes32 {
    fn from(h: Hash) -> Self {
        Bytes32(h.0)
    }
}

/// 65-byte Ethereum signature: `r || s || v` with `v` in `{27, 28}`.
///
/// Never ABI-encoded as a unit; the transaction builders split it into the
/// `(v, r, s)` tuple the verifier expects.
#[derive(PartialEq, Eq, Copy, Clone)]
pub struct Signature(pub [u8; 65]);
impl_hex_debug!(Signature);

impl Signature {
    pub fn new(rs: &[u8; 64], v: u8) -> Self {
        let mut sig = Signature([0; 65]);
        sig.0[..64].copy_from_slice(rs);
        sig.0[64] = v;
        sig
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn r(&self) -> Bytes32 {
        let mut r = [0u8; 32];
        r.copy_from_slice(&self.0[..32]);
        Bytes32(r)
    }

    pub fn s(&self) -> Bytes32 {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[32..64]);
        Bytes32(s)
    }
}

// primitive_types::U256 would work too, but it serde-serializes to a hex
// string, not to the 32-byte big-endian slot the ABI needs, so we construct
// our own and give it the slot encoding directly.
construct_uint! {
    pub struct U256(4);
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        serializer.serialize_bytes(&bytes)
    }
}

impl Distribution<U256> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let buf: [u8; 32] = rng.gen();
        U256::from_big_endian(&buf)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);
impl_hex_debug!(Address);

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Addresses are right aligned in their slot, like uints (unlike
        // bytesN, which is left aligned).
        let mut bytes = [0u8; 32];
        bytes[32 - 20..].copy_from_slice(self.0.as_slice());
        serializer.serialize_bytes(&bytes)
    }
}

impl Distribution<Address> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Address {
        Address(rng.gen())
    }
}
