//! Off-chain implementation of the ForceMove state-channel protocol: channel
//! and state identity hashing, the challenge/response dispute state machine,
//! and the allocation/guarantee settlement arithmetic.
//!
//! Everything in this crate is a pure function of its inputs. The adjudicating
//! ledger owns the per-channel storage hash and the per-asset holdings; this
//! crate computes, byte for byte, the same hashes and decisions the on-chain
//! verifier computes, so that callers can apply a transition as a single
//! compare-and-swap on the stored hash.

mod abiencode {
    mod error;
    mod hashing;
    mod ser;

    pub mod as_bytes;
    pub mod types;

    pub use error::{Error, Result};
    pub use hashing::{keccak256, to_fnargs_hash, to_hash};
    pub use ser::{to_fnargs_vec, to_fnargs_writer, to_vec, to_writer, Serializer, Writer};

    #[cfg(test)]
    pub mod tests;
}
pub mod sig;

pub mod channel;
pub mod force_move;
pub mod outcome;
pub mod settlement;
pub mod storage;
pub mod transactions;

pub use abiencode::types::{Address, Bytes32, Hash, Signature, U256};
