//! The per-channel storage word kept by the adjudicating ledger.
//!
//! The ledger stores exactly one 32-byte word per channel. It packs the two
//! values every transition has to read, `finalizesAt` and `turnNumRecord`,
//! into the top 12 bytes, and fills the remaining 20 bytes with a fingerprint
//! of the full storage encoding. Transitions verify the declared cleartext
//! against the fingerprint, then replace the word.

use crate::{
    abiencode::{
        self, keccak256, to_fnargs_vec,
        types::{Address, Hash},
    },
    channel::State,
    outcome::Outcome,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// `finalizesAt` is zero but a state hash, challenger or outcome hash is
    /// set. An open channel has no challenge data.
    InvalidOpenStorage,
    /// `turnNumRecord` or `finalizesAt` does not fit the packed 48-bit field.
    Uint48Overflow(&'static str),
    Encoding(abiencode::Error),
}

impl From<abiencode::Error> for Error {
    fn from(e: abiencode::Error) -> Self {
        Error::Encoding(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidOpenStorage => {
                write!(f, "open storage must not carry challenge data")
            }
            Error::Uint48Overflow(field) => {
                write!(f, "{field} does not fit in 48 bits")
            }
            Error::Encoding(e) => write!(f, "encoding failed: {e}"),
        }
    }
}

impl std::error::Error for Error {}

const UINT48_MAX: u64 = (1 << 48) - 1;

fn require_uint48(value: u64, field: &'static str) -> Result<u64, Error> {
    if value > UINT48_MAX {
        return Err(Error::Uint48Overflow(field));
    }
    Ok(value)
}

/// The cleartext behind a channel's storage word.
///
/// Absent fields are all-zero: an open channel has `finalizes_at == 0` and
/// zero state hash, challenger and outcome hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStorage {
    pub turn_num_record: u64,
    pub finalizes_at: u64,
    pub state_hash: Hash,
    pub challenger_address: Address,
    pub outcome_hash: Hash,
}

impl ChannelStorage {
    /// Storage of an open channel: only the turn number record is set.
    pub fn open(turn_num_record: u64) -> Self {
        ChannelStorage {
            turn_num_record,
            ..Default::default()
        }
    }

    /// Storage of a channel finalized at `finalizes_at` by conclusion: the
    /// turn number record is cleared and only the outcome survives.
    pub fn finalized(finalizes_at: u64, outcome: &Outcome) -> Result<Self, Error> {
        Ok(ChannelStorage {
            turn_num_record: 0,
            finalizes_at,
            state_hash: Hash::default(),
            challenger_address: Address::default(),
            outcome_hash: outcome.hash()?,
        })
    }

    /// Storage of an ongoing challenge.
    pub fn challenge(
        turn_num_record: u64,
        finalizes_at: u64,
        state: &State,
        challenger_address: Address,
    ) -> Result<Self, Error> {
        Ok(ChannelStorage {
            turn_num_record,
            finalizes_at,
            state_hash: state.hash()?,
            challenger_address,
            outcome_hash: state.outcome.hash()?,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.finalizes_at == 0
            && (!self.state_hash.is_zero()
                || self.challenger_address != Address::default()
                || !self.outcome_hash.is_zero())
        {
            return Err(Error::InvalidOpenStorage);
        }
        Ok(())
    }

    /// `abi.encode(turnNumRecord, finalizesAt, stateHash, challengerAddress,
    /// outcomeHash)`.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        self.validate()?;
        require_uint48(self.turn_num_record, "turnNumRecord")?;
        require_uint48(self.finalizes_at, "finalizesAt")?;
        Ok(to_fnargs_vec(&(
            self.turn_num_record,
            self.finalizes_at,
            self.state_hash,
            self.challenger_address,
            self.outcome_hash,
        ))?)
    }

    /// The packed storage word:
    /// `finalizesAt` (6 bytes) || `turnNumRecord` (6 bytes) || the low 20
    /// bytes of `keccak256(encode())`.
    pub fn hash(&self) -> Result<Hash, Error> {
        let fingerprint = keccak256(&self.encode()?);

        let mut packed = [0u8; 32];
        packed[..6].copy_from_slice(&self.finalizes_at.to_be_bytes()[2..]);
        packed[6..12].copy_from_slice(&self.turn_num_record.to_be_bytes()[2..]);
        packed[12..].copy_from_slice(&fingerprint.0[12..]);
        Ok(Hash(packed))
    }
}

/// What a storage word allows, given the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Open,
    Challenge,
    Finalized,
}

/// The cleartext fields recoverable from a stored word alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackedStorage {
    pub turn_num_record: u64,
    pub finalizes_at: u64,
    pub fingerprint: [u8; 20],
}

impl UnpackedStorage {
    pub fn mode(&self, now: u64) -> ChannelMode {
        if self.finalizes_at == 0 {
            ChannelMode::Open
        } else if now < self.finalizes_at {
            ChannelMode::Challenge
        } else {
            ChannelMode::Finalized
        }
    }
}

/// Split a stored word into `finalizesAt`, `turnNumRecord` and the
/// fingerprint. The fingerprint alone cannot be verified; transitions
/// recompute [ChannelStorage::hash] from declared cleartext for that.
pub fn unpack(stored: Hash) -> UnpackedStorage {
    let mut be = [0u8; 8];

    be[2..].copy_from_slice(&stored.0[..6]);
    let finalizes_at = u64::from_be_bytes(be);

    be[2..].copy_from_slice(&stored.0[6..12]);
    let turn_num_record = u64::from_be_bytes(be);

    let mut fingerprint = [0u8; 20];
    fingerprint.copy_from_slice(&stored.0[12..]);

    UnpackedStorage {
        turn_num_record,
        finalizes_at,
        fingerprint,
    }
}
