//! Channel identity and state hashing.
//!
//! A channel is identified by the hash of its constants; a state is
//! identified by a hash over the channel id, the hash of the application
//! constants and the outcome hash. Everything a participant signs is one of
//! these hashes.

use serde::Serialize;

use crate::{
    abiencode::{
        self, as_bytes, to_fnargs_hash,
        types::{Address, Hash, U256},
    },
    outcome::Outcome,
};

/// The constants that identify a channel.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub chain_id: U256,
    pub channel_nonce: U256,
    pub participants: Vec<Address>,
}

impl Channel {
    /// `keccak256(abi.encode(chainId, participants, channelNonce))`.
    pub fn id(&self) -> Result<Hash, abiencode::Error> {
        to_fnargs_hash(&(self.chain_id, &self.participants, self.channel_nonce))
    }
}

/// A complete channel state as exchanged between participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub channel: Channel,
    pub turn_num: u64,
    pub is_final: bool,
    pub challenge_duration: u64,
    pub app_definition: Address,
    pub app_data: Vec<u8>,
    pub outcome: Outcome,
}

#[derive(Serialize)]
struct AppPart<'a> {
    challenge_duration: u64,
    app_definition: Address,
    #[serde(with = "as_bytes")]
    app_data: &'a [u8],
}

impl State {
    pub fn channel_id(&self) -> Result<Hash, abiencode::Error> {
        self.channel.id()
    }

    /// Hash over the application constants:
    /// `keccak256(abi.encode(challengeDuration, appDefinition, appData))`.
    pub fn app_part_hash(&self) -> Result<Hash, abiencode::Error> {
        to_fnargs_hash(&AppPart {
            challenge_duration: self.challenge_duration,
            app_definition: self.app_definition,
            app_data: &self.app_data,
        })
    }

    /// The hash participants sign:
    /// `keccak256(abi.encode(turnNum, isFinal, channelId, appPartHash, outcomeHash))`.
    pub fn hash(&self) -> Result<Hash, abiencode::Error> {
        to_fnargs_hash(&(
            self.turn_num,
            self.is_final,
            self.channel_id()?,
            self.app_part_hash()?,
            self.outcome.hash()?,
        ))
    }

    /// The participant whose turn it is to progress from this state.
    pub fn mover(&self) -> Option<Address> {
        let n = self.channel.participants.len();
        if n == 0 {
            return None;
        }
        Some(self.channel.participants[self.turn_num as usize % n])
    }

    pub fn fixed_part(&self) -> FixedPart {
        FixedPart {
            chain_id: self.channel.chain_id,
            participants: self.channel.participants.clone(),
            channel_nonce: self.channel.channel_nonce,
            app_definition: self.app_definition,
            challenge_duration: self.challenge_duration,
        }
    }

    pub fn variable_part(&self) -> Result<VariablePart, abiencode::Error> {
        Ok(VariablePart {
            outcome: self.outcome.encode()?,
            app_data: self.app_data.clone(),
        })
    }

    /// Whether two states belong to the same channel with the same
    /// application constants. Support validation requires this for every
    /// state in a chain.
    pub fn same_fixed_part(&self, other: &State) -> bool {
        self.channel == other.channel
            && self.challenge_duration == other.challenge_duration
            && self.app_definition == other.app_definition
    }
}

/// The constants of a channel as sent on-chain during a dispute.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FixedPart {
    pub chain_id: U256,
    pub participants: Vec<Address>,
    pub channel_nonce: U256,
    pub app_definition: Address,
    pub challenge_duration: u64,
}

impl FixedPart {
    pub fn channel_id(&self) -> Result<Hash, abiencode::Error> {
        to_fnargs_hash(&(self.chain_id, &self.participants, self.channel_nonce))
    }
}

/// The parts of a state that change from turn to turn, with the outcome
/// already in its encoded form.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VariablePart {
    #[serde(with = "as_bytes")]
    pub outcome: Vec<u8>,
    #[serde(with = "as_bytes")]
    pub app_data: Vec<u8>,
}
