//! Builders for the adjudicator and asset-holder call arguments.
//!
//! Each function encodes the argument tuple of the corresponding on-chain
//! method, without the 4-byte method id (which is not representable in the
//! serializer and can be prepended afterwards).

use serde::Serialize;

use crate::{
    abiencode::{
        self, as_bytes, to_fnargs_vec, to_vec,
        types::{Address, Bytes32, Hash, Signature},
    },
    channel::{State, VariablePart},
    force_move::{ChallengeRecord, WhoSignedWhat},
    outcome::{Allocation, Guarantee, Outcome},
    storage::ChannelStorage,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    NoStates,
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
            Error::NoStates => write!(f, "at least one state is required"),
            Error::Encoding(e) => write!(f, "encoding: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Signature in the `(v, r, s)` shape the verifier expects.
#[derive(Serialize)]
struct WireSignature {
    v: u8,
    r: Bytes32,
    s: Bytes32,
}

impl From<&Signature> for WireSignature {
    fn from(sig: &Signature) -> Self {
        WireSignature {
            v: sig.v(),
            r: sig.r(),
            s: sig.s(),
        }
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct WireBytes(#[serde(with = "as_bytes")] Vec<u8>);

fn wire_sigs(sigs: &[Signature]) -> Vec<WireSignature> {
    sigs.iter().map(WireSignature::from).collect()
}

fn variable_parts(states: &[State]) -> Result<Vec<VariablePart>, abiencode::Error> {
    states.iter().map(|s| s.variable_part()).collect()
}

fn is_final_count(states: &[State]) -> u8 {
    states.iter().filter(|s| s.is_final).count() as u8
}

/// Arguments of `forceMove`.
pub fn force_move(
    turn_num_record: u64,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
    challenger_sig: &Signature,
) -> Result<Vec<u8>, Error> {
    let last = states.last().ok_or(Error::NoStates)?;
    Ok(to_fnargs_vec(&(
        turn_num_record,
        last.fixed_part(),
        last.turn_num,
        variable_parts(states)?,
        is_final_count(states),
        wire_sigs(sigs),
        who_signed_what,
        WireSignature::from(challenger_sig),
    ))?)
}

/// Arguments of `respond`, built from the challenge being answered.
pub fn respond(
    challenge: &ChallengeRecord,
    response: &State,
    response_sig: &Signature,
) -> Result<Vec<u8>, Error> {
    Ok(to_fnargs_vec(&(
        challenge.turn_num_record,
        challenge.finalizes_at,
        challenge.challenger,
        [challenge.state.is_final, response.is_final],
        response.fixed_part(),
        [challenge.state.variable_part()?, response.variable_part()?],
        WireSignature::from(response_sig),
    ))?)
}

/// Arguments of `refute`.
pub fn refute(
    challenge: &ChallengeRecord,
    refutation: &State,
    refutation_sig: &Signature,
) -> Result<Vec<u8>, Error> {
    Ok(to_fnargs_vec(&(
        challenge.turn_num_record,
        refutation.turn_num,
        challenge.finalizes_at,
        challenge.challenger,
        [challenge.state.is_final, refutation.is_final],
        refutation.fixed_part(),
        [challenge.state.variable_part()?, refutation.variable_part()?],
        WireSignature::from(refutation_sig),
    ))?)
}

/// Arguments of `checkpoint`.
pub fn checkpoint(
    turn_num_record: u64,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
) -> Result<Vec<u8>, Error> {
    let last = states.last().ok_or(Error::NoStates)?;
    Ok(to_fnargs_vec(&(
        turn_num_record,
        last.fixed_part(),
        last.turn_num,
        variable_parts(states)?,
        is_final_count(states),
        wire_sigs(sigs),
        who_signed_what,
    ))?)
}

/// Arguments of `concludeFromOpen`. Final states agree on everything but the
/// turn number, so only the shared hashes travel.
pub fn conclude_from_open(
    turn_num_record: u64,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
) -> Result<Vec<u8>, Error> {
    let last = states.last().ok_or(Error::NoStates)?;
    Ok(to_fnargs_vec(&(
        turn_num_record,
        last.turn_num,
        last.fixed_part(),
        last.app_part_hash()?,
        last.outcome.hash()?,
        states.len() as u8,
        who_signed_what,
        wire_sigs(sigs),
    ))?)
}

/// The challenge fields without the turn number record, sent as opaque bytes
/// alongside `concludeFromChallenge`.
#[derive(Serialize)]
struct ChannelStorageLite {
    finalizes_at: u64,
    state_hash: Hash,
    challenger_address: Address,
    outcome_hash: Hash,
}

/// Arguments of `concludeFromChallenge`.
pub fn conclude_from_challenge(
    challenge: &ChallengeRecord,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
) -> Result<Vec<u8>, Error> {
    let last = states.last().ok_or(Error::NoStates)?;
    let challenge_outcome_hash = challenge.state.outcome.hash()?;
    let lite = to_vec(&ChannelStorageLite {
        finalizes_at: challenge.finalizes_at,
        state_hash: challenge.state.hash()?,
        challenger_address: challenge.challenger,
        outcome_hash: challenge_outcome_hash,
    })?;

    Ok(to_fnargs_vec(&(
        challenge.turn_num_record,
        last.turn_num,
        last.fixed_part(),
        last.app_part_hash()?,
        states.len() as u8,
        who_signed_what,
        wire_sigs(sigs),
        challenge_outcome_hash,
        WireBytes(lite),
    ))?)
}

/// Arguments of an asset holder's `transferAll`.
pub fn transfer_all(channel_id: Hash, allocation: &Allocation) -> Result<Vec<u8>, Error> {
    Ok(to_fnargs_vec(&(
        channel_id,
        WireBytes(allocation.encode()?),
    ))?)
}

/// Arguments of an asset holder's `claimAll`.
pub fn claim_all(
    guarantor_id: Hash,
    guarantee: &Guarantee,
    allocation: &Allocation,
) -> Result<Vec<u8>, Error> {
    Ok(to_fnargs_vec(&(
        guarantor_id,
        WireBytes(guarantee.encode()?),
        WireBytes(allocation.encode()?),
    ))?)
}

/// Arguments of the adjudicator's `pushOutcome`.
pub fn push_outcome(
    channel_id: Hash,
    storage: &ChannelStorage,
    outcome: &Outcome,
) -> Result<Vec<u8>, Error> {
    Ok(to_fnargs_vec(&(
        channel_id,
        storage.turn_num_record,
        storage.finalizes_at,
        storage.state_hash,
        storage.challenger_address,
        WireBytes(outcome.encode()?),
    ))?)
}
