//! The ForceMove dispute state machine.
//!
//! Each function takes the channel's stored word, the current time and the
//! declared cleartext behind the word, verifies a transition and returns the
//! replacement [ChannelStorage]. Nothing here mutates anything: the caller
//! applies the result as a compare-and-swap on the stored word.

use serde::Serialize;

use crate::{
    abiencode::{
        self, to_fnargs_hash,
        types::{Address, Hash, Signature},
    },
    channel::{State, VariablePart},
    sig,
    storage::{self, ChannelMode, ChannelStorage},
};

/// Application-specific transition rules, consulted once a channel has left
/// its setup rounds.
pub trait ForceMoveApp {
    fn valid_transition(
        &self,
        from: &VariablePart,
        to: &VariablePart,
        turn_num_b: u64,
        n_participants: usize,
    ) -> bool;
}

#[derive(Debug)]
pub enum Error {
    /// The stored word holds an ongoing challenge.
    ChannelNotOpen,
    /// The stored word holds a finalized channel.
    ChannelFinalized,
    /// The challenge being responded to has already expired.
    NoOngoingChallenge,
    /// The declared cleartext does not hash to the stored word.
    WrongChannelStorage,
    StaleChallenge,
    TurnNumRecordNotIncreased,
    NoStates,
    FixedPartMismatch,
    NonConsecutiveTurnNums,
    /// A final state was followed by a non-final one.
    FinalityReversed,
    OutcomeChanged,
    AppDataChanged,
    /// The application rejected a transition.
    AppRejected,
    InvalidWhoSignedWhatLength,
    StateIndexOutOfBounds,
    /// A participant signed an older state than their position allows.
    UnacceptableWhoSignedWhat,
    SignatureCountMismatch,
    /// Signature `i` does not recover to participant `i`.
    InvalidSigner(usize),
    /// The response state was not signed by its mover.
    ResponseUnauthorized,
    /// The refutation was not signed by the challenger.
    WrongRefutationSignature,
    ChallengerNotParticipant,
    /// Conclusion requires every state to be final.
    NotFinal,
    /// Final states must agree on outcome and app data.
    FinalStateMismatch,
    Storage(storage::Error),
    Encoding(abiencode::Error),
    Signature(sig::Error),
}

impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<abiencode::Error> for Error {
    fn from(e: abiencode::Error) -> Self {
        Error::Encoding(e)
    }
}

impl From<sig::Error> for Error {
    fn from(e: sig::Error) -> Self {
        Error::Signature(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Storage(e) => write!(f, "storage: {e}"),
            Error::Encoding(e) => write!(f, "encoding: {e}"),
            Error::Signature(e) => write!(f, "signature: {e}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl std::error::Error for Error {}

/// The cleartext behind a stored challenge word.
#[derive(Debug, Clone)]
pub struct ChallengeRecord {
    pub turn_num_record: u64,
    pub finalizes_at: u64,
    pub state: State,
    pub challenger: Address,
}

impl ChallengeRecord {
    pub fn storage(&self) -> Result<ChannelStorage, storage::Error> {
        ChannelStorage::challenge(
            self.turn_num_record,
            self.finalizes_at,
            &self.state,
            self.challenger,
        )
    }
}

/// What a caller declares the stored word to contain.
#[derive(Debug, Clone)]
pub enum DeclaredStorage {
    Open { turn_num_record: u64 },
    Challenge(ChallengeRecord),
}

/// Which state each participant signed: entry `i` is an index into the
/// submitted state set, for participant `i`.
///
/// Encodes as `uint8[]`. Length, index bounds and the mover rule are
/// validated whenever a state set is checked for support.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct WhoSignedWhat(pub Vec<u8>);

/// Hash authorizing a challenge at `largest_turn_num`:
/// `keccak256(abi.encode(largestTurnNum, channelId))`.
pub fn challenge_hash(largest_turn_num: u64, channel_id: Hash) -> Result<Hash, abiencode::Error> {
    to_fnargs_hash(&(largest_turn_num, channel_id))
}

/// Register a challenge on an open channel.
///
/// `turn_num_record` is the declared record behind the stored word; a fresh
/// channel has an all-zero word and a record of zero. On success the channel
/// enters challenge mode, finalizing at `now + challengeDuration` unless
/// cleared.
#[allow(clippy::too_many_arguments)]
pub fn force_move(
    stored: Hash,
    now: u64,
    turn_num_record: u64,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
    challenger_sig: Signature,
    app: &impl ForceMoveApp,
) -> Result<ChannelStorage, Error> {
    match storage::unpack(stored).mode(now) {
        ChannelMode::Challenge => return Err(Error::ChannelNotOpen),
        ChannelMode::Finalized => return Err(Error::ChannelFinalized),
        ChannelMode::Open => {}
    }
    require_open_storage(stored, turn_num_record)?;

    let last = states.last().ok_or(Error::NoStates)?;
    let largest_turn_num = last.turn_num;
    if largest_turn_num <= turn_num_record {
        return Err(Error::StaleChallenge);
    }

    require_valid_support(states, sigs, who_signed_what, app)?;

    let channel_id = last.channel_id()?;
    let authorization = challenge_hash(largest_turn_num, channel_id)?;
    let challenger = sig::recover_signer(authorization, challenger_sig)?;
    if !last.channel.participants.contains(&challenger) {
        return Err(Error::ChallengerNotParticipant);
    }

    Ok(ChannelStorage::challenge(
        largest_turn_num,
        now.saturating_add(last.challenge_duration),
        last,
        challenger,
    )?)
}

/// Clear a challenge by providing the next state, signed by its mover.
pub fn respond(
    stored: Hash,
    now: u64,
    challenge: &ChallengeRecord,
    response: &State,
    response_sig: Signature,
    app: &impl ForceMoveApp,
) -> Result<ChannelStorage, Error> {
    require_challenge_storage(stored, challenge)?;
    if now >= challenge.finalizes_at {
        return Err(Error::NoOngoingChallenge);
    }
    if !challenge.state.same_fixed_part(response) {
        return Err(Error::FixedPartMismatch);
    }
    require_valid_transition(&challenge.state, response, app)?;

    let signer = sig::recover_signer(response.hash()?, response_sig)?;
    if response.mover() != Some(signer) {
        return Err(Error::ResponseUnauthorized);
    }

    Ok(ChannelStorage::open(response.turn_num))
}

/// Raise the turn number record with a newer supported state, clearing any
/// ongoing challenge along the way.
pub fn checkpoint(
    stored: Hash,
    now: u64,
    declared: &DeclaredStorage,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
    app: &impl ForceMoveApp,
) -> Result<ChannelStorage, Error> {
    let current_record = match declared {
        DeclaredStorage::Open { turn_num_record } => {
            require_open_storage(stored, *turn_num_record)?;
            *turn_num_record
        }
        DeclaredStorage::Challenge(challenge) => {
            require_challenge_storage(stored, challenge)?;
            if now >= challenge.finalizes_at {
                return Err(Error::ChannelFinalized);
            }
            challenge.turn_num_record
        }
    };

    let largest_turn_num = states.last().ok_or(Error::NoStates)?.turn_num;
    if largest_turn_num <= current_record {
        return Err(Error::TurnNumRecordNotIncreased);
    }

    require_valid_support(states, sigs, who_signed_what, app)?;

    Ok(ChannelStorage::open(largest_turn_num))
}

/// Clear a challenge by proving the challenger already signed a state newer
/// than the turn number record. The record itself stays unchanged.
pub fn refute(
    stored: Hash,
    now: u64,
    challenge: &ChallengeRecord,
    refutation: &State,
    refutation_sig: Signature,
) -> Result<ChannelStorage, Error> {
    require_challenge_storage(stored, challenge)?;
    if now >= challenge.finalizes_at {
        return Err(Error::NoOngoingChallenge);
    }
    if refutation.turn_num <= challenge.turn_num_record {
        return Err(Error::TurnNumRecordNotIncreased);
    }
    if !challenge.state.same_fixed_part(refutation) {
        return Err(Error::FixedPartMismatch);
    }

    let signer = sig::recover_signer(refutation.hash()?, refutation_sig)?;
    if signer != challenge.challenger {
        return Err(Error::WrongRefutationSignature);
    }

    Ok(ChannelStorage::open(challenge.turn_num_record))
}

/// Finalize an open channel immediately from a supported set of final states.
pub fn conclude_from_open(
    stored: Hash,
    now: u64,
    turn_num_record: u64,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
) -> Result<ChannelStorage, Error> {
    require_open_storage(stored, turn_num_record)?;
    conclude(now, states, sigs, who_signed_what)
}

/// Finalize a challenged channel immediately from a supported set of final
/// states, before the challenge itself expires.
pub fn conclude_from_challenge(
    stored: Hash,
    now: u64,
    challenge: &ChallengeRecord,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
) -> Result<ChannelStorage, Error> {
    require_challenge_storage(stored, challenge)?;
    if now >= challenge.finalizes_at {
        return Err(Error::ChannelFinalized);
    }
    conclude(now, states, sigs, who_signed_what)
}

fn conclude(
    now: u64,
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
) -> Result<ChannelStorage, Error> {
    let first = states.first().ok_or(Error::NoStates)?;
    let last = states.last().ok_or(Error::NoStates)?;

    for state in states {
        if !state.is_final {
            return Err(Error::NotFinal);
        }
    }
    for pair in states.windows(2) {
        if !pair[0].same_fixed_part(&pair[1]) {
            return Err(Error::FixedPartMismatch);
        }
        if pair[1].turn_num != pair[0].turn_num + 1 {
            return Err(Error::NonConsecutiveTurnNums);
        }
        if pair[0].outcome != pair[1].outcome || pair[0].app_data != pair[1].app_data {
            return Err(Error::FinalStateMismatch);
        }
    }

    let hashes = state_hashes(states)?;
    require_support_signatures(
        &hashes,
        last.turn_num,
        &first.channel.participants,
        sigs,
        who_signed_what,
    )?;

    Ok(ChannelStorage::finalized(now, &last.outcome)?)
}

fn require_open_storage(stored: Hash, turn_num_record: u64) -> Result<(), Error> {
    // A channel nobody has touched yet has an all-zero word.
    if stored.is_zero() {
        if turn_num_record != 0 {
            return Err(Error::WrongChannelStorage);
        }
        return Ok(());
    }
    if ChannelStorage::open(turn_num_record).hash()? != stored {
        return Err(Error::WrongChannelStorage);
    }
    Ok(())
}

fn require_challenge_storage(stored: Hash, challenge: &ChallengeRecord) -> Result<(), Error> {
    if challenge.storage()?.hash()? != stored {
        return Err(Error::WrongChannelStorage);
    }
    Ok(())
}

fn require_valid_transition(a: &State, b: &State, app: &impl ForceMoveApp) -> Result<(), Error> {
    if b.turn_num != a.turn_num + 1 {
        return Err(Error::NonConsecutiveTurnNums);
    }
    if a.is_final && !b.is_final {
        return Err(Error::FinalityReversed);
    }

    let n = b.channel.participants.len() as u64;
    if b.is_final {
        if b.outcome != a.outcome {
            return Err(Error::OutcomeChanged);
        }
    } else if b.turn_num < 2 * n {
        // Setup rounds: both outcome and app data are locked until every
        // participant has funded.
        if b.outcome != a.outcome {
            return Err(Error::OutcomeChanged);
        }
        if b.app_data != a.app_data {
            return Err(Error::AppDataChanged);
        }
    } else if !app.valid_transition(
        &a.variable_part()?,
        &b.variable_part()?,
        b.turn_num,
        n as usize,
    ) {
        return Err(Error::AppRejected);
    }
    Ok(())
}

fn state_hashes(states: &[State]) -> Result<Vec<Hash>, Error> {
    states
        .iter()
        .map(|s| s.hash().map_err(Error::from))
        .collect()
}

/// Chain validation plus the signature scheme over the whole state set.
fn require_valid_support(
    states: &[State],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
    app: &impl ForceMoveApp,
) -> Result<(), Error> {
    let first = states.first().ok_or(Error::NoStates)?;
    let last = states.last().ok_or(Error::NoStates)?;

    for pair in states.windows(2) {
        if !pair[0].same_fixed_part(&pair[1]) {
            return Err(Error::FixedPartMismatch);
        }
        require_valid_transition(&pair[0], &pair[1], app)?;
    }

    let hashes = state_hashes(states)?;
    require_support_signatures(
        &hashes,
        last.turn_num,
        &first.channel.participants,
        sigs,
        who_signed_what,
    )
}

/// Verify that every participant signed a recent-enough state.
///
/// Participant `i` moved at offset `(n + largestTurnNum - i) % n` rounds ago.
/// Anyone who moved within the provided window must have signed the state
/// they moved or a later one; participants whose own move lies before the
/// window may sign any provided state.
fn require_support_signatures(
    state_hashes: &[Hash],
    largest_turn_num: u64,
    participants: &[Address],
    sigs: &[Signature],
    who_signed_what: &WhoSignedWhat,
) -> Result<(), Error> {
    let n = participants.len();
    if who_signed_what.0.len() != n {
        return Err(Error::InvalidWhoSignedWhatLength);
    }
    if sigs.len() != n {
        return Err(Error::SignatureCountMismatch);
    }

    let n_states = state_hashes.len() as u64;
    for (i, &signed) in who_signed_what.0.iter().enumerate() {
        if u64::from(signed) >= n_states {
            return Err(Error::StateIndexOutOfBounds);
        }
        let offset = (n as u64 + largest_turn_num - i as u64) % n as u64;
        if offset < n_states && u64::from(signed) < n_states - 1 - offset {
            return Err(Error::UnacceptableWhoSignedWhat);
        }
    }

    for (i, participant) in participants.iter().enumerate() {
        let signed = who_signed_what.0[i] as usize;
        let signer = sig::recover_signer(state_hashes[signed], sigs[i])?;
        if signer != *participant {
            return Err(Error::InvalidSigner(i));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::Channel,
        outcome::{Allocation, AllocationItem, AssetOutcome, Destination, Outcome, OutcomeContent},
        sig::Signer,
        U256,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    struct AcceptAll;
    impl ForceMoveApp for AcceptAll {
        fn valid_transition(&self, _: &VariablePart, _: &VariablePart, _: u64, _: usize) -> bool {
            true
        }
    }

    struct RejectAll;
    impl ForceMoveApp for RejectAll {
        fn valid_transition(&self, _: &VariablePart, _: &VariablePart, _: u64, _: usize) -> bool {
            false
        }
    }

    struct Fixture {
        signers: Vec<Signer>,
        channel: Channel,
        asset_holder: Address,
    }

    fn fixture(seed: u64, n: usize) -> Fixture {
        let mut rng = StdRng::seed_from_u64(seed);
        let signers: Vec<Signer> = (0..n).map(|_| Signer::new(&mut rng)).collect();
        let channel = Channel {
            chain_id: 1337.into(),
            channel_nonce: rng.gen(),
            participants: signers.iter().map(|s| s.address()).collect(),
        };
        Fixture {
            signers,
            channel,
            asset_holder: rng.gen(),
        }
    }

    fn outcome(f: &Fixture, amount: u64) -> Outcome {
        Outcome(vec![AssetOutcome {
            asset_holder: f.asset_holder,
            content: OutcomeContent::Allocation(Allocation(vec![AllocationItem {
                destination: Destination::from_external(f.channel.participants[0]),
                amount: U256::from(amount),
            }])),
        }])
    }

    fn state(f: &Fixture, turn_num: u64, is_final: bool) -> State {
        State {
            channel: f.channel.clone(),
            turn_num,
            is_final,
            challenge_duration: 60,
            app_definition: Address([0xab; 20]),
            app_data: vec![],
            outcome: outcome(f, 10),
        }
    }

    fn states(f: &Fixture, turns: &[u64], is_final: bool) -> Vec<State> {
        turns.iter().map(|&t| state(f, t, is_final)).collect()
    }

    /// Everyone signs the newest state, which is acceptable for any offset.
    fn sign_last(f: &Fixture, states: &[State]) -> (Vec<Signature>, WhoSignedWhat) {
        let last_hash = states.last().unwrap().hash().unwrap();
        let sigs = f.signers.iter().map(|s| s.sign_eth(last_hash)).collect();
        let wsw = WhoSignedWhat(vec![(states.len() - 1) as u8; f.signers.len()]);
        (sigs, wsw)
    }

    fn challenger_sig(f: &Fixture, signer: usize, largest_turn_num: u64) -> Signature {
        let hash = challenge_hash(largest_turn_num, f.channel.id().unwrap()).unwrap();
        f.signers[signer].sign_eth(hash)
    }

    /// A registered challenge plus the word the ledger would store for it.
    fn challenged(f: &Fixture, now: u64) -> (ChallengeRecord, Hash) {
        let sts = states(f, &[4, 5], false);
        let (sigs, wsw) = sign_last(f, &sts);
        let result = force_move(
            Hash::default(),
            now,
            0,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(f, 0, 5),
            &AcceptAll,
        )
        .unwrap();

        let record = ChallengeRecord {
            turn_num_record: result.turn_num_record,
            finalizes_at: result.finalizes_at,
            state: sts.last().unwrap().clone(),
            challenger: f.signers[0].address(),
        };
        let stored = result.hash().unwrap();
        assert_eq!(record.storage().unwrap().hash().unwrap(), stored);
        (record, stored)
    }

    #[test]
    fn force_move_on_fresh_channel() {
        let f = fixture(1, 2);
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let result = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 1, 5),
            &AcceptAll,
        )
        .unwrap();

        assert_eq!(result.turn_num_record, 5);
        assert_eq!(result.finalizes_at, 1060);
        assert_eq!(result.state_hash, sts[1].hash().unwrap());
        assert_eq!(result.challenger_address, f.signers[1].address());
        assert_eq!(
            storage::unpack(result.hash().unwrap()).mode(1000),
            ChannelMode::Challenge
        );
    }

    #[test]
    fn force_move_requires_declared_record_to_match() {
        let f = fixture(2, 2);
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        // Declaring a nonzero record against a fresh word.
        let err = force_move(
            Hash::default(),
            1000,
            3,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 5),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::WrongChannelStorage));
    }

    #[test]
    fn force_move_rejects_stale_challenge() {
        let f = fixture(3, 2);
        let stored = ChannelStorage::open(5).hash().unwrap();
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = force_move(
            stored,
            1000,
            5,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 5),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::StaleChallenge));
    }

    #[test]
    fn force_move_rejects_ongoing_challenge() {
        let f = fixture(4, 2);
        let (_, stored) = challenged(&f, 1000);
        let sts = states(&f, &[6, 7], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = force_move(
            stored,
            1010,
            5,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 7),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ChannelNotOpen));

        // Once expired the channel counts as finalized instead.
        let err = force_move(
            stored,
            2000,
            5,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 7),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ChannelFinalized));
    }

    #[test]
    fn force_move_requires_participant_challenger() {
        let f = fixture(5, 2);
        let outsider = fixture(55, 1);
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let hash = challenge_hash(5, f.channel.id().unwrap()).unwrap();
        let err = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &wsw,
            outsider.signers[0].sign_eth(hash),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ChallengerNotParticipant));
    }

    #[test]
    fn setup_rounds_lock_outcome_and_app_data() {
        let f = fixture(6, 2);
        let mut sts = states(&f, &[1, 2], false);
        sts[1].outcome = outcome(&f, 11);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 2),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::OutcomeChanged));

        let mut sts = states(&f, &[1, 2], false);
        sts[1].app_data = vec![0xff];
        let (sigs, wsw) = sign_last(&f, &sts);
        let err = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 2),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AppDataChanged));
    }

    #[test]
    fn force_move_rejects_non_increasing_chain() {
        let f = fixture(25, 2);
        // Turn numbers must grow by one per state; a descending set is not a
        // support chain no matter who signed it.
        let sts = states(&f, &[7, 6, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 5),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NonConsecutiveTurnNums));
    }

    #[test]
    fn app_can_reject_transitions() {
        let f = fixture(7, 2);
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 5),
            &RejectAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AppRejected));
    }

    #[test]
    fn who_signed_what_must_be_recent_enough() {
        let f = fixture(8, 2);
        let sts = states(&f, &[4, 5], false);
        let hashes: Vec<Hash> = sts.iter().map(|s| s.hash().unwrap()).collect();

        // largestTurnNum 5: participant 1 moved last (offset 0) and must sign
        // the newest state. Both signing the oldest is unacceptable.
        let sigs: Vec<Signature> = f.signers.iter().map(|s| s.sign_eth(hashes[0])).collect();
        let err = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &WhoSignedWhat(vec![0, 0]),
            challenger_sig(&f, 0, 5),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnacceptableWhoSignedWhat));
    }

    #[test]
    fn mover_signing_their_own_state_is_acceptable() {
        let f = fixture(9, 2);
        let sts = states(&f, &[4, 5], false);
        let hashes: Vec<Hash> = sts.iter().map(|s| s.hash().unwrap()).collect();

        // Turn 4 was moved by participant 0, turn 5 by participant 1.
        let sigs = vec![
            f.signers[0].sign_eth(hashes[0]),
            f.signers[1].sign_eth(hashes[1]),
        ];
        let result = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &WhoSignedWhat(vec![0, 1]),
            challenger_sig(&f, 0, 5),
            &AcceptAll,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn signatures_must_match_participant_order() {
        let f = fixture(10, 2);
        let sts = states(&f, &[4, 5], false);
        let (mut sigs, wsw) = sign_last(&f, &sts);
        sigs.swap(0, 1);

        let err = force_move(
            Hash::default(),
            1000,
            0,
            &sts,
            &sigs,
            &wsw,
            challenger_sig(&f, 0, 5),
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSigner(0)));
    }

    #[test]
    fn respond_clears_challenge() {
        let f = fixture(11, 2);
        let (record, stored) = challenged(&f, 1000);

        // Turn 6 is participant 0's move.
        let response = state(&f, 6, false);
        let response_sig = f.signers[0].sign_eth(response.hash().unwrap());

        let result = respond(stored, 1030, &record, &response, response_sig, &AcceptAll).unwrap();
        assert_eq!(result, ChannelStorage::open(6));
    }

    #[test]
    fn respond_requires_the_mover() {
        let f = fixture(12, 2);
        let (record, stored) = challenged(&f, 1000);

        let response = state(&f, 6, false);
        let wrong_sig = f.signers[1].sign_eth(response.hash().unwrap());

        let err = respond(stored, 1030, &record, &response, wrong_sig, &AcceptAll).unwrap_err();
        assert!(matches!(err, Error::ResponseUnauthorized));
    }

    #[test]
    fn respond_after_expiry_fails() {
        let f = fixture(13, 2);
        let (record, stored) = challenged(&f, 1000);

        let response = state(&f, 6, false);
        let response_sig = f.signers[0].sign_eth(response.hash().unwrap());

        let err = respond(stored, 1060, &record, &response, response_sig, &AcceptAll).unwrap_err();
        assert!(matches!(err, Error::NoOngoingChallenge));
    }

    #[test]
    fn respond_requires_consecutive_turn() {
        let f = fixture(14, 2);
        let (record, stored) = challenged(&f, 1000);

        let response = state(&f, 8, false);
        let response_sig = f.signers[0].sign_eth(response.hash().unwrap());

        let err = respond(stored, 1030, &record, &response, response_sig, &AcceptAll).unwrap_err();
        assert!(matches!(err, Error::NonConsecutiveTurnNums));
    }

    #[test]
    fn checkpoint_raises_open_record() {
        let f = fixture(15, 2);
        let stored = ChannelStorage::open(2).hash().unwrap();
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let result = checkpoint(
            stored,
            1000,
            &DeclaredStorage::Open { turn_num_record: 2 },
            &sts,
            &sigs,
            &wsw,
            &AcceptAll,
        )
        .unwrap();
        assert_eq!(result, ChannelStorage::open(5));
    }

    #[test]
    fn checkpoint_requires_increased_record() {
        let f = fixture(16, 2);
        let stored = ChannelStorage::open(5).hash().unwrap();
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = checkpoint(
            stored,
            1000,
            &DeclaredStorage::Open { turn_num_record: 5 },
            &sts,
            &sigs,
            &wsw,
            &AcceptAll,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TurnNumRecordNotIncreased));
    }

    #[test]
    fn checkpoint_clears_challenge() {
        let f = fixture(17, 2);
        let (record, stored) = challenged(&f, 1000);
        let sts = states(&f, &[6, 7], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let result = checkpoint(
            stored,
            1030,
            &DeclaredStorage::Challenge(record),
            &sts,
            &sigs,
            &wsw,
            &AcceptAll,
        )
        .unwrap();
        assert_eq!(result, ChannelStorage::open(7));
    }

    #[test]
    fn refute_restores_open_storage() {
        let f = fixture(18, 2);
        let (record, stored) = challenged(&f, 1000);

        // The challenger (participant 0) already signed turn 6 off-chain.
        let refutation = state(&f, 6, false);
        let refutation_sig = f.signers[0].sign_eth(refutation.hash().unwrap());

        let result = refute(stored, 1030, &record, &refutation, refutation_sig).unwrap();
        assert_eq!(result, ChannelStorage::open(record.turn_num_record));
    }

    #[test]
    fn refute_requires_challenger_signature() {
        let f = fixture(19, 2);
        let (record, stored) = challenged(&f, 1000);

        let refutation = state(&f, 6, false);
        let wrong_sig = f.signers[1].sign_eth(refutation.hash().unwrap());

        let err = refute(stored, 1030, &record, &refutation, wrong_sig).unwrap_err();
        assert!(matches!(err, Error::WrongRefutationSignature));
    }

    #[test]
    fn refute_requires_newer_turn() {
        let f = fixture(20, 2);
        let (record, stored) = challenged(&f, 1000);

        // Record is 5, a refutation at turn 5 or below proves nothing.
        let refutation = state(&f, 5, false);
        let refutation_sig = f.signers[0].sign_eth(refutation.hash().unwrap());

        let err = refute(stored, 1030, &record, &refutation, refutation_sig).unwrap_err();
        assert!(matches!(err, Error::TurnNumRecordNotIncreased));
    }

    #[test]
    fn conclude_from_open_finalizes_now() {
        let f = fixture(21, 2);
        let sts = states(&f, &[4, 5], true);
        let (sigs, wsw) = sign_last(&f, &sts);

        let result = conclude_from_open(Hash::default(), 1000, 0, &sts, &sigs, &wsw).unwrap();
        assert_eq!(result.turn_num_record, 0);
        assert_eq!(result.finalizes_at, 1000);
        assert_eq!(result.outcome_hash, sts[1].outcome.hash().unwrap());
        assert_eq!(
            storage::unpack(result.hash().unwrap()).mode(1000),
            ChannelMode::Finalized
        );
    }

    #[test]
    fn conclude_requires_final_states() {
        let f = fixture(22, 2);
        let sts = states(&f, &[4, 5], false);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = conclude_from_open(Hash::default(), 1000, 0, &sts, &sigs, &wsw).unwrap_err();
        assert!(matches!(err, Error::NotFinal));
    }

    #[test]
    fn conclude_requires_matching_final_states() {
        let f = fixture(23, 2);
        let mut sts = states(&f, &[4, 5], true);
        sts[1].outcome = outcome(&f, 11);
        let (sigs, wsw) = sign_last(&f, &sts);

        let err = conclude_from_open(Hash::default(), 1000, 0, &sts, &sigs, &wsw).unwrap_err();
        assert!(matches!(err, Error::FinalStateMismatch));
    }

    #[test]
    fn conclude_requires_a_signature_per_participant() {
        let f = fixture(26, 2);
        let (record, stored) = challenged(&f, 1000);
        let sts = states(&f, &[6, 7], true);
        let (mut sigs, wsw) = sign_last(&f, &sts);
        sigs.truncate(1);

        let err = conclude_from_challenge(stored, 1030, &record, &sts, &sigs, &wsw).unwrap_err();
        assert!(matches!(err, Error::SignatureCountMismatch));
    }

    #[test]
    fn conclude_from_challenge_beats_the_clock() {
        let f = fixture(24, 2);
        let (record, stored) = challenged(&f, 1000);
        let sts = states(&f, &[6, 7], true);
        let (sigs, wsw) = sign_last(&f, &sts);

        let result = conclude_from_challenge(stored, 1030, &record, &sts, &sigs, &wsw).unwrap();
        assert_eq!(result.finalizes_at, 1030);

        let err = conclude_from_challenge(stored, 1060, &record, &sts, &sigs, &wsw).unwrap_err();
        assert!(matches!(err, Error::ChannelFinalized));
    }
}
