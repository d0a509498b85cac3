//! Asset settlement once a channel has finalized.
//!
//! Each asset holder tracks, per destination, how much it holds and the
//! content hash of the outcome it will pay out against. [push_outcome]
//! transcribes a finalized channel's outcome into the holders, after which
//! [AssetHolder::transfer_all] and [AssetHolder::claim_all] convert holdings
//! into payouts. All additions are checked, and every payout is capped at
//! the remaining balance before it is subtracted, so holdings can neither
//! overflow nor go negative; there is no overdraw error because the state
//! that would produce one cannot be reached.

use std::collections::BTreeMap;

use crate::{
    abiencode::{
        self,
        types::{Address, Hash, U256},
    },
    outcome::{Allocation, AllocationItem, Destination, Guarantee, Outcome},
    storage::{self, ChannelStorage},
};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The provided content does not hash to the stored outcome hash.
    OutcomeHashMismatch,
    /// An asset holder already has an outcome registered for this channel.
    OutcomeHashAlreadyExists,
    /// Adding to a destination's holdings would overflow.
    AmountOverflow,
    /// Deposits go to channels, never to external addresses.
    CannotDepositToExternal,
    HoldingsBelowExpected,
    /// The destination already holds the expected amount plus the deposit.
    AlreadyFunded,
    /// `finalizesAt` has not passed (or the channel never finalized).
    ChannelNotFinalized,
    /// The declared storage fields do not hash to the stored word.
    StorageMismatch,
    Storage(storage::Error),
    Encoding(abiencode::Error),
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

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Storage(e) => write!(f, "storage: {e}"),
            Error::Encoding(e) => write!(f, "encoding: {e}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl std::error::Error for Error {}

/// Funds leaving the system towards an external address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub to: Address,
    pub amount: U256,
}

/// Result of a deposit, echoing how much was actually credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deposited {
    pub destination: Destination,
    pub amount_deposited: U256,
    pub destination_holdings: U256,
}

/// Per-asset ledger: holdings and registered outcome hashes by destination.
///
/// Absent entries are zero. An entry in `outcome_hashes` means the channel
/// has finalized for this asset and its funds can be paid out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetHolder {
    pub holdings: BTreeMap<Destination, U256>,
    pub outcome_hashes: BTreeMap<Destination, Hash>,
}

impl AssetHolder {
    pub fn holdings(&self, destination: Destination) -> U256 {
        self.holdings
            .get(&destination)
            .copied()
            .unwrap_or_default()
    }

    fn credit(&mut self, destination: Destination, amount: U256) -> Result<(), Error> {
        let held = self.holdings(destination);
        let new = held.checked_add(amount).ok_or(Error::AmountOverflow)?;
        self.holdings.insert(destination, new);
        Ok(())
    }

    /// Fund a channel, guarded against front-running: the deposit only
    /// counts if the destination held exactly `expected_held` and needs the
    /// full `amount` on top.
    pub fn deposit(
        &mut self,
        destination: Destination,
        expected_held: U256,
        amount: U256,
    ) -> Result<Deposited, Error> {
        if destination.is_external() {
            return Err(Error::CannotDepositToExternal);
        }
        let held = self.holdings(destination);
        if held < expected_held {
            return Err(Error::HoldingsBelowExpected);
        }
        let target = expected_held
            .checked_add(amount)
            .ok_or(Error::AmountOverflow)?;
        if held >= target {
            return Err(Error::AlreadyFunded);
        }

        let amount_deposited = target - held;
        self.credit(destination, amount_deposited)?;
        Ok(Deposited {
            destination,
            amount_deposited,
            destination_holdings: self.holdings(destination),
        })
    }

    /// Pay out `channel`'s allocation in order, as far as holdings reach.
    ///
    /// Fully paid items disappear; a partially affordable item stays with
    /// the remainder. External destinations become [Payout]s, channel
    /// destinations are credited in place.
    pub fn transfer_all(
        &mut self,
        channel: Destination,
        allocation: &Allocation,
    ) -> Result<Vec<Payout>, Error> {
        self.require_outcome(channel, allocation.content_hash()?)?;

        let mut balance = self.holdings(channel);
        let mut payments: Vec<AllocationItem> = Vec::new();
        let mut remaining: Vec<AllocationItem> = Vec::new();

        for item in &allocation.0 {
            let affordable = item.amount.min(balance);
            balance = balance - affordable;
            if affordable < item.amount {
                remaining.push(AllocationItem {
                    destination: item.destination,
                    amount: item.amount - affordable,
                });
            }
            if !affordable.is_zero() {
                payments.push(AllocationItem {
                    destination: item.destination,
                    amount: affordable,
                });
            }
        }

        self.holdings.insert(channel, balance);
        if remaining.is_empty() {
            self.outcome_hashes.remove(&channel);
        } else {
            self.outcome_hashes
                .insert(channel, Allocation(remaining).content_hash()?);
        }

        self.apply_payments(payments)
    }

    /// Pay out a guarantor channel's funds against the target channel's
    /// allocation, in the guarantee's preferred order first, then the
    /// allocation's own order.
    ///
    /// The target's outcome is rewritten to the remaining allocation; the
    /// guarantor's outcome stays registered.
    pub fn claim_all(
        &mut self,
        guarantor: Destination,
        guarantee: &Guarantee,
        allocation: &Allocation,
    ) -> Result<Vec<Payout>, Error> {
        self.require_outcome(guarantor, guarantee.content_hash()?)?;
        let target = Destination::from_channel(guarantee.guaranteed_channel_id);
        self.require_outcome(target, allocation.content_hash()?)?;

        let mut balance = self.holdings(guarantor);
        let mut amounts: Vec<U256> = allocation.0.iter().map(|item| item.amount).collect();
        let mut payments: Vec<AllocationItem> = Vec::new();

        // First pass: the guarantee's destinations, in its order. Only the
        // first allocation item per destination is considered.
        'outer: for destination in &guarantee.destinations {
            if balance.is_zero() {
                break;
            }
            for (item, amount) in allocation.0.iter().zip(amounts.iter_mut()) {
                if item.destination == *destination {
                    let affordable = (*amount).min(balance);
                    if !affordable.is_zero() {
                        balance = balance - affordable;
                        *amount = *amount - affordable;
                        payments.push(AllocationItem {
                            destination: item.destination,
                            amount: affordable,
                        });
                    }
                    continue 'outer;
                }
            }
        }

        // Second pass: whatever is left follows the allocation's own order.
        for (item, amount) in allocation.0.iter().zip(amounts.iter_mut()) {
            if balance.is_zero() {
                break;
            }
            if amount.is_zero() {
                continue;
            }
            let affordable = (*amount).min(balance);
            balance = balance - affordable;
            *amount = *amount - affordable;
            payments.push(AllocationItem {
                destination: item.destination,
                amount: affordable,
            });
        }

        let remaining: Vec<AllocationItem> = allocation
            .0
            .iter()
            .zip(amounts.iter())
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(item, amount)| AllocationItem {
                destination: item.destination,
                amount: *amount,
            })
            .collect();

        self.holdings.insert(guarantor, balance);
        if remaining.is_empty() {
            self.outcome_hashes.remove(&target);
        } else {
            self.outcome_hashes
                .insert(target, Allocation(remaining).content_hash()?);
        }

        self.apply_payments(payments)
    }

    fn require_outcome(&self, destination: Destination, expected: Hash) -> Result<(), Error> {
        match self.outcome_hashes.get(&destination) {
            Some(stored) if *stored == expected => Ok(()),
            _ => Err(Error::OutcomeHashMismatch),
        }
    }

    fn apply_payments(&mut self, payments: Vec<AllocationItem>) -> Result<Vec<Payout>, Error> {
        let mut payouts = Vec::new();
        for payment in payments {
            match payment.destination.to_external() {
                Some(to) => payouts.push(Payout {
                    to,
                    amount: payment.amount,
                }),
                None => self.credit(payment.destination, payment.amount)?,
            }
        }
        Ok(payouts)
    }
}

/// Transcribe a finalized channel's outcome into the asset holders.
///
/// The declared storage fields must hash to `stored` with the provided
/// outcome, `finalizes_at` must have passed, and no targeted asset holder may
/// already have an outcome for this channel. The check runs over all assets
/// before anything is written.
#[allow(clippy::too_many_arguments)]
pub fn push_outcome(
    stored: Hash,
    now: u64,
    channel_id: Hash,
    turn_num_record: u64,
    finalizes_at: u64,
    state_hash: Hash,
    challenger_address: Address,
    outcome: &Outcome,
    holders: &mut BTreeMap<Address, AssetHolder>,
) -> Result<(), Error> {
    let declared = ChannelStorage {
        turn_num_record,
        finalizes_at,
        state_hash,
        challenger_address,
        outcome_hash: outcome.hash()?,
    };
    if declared.hash()? != stored {
        return Err(Error::StorageMismatch);
    }
    if finalizes_at == 0 || now < finalizes_at {
        return Err(Error::ChannelNotFinalized);
    }

    let destination = Destination::from_channel(channel_id);
    for entry in &outcome.0 {
        if let Some(holder) = holders.get(&entry.asset_holder) {
            if holder.outcome_hashes.contains_key(&destination) {
                return Err(Error::OutcomeHashAlreadyExists);
            }
        }
    }

    for entry in &outcome.0 {
        let content_hash = entry.content.hash()?;
        holders
            .entry(entry.asset_holder)
            .or_default()
            .outcome_hashes
            .insert(destination, content_hash);
    }
    Ok(())
}
