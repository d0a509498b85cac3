//! The outcome model: who gets what once a channel finalizes.
//!
//! An outcome is a list of per-asset-holder entries, each carrying either an
//! [Allocation] (ordered payout list) or a [Guarantee] (payout reordering for
//! a target channel). The asset holders only ever store the keccak256 of the
//! encoded content, so every type here comes with its exact ABI encoding.

use serde::Serialize;

use crate::abiencode::{
    self, as_bytes, keccak256,
    types::{Address, Bytes32, Hash, U256},
};

/// Recipient of funds held by an asset holder.
///
/// Either an external address (low 12 bytes zero, address in the top 20
/// bytes) or the id of another channel.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Destination(pub Bytes32);

impl Destination {
    pub fn from_external(addr: Address) -> Self {
        let mut raw = [0u8; 32];
        raw[..20].copy_from_slice(&addr.0);
        Destination(Bytes32(raw))
    }

    pub fn from_channel(id: Hash) -> Self {
        Destination(id.into())
    }

    pub fn is_external(&self) -> bool {
        self.0 .0[20..] == [0u8; 12]
    }

    /// The external address, or `None` if this destination is a channel.
    pub fn to_external(&self) -> Option<Address> {
        if !self.is_external() {
            return None;
        }
        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&self.0 .0[..20]);
        Some(addr)
    }
}

#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct AllocationItem {
    pub destination: Destination,
    pub amount: U256,
}

/// Ordered payout list: earlier items have priority when funds run short.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Allocation(pub Vec<AllocationItem>);

impl Allocation {
    /// `abi.encode` of the `tuple(bytes32, uint256)[]` item list.
    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        abiencode::to_vec(self)
    }

    pub fn total(&self) -> U256 {
        self.0
            .iter()
            .fold(U256::zero(), |acc, item| acc.saturating_add(item.amount))
    }

    /// Hash of the labelled content, as stored by the asset holders.
    pub fn content_hash(&self) -> Result<Hash, abiencode::Error> {
        labelled_content_hash(OUTCOME_TYPE_ALLOCATION, &self.encode()?)
    }
}

/// Reprioritization of a target channel's allocation.
///
/// The guarantor channel's funds are paid out following `destinations` order,
/// with amounts looked up in the target channel's allocation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Guarantee {
    pub guaranteed_channel_id: Hash,
    pub destinations: Vec<Destination>,
}

impl Guarantee {
    /// `abi.encode` of the `tuple(bytes32, bytes32[])` struct.
    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        abiencode::to_vec(self)
    }

    pub fn content_hash(&self) -> Result<Hash, abiencode::Error> {
        labelled_content_hash(OUTCOME_TYPE_GUARANTEE, &self.encode()?)
    }
}

pub const OUTCOME_TYPE_ALLOCATION: u8 = 0;
pub const OUTCOME_TYPE_GUARANTEE: u8 = 1;

/// The per-asset-holder payload, labelled with its one-byte discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeContent {
    Allocation(Allocation),
    Guarantee(Guarantee),
}

#[derive(Serialize)]
struct Labelled<'a> {
    outcome_type: u8,
    #[serde(with = "as_bytes")]
    data: &'a [u8],
}

fn labelled_content_hash(outcome_type: u8, payload: &[u8]) -> Result<Hash, abiencode::Error> {
    Ok(keccak256(&abiencode::to_vec(&Labelled {
        outcome_type,
        data: payload,
    })?))
}

impl OutcomeContent {
    pub fn outcome_type(&self) -> u8 {
        match self {
            OutcomeContent::Allocation(_) => OUTCOME_TYPE_ALLOCATION,
            OutcomeContent::Guarantee(_) => OUTCOME_TYPE_GUARANTEE,
        }
    }

    /// `abi.encode` of the `tuple(uint8 outcomeType, bytes data)` wrapper.
    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        let payload = match self {
            OutcomeContent::Allocation(a) => a.encode()?,
            OutcomeContent::Guarantee(g) => g.encode()?,
        };
        abiencode::to_vec(&Labelled {
            outcome_type: self.outcome_type(),
            data: &payload,
        })
    }

    pub fn hash(&self) -> Result<Hash, abiencode::Error> {
        Ok(keccak256(&self.encode()?))
    }
}

/// One asset holder's share of an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetOutcome {
    pub asset_holder: Address,
    pub content: OutcomeContent,
}

/// The full outcome of a state: one entry per asset holder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome(pub Vec<AssetOutcome>);

#[derive(Serialize)]
struct EncodedAssetOutcome {
    asset_holder: Address,
    #[serde(with = "as_bytes")]
    content: Vec<u8>,
}

impl Outcome {
    /// `abi.encode` of the `tuple(address, bytes)[]` entry list, where each
    /// `bytes` holds the entry's labelled content encoding.
    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        let entries = self
            .0
            .iter()
            .map(|entry| {
                Ok(EncodedAssetOutcome {
                    asset_holder: entry.asset_holder,
                    content: entry.content.encode()?,
                })
            })
            .collect::<Result<Vec<_>, abiencode::Error>>()?;
        abiencode::to_vec(&entries)
    }

    /// The outcome hash committed to by a state.
    pub fn hash(&self) -> Result<Hash, abiencode::Error> {
        Ok(keccak256(&self.encode()?))
    }
}
