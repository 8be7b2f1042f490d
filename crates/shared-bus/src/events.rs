//! # Blockchain Events
//!
//! Defines the payloads that flow through the typed event bus and the tag
//! keys every published event carries, so subscribers can select them
//! with queries such as `qc.event = 'Tx' AND tx.height > 100`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte hash.
pub type Hash = [u8; 32];

/// 20-byte validator address.
pub type Address = [u8; 20];

/// Tag key holding the event type of every published event.
pub const EVENT_TYPE_KEY: &str = "qc.event";

/// Tag key holding the hex-encoded transaction hash of `Tx` events.
pub const TX_HASH_KEY: &str = "tx.hash";

/// Tag key holding the block height of `Tx` events.
pub const TX_HEIGHT_KEY: &str = "tx.height";

/// Event type discriminator, published as the `qc.event` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A block was committed.
    NewBlock,
    /// A block header was committed.
    NewBlockHeader,
    /// A transaction was executed in a block.
    Tx,
    /// Consensus entered a new round.
    NewRound,
    /// A vote was received.
    Vote,
    /// The validator set changed.
    ValidatorSetUpdates,
}

impl EventType {
    /// The tag value for this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewBlock => "NewBlock",
            Self::NewBlockHeader => "NewBlockHeader",
            Self::Tx => "Tx",
            Self::NewRound => "NewRound",
            Self::Vote => "Vote",
            Self::ValidatorSetUpdates => "ValidatorSetUpdates",
        }
    }

    /// The query selecting every event of this type.
    #[must_use]
    pub fn query(self) -> String {
        format!("{} = '{}'", EVENT_TYPE_KEY, self.as_str())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of executing a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// Application result code (0 = success).
    pub code: u32,
    /// Application log output.
    pub log: String,
    /// Gas consumed.
    pub gas_used: u64,
}

/// A single validator power change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Validator address.
    pub address: Address,
    /// New voting power (0 removes the validator).
    pub power: u64,
}

/// Payload of every event published on the typed bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventData {
    /// A block was committed.
    NewBlock {
        /// Block height.
        height: u64,
        /// Block hash.
        hash: Hash,
        /// Number of transactions in the block.
        num_txs: u32,
    },

    /// A block header was committed.
    NewBlockHeader {
        /// Block height.
        height: u64,
        /// Block hash.
        hash: Hash,
        /// Parent block hash.
        parent_hash: Hash,
        /// Block timestamp (unix seconds).
        timestamp: u64,
    },

    /// A transaction was executed.
    Tx {
        /// Height of the including block.
        height: u64,
        /// Index within the block.
        index: u32,
        /// Transaction hash.
        hash: Hash,
        /// Execution result.
        result: TxResult,
    },

    /// Consensus entered a new round.
    NewRound {
        /// Height being decided.
        height: u64,
        /// Round number.
        round: u32,
        /// Proposer of the round.
        proposer: Address,
    },

    /// A vote was received.
    Vote {
        /// Height voted on.
        height: u64,
        /// Round voted in.
        round: u32,
        /// Voting validator.
        validator: Address,
        /// Block voted for; `None` for a nil vote.
        block_hash: Option<Hash>,
    },

    /// The validator set changed.
    ValidatorSetUpdates {
        /// Power changes, in application order.
        updates: Vec<ValidatorUpdate>,
    },
}

impl EventData {
    /// The event type of this payload.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::NewBlock { .. } => EventType::NewBlock,
            Self::NewBlockHeader { .. } => EventType::NewBlockHeader,
            Self::Tx { .. } => EventType::Tx,
            Self::NewRound { .. } => EventType::NewRound,
            Self::Vote { .. } => EventType::Vote,
            Self::ValidatorSetUpdates { .. } => EventType::ValidatorSetUpdates,
        }
    }

    /// Height the event refers to, if any.
    #[must_use]
    pub fn height(&self) -> Option<u64> {
        match self {
            Self::NewBlock { height, .. }
            | Self::NewBlockHeader { height, .. }
            | Self::Tx { height, .. }
            | Self::NewRound { height, .. }
            | Self::Vote { height, .. } => Some(*height),
            Self::ValidatorSetUpdates { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_mapping() {
        let event = EventData::NewBlock {
            height: 3,
            hash: [1; 32],
            num_txs: 0,
        };
        assert_eq!(event.event_type(), EventType::NewBlock);
        assert_eq!(event.height(), Some(3));

        let updates = EventData::ValidatorSetUpdates { updates: vec![] };
        assert_eq!(updates.event_type(), EventType::ValidatorSetUpdates);
        assert_eq!(updates.height(), None);
    }

    #[test]
    fn test_event_type_query() {
        assert_eq!(EventType::Tx.query(), "qc.event = 'Tx'");
        assert_eq!(EventType::NewRound.to_string(), "NewRound");
    }

    #[test]
    fn test_serde_tagging() {
        let event = EventData::NewRound {
            height: 10,
            round: 2,
            proposer: [7; 20],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NewRound");
        assert_eq!(json["value"]["round"], 2);

        let back: EventData = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
