use serde::{Deserialize, Serialize};

/// BIP32 chain below the wallet account: receive addresses live on the
/// external chain, change addresses on the internal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceChain {
    External,
    Internal,
}

impl SequenceChain {
    pub const ALL: [SequenceChain; 2] = [SequenceChain::External, SequenceChain::Internal];

    /// Child number of the chain under `m/0H`.
    pub fn child_number(self) -> u32 {
        match self {
            SequenceChain::External => 0,
            SequenceChain::Internal => 1,
        }
    }
}

/// Where a tracked transaction stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum TxStatus {
    /// Seen on the network, not yet in a block.
    Pending,
    Confirmed { height: u32 },
    /// Lost a double-spend or depends on a tx that did. Not part of the
    /// balance, kept so a later confirmation can revive it.
    Removed,
}

impl TxStatus {
    pub fn height(self) -> Option<u32> {
        match self {
            TxStatus::Confirmed { height } => Some(height),
            _ => None,
        }
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, TxStatus::Confirmed { .. })
    }

    pub fn is_removed(self) -> bool {
        self == TxStatus::Removed
    }

    pub(crate) fn from_height(height: Option<u32>) -> Self {
        match height {
            Some(height) => TxStatus::Confirmed { height },
            None => TxStatus::Pending,
        }
    }
}
