use ethers::types::{
    Address,
    TxHash,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;
use tokio::time::Instant;

/// Number of word positions held by the contract.
pub const SLOT_COUNT: usize = 128;

/// Shown for a slot whose on-chain word is empty or could not be read.
pub const EMPTY_WORD: &str = "[...]";

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Tribe {
    #[default]
    Yellow,
    Red,
    Green,
    Blue,
}

impl Tribe {
    pub const ALL: [Tribe; 4] = [Tribe::Yellow, Tribe::Red, Tribe::Green, Tribe::Blue];

    pub fn id(self) -> u8 {
        match self {
            Tribe::Yellow => 0,
            Tribe::Red => 1,
            Tribe::Green => 2,
            Tribe::Blue => 3,
        }
    }

    pub fn kanji(self) -> &'static str {
        match self {
            Tribe::Yellow => "黄",
            Tribe::Red => "赤",
            Tribe::Green => "緑",
            Tribe::Blue => "青",
        }
    }
}

impl TryFrom<u8> for Tribe {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tribe::Yellow),
            1 => Ok(Tribe::Red),
            2 => Ok(Tribe::Green),
            3 => Ok(Tribe::Blue),
            other => Err(other),
        }
    }
}

impl fmt::Display for Tribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tribe::Yellow => "Yellow",
            Tribe::Red => "Red",
            Tribe::Green => "Green",
            Tribe::Blue => "Blue",
        };
        write!(f, "{name}")
    }
}

/// What a slot shows next to its word: the author's tribe, or the pending
/// marker while a contribution is unconfirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TribeMarker {
    Tribe(Tribe),
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordSlot {
    pub word: String,
    pub author_address: Option<Address>,
    pub author_name: String,
    pub tribe: Tribe,
    pub is_pending: bool,
}

impl WordSlot {
    pub fn placeholder() -> Self {
        Self {
            word: EMPTY_WORD.to_string(),
            author_address: None,
            author_name: String::new(),
            tribe: Tribe::default(),
            is_pending: false,
        }
    }

    pub fn marker(&self) -> TribeMarker {
        if self.is_pending {
            TribeMarker::Pending
        } else {
            TribeMarker::Tribe(self.tribe)
        }
    }

    pub fn is_editable(&self) -> bool {
        !self.is_pending
    }

    /// Registered name if the author has one, otherwise the full address.
    pub fn author_label(&self) -> String {
        if !self.author_name.is_empty() {
            return self.author_name.clone();
        }
        match &self.author_address {
            Some(address) => format!("{address:#x}"),
            None => String::from("unknown"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub tribe: Tribe,
    pub last_updated: Instant,
}

impl UserInfo {
    pub fn new(name: impl Into<String>, tribe: Tribe, last_updated: Instant) -> Self {
        Self {
            name: name.into(),
            tribe,
            last_updated,
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.name.is_empty()
    }
}

/// A `WordUpdated(index, author)` log together with the transaction that
/// emitted it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WordUpdated {
    pub index: usize,
    pub author: Address,
    pub tx_hash: TxHash,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxLifecycle {
    #[default]
    Pending,
    Confirmed,
    Reverted,
}

pub fn short_address(address: &Address) -> String {
    let full = format!("{address:#x}");
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
