use crate::{
    Error,
    Result,
    maintenance::reload_due,
    types::{
        EMPTY_WORD,
        SLOT_COUNT,
        Tribe,
        TxLifecycle,
        UserInfo,
        WordSlot,
    },
};
use ethers::types::{
    Address,
    TxHash,
};
use std::{
    collections::HashMap,
    time::Duration,
};
use tokio::time::Instant;

/// A contribution applied locally before the chain confirmed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingContribution {
    /// Slot value to restore if the transaction fails.
    pub previous: Option<WordSlot>,
    pub word: String,
    pub author: Address,
    pub tx_hash: Option<TxHash>,
    pub lifecycle: TxLifecycle,
}

#[derive(Debug)]
pub struct WordCache {
    words: Vec<Option<WordSlot>>,
    users: HashMap<Address, UserInfo>,
    pending: HashMap<usize, PendingContribution>,
    last_full_update: Option<Instant>,
    version: u64,
}

impl Default for WordCache {
    fn default() -> Self {
        Self::new()
    }
}

impl WordCache {
    pub fn new() -> Self {
        Self {
            words: vec![None; SLOT_COUNT],
            users: HashMap::new(),
            pending: HashMap::new(),
            last_full_update: None,
            version: 0,
        }
    }

    pub fn slot(&self, index: usize) -> Option<&WordSlot> {
        self.words.get(index).and_then(Option::as_ref)
    }

    pub fn slots(&self) -> &[Option<WordSlot>] {
        &self.words
    }

    pub fn has_any_words(&self) -> bool {
        self.words.iter().any(Option::is_some)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_full_update(&self) -> Option<Instant> {
        self.last_full_update
    }

    pub fn mark_full_update(&mut self, now: Instant) {
        self.last_full_update = Some(now);
        self.version += 1;
    }

    /// True when no full load happened yet or the last one is at least
    /// `threshold` old.
    pub fn needs_full_reload(&self, now: Instant, threshold: Duration) -> bool {
        reload_due(self.last_full_update, now, threshold)
    }

    pub fn user(&self, address: &Address) -> Option<&UserInfo> {
        self.users.get(address)
    }

    pub fn users_len(&self) -> usize {
        self.users.len()
    }

    /// Whether user info should be fetched for this author.
    pub fn needs_user(&self, author: Option<Address>) -> bool {
        match author {
            Some(address) => !address.is_zero() && !self.users.contains_key(&address),
            None => false,
        }
    }

    pub fn insert_user(&mut self, address: Address, name: String, tribe: Tribe, now: Instant) {
        self.users.insert(address, UserInfo::new(name, tribe, now));
    }

    pub fn forget_user(&mut self, address: &Address) {
        self.users.remove(address);
    }

    /// Drops user entries older than `max_age`; returns how many went.
    pub fn evict_stale_users(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.users.len();
        self.users
            .retain(|_, info| now.saturating_duration_since(info.last_updated) <= max_age);
        before - self.users.len()
    }

    fn resolve_slot(&self, word: String, author: Option<Address>) -> WordSlot {
        let (author_name, tribe) = author
            .and_then(|address| self.users.get(&address))
            .map(|info| (info.name.clone(), info.tribe))
            .unwrap_or_default();
        let word = if word.is_empty() {
            EMPTY_WORD.to_string()
        } else {
            word
        };
        WordSlot {
            word,
            author_address: author,
            author_name,
            tribe,
            is_pending: false,
        }
    }

    /// Stores on-chain data for a slot. Returns true when the visible slot
    /// changed.
    ///
    /// A pending slot is reconciled when the chain shows the optimistic
    /// word, or when its transaction was already confirmed. Otherwise the
    /// fetched value becomes the one restored on revert.
    pub fn apply_fetched(
        &mut self,
        index: usize,
        word: String,
        author: Option<Address>,
    ) -> Result<bool> {
        check_index(index)?;
        let fetched = self.resolve_slot(word, author);

        if let Some(pending) = self.pending.get_mut(&index) {
            let reconciled = pending.lifecycle == TxLifecycle::Confirmed
                || (fetched.word == pending.word
                    && fetched.author_address == Some(pending.author));
            if !reconciled {
                pending.previous = Some(fetched);
                return Ok(false);
            }
            self.pending.remove(&index);
        }

        if self.words[index].as_ref() == Some(&fetched) {
            return Ok(false);
        }
        self.words[index] = Some(fetched);
        self.version += 1;
        Ok(true)
    }

    /// Keeps the cached value of a slot whose read failed, or fills in the
    /// placeholder when nothing was cached.
    pub fn apply_fallback(&mut self, index: usize) -> Result<bool> {
        check_index(index)?;
        if self.words[index].is_some() {
            return Ok(false);
        }
        self.words[index] = Some(WordSlot::placeholder());
        self.version += 1;
        Ok(true)
    }

    pub fn apply_optimistic(&mut self, index: usize, word: &str, author: Address) -> Result<()> {
        check_index(index)?;
        if self.pending.contains_key(&index) {
            return Err(Error::SlotPending(index));
        }
        let (author_name, tribe) = self
            .users
            .get(&author)
            .map(|info| (info.name.clone(), info.tribe))
            .unwrap_or_default();
        let previous = self.words[index].replace(WordSlot {
            word: word.to_string(),
            author_address: Some(author),
            author_name,
            tribe,
            is_pending: true,
        });
        self.pending.insert(
            index,
            PendingContribution {
                previous,
                word: word.to_string(),
                author,
                tx_hash: None,
                lifecycle: TxLifecycle::Pending,
            },
        );
        self.version += 1;
        Ok(())
    }

    pub fn record_transaction(&mut self, index: usize, tx_hash: TxHash) {
        if let Some(pending) = self.pending.get_mut(&index) {
            pending.tx_hash = Some(tx_hash);
        }
    }

    /// Marks the contribution mined; the slot stays pending until the next
    /// refresh reads it back.
    pub fn confirm(&mut self, index: usize) -> bool {
        match self.pending.get_mut(&index) {
            Some(pending) => {
                pending.lifecycle = TxLifecycle::Confirmed;
                true
            }
            None => false,
        }
    }

    /// Restores the value recorded before the optimistic update.
    pub fn revert(&mut self, index: usize) -> Option<PendingContribution> {
        let mut pending = self.pending.remove(&index)?;
        self.words[index] = pending.previous.clone();
        pending.lifecycle = TxLifecycle::Reverted;
        self.version += 1;
        Some(pending)
    }

    pub fn pending_contribution(&self, index: usize) -> Option<&PendingContribution> {
        self.pending.get(&index)
    }

    pub fn pending_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.pending.keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

fn check_index(index: usize) -> Result<()> {
    if index < SLOT_COUNT {
        Ok(())
    } else {
        Err(Error::SlotOutOfRange(index))
    }
}
