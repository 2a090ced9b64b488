use crate::{
    Result,
    types::WordUpdated,
};
use ethers::types::TxHash;
use std::collections::{
    HashSet,
    VecDeque,
};
use tokio::sync::mpsc;

pub type NotificationSender = mpsc::UnboundedSender<WordUpdated>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<WordUpdated>;

/// Source of `WordUpdated` notifications emitted by the contract.
pub trait WordUpdateSource {
    /// Waits for the next batch of notifications. An empty batch means the
    /// source was polled but nothing new happened.
    fn next_batch(&mut self) -> impl Future<Output = Result<Vec<WordUpdated>>> + Send;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrainState {
    #[default]
    Idle,
    Draining,
}

/// Slot indices waiting to be refreshed, plus the transactions whose
/// notifications were already accepted.
#[derive(Debug, Default)]
pub struct EventQueue {
    processed: HashSet<TxHash>,
    pending: VecDeque<usize>,
    queued: HashSet<usize>,
    state: DrainState,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a notification unless its transaction was seen before.
    pub fn record(&mut self, update: &WordUpdated) -> bool {
        if !self.processed.insert(update.tx_hash) {
            return false;
        }
        self.enqueue(update.index);
        true
    }

    /// Remembers a transaction whose effect is already in the cache, so its
    /// notification is dropped when it arrives.
    pub fn mark_processed(&mut self, tx_hash: TxHash) {
        self.processed.insert(tx_hash);
    }

    pub fn enqueue(&mut self, index: usize) {
        if self.queued.insert(index) {
            self.pending.push_back(index);
        }
    }

    /// Removes and returns every queued index in enqueue order.
    pub fn take_pending(&mut self) -> Vec<usize> {
        self.queued.clear();
        self.pending.drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    /// Moves to `Draining`; returns false if a drain is already running.
    pub fn begin_drain(&mut self) -> bool {
        if self.state == DrainState::Draining {
            return false;
        }
        self.state = DrainState::Draining;
        true
    }

    pub fn finish_drain(&mut self) {
        self.state = DrainState::Idle;
    }

    pub fn is_processed(&self, tx_hash: &TxHash) -> bool {
        self.processed.contains(tx_hash)
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    /// Clears the processed set once it holds more than `limit` entries.
    pub fn truncate_processed(&mut self, limit: usize) -> bool {
        if self.processed.len() > limit {
            self.processed.clear();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use ethers::types::Address;

    fn update(index: usize, tx: u64) -> WordUpdated {
        WordUpdated {
            index,
            author: Address::from_low_u64_be(1),
            tx_hash: TxHash::from_low_u64_be(tx),
        }
    }

    #[test]
    fn record__ignores_repeated_transaction() {
        // given
        let mut queue = EventQueue::new();

        // when
        let first = queue.record(&update(3, 7));
        let second = queue.record(&update(3, 7));

        // then
        assert!(first);
        assert!(!second);
        assert_eq!(queue.take_pending(), vec![3]);
    }

    #[test]
    fn enqueue__keeps_order_without_duplicates() {
        // given
        let mut queue = EventQueue::new();

        // when
        for index in [9, 2, 9, 5, 2] {
            queue.enqueue(index);
        }

        // then
        assert_eq!(queue.take_pending(), vec![9, 2, 5]);
        assert!(!queue.has_pending());
    }

    #[test]
    fn begin_drain__refuses_reentry() {
        let mut queue = EventQueue::new();
        assert!(queue.begin_drain());
        assert!(!queue.begin_drain());
        queue.finish_drain();
        assert_eq!(queue.state(), DrainState::Idle);
        assert!(queue.begin_drain());
    }

    #[test]
    fn truncate_processed__clears_only_above_limit() {
        // given
        let mut queue = EventQueue::new();
        for tx in 0..1000 {
            queue.record(&update(0, tx));
        }

        // when
        let at_limit = queue.truncate_processed(1000);
        queue.record(&update(0, 1000));
        let above_limit = queue.truncate_processed(1000);

        // then
        assert!(!at_limit);
        assert!(above_limit);
        assert_eq!(queue.processed_len(), 0);
    }
}
