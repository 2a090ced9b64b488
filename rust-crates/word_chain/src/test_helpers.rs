//! In-memory stand-ins for the contract and its event stream.

use crate::{
    Error,
    Result,
    events::{
        NotificationSender,
        WordUpdateSource,
    },
    gateway::WordChainGateway,
    types::{
        Tribe,
        WordUpdated,
    },
};
use ethers::types::{
    Address,
    TxHash,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::sync::mpsc;

pub fn address(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn tx_hash(n: u64) -> TxHash {
    TxHash::from_low_u64_be(n)
}

pub fn word_updated(index: usize, author: u64, tx: u64) -> WordUpdated {
    WordUpdated {
        index,
        author: address(author),
        tx_hash: tx_hash(tx),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FakeWrite {
    Contribution {
        index: usize,
        word: String,
        author: Address,
    },
    Registration {
        account: Address,
        name: String,
        tribe: Tribe,
    },
}

/// Contract state plus failure switches shared between a test and the
/// gateway it hands to the code under test.
#[derive(Debug, Default)]
pub struct FakeChain {
    pub words: HashMap<usize, (String, Option<Address>)>,
    pub users: HashMap<Address, (String, Tribe)>,
    pub failing_reads: HashSet<usize>,
    pub fail_all_reads: bool,
    pub fail_user_reads: bool,
    /// Fails the next write with this signer/RPC message.
    pub fail_next_write: Option<String>,
    pub fail_confirmations: bool,
    pub read_delay: Duration,
    pub read_calls: Vec<usize>,
    pub user_calls: Vec<Address>,
    pub submitted: Vec<FakeWrite>,
    /// Notifications pushed out when the given slot is read.
    pub emit_on_read: HashMap<usize, Vec<WordUpdated>>,
    in_flight: HashMap<TxHash, FakeWrite>,
    next_tx: u64,
    notifier: Option<NotificationSender>,
}

impl FakeChain {
    pub fn set_word(&mut self, index: usize, word: &str, author: Option<Address>) {
        self.words.insert(index, (word.to_string(), author));
    }

    pub fn set_user(&mut self, address: Address, name: &str, tribe: Tribe) {
        self.users.insert(address, (name.to_string(), tribe));
    }

    fn submit(&mut self, write: FakeWrite) -> Result<TxHash> {
        if let Some(message) = self.fail_next_write.take() {
            return Err(Error::from_write_failure(message));
        }
        self.next_tx += 1;
        let tx = TxHash::from_low_u64_be(0xfeed_0000 + self.next_tx);
        self.submitted.push(write.clone());
        self.in_flight.insert(tx, write);
        Ok(tx)
    }
}

#[derive(Clone)]
pub struct FakeGateway {
    state: Arc<Mutex<FakeChain>>,
    account: Option<Address>,
}

impl FakeGateway {
    pub fn read_only() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeChain::default())),
            account: None,
        }
    }

    pub fn with_account(account: Address) -> Self {
        Self {
            account: Some(account),
            ..Self::read_only()
        }
    }

    /// Another client of the same fake contract.
    pub fn on_same_chain(&self, account: Option<Address>) -> Self {
        Self {
            state: self.state.clone(),
            account,
        }
    }

    pub fn state(&self) -> Arc<Mutex<FakeChain>> {
        self.state.clone()
    }

    /// Confirmed contributions are announced on `sender` the way the
    /// contract's `WordUpdated` log would be.
    pub fn attach_notifier(&self, sender: NotificationSender) {
        self.state.lock().unwrap().notifier = Some(sender);
    }
}

impl WordChainGateway for FakeGateway {
    fn account(&self) -> Option<Address> {
        self.account
    }

    fn disconnect(&mut self) {
        self.account = None;
    }

    async fn last_word(&self, index: usize) -> Result<(String, Option<Address>)> {
        let delay = self.state.lock().unwrap().read_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut chain = self.state.lock().unwrap();
        chain.read_calls.push(index);
        if let Some(updates) = chain.emit_on_read.remove(&index) {
            if let Some(notifier) = &chain.notifier {
                for update in updates {
                    let _ = notifier.send(update);
                }
            }
        }
        if chain.fail_all_reads || chain.failing_reads.contains(&index) {
            return Err(Error::Read(format!("connection refused reading slot {index}")));
        }
        Ok(chain.words.get(&index).cloned().unwrap_or_default())
    }

    async fn user(&self, address: Address) -> Result<(String, Tribe)> {
        let mut chain = self.state.lock().unwrap();
        chain.user_calls.push(address);
        if chain.fail_user_reads {
            return Err(Error::Read(String::from("connection refused reading user")));
        }
        Ok(chain.users.get(&address).cloned().unwrap_or_default())
    }

    async fn submit_contribution(&self, index: usize, word: &str) -> Result<TxHash> {
        let author = self.account.ok_or(Error::ReadOnly)?;
        self.state.lock().unwrap().submit(FakeWrite::Contribution {
            index,
            word: word.to_string(),
            author,
        })
    }

    async fn submit_registration(&self, name: &str, tribe: Tribe) -> Result<TxHash> {
        let account = self.account.ok_or(Error::ReadOnly)?;
        self.state.lock().unwrap().submit(FakeWrite::Registration {
            account,
            name: name.to_string(),
            tribe,
        })
    }

    async fn await_confirmation(&self, tx: TxHash) -> Result<()> {
        let mut chain = self.state.lock().unwrap();
        let write = chain
            .in_flight
            .remove(&tx)
            .ok_or_else(|| Error::Transaction(format!("unknown transaction {tx:#x}")))?;
        if chain.fail_confirmations {
            return Err(Error::Transaction(String::from("execution reverted")));
        }
        match write {
            FakeWrite::Contribution {
                index,
                word,
                author,
            } => {
                chain.words.insert(index, (word, Some(author)));
                if let Some(notifier) = &chain.notifier {
                    let _ = notifier.send(WordUpdated {
                        index,
                        author,
                        tx_hash: tx,
                    });
                }
            }
            FakeWrite::Registration {
                account,
                name,
                tribe,
            } => {
                chain.users.insert(account, (name, tribe));
            }
        }
        Ok(())
    }
}

pub struct FakeEventSource {
    recv: mpsc::UnboundedReceiver<Vec<WordUpdated>>,
}

impl FakeEventSource {
    pub fn new_with_sender() -> (Self, mpsc::UnboundedSender<Vec<WordUpdated>>) {
        let (send, recv) = mpsc::unbounded_channel();
        (FakeEventSource { recv }, send)
    }
}

impl WordUpdateSource for FakeEventSource {
    async fn next_batch(&mut self) -> Result<Vec<WordUpdated>> {
        match self.recv.recv().await {
            Some(batch) => Ok(batch),
            None => Err(Error::Read(String::from("No more events"))),
        }
    }
}
