use crate::{
    Error,
    Result,
    cache::{
        PendingContribution,
        WordCache,
    },
    config::CacheConfig,
    events::{
        EventQueue,
        NotificationReceiver,
    },
    gateway::WordChainGateway,
    maintenance::MaintenanceTask,
    status::{
        StatusLevel,
        StatusMessage,
        describe_error,
    },
    types::{
        SLOT_COUNT,
        Tribe,
        WordUpdated,
        short_address,
    },
    validation::{
        check_word,
        validate_registration,
    },
};
use ethers::types::{
    Address,
    TxHash,
};
use futures::future::join_all;
use itertools::Itertools;
use tokio::time::{
    self,
    Instant,
};
use tracing::{
    debug,
    info,
    warn,
};


type SlotRead = (usize, Result<(String, Option<Address>)>);

/// Outcome of a full load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub fetched: usize,
    pub fallbacks: usize,
}

/// A contribution that passed validation and is shown optimistically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedContribution {
    pub index: usize,
    pub word: String,
}

/// Single owner of the word cache, the event queue and the status line.
pub struct WordChainController<G> {
    gateway: G,
    config: CacheConfig,
    cache: WordCache,
    queue: EventQueue,
    status: Option<StatusMessage>,
}

impl<G> WordChainController<G> {
    pub fn new(gateway: G, config: CacheConfig) -> Self {
        Self {
            gateway,
            config: config.normalized(),
            cache: WordCache::new(),
            queue: EventQueue::new(),
            status: None,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &WordCache {
        &self.cache
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_status(&mut self, text: impl AsRef<str>, level: StatusLevel) {
        self.status = Some(StatusMessage::new(text, level));
    }

    /// Drops the status message once it outlived its TTL. Returns true if
    /// something was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        let ttl = self.config.status_ttl;
        if self.status.as_ref().is_some_and(|status| status.is_expired(ttl)) {
            self.status = None;
            return true;
        }
        false
    }

    pub fn apply_optimistic(&mut self, index: usize, word: &str, author: Address) -> Result<()> {
        self.cache.apply_optimistic(index, word, author)
    }

    pub fn revert(&mut self, index: usize) -> Option<PendingContribution> {
        self.cache.revert(index)
    }

    /// Accepts a `WordUpdated` notification into the queue. Returns false
    /// for repeats and out-of-range slots.
    pub fn handle_notification(&mut self, update: WordUpdated) -> bool {
        if update.index >= SLOT_COUNT {
            warn!(index = update.index, "ignoring notification for unknown slot");
            return false;
        }
        let accepted = self.queue.record(&update);
        debug!(index = update.index, tx = ?update.tx_hash, accepted, "word update notification");
        accepted
    }

    fn pull_notifications(&mut self, incoming: &mut NotificationReceiver) {
        while let Ok(update) = incoming.try_recv() {
            self.handle_notification(update);
        }
    }

    pub fn evict_stale(&mut self) {
        let evicted = self
            .cache
            .evict_stale_users(Instant::now(), self.config.user_max_age);
        let cleared = self
            .queue
            .truncate_processed(self.config.max_processed_transactions);
        info!(evicted, cleared, "cache eviction finished");
    }

    pub fn is_registered(&self) -> bool
    where
        G: WordChainGateway,
    {
        self.gateway
            .account()
            .and_then(|account| self.cache.user(&account))
            .is_some_and(|info| info.is_registered())
    }

    /// Name shown for the connected wallet.
    pub fn wallet_label(&self) -> String
    where
        G: WordChainGateway,
    {
        let Some(account) = self.gateway.account() else {
            return String::from("Read-only");
        };
        match self.cache.user(&account) {
            Some(info) if info.is_registered() => info.name.clone(),
            _ => short_address(&account),
        }
    }

    /// Drops the wallet and keeps going read-only. Returns false when no
    /// wallet was connected.
    pub fn disconnect_wallet(&mut self) -> bool
    where
        G: WordChainGateway,
    {
        let Some(account) = self.gateway.account() else {
            return false;
        };
        self.gateway.disconnect();
        info!(?account, "wallet disconnected");
        self.set_status("Wallet disconnected", StatusLevel::Success);
        true
    }

    /// Puts a failed contribution step on the status line.
    pub fn report_failure(&mut self, error: &Error) {
        let text = match error {
            Error::Rejected => String::from("Error: Transaction cancelled"),
            Error::Transaction(_) => String::from("Transaction failed"),
            Error::Validation(invalid) => invalid.to_string(),
            Error::ReadOnly => error.to_string(),
            other => format!("Error: {}", describe_error(other)),
        };
        self.set_status(text, StatusLevel::Error);
    }

    fn report_registration_failure(&mut self, error: &Error) {
        let text = match error {
            Error::Validation(invalid) => invalid.to_string(),
            Error::ReadOnly => error.to_string(),
            other => format!("Registration error: {}", describe_error(other)),
        };
        self.set_status(text, StatusLevel::Error);
    }
}

impl<G: WordChainGateway> WordChainController<G> {
    async fn read_slots(&self, indices: &[usize]) -> Vec<SlotRead> {
        let gateway = &self.gateway;
        join_all(indices.iter().map(|&index| async move {
            (index, gateway.last_word(index).await)
        }))
        .await
    }

    /// Looks up every distinct author in `reads` that is not cached yet. A
    /// failed lookup caches an unregistered entry so the slot still renders.
    async fn fetch_users(&mut self, reads: &[SlotRead]) {
        let missing: Vec<Address> = reads
            .iter()
            .filter_map(|(_, read)| read.as_ref().ok().and_then(|(_, author)| *author))
            .filter(|author| self.cache.needs_user(Some(*author)))
            .unique()
            .collect();
        if missing.is_empty() {
            return;
        }
        let gateway = &self.gateway;
        let results = join_all(missing.into_iter().map(|address| async move {
            (address, gateway.user(address).await)
        }))
        .await;

        let now = Instant::now();
        for (address, result) in results {
            let (name, tribe) = result.unwrap_or_else(|err| {
                warn!(?err, ?address, "user lookup failed");
                (String::new(), Tribe::default())
            });
            self.cache.insert_user(address, name, tribe, now);
        }
    }

    /// Fetches all slots in batches. Failed reads keep their cached value;
    /// only a load that fetched nothing without any prior cache fails.
    pub async fn load_all(&mut self) -> Result<LoadReport> {
        let had_cache = self.cache.has_any_words();
        let indices: Vec<usize> = (0..SLOT_COUNT).collect();
        let mut report = LoadReport::default();
        let mut failed = Vec::new();

        for (batch_no, batch) in indices.chunks(self.config.load_batch_size).enumerate() {
            if batch_no > 0 {
                time::sleep(self.config.load_batch_delay).await;
            }
            let reads = self.read_slots(batch).await;
            self.fetch_users(&reads).await;
            for (index, read) in reads {
                match read {
                    Ok((word, author)) => {
                        self.cache.apply_fetched(index, word, author)?;
                        report.fetched += 1;
                    }
                    Err(err) => {
                        debug!(index, ?err, "slot read failed during full load");
                        failed.push(index);
                    }
                }
            }
        }

        if report.fetched == 0 && !had_cache {
            warn!("full load fetched nothing and no cache exists");
            self.set_status("Failed to load words", StatusLevel::Error);
            return Err(Error::NoCachedData);
        }
        for index in failed {
            self.cache.apply_fallback(index)?;
            report.fallbacks += 1;
        }
        if report.fallbacks > 0 {
            self.set_status("Using cached data due to network issues", StatusLevel::Warning);
        }
        self.cache.mark_full_update(Instant::now());
        info!(
            fetched = report.fetched,
            fallbacks = report.fallbacks,
            "full word load finished"
        );
        Ok(report)
    }

    /// Re-reads one slot. Returns whether the cache changed; on a read
    /// failure the cached value stays and the error is returned.
    pub async fn refresh_one(&mut self, index: usize) -> Result<bool> {
        if index >= SLOT_COUNT {
            return Err(Error::SlotOutOfRange(index));
        }
        let reads = self.read_slots(&[index]).await;
        self.fetch_users(&reads).await;
        let Some((_, read)) = reads.into_iter().next() else {
            return Ok(false);
        };
        let (word, author) = read?;
        self.cache.apply_fetched(index, word, author)
    }

    async fn refresh_batch(&mut self, batch: &[usize]) -> usize {
        let reads = self.read_slots(batch).await;
        self.fetch_users(&reads).await;
        let mut changed = 0;
        for (index, read) in reads {
            match read.and_then(|(word, author)| self.cache.apply_fetched(index, word, author)) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(index, ?err, "slot refresh failed, re-queueing");
                    self.queue.enqueue(index);
                }
            }
        }
        changed
    }

    /// Refreshes every queued slot, picking up notifications that arrive
    /// meanwhile. Runs at most `max_drain_rounds` rounds; anything still
    /// queued waits for the next call. Returns how many slots changed.
    pub async fn drain_events(&mut self, incoming: &mut NotificationReceiver) -> usize {
        self.pull_notifications(incoming);
        if !self.queue.has_pending() || !self.queue.begin_drain() {
            return 0;
        }

        let mut changed = 0;
        let mut rounds = 0;
        while self.queue.has_pending() && rounds < self.config.max_drain_rounds {
            if rounds > 0 {
                time::sleep(self.config.event_batch_delay).await;
            }
            rounds += 1;
            let indices = self.queue.take_pending();
            for (batch_no, batch) in indices.chunks(self.config.event_batch_size).enumerate() {
                if batch_no > 0 {
                    time::sleep(self.config.event_batch_delay).await;
                    self.pull_notifications(incoming);
                }
                changed += self.refresh_batch(batch).await;
            }
            self.pull_notifications(incoming);
        }
        self.queue.finish_drain();

        if self.queue.has_pending() {
            debug!(
                rounds,
                remaining = self.queue.pending_len(),
                "drain round limit reached"
            );
        }
        changed
    }

    /// Reloads everything when the last full load is older than
    /// `force_refresh_after`. Returns whether a reload ran.
    pub async fn refresh_if_stale(&mut self) -> Result<bool> {
        if !self
            .cache
            .needs_full_reload(Instant::now(), self.config.force_refresh_after)
        {
            return Ok(false);
        }
        info!("word cache is stale, reloading");
        self.load_all().await?;
        Ok(true)
    }

    /// Re-reads every pending slot so confirmed or superseded contributions
    /// settle. Returns how many slots changed.
    pub async fn reconcile_pending(&mut self) -> usize {
        let mut changed = 0;
        for index in self.cache.pending_indices() {
            match self.refresh_one(index).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => warn!(index, ?err, "pending slot reconciliation failed"),
            }
        }
        changed
    }

    /// Runs one scheduled task. Failures are logged and never propagate.
    pub async fn run_maintenance(&mut self, task: MaintenanceTask) {
        match task {
            MaintenanceTask::EvictStale => self.evict_stale(),
            MaintenanceTask::CheckStaleness => match self.refresh_if_stale().await {
                // a full load already reconciled the pending slots
                Ok(true) => {}
                Ok(false) => {
                    self.reconcile_pending().await;
                }
                Err(err) => warn!(?err, "scheduled reload failed"),
            },
        }
    }

    /// Re-reads the connected account's user entry and reports whether it
    /// is registered. If the read fails, a cached registration still counts.
    pub async fn check_registration(&mut self) -> Result<bool> {
        let account = self.gateway.account().ok_or(Error::ReadOnly)?;
        match self.gateway.user(account).await {
            Ok((name, tribe)) => {
                self.cache.insert_user(account, name, tribe, Instant::now());
            }
            Err(err) if self.is_registered() => {
                warn!(?err, "registration lookup failed, using cached entry");
            }
            Err(err) => return Err(err),
        }
        Ok(self.is_registered())
    }

    /// Validates a contribution and applies it optimistically.
    pub fn prepare_contribution(
        &mut self,
        index: usize,
        word: &str,
    ) -> Result<PreparedContribution> {
        let author = self.gateway.account().ok_or(Error::ReadOnly)?;
        if index >= SLOT_COUNT {
            return Err(Error::SlotOutOfRange(index));
        }
        if self.cache.pending_contribution(index).is_some() {
            return Err(Error::SlotPending(index));
        }
        let word = word.trim();
        check_word(word)?;
        self.cache.apply_optimistic(index, word, author)?;
        Ok(PreparedContribution {
            index,
            word: word.to_string(),
        })
    }

    pub async fn send_contribution(&mut self, prepared: &PreparedContribution) -> Result<TxHash> {
        match self
            .gateway
            .submit_contribution(prepared.index, &prepared.word)
            .await
        {
            Ok(tx) => {
                info!(index = prepared.index, ?tx, "contribution sent");
                self.cache.record_transaction(prepared.index, tx);
                self.set_status(
                    "Transaction sent! Waiting for confirmation...",
                    StatusLevel::Info,
                );
                Ok(tx)
            }
            Err(err) => {
                warn!(index = prepared.index, ?err, "contribution submit failed");
                self.cache.revert(prepared.index);
                self.report_failure(&err);
                Err(err)
            }
        }
    }

    pub async fn confirm_contribution(
        &mut self,
        prepared: &PreparedContribution,
        tx: TxHash,
    ) -> Result<()> {
        if let Err(err) = self.gateway.await_confirmation(tx).await {
            warn!(index = prepared.index, ?tx, ?err, "contribution failed");
            self.cache.revert(prepared.index);
            self.report_failure(&err);
            return Err(err);
        }
        self.cache.confirm(prepared.index);
        match self.refresh_one(prepared.index).await {
            Ok(_) => {
                self.queue.mark_processed(tx);
                self.set_status("Word contributed successfully!", StatusLevel::Success);
            }
            Err(err) => {
                warn!(index = prepared.index, ?err, "refresh after contribution failed");
                self.set_status(
                    "Using cached version due to network issues",
                    StatusLevel::Warning,
                );
            }
        }
        Ok(())
    }

    /// Validate, send and confirm in one go.
    pub async fn contribute(&mut self, index: usize, word: &str) -> Result<TxHash> {
        let prepared = match self.prepare_contribution(index, word) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.report_failure(&err);
                return Err(err);
            }
        };
        let tx = self.send_contribution(&prepared).await?;
        self.confirm_contribution(&prepared, tx).await?;
        Ok(tx)
    }

    pub async fn register(&mut self, name: &str, tribe: Option<Tribe>) -> Result<TxHash> {
        match self.try_register(name, tribe).await {
            Ok(tx) => {
                self.set_status("Successfully registered!", StatusLevel::Success);
                Ok(tx)
            }
            Err(err) => {
                warn!(?err, "registration failed");
                self.report_registration_failure(&err);
                Err(err)
            }
        }
    }

    async fn try_register(&mut self, name: &str, tribe: Option<Tribe>) -> Result<TxHash> {
        let account = self.gateway.account().ok_or(Error::ReadOnly)?;
        let name = name.trim();
        let tribe = validate_registration(name, tribe)?;
        let tx = self.gateway.submit_registration(name, tribe).await?;
        info!(?tx, %tribe, "registration sent");
        self.set_status(
            "Registration sent! Waiting for confirmation...",
            StatusLevel::Info,
        );
        self.gateway.await_confirmation(tx).await?;
        self.cache.forget_user(&account);
        Ok(tx)
    }
}
