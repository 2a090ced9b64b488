use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use contract_abi::{
    EthGateway,
    LogEventSource,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use ethers::types::Address;
use std::{
    path::PathBuf,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};
use word_chain::{
    CacheConfig,
    Error,
    MaintenanceScheduler,
    NotificationReceiver,
    NotificationSender,
    SLOT_COUNT,
    StatusLevel,
    Tribe,
    WordChainController,
    WordChainGateway,
    WordUpdateSource,
    types::EMPTY_WORD,
};
use word_chain_tui::wallets;

/// How often expired status messages are cleared and leftover queued
/// slots are retried.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkTarget {
    pub env: DeploymentEnv,
    pub url: String,
}

impl NetworkTarget {
    pub fn new(env: DeploymentEnv, url: Option<String>) -> Self {
        Self {
            env,
            url: url.unwrap_or_else(|| env.default_rpc_url().to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletConfig {
    Keystore { name: String, dir: PathBuf },
    ReadOnly,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub contract: Option<Address>,
    pub wallet: WalletConfig,
    pub cache: CacheConfig,
}

/// One word position as the UI draws it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotView {
    pub index: usize,
    pub word: String,
    pub author: String,
    pub tribe: Tribe,
    pub pending: bool,
    /// False until the slot was fetched or fell back to the placeholder.
    pub loaded: bool,
}

impl SlotView {
    pub fn is_editable(&self) -> bool {
        !self.pending
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppSnapshot {
    pub slots: Vec<SlotView>,
    pub wallet_label: String,
    pub wallet_tribe: Option<Tribe>,
    pub network: String,
    pub status: Option<(String, StatusLevel)>,
    pub loading: bool,
    pub queued_updates: usize,
}

pub fn build_snapshot<G: WordChainGateway>(
    controller: &WordChainController<G>,
    network: &str,
    loading: bool,
) -> AppSnapshot {
    let cache = controller.cache();
    let slots = (0..SLOT_COUNT)
        .map(|index| match cache.slot(index) {
            Some(slot) => SlotView {
                index,
                word: slot.word.clone(),
                author: slot.author_label(),
                tribe: slot.tribe,
                pending: slot.is_pending,
                loaded: true,
            },
            None => SlotView {
                index,
                word: EMPTY_WORD.to_string(),
                author: String::from("unknown"),
                tribe: Tribe::default(),
                pending: false,
                loaded: false,
            },
        })
        .collect();
    let wallet_tribe = controller
        .gateway()
        .account()
        .and_then(|account| cache.user(&account))
        .filter(|info| info.is_registered())
        .map(|info| info.tribe);

    AppSnapshot {
        slots,
        wallet_label: controller.wallet_label(),
        wallet_tribe,
        network: network.to_string(),
        status: controller
            .status()
            .map(|status| (status.text.clone(), status.level)),
        loading,
        queued_updates: controller.queue().pending_len(),
    }
}

/// Uses `--contract` when given, recording it as the current deployment;
/// otherwise reads the latest recorded deployment for the network.
fn resolve_contract(network: &NetworkTarget, contract: Option<Address>) -> Result<Address> {
    if let Some(address) = contract {
        deployments::record_deployment(network.env, format!("{address:#x}"), &network.url)
            .map_err(|e| eyre!(e))?;
        return Ok(address);
    }
    let store = DeploymentStore::new(network.env).map_err(|e| eyre!(e))?;
    let record = store.load().map_err(|e| eyre!(e))?.ok_or_else(|| {
        eyre!(
            "No {} deployment recorded in {}; pass --contract <address>",
            network.env,
            store.path().display()
        )
    })?;
    record
        .contract_address
        .parse::<Address>()
        .wrap_err_with(|| format!("Invalid contract address {}", record.contract_address))
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let contract = resolve_contract(&config.network, config.contract)?;
    let chain_id = config.network.env.chain_id();
    // unlock before the terminal switches to raw mode so the prompt works
    let wallet = match &config.wallet {
        WalletConfig::Keystore { name, dir } => {
            let descriptor = wallets::find_wallet(dir, name)?;
            Some(wallets::unlock_wallet(&descriptor, chain_id)?)
        }
        WalletConfig::ReadOnly => None,
    };
    let gateway = EthGateway::connect(&config.network.url, contract, chain_id, wallet)
        .await
        .wrap_err("connecting to the word chain contract failed")?;
    let source = LogEventSource::at_current_head(gateway.reader().clone())
        .await
        .wrap_err("reading the chain head failed")?;
    let controller = WordChainController::new(gateway, config.cache);
    let network = format!("{} ({})", config.network.env, config.network.url);

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, source, &network, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

enum EventWorkerCommand {
    PollNow,
    Shutdown,
}

/// Polls `source` every `poll_interval` and forwards each notification to
/// the run loop.
async fn event_worker<S: WordUpdateSource>(
    poll_interval: Duration,
    mut source: S,
    mut cmd_rx: mpsc::UnboundedReceiver<EventWorkerCommand>,
    notify_tx: NotificationSender,
) -> Result<()> {
    async fn poll<S: WordUpdateSource>(
        source: &mut S,
        notify_tx: &NotificationSender,
    ) -> Result<()> {
        for update in source.next_batch().await? {
            notify_tx
                .send(update)
                .map_err(|_| eyre!("notification receiver dropped"))?;
        }
        Ok(())
    }

    let mut ticker = time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if notify_tx.is_closed() {
                    break;
                }
                if let Err(err) = poll(&mut source, &notify_tx).await {
                    warn!(?err, "word update poll failed");
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    EventWorkerCommand::PollNow => {
                        if let Err(err) = poll(&mut source, &notify_tx).await {
                            warn!(?err, "word update poll failed");
                        }
                    }
                    EventWorkerCommand::Shutdown => break,
                }
            }
        }
    }
    Ok(())
}

fn redraw<G: WordChainGateway>(
    ui_state: &mut ui::UiState,
    controller: &WordChainController<G>,
    network: &str,
    context: &'static str,
) -> Result<()> {
    let snapshot = build_snapshot(controller, network, false);
    ui::draw(ui_state, &snapshot).wrap_err(context)
}

/// Whether the run loop keeps going after a step that waits on the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Drives `work` to completion unless `interrupt` resolves first.
async fn unless_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future,
) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => None,
    }
}

/// Opens the contribution form for a registered account, or the
/// registration form when the account has no name yet.
async fn request_contribution<G: WordChainGateway>(
    controller: &mut WordChainController<G>,
    ui_state: &mut ui::UiState,
    index: usize,
) {
    match controller.check_registration().await {
        Ok(true) => ui_state.open_contribute(index),
        Ok(false) => {
            controller.set_status("Register to contribute words", StatusLevel::Info);
            ui_state.open_registration();
        }
        Err(err) => {
            warn!(?err, "registration check failed");
            controller.report_failure(&err);
        }
    }
}

async fn contribute<G: WordChainGateway>(
    controller: &mut WordChainController<G>,
    ui_state: &mut ui::UiState,
    network: &str,
    index: usize,
    word: &str,
) -> Result<Flow> {
    let prepared = match controller.prepare_contribution(index, word) {
        Ok(prepared) => prepared,
        Err(err) => {
            controller.report_failure(&err);
            redraw(ui_state, controller, network, "draw after rejected contribution failed")?;
            return Ok(Flow::Continue);
        }
    };
    redraw(ui_state, controller, network, "draw after optimistic update failed")?;
    let Ok(tx) = controller.send_contribution(&prepared).await else {
        redraw(ui_state, controller, network, "draw after failed submit failed")?;
        return Ok(Flow::Continue);
    };
    redraw(ui_state, controller, network, "draw while awaiting confirmation failed")?;
    let confirm = controller.confirm_contribution(&prepared, tx);
    match unless_interrupted(confirm, tokio::signal::ctrl_c()).await {
        Some(Ok(())) => {}
        Some(Err(err)) => debug!(?err, "contribution did not confirm"),
        None => {
            info!(?tx, "quit while waiting for contribution receipt");
            return Ok(Flow::Quit);
        }
    }
    redraw(ui_state, controller, network, "draw after contribution failed")?;
    Ok(Flow::Continue)
}

async fn register<G: WordChainGateway>(
    controller: &mut WordChainController<G>,
    ui_state: &mut ui::UiState,
    network: &str,
    name: &str,
    tribe: Tribe,
) -> Result<Flow> {
    controller.set_status("Sending registration...", StatusLevel::Info);
    redraw(ui_state, controller, network, "draw while registering failed")?;
    let registration = async {
        if controller.register(name, Some(tribe)).await.is_ok() {
            // refetch the fresh name for the wallet label
            if let Err(err) = controller.check_registration().await {
                warn!(?err, "reading registration back failed");
            }
        }
    };
    if unless_interrupted(registration, tokio::signal::ctrl_c())
        .await
        .is_none()
    {
        info!("quit while waiting for registration receipt");
        return Ok(Flow::Quit);
    }
    redraw(ui_state, controller, network, "draw after registration failed")?;
    Ok(Flow::Continue)
}

async fn run_loop<G, S>(
    mut controller: WordChainController<G>,
    source: S,
    network: &str,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()>
where
    G: WordChainGateway,
    S: WordUpdateSource + Send + 'static,
{
    info!("Running app loop");
    let snapshot = build_snapshot(&controller, network, true);
    ui::draw(ui_state, &snapshot).wrap_err("draw before initial load failed")?;
    if let Err(err) = controller.load_all().await {
        warn!(?err, "initial word load failed");
    }
    if controller.gateway().account().is_some()
        && let Err(err) = controller.check_registration().await
    {
        warn!(?err, "registration lookup failed");
    }
    redraw(ui_state, &controller, network, "draw after initial load failed")?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (notify_tx, mut incoming): (NotificationSender, NotificationReceiver) =
        mpsc::unbounded_channel();
    let worker_handle = tokio::spawn(event_worker(
        controller.config().event_poll_interval,
        source,
        cmd_rx,
        notify_tx,
    ));

    let mut scheduler = MaintenanceScheduler::new(controller.config());
    let mut housekeeping = time::interval(HOUSEKEEPING_INTERVAL);

    loop {
        tokio::select! {
            maybe_update = incoming.recv() => {
                let Some(update) = maybe_update else {
                    warn!("event worker channel closed");
                    break;
                };
                controller.handle_notification(update);
                let changed = controller.drain_events(&mut incoming).await;
                debug!(changed, "word updates drained");
                redraw(ui_state, &controller, network, "draw after word updates failed")?;
            }
            task = scheduler.next_task() => {
                debug!(?task, "running cache maintenance");
                controller.run_maintenance(task).await;
                redraw(ui_state, &controller, network, "draw after maintenance failed")?;
            }
            _ = housekeeping.tick() => {
                let cleared = controller.clear_expired_status();
                let changed = if controller.queue().has_pending() {
                    controller.drain_events(&mut incoming).await
                } else {
                    0
                };
                if cleared || changed > 0 {
                    redraw(ui_state, &controller, network, "draw after housekeeping failed")?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {
                        redraw(ui_state, &controller, network, "draw after input failed")?;
                    }
                    ui::UserEvent::Reload => {
                        controller.set_status("Reloading words...", StatusLevel::Info);
                        let snapshot = build_snapshot(&controller, network, true);
                        ui::draw(ui_state, &snapshot).wrap_err("draw before reload failed")?;
                        match controller.load_all().await {
                            Ok(report) if report.fallbacks == 0 => {
                                controller.set_status("Words reloaded", StatusLevel::Success);
                            }
                            Ok(_) => {}
                            Err(err) => warn!(?err, "manual reload failed"),
                        }
                        let _ = cmd_tx.send(EventWorkerCommand::PollNow);
                        redraw(ui_state, &controller, network, "draw after reload failed")?;
                    }
                    ui::UserEvent::RequestContribute(index) => {
                        if controller.gateway().account().is_none() {
                            controller.report_failure(&Error::ReadOnly);
                        } else {
                            request_contribution(&mut controller, ui_state, index).await;
                        }
                        redraw(ui_state, &controller, network, "draw after RequestContribute failed")?;
                    }
                    ui::UserEvent::OpenRegistration => {
                        if controller.gateway().account().is_none() {
                            controller.report_failure(&Error::ReadOnly);
                        } else {
                            ui_state.open_registration();
                        }
                        redraw(ui_state, &controller, network, "draw after OpenRegistration failed")?;
                    }
                    ui::UserEvent::DisconnectWallet => {
                        if !controller.disconnect_wallet() {
                            controller.report_failure(&Error::ReadOnly);
                        }
                        redraw(ui_state, &controller, network, "draw after DisconnectWallet failed")?;
                    }
                    ui::UserEvent::ConfirmContribution { index, word } => {
                        let flow = contribute(&mut controller, ui_state, network, index, &word).await?;
                        if flow == Flow::Quit {
                            break;
                        }
                    }
                    ui::UserEvent::ConfirmRegistration { name, tribe } => {
                        let flow = register(&mut controller, ui_state, network, &name, tribe).await?;
                        if flow == Flow::Quit {
                            break;
                        }
                    }
                }
            }
        }
    }

    let _ = cmd_tx.send(EventWorkerCommand::Shutdown);
    match worker_handle.await {
        Ok(Err(err)) => warn!(?err, "event worker stopped with error"),
        Err(err) => warn!(?err, "event worker panicked"),
        Ok(Ok(())) => {}
    }
    info!("app loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use word_chain::test_helpers::{
        FakeEventSource,
        FakeGateway,
        address,
        word_updated,
    };

    #[tokio::test(start_paused = true)]
    async fn build_snapshot__shows_loaded_slots_with_author_names() {
        // given
        let gateway = FakeGateway::with_account(address(1));
        {
            let state = gateway.state();
            let mut chain = state.lock().unwrap();
            chain.set_word(0, "Hello", Some(address(2)));
            chain.set_user(address(2), "Alice", Tribe::Green);
        }
        let mut controller = WordChainController::new(gateway, CacheConfig::default());
        controller.load_all().await.unwrap();

        // when
        let snapshot = build_snapshot(&controller, "Local", false);

        // then
        assert_eq!(snapshot.slots.len(), SLOT_COUNT);
        let first = &snapshot.slots[0];
        assert_eq!(first.word, "Hello");
        assert_eq!(first.author, "Alice");
        assert_eq!(first.tribe, Tribe::Green);
        assert!(first.loaded);
        assert_eq!(snapshot.slots[1].word, EMPTY_WORD);
        assert_eq!(snapshot.wallet_label, "0x0000...0001");
        assert_eq!(snapshot.wallet_tribe, None);
    }

    #[test]
    fn build_snapshot__marks_unloaded_slots() {
        let controller = WordChainController::new(FakeGateway::read_only(), CacheConfig::default());

        let snapshot = build_snapshot(&controller, "Local", true);

        assert!(snapshot.slots.iter().all(|slot| !slot.loaded));
        assert_eq!(snapshot.wallet_label, "Read-only");
        assert!(snapshot.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn build_snapshot__pending_slot_is_not_editable() {
        // given
        let gateway = FakeGateway::with_account(address(1));
        let mut controller = WordChainController::new(gateway, CacheConfig::default());
        controller.load_all().await.unwrap();

        // when
        controller.prepare_contribution(3, "Hello").unwrap();
        let snapshot = build_snapshot(&controller, "Local", false);

        // then
        assert!(snapshot.slots[3].pending);
        assert!(!snapshot.slots[3].is_editable());
        assert_eq!(snapshot.slots[3].word, "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn event_worker__forwards_batches_until_shutdown() {
        // given
        let (source, batches) = FakeEventSource::new_with_sender();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (notify_tx, mut incoming) = mpsc::unbounded_channel();
        let handle = tokio::spawn(event_worker(
            Duration::from_secs(4),
            source,
            cmd_rx,
            notify_tx,
        ));

        // when
        batches
            .send(vec![word_updated(1, 2, 10), word_updated(5, 2, 11)])
            .unwrap();
        let first = incoming.recv().await.unwrap();
        let second = incoming.recv().await.unwrap();
        drop(batches);
        cmd_tx.send(EventWorkerCommand::Shutdown).unwrap();

        // then
        assert_eq!(first.index, 1);
        assert_eq!(second.index, 5);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unless_interrupted__returns_finished_work() {
        // when
        let out = unless_interrupted(async { 7 }, std::future::pending::<()>()).await;

        // then
        assert_eq!(out, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn unless_interrupted__stops_waiting_for_slow_receipt() {
        // given
        let gateway = FakeGateway::with_account(address(1));
        let mut controller = WordChainController::new(gateway, CacheConfig::default());
        let receipt = async {
            time::sleep(Duration::from_secs(60)).await;
            controller.set_status("confirmed", StatusLevel::Success);
        };

        // when
        let out = unless_interrupted(receipt, time::sleep(Duration::from_secs(2))).await;

        // then
        assert_eq!(out, None);
        assert!(controller.status().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_wallet__snapshot_turns_read_only() {
        // given
        let gateway = FakeGateway::with_account(address(1));
        let mut controller = WordChainController::new(gateway, CacheConfig::default());

        // when
        assert!(controller.disconnect_wallet());
        let snapshot = build_snapshot(&controller, "Local", false);

        // then
        assert_eq!(snapshot.wallet_label, "Read-only");
        assert_eq!(snapshot.wallet_tribe, None);
        assert_eq!(
            snapshot.status,
            Some((String::from("Wallet disconnected"), StatusLevel::Success))
        );
    }

    #[test]
    fn network_target__defaults_to_env_rpc_url() {
        let target = NetworkTarget::new(DeploymentEnv::Sepolia, None);
        assert_eq!(target.url, "https://sepolia.base.org");
        let custom = NetworkTarget::new(DeploymentEnv::Local, Some("http://node:8545".into()));
        assert_eq!(custom.url, "http://node:8545");
    }
}
