#![allow(non_snake_case)]

use tokio::sync::mpsc;
use word_chain::{
    CacheConfig,
    Error,
    Tribe,
    WordChainController,
    test_helpers::{
        FakeGateway,
        FakeWrite,
        address,
    },
};

fn status_text<G>(controller: &WordChainController<G>) -> &str {
    controller
        .status()
        .map(|status| status.text.as_str())
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn new_account__registers_then_contributes_under_its_name() {
    // given
    let gateway = FakeGateway::with_account(address(8));
    let state = gateway.state();
    let mut controller = WordChainController::new(gateway, CacheConfig::default());
    controller.load_all().await.unwrap();
    let registered_before = controller.check_registration().await.unwrap();

    // when
    controller.register("  Kenji ", Some(Tribe::Red)).await.unwrap();
    let registered_after = controller.check_registration().await.unwrap();
    controller.contribute(12, "Lantern").await.unwrap();

    // then
    assert!(!registered_before);
    assert!(registered_after);
    assert_eq!(controller.wallet_label(), "Kenji");
    let slot = controller.cache().slot(12).unwrap();
    assert_eq!(slot.word, "Lantern");
    assert_eq!(slot.author_name, "Kenji");
    assert_eq!(slot.tribe, Tribe::Red);
    assert_eq!(status_text(&controller), "Word contributed successfully!");
    assert_eq!(
        state.lock().unwrap().submitted,
        vec![
            FakeWrite::Registration {
                account: address(8),
                name: String::from("Kenji"),
                tribe: Tribe::Red,
            },
            FakeWrite::Contribution {
                index: 12,
                word: String::from("Lantern"),
                author: address(8),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn reverted_contribution__restores_slot_and_allows_retry() {
    // given
    let gateway = FakeGateway::with_account(address(1));
    let state = gateway.state();
    {
        let mut chain = state.lock().unwrap();
        chain.set_word(2, "Old", Some(address(9)));
        chain.set_user(address(9), "Mika", Tribe::Green);
        chain.fail_confirmations = true;
    }
    let mut controller = WordChainController::new(gateway, CacheConfig::default());
    controller.load_all().await.unwrap();
    let before = controller.cache().slot(2).cloned();

    // when
    let failed = controller.contribute(2, "New").await;
    let after_failure = controller.cache().slot(2).cloned();
    let failure_status = status_text(&controller).to_string();
    state.lock().unwrap().fail_confirmations = false;
    let retried = controller.contribute(2, "New").await;

    // then
    assert!(matches!(failed, Err(Error::Transaction(_))));
    assert_eq!(after_failure, before);
    assert_eq!(failure_status, "Transaction failed");
    assert!(retried.is_ok());
    assert_eq!(controller.cache().slot(2).unwrap().word, "New");
    assert!(controller.cache().pending_indices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn own_contribution__echoed_notification_is_not_refetched() {
    // given
    let gateway = FakeGateway::with_account(address(1));
    let state = gateway.state();
    let (notify_tx, mut incoming) = mpsc::unbounded_channel();
    gateway.attach_notifier(notify_tx);
    let mut controller = WordChainController::new(gateway, CacheConfig::default());
    controller.load_all().await.unwrap();

    // when
    controller.contribute(40, "Echo").await.unwrap();
    let reads_after_confirm = state.lock().unwrap().read_calls.len();
    let changed = controller.drain_events(&mut incoming).await;

    // then
    assert_eq!(changed, 0);
    assert_eq!(state.lock().unwrap().read_calls.len(), reads_after_confirm);
    assert!(!controller.queue().has_pending());
}

#[tokio::test(start_paused = true)]
async fn read_only_client__can_browse_but_not_write() {
    // given
    let gateway = FakeGateway::read_only();
    let state = gateway.state();
    state
        .lock()
        .unwrap()
        .set_word(0, "Hello", Some(address(3)));
    let mut controller = WordChainController::new(gateway, CacheConfig::default());

    // when
    controller.load_all().await.unwrap();
    let contribution = controller.contribute(0, "Bye").await;
    let registration = controller.register("Ren", Some(Tribe::Yellow)).await;

    // then
    assert_eq!(controller.cache().slot(0).unwrap().word, "Hello");
    assert!(matches!(contribution, Err(Error::ReadOnly)));
    assert!(matches!(registration, Err(Error::ReadOnly)));
    assert_eq!(status_text(&controller), "Please connect your wallet first");
    assert_eq!(controller.wallet_label(), "Read-only");
    assert!(state.lock().unwrap().submitted.is_empty());
}
