#![allow(non_snake_case)]

use std::time::Duration;
use tokio::time;
use word_chain::{
    CacheConfig,
    MaintenanceScheduler,
    MaintenanceTask,
    SLOT_COUNT,
    Tribe,
    WordChainController,
    test_helpers::{
        FakeGateway,
        address,
        word_updated,
    },
};

#[tokio::test(start_paused = true)]
async fn scheduler__reloads_after_five_minutes_of_checks() {
    // given
    let gateway = FakeGateway::read_only();
    let state = gateway.state();
    let mut controller = WordChainController::new(gateway, CacheConfig::default());
    controller.load_all().await.unwrap();
    let mut scheduler = MaintenanceScheduler::new(controller.config());
    state.lock().unwrap().set_word(0, "Later", None);

    // when
    let mut reads_per_check = Vec::new();
    for _ in 0..5 {
        let task = scheduler.next_task().await;
        assert_eq!(task, MaintenanceTask::CheckStaleness);
        controller.run_maintenance(task).await;
        reads_per_check.push(state.lock().unwrap().read_calls.len());
    }

    // then
    assert_eq!(
        reads_per_check,
        vec![SLOT_COUNT, SLOT_COUNT, SLOT_COUNT, SLOT_COUNT, 2 * SLOT_COUNT]
    );
    assert_eq!(controller.cache().slot(0).unwrap().word, "Later");
}

#[tokio::test(start_paused = true)]
async fn scheduler__eviction_refetches_authors_after_a_day() {
    // given
    let gateway = FakeGateway::read_only();
    let state = gateway.state();
    {
        let mut chain = state.lock().unwrap();
        chain.set_word(5, "Tide", Some(address(3)));
        chain.set_user(address(3), "Sora", Tribe::Blue);
    }
    let config = CacheConfig {
        staleness_check_interval: Duration::from_secs(24 * 60 * 60),
        force_refresh_after: Duration::from_secs(48 * 60 * 60),
        ..CacheConfig::default()
    };
    let mut controller = WordChainController::new(gateway, config);
    controller.load_all().await.unwrap();
    let mut scheduler = MaintenanceScheduler::new(controller.config());

    // when
    time::advance(Duration::from_secs(25 * 60 * 60)).await;
    let mut tasks = Vec::new();
    while controller.cache().users_len() > 0 {
        let task = scheduler.next_task().await;
        tasks.push(task);
        controller.run_maintenance(task).await;
    }
    state.lock().unwrap().set_user(address(3), "Sora", Tribe::Red);
    controller.handle_notification(word_updated(5, 3, 700));
    let (_tx, mut incoming) = tokio::sync::mpsc::unbounded_channel();
    controller.drain_events(&mut incoming).await;

    // then
    assert!(tasks.contains(&MaintenanceTask::EvictStale));
    assert_eq!(state.lock().unwrap().user_calls, vec![address(3), address(3)]);
    assert_eq!(controller.cache().slot(5).unwrap().tribe, Tribe::Red);
}
