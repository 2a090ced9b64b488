use crate::config::CacheConfig;
use std::time::Duration;
use tokio::time::{
    self,
    Instant,
    Interval,
    MissedTickBehavior,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaintenanceTask {
    /// Drop stale user entries and bound the processed transaction set.
    EvictStale,
    /// Reload everything if the last full load is too old, then reconcile
    /// pending slots.
    CheckStaleness,
}

/// The two periodic maintenance timers. Neither fires at construction;
/// the first tick of each comes one full period later.
pub struct MaintenanceScheduler {
    eviction: Interval,
    staleness: Interval,
}

impl MaintenanceScheduler {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_periods(config.eviction_interval, config.staleness_check_interval)
    }

    pub fn with_periods(eviction_period: Duration, staleness_period: Duration) -> Self {
        let now = Instant::now();
        let mut eviction = time::interval_at(now + eviction_period, eviction_period);
        eviction.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut staleness = time::interval_at(now + staleness_period, staleness_period);
        staleness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            eviction,
            staleness,
        }
    }

    /// Waits for whichever timer fires next.
    pub async fn next_task(&mut self) -> MaintenanceTask {
        tokio::select! {
            _ = self.eviction.tick() => MaintenanceTask::EvictStale,
            _ = self.staleness.tick() => MaintenanceTask::CheckStaleness,
        }
    }
}

/// Whether a full reload is due at `now`.
pub fn reload_due(last_full_update: Option<Instant>, now: Instant, threshold: Duration) -> bool {
    last_full_update.is_none_or(|at| now.saturating_duration_since(at) >= threshold)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn next_task__staleness_fires_every_period() {
        // given
        let mut scheduler =
            MaintenanceScheduler::with_periods(Duration::from_secs(3600), Duration::from_secs(60));
        let start = Instant::now();

        // when
        let first = scheduler.next_task().await;
        let first_at = Instant::now();
        let second = scheduler.next_task().await;

        // then
        assert_eq!(first, MaintenanceTask::CheckStaleness);
        assert_eq!(second, MaintenanceTask::CheckStaleness);
        assert_eq!(first_at - start, Duration::from_secs(60));
        assert_eq!(Instant::now() - start, Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn next_task__eviction_fires_hourly() {
        // given
        let mut scheduler = MaintenanceScheduler::new(&CacheConfig::default());
        let start = Instant::now();

        // when
        let mut staleness_checks = 0;
        let task = loop {
            match scheduler.next_task().await {
                MaintenanceTask::CheckStaleness => staleness_checks += 1,
                other => break other,
            }
        };

        // then
        assert_eq!(task, MaintenanceTask::EvictStale);
        assert_eq!(Instant::now() - start, Duration::from_secs(3600));
        assert!(staleness_checks >= 59);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_due__boundary_is_inclusive() {
        // given
        let threshold = Duration::from_secs(300);
        let last = Instant::now();

        // when
        time::advance(Duration::from_secs(299)).await;
        let early = reload_due(Some(last), Instant::now(), threshold);
        time::advance(Duration::from_secs(1)).await;
        let due = reload_due(Some(last), Instant::now(), threshold);

        // then
        assert!(!early);
        assert!(due);
        assert!(reload_due(None, Instant::now(), threshold));
    }
}
