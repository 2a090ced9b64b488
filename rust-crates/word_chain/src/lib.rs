//! Client-side state for the word chain contract: the 128-slot word cache,
//! the `WordUpdated` event queue and the maintenance timers that keep both
//! in step with the chain.

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gateway;
pub mod maintenance;
pub mod status;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use cache::WordCache;
pub use config::CacheConfig;
pub use controller::{
    LoadReport,
    PreparedContribution,
    WordChainController,
};
pub use error::{
    Error,
    Result,
};
pub use events::{
    EventQueue,
    NotificationReceiver,
    NotificationSender,
    WordUpdateSource,
};
pub use gateway::WordChainGateway;
pub use maintenance::{
    MaintenanceScheduler,
    MaintenanceTask,
};
pub use status::{
    StatusLevel,
    StatusMessage,
};
pub use types::{
    SLOT_COUNT,
    Tribe,
    TxLifecycle,
    UserInfo,
    WordSlot,
    WordUpdated,
};
