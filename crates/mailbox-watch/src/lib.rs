//! Watch an Exchange mailbox folder for the first batch of matching items.

pub mod cancel;
pub mod config;
pub mod error;
pub mod ews;
pub mod lifecycle;
pub mod service;
pub mod soap;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use config::{EwsConfig, WatchConfig, WatchCriteria};
pub use error::{ServiceError, WatchError};
pub use ews::EwsClient;
pub use lifecycle::{RunLimits, RunOutcome, RunReport, ShutdownKind};
pub use service::MailboxService;
pub use watcher::{MailboxWatcher, WatchOutcome};
