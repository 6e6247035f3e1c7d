//! Traffic-quota lifecycle controller.
//!
//! Per account: list instances and their traffic packages, stop instances that used up
//! their quota, start instances whose usage dropped back below it, and report what was
//! done through a notification channel.

pub mod cycle;
pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod notifier;
pub mod provider_manager;
pub mod settings;
pub mod usage;

pub use cycle::{run_accounts, AccountCycle, CyclePolicy, CycleSummary};
pub use decision::{decide, Decision};
pub use error::{CycleError, FailureStage};
pub use settings::{AccountSettings, Settings, SettingsError};
