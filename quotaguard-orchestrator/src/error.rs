use std::fmt;
use thiserror::Error;

/// Where an account cycle failed. The binary maps each stage to its own exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// The account's provider client could not be built (unknown or uncompiled adapter, bad client config).
    ProviderSetup,
    NotificationSetup,
    Inventory,
    Traffic,
    Stop,
    Start,
    Notification,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::ProviderSetup => "provider setup",
            FailureStage::NotificationSetup => "notification setup",
            FailureStage::Inventory => "inventory fetch",
            FailureStage::Traffic => "traffic fetch",
            FailureStage::Stop => "stop instances",
            FailureStage::Start => "start instances",
            FailureStage::Notification => "notification send",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal provider/channel failure. No retry is attempted.
#[derive(Debug, Error)]
#[error("[{account}] {stage} failed: {error:#}")]
pub struct CycleError {
    pub stage: FailureStage,
    pub account: String,
    pub error: anyhow::Error,
}

impl CycleError {
    pub fn new(stage: FailureStage, account: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            stage,
            account: account.into(),
            error,
        }
    }
}
