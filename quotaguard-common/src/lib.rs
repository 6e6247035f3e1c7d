use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod integrity;

pub use integrity::DataIntegrityError;

/// Bytes per binary gigabyte (GiB), used for notice rendering.
pub const GB: f64 = 1024.0 * 1024.0 * 1024.0;
/// Bytes per binary terabyte (TiB).
pub const TB: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;

/// Default stop threshold (98% of the traffic package).
pub const DEFAULT_THRESHOLD: f64 = 0.98;

// --- Enums ---

/// Lifecycle state as reported by the provider.
/// Only `Running` and `Stopped` are actionable; every other state is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceState {
    Running,
    Stopped,
    Other(String),
}

impl InstanceState {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("running") {
            InstanceState::Running
        } else if trimmed.eq_ignore_ascii_case("stopped") {
            InstanceState::Stopped
        } else {
            InstanceState::Other(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Running => "RUNNING",
            InstanceState::Stopped => "STOPPED",
            InstanceState::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for InstanceState {
    fn from(value: String) -> Self {
        InstanceState::parse(&value)
    }
}

impl From<InstanceState> for String {
    fn from(value: InstanceState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoticeAction {
    Start,
    Stop,
}

impl NoticeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeAction::Start => "START",
            NoticeAction::Stop => "STOP",
        }
    }
}

impl fmt::Display for NoticeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How several traffic packages reported for the same instance are reduced to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagePolicy {
    /// The first package in the provider's list is authoritative.
    #[default]
    First,
    /// Used and total bytes are summed across every package (base + add-on plans).
    Sum,
}

impl PackagePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first" => Some(PackagePolicy::First),
            "sum" => Some(PackagePolicy::Sum),
            _ => None,
        }
    }
}

// --- Entities ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub state: InstanceState,
    pub expiry: Option<DateTime<Utc>>, // display only, never part of a decision
    #[serde(default)]
    pub public_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPackage {
    pub instance_id: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl TrafficPackage {
    /// Builds a package, rejecting a zero total so `usage_ratio` can never divide by zero.
    pub fn new(
        instance_id: impl Into<String>,
        used_bytes: u64,
        total_bytes: u64,
    ) -> Result<Self, DataIntegrityError> {
        let instance_id = instance_id.into();
        if total_bytes == 0 {
            return Err(DataIntegrityError::ZeroTotal { instance_id, used_bytes });
        }
        Ok(Self {
            instance_id,
            used_bytes,
            total_bytes,
        })
    }

    /// used / total. Values above 1.0 mean over quota and are not clamped.
    pub fn usage_ratio(&self) -> f64 {
        self.used_bytes as f64 / self.total_bytes as f64
    }
}

/// An instance paired with its traffic package.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub instance: Instance,
    pub traffic: TrafficPackage,
}

impl UsageRecord {
    pub fn instance_id(&self) -> &str {
        &self.instance.id
    }

    pub fn usage_ratio(&self) -> f64 {
        self.traffic.usage_ratio()
    }
}

/// One reported decision, consumed by the notifier and then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeEntry {
    pub instance_id: String,
    pub instance_name: String,
    pub used_gb: f64,
    pub total_tb: f64,
    pub ratio_percent: f64,
    pub action: NoticeAction,
}

impl NoticeEntry {
    pub fn from_record(record: &UsageRecord, action: NoticeAction) -> Self {
        Self {
            instance_id: record.instance.id.clone(),
            instance_name: record.instance.name.clone(),
            used_gb: round1(record.traffic.used_bytes as f64 / GB),
            total_tb: round1(record.traffic.total_bytes as f64 / TB),
            ratio_percent: round2(record.usage_ratio() * 100.0),
            action,
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
