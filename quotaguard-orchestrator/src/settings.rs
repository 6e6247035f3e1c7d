//! Process configuration, read once at startup and passed down explicitly.

use quotaguard_common::{PackagePolicy, DEFAULT_THRESHOLD};
use std::fmt;
use std::fs;
use thiserror::Error;

pub const DEFAULT_REGION: &str = "ap-hongkong";

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("{ids} secret ids but {keys} secret keys configured; lists must be parallel")]
    KeyCountMismatch { ids: usize, keys: usize },

    #[error("{accounts} accounts but {regions} regions configured; give one region or one per account")]
    RegionCountMismatch { accounts: usize, regions: usize },

    #[error("threshold must be a number in (0, 1], got {0:?}")]
    InvalidThreshold(String),

    #[error("unknown traffic package policy {0:?} (expected first or sum)")]
    InvalidPolicy(String),

    #[error("invalid boolean {value:?} for {name}")]
    InvalidFlag { name: &'static str, value: String },

    #[error("unknown {kind} {value:?}")]
    UnknownAdapter { kind: &'static str, value: String },
}

/// One credential/region tuple; one account cycle runs per entry.
#[derive(Clone, PartialEq)]
pub struct AccountSettings {
    pub secret_id: String,
    pub secret_key: String,
    pub region: String,
}

impl AccountSettings {
    /// Log-safe label: region plus the last 4 chars of the secret id.
    pub fn label(&self) -> String {
        let tail: String = {
            let chars: Vec<char> = self.secret_id.chars().collect();
            let start = chars.len().saturating_sub(4);
            chars[start..].iter().collect()
        };
        format!("{}/…{}", self.region, tail)
    }
}

impl fmt::Debug for AccountSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSettings")
            .field("account", &self.label())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub accounts: Vec<AccountSettings>,
    pub threshold: f64,
    pub package_policy: PackagePolicy,
    pub provider: String,
    pub notifier: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub mock_fixture_file: Option<String>,
    pub dry_run: bool,
    pub continue_on_error: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup (env, test map). Legacy lowercase
    /// names (`ak`, `sk`, `regs`, `tgtoken`, `threshold`) are accepted as fallbacks.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| first_set(&lookup, keys);
        let secret = |file_key: &str, keys: &[&str]| secret_value(&lookup, file_key, keys);

        let provider = get(&["PROVIDER"]).unwrap_or_else(|| "lighthouse".to_string());
        if !matches!(provider.as_str(), "lighthouse" | "mock") {
            return Err(SettingsError::UnknownAdapter {
                kind: "provider",
                value: provider,
            });
        }
        let notifier = get(&["NOTIFIER"]).unwrap_or_else(|| "telegram".to_string());
        if !matches!(notifier.as_str(), "telegram" | "mock") {
            return Err(SettingsError::UnknownAdapter {
                kind: "notifier",
                value: notifier,
            });
        }

        let ids = parse_csv(
            get(&["TENCENTCLOUD_SECRET_ID", "ak"])
                .ok_or(SettingsError::Missing("TENCENTCLOUD_SECRET_ID"))?
                .as_str(),
        );
        let keys = parse_csv(
            secret(
                "TENCENTCLOUD_SECRET_KEY_FILE",
                &["TENCENTCLOUD_SECRET_KEY", "sk"],
            )
            .ok_or(SettingsError::Missing("TENCENTCLOUD_SECRET_KEY"))?
            .as_str(),
        );
        if ids.is_empty() {
            return Err(SettingsError::Missing("TENCENTCLOUD_SECRET_ID"));
        }
        if ids.len() != keys.len() {
            return Err(SettingsError::KeyCountMismatch {
                ids: ids.len(),
                keys: keys.len(),
            });
        }

        let mut regions = parse_csv(
            get(&["TENCENTCLOUD_REGIONS", "regs"])
                .unwrap_or_else(|| DEFAULT_REGION.to_string())
                .as_str(),
        );
        if regions.is_empty() {
            regions.push(DEFAULT_REGION.to_string());
        }
        if regions.len() != 1 && regions.len() != ids.len() {
            return Err(SettingsError::RegionCountMismatch {
                accounts: ids.len(),
                regions: regions.len(),
            });
        }

        let accounts = ids
            .into_iter()
            .zip(keys)
            .enumerate()
            .map(|(i, (secret_id, secret_key))| AccountSettings {
                secret_id,
                secret_key,
                region: regions.get(i).unwrap_or(&regions[0]).clone(),
            })
            .collect();

        let threshold = match get(&["TRAFFIC_THRESHOLD", "threshold"]) {
            None => DEFAULT_THRESHOLD,
            Some(raw) => parse_threshold(&raw)?,
        };

        let package_policy = match get(&["TRAFFIC_PACKAGE_POLICY"]) {
            None => PackagePolicy::default(),
            Some(raw) => PackagePolicy::parse(&raw).ok_or(SettingsError::InvalidPolicy(raw))?,
        };

        let telegram_token = secret("TELEGRAM_BOT_TOKEN_FILE", &["TELEGRAM_BOT_TOKEN", "tgtoken"]);
        if notifier == "telegram" && telegram_token.is_none() {
            return Err(SettingsError::Missing("TELEGRAM_BOT_TOKEN"));
        }

        Ok(Self {
            accounts,
            threshold,
            package_policy,
            provider,
            notifier,
            telegram_token,
            telegram_chat_id: get(&["TELEGRAM_CHAT_ID"]),
            mock_fixture_file: get(&["MOCK_FIXTURE_FILE"]),
            dry_run: parse_flag("DRY_RUN", get(&["DRY_RUN"]))?,
            continue_on_error: parse_flag("CONTINUE_ON_ERROR", get(&["CONTINUE_ON_ERROR"]))?,
        })
    }
}

fn first_set<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|k| lookup(k))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

// Prefer *_FILE for secrets (Docker/K8s friendly), fallback to env var.
fn secret_value<F>(lookup: &F, file_key: &str, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(file_key)
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .and_then(|path| read_secret_file(file_key, &path))
        .or_else(|| first_set(lookup, keys))
}

fn read_secret_file(file_key: &str, path: &str) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let value = contents.trim();
            if value.is_empty() {
                tracing::warn!("⚠️ {}={} is empty, falling back to the plain variable", file_key, path);
                return None;
            }
            Some(value.to_string())
        }
        Err(e) => {
            tracing::warn!(
                "⚠️ {}={} could not be read ({}), falling back to the plain variable",
                file_key,
                path,
                e
            );
            None
        }
    }
}

/// Comma-separated list; trims whitespace and drops empty entries.
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_threshold(raw: &str) -> Result<f64, SettingsError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v > 0.0 && v <= 1.0 => Ok(v),
        _ => Err(SettingsError::InvalidThreshold(raw.to_string())),
    }
}

fn parse_flag(name: &'static str, raw: Option<String>) -> Result<bool, SettingsError> {
    let Some(value) = raw else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidFlag { name, value }),
    }
}
