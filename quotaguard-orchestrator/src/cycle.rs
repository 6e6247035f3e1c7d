//! One account cycle: fetch inventory → fetch traffic → decide → stop → start → notify.

use crate::decision::{decide, Decision};
use crate::dispatcher::{dispatch, DispatchOutcome};
use crate::error::{CycleError, FailureStage};
use crate::notifier::{compose, notify};
use crate::settings::{AccountSettings, Settings};
use crate::usage::build_usage_records;
use quotaguard_common::{DataIntegrityError, PackagePolicy};
use quotaguard_providers::{CloudProvider, NotificationChannel};
use serde::Serialize;

/// What a finished cycle did, for logs and tests.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub account: String,
    pub instances: usize,
    pub records: usize,
    #[serde(serialize_with = "serialize_warnings")]
    pub warnings: Vec<DataIntegrityError>,
    pub decision: Decision,
    pub dispatched: DispatchOutcome,
    pub messages_sent: usize,
    pub dry_run: bool,
}

fn serialize_warnings<S>(warnings: &[DataIntegrityError], s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.collect_seq(warnings.iter().map(|w| w.to_string()))
}

/// Per-cycle knobs, copied out of `Settings`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclePolicy {
    pub threshold: f64,
    pub package_policy: PackagePolicy,
    pub dry_run: bool,
}

impl From<&Settings> for CyclePolicy {
    fn from(s: &Settings) -> Self {
        Self {
            threshold: s.threshold,
            package_policy: s.package_policy,
            dry_run: s.dry_run,
        }
    }
}

pub struct AccountCycle<'a> {
    pub account: &'a AccountSettings,
    pub policy: CyclePolicy,
    pub provider: &'a dyn CloudProvider,
    pub channel: &'a dyn NotificationChannel,
}

impl<'a> AccountCycle<'a> {
    pub async fn run(&self) -> Result<CycleSummary, CycleError> {
        let label = self.account.label();
        let region = self.account.region.as_str();
        tracing::info!(
            "🔎 [{}] checking traffic via {} (threshold={})",
            label,
            self.provider.code(),
            self.policy.threshold
        );

        let instances = self
            .provider
            .list_instances(region)
            .await
            .map_err(|e| CycleError::new(FailureStage::Inventory, &label, e))?;

        let traffic = if instances.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<String> = instances.iter().map(|i| i.provider_id.clone()).collect();
            self.provider
                .list_traffic_packages(region, &ids)
                .await
                .map_err(|e| CycleError::new(FailureStage::Traffic, &label, e))?
        };

        let report = build_usage_records(&instances, &traffic, self.policy.package_policy);
        let decision = decide(&report.records, self.policy.threshold);
        tracing::debug!(
            "[{}] stop={:?} start={:?}",
            label,
            decision.stop_ids,
            decision.start_ids
        );

        let dispatched = dispatch(
            self.provider,
            region,
            &label,
            &decision,
            self.policy.dry_run,
        )
        .await?;

        let messages = compose(&decision.notices, &label);
        let messages_sent = if self.policy.dry_run {
            for m in &messages {
                tracing::info!("🧪 [{}] dry run: would notify\n{}", label, m.text);
            }
            0
        } else {
            notify(self.channel, &messages)
                .await
                .map_err(|e| CycleError::new(FailureStage::Notification, &label, e))?
        };

        let summary = CycleSummary {
            account: label,
            instances: instances.len(),
            records: report.records.len(),
            warnings: report.warnings,
            decision,
            dispatched,
            messages_sent,
            dry_run: self.policy.dry_run,
        };
        tracing::info!(
            "✅ [{}] cycle done: {} instance(s), {} on a traffic plan, stopped={} started={} warnings={}",
            summary.account,
            summary.instances,
            summary.records,
            summary.decision.stop_ids.len(),
            summary.decision.start_ids.len(),
            summary.warnings.len()
        );
        tracing::debug!(
            "[{}] summary: {}",
            summary.account,
            serde_json::to_string(&summary).unwrap_or_default()
        );
        Ok(summary)
    }
}

/// Runs every configured account one after another.
///
/// Fail-stop by default: the first failure ends the run. With `continue_on_error`
/// the failing account is logged and skipped, and the first failure is returned
/// once every account has had its turn.
pub async fn run_accounts<F>(
    settings: &Settings,
    channel: &dyn NotificationChannel,
    mut make_provider: F,
) -> Result<Vec<CycleSummary>, CycleError>
where
    F: FnMut(&AccountSettings) -> anyhow::Result<Box<dyn CloudProvider>>,
{
    let policy = CyclePolicy::from(settings);
    let mut summaries = Vec::with_capacity(settings.accounts.len());
    let mut first_failure: Option<CycleError> = None;

    for account in &settings.accounts {
        let result = match make_provider(account) {
            Ok(provider) => {
                AccountCycle {
                    account,
                    policy,
                    provider: provider.as_ref(),
                    channel,
                }
                .run()
                .await
            }
            Err(e) => Err(CycleError::new(FailureStage::ProviderSetup, account.label(), e)),
        };

        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) if settings.continue_on_error => {
                tracing::error!("❌ {} (continuing with next account)", e);
                first_failure.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(summaries),
    }
}
