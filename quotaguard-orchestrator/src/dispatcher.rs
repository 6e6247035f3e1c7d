use crate::decision::Decision;
use crate::error::{CycleError, FailureStage};
use quotaguard_providers::CloudProvider;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub stopped: usize,
    pub started: usize,
}

/// Stops, then starts. An empty list issues no call at all.
/// The first actuator failure aborts; nothing after it runs.
pub async fn dispatch(
    provider: &dyn CloudProvider,
    region: &str,
    account: &str,
    decision: &Decision,
    dry_run: bool,
) -> Result<DispatchOutcome, CycleError> {
    let mut outcome = DispatchOutcome::default();

    if decision.stop_ids.is_empty() {
        tracing::debug!("[{}] nothing to stop", account);
    } else if dry_run {
        tracing::info!("🧪 [{}] dry run: would stop {:?}", account, decision.stop_ids);
    } else {
        provider
            .stop_instances(region, &decision.stop_ids)
            .await
            .map_err(|e| CycleError::new(FailureStage::Stop, account, e))?;
        tracing::info!("🛑 [{}] stopped {} instance(s)", account, decision.stop_ids.len());
        outcome.stopped = decision.stop_ids.len();
    }

    if decision.start_ids.is_empty() {
        tracing::debug!("[{}] nothing to start", account);
    } else if dry_run {
        tracing::info!("🧪 [{}] dry run: would start {:?}", account, decision.start_ids);
    } else {
        provider
            .start_instances(region, &decision.start_ids)
            .await
            .map_err(|e| CycleError::new(FailureStage::Start, account, e))?;
        tracing::info!("▶️ [{}] started {} instance(s)", account, decision.start_ids.len());
        outcome.started = decision.start_ids.len();
    }

    Ok(outcome)
}
