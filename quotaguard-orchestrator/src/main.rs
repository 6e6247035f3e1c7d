use quotaguard_orchestrator::provider_manager::ProviderManager;
use quotaguard_orchestrator::{run_accounts, FailureStage, Settings};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: u8 = 7;

fn exit_code(stage: FailureStage) -> u8 {
    match stage {
        FailureStage::ProviderSetup => EXIT_CONFIG,
        FailureStage::Inventory => 1,
        FailureStage::Traffic => 2,
        FailureStage::Stop => 3,
        FailureStage::Start => 4,
        FailureStage::NotificationSetup => 5,
        FailureStage::Notification => 6,
    }
}

fn init_tracing() {
    let level = std::env::var("LOG_LEVEL")
        .or_else(|_| std::env::var("log_level"))
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(level.trim()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Please set the environment variables: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!(
        "quotaguard starting: {} account(s), provider={}, notifier={}, threshold={}, dry_run={}",
        settings.accounts.len(),
        settings.provider,
        settings.notifier,
        settings.threshold,
        settings.dry_run
    );

    let channel = match ProviderManager::get_channel(&settings).await {
        Ok(c) => c,
        Err(e) => {
            error!("❌ notification channel unavailable: {:#}", e);
            return ExitCode::from(exit_code(FailureStage::NotificationSetup));
        }
    };

    let result = run_accounts(&settings, channel.as_ref(), |account| {
        ProviderManager::get_provider(&settings, account)
    })
    .await;

    match result {
        Ok(summaries) => {
            let stopped: usize = summaries.iter().map(|s| s.dispatched.stopped).sum();
            let started: usize = summaries.iter().map(|s| s.dispatched.started).sum();
            info!(
                "quotaguard finished: {} account(s), stopped={}, started={}",
                summaries.len(),
                stopped,
                started
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::from(exit_code(e.stage))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exit_codes_are_distinct() {
        let stages = [
            FailureStage::Inventory,
            FailureStage::Traffic,
            FailureStage::Stop,
            FailureStage::Start,
            FailureStage::NotificationSetup,
            FailureStage::Notification,
        ];
        let codes: HashSet<u8> = stages.iter().map(|s| exit_code(*s)).collect();
        assert_eq!(codes.len(), stages.len());
        assert!(!codes.contains(&0));
        assert!(!codes.contains(&EXIT_CONFIG));
    }

    #[test]
    fn provider_setup_counts_as_configuration() {
        assert_eq!(exit_code(FailureStage::ProviderSetup), EXIT_CONFIG);
    }
}
