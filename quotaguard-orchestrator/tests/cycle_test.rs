// Full account cycles against the in-memory provider and channel.

use quotaguard_common::{NoticeAction, PackagePolicy};
use quotaguard_orchestrator::notifier::BANNER;
use quotaguard_orchestrator::{
    run_accounts, AccountCycle, AccountSettings, CyclePolicy, FailureStage, Settings,
};
use quotaguard_providers::mock::{MockChannel, MockOperation, MockProvider, ProviderCall};
use quotaguard_providers::inventory::TrafficPackageUsage;
use quotaguard_providers::CloudProvider;

const T: u64 = 1u64 << 40;
const REGION: &str = "ap-hongkong";

fn account(id: &str) -> AccountSettings {
    AccountSettings {
        secret_id: id.into(),
        secret_key: "secret".into(),
        region: REGION.into(),
    }
}

fn policy() -> CyclePolicy {
    CyclePolicy {
        threshold: 0.98,
        package_policy: PackagePolicy::First,
        dry_run: false,
    }
}

fn settings(accounts: Vec<AccountSettings>, continue_on_error: bool) -> Settings {
    Settings {
        accounts,
        threshold: 0.98,
        package_policy: PackagePolicy::First,
        provider: "mock".into(),
        notifier: "mock".into(),
        telegram_token: None,
        telegram_chat_id: None,
        mock_fixture_file: None,
        dry_run: false,
        continue_on_error,
    }
}

fn actuator_calls(calls: &[ProviderCall]) -> Vec<ProviderCall> {
    calls
        .iter()
        .filter(|c| matches!(c, ProviderCall::Stop { .. } | ProviderCall::Start { .. }))
        .cloned()
        .collect()
}

#[tokio::test]
async fn over_quota_running_instance_is_stopped_and_reported() {
    let provider = MockProvider::new()
        .with_instance("i-1", "edge-hk", "RUNNING")
        .with_traffic("i-1", T / 100 * 99, T);
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    let summary = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    assert_eq!(summary.decision.stop_ids, vec!["i-1"]);
    assert!(summary.decision.start_ids.is_empty());
    assert_eq!(summary.decision.notices.len(), 1);
    assert_eq!(summary.decision.notices[0].action, NoticeAction::Stop);

    assert_eq!(
        actuator_calls(&provider.calls().await),
        vec![ProviderCall::Stop {
            region: REGION.into(),
            instance_ids: vec!["i-1".into()]
        }]
    );

    let sent = channel.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("🛑 Stopped 1 instance(s)"));
    assert!(sent[0].contains(BANNER));
    assert!(sent[0].contains("i-1 edge-hk "));
    assert_eq!(summary.messages_sent, 1);
}

#[tokio::test]
async fn recovered_stopped_instance_is_started() {
    let provider = MockProvider::new()
        .with_instance("i-1", "edge-hk", "STOPPED")
        .with_traffic("i-1", T / 10, T);
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    let summary = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    assert_eq!(summary.decision.start_ids, vec!["i-1"]);
    assert_eq!(
        actuator_calls(&provider.calls().await),
        vec![ProviderCall::Start {
            region: REGION.into(),
            instance_ids: vec!["i-1".into()]
        }]
    );
    let sent = channel.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("✅ Started 1 instance(s)"));
}

#[tokio::test]
async fn nothing_to_do_means_no_calls_and_no_messages() {
    let provider = MockProvider::new()
        .with_instance("i-1", "a", "RUNNING")
        .with_traffic("i-1", T / 2, T)
        .with_instance("i-2", "b", "STOPPED")
        .with_traffic("i-2", T, T)
        .with_instance("i-3", "no-plan", "RUNNING");
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    let summary = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    assert!(summary.decision.is_empty());
    assert_eq!(summary.records, 2);
    assert!(actuator_calls(&provider.calls().await).is_empty());
    assert!(channel.sent().await.is_empty());
}

#[tokio::test]
async fn zero_total_package_is_skipped_with_warning() {
    let provider = MockProvider::new()
        .with_instance("i-1", "broken", "RUNNING")
        .with_traffic("i-1", 5, 0)
        .with_instance("i-2", "hot", "RUNNING")
        .with_traffic("i-2", T, T);
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    let summary = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    assert_eq!(summary.warnings.len(), 1);
    assert_eq!(summary.warnings[0].instance_id(), "i-1");
    assert_eq!(summary.decision.stop_ids, vec!["i-2"]);
}

#[tokio::test]
async fn package_without_usage_counter_never_restarts_instance() {
    let provider = MockProvider::new()
        .with_instance("i-1", "quiet", "STOPPED")
        .with_packages(
            "i-1",
            vec![TrafficPackageUsage {
                package_id: Some("pkg-1".into()),
                used_bytes: None,
                total_bytes: Some(T),
            }],
        );
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    let summary = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    assert!(summary.decision.is_empty());
    assert_eq!(summary.warnings.len(), 1);
    assert_eq!(summary.warnings[0].instance_id(), "i-1");
    assert!(actuator_calls(&provider.calls().await).is_empty());
    assert_eq!(provider.status_of("i-1").await.as_deref(), Some("STOPPED"));
}

#[tokio::test]
async fn empty_inventory_skips_traffic_fetch() {
    let provider = MockProvider::new();
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    assert_eq!(
        provider.calls().await,
        vec![ProviderCall::ListInstances {
            region: REGION.into()
        }]
    );
}

#[tokio::test]
async fn stop_then_start_within_one_cycle() {
    let provider = MockProvider::new()
        .with_instance("i-1", "a", "STOPPED")
        .with_traffic("i-1", 0, T)
        .with_instance("i-2", "b", "RUNNING")
        .with_traffic("i-2", T, T);
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    let calls = actuator_calls(&provider.calls().await);
    assert!(matches!(calls[0], ProviderCall::Stop { .. }));
    assert!(matches!(calls[1], ProviderCall::Start { .. }));

    let sent = channel.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent[0].contains("i-2 b "));
    assert!(sent[1].contains("i-1 a "));
}

#[tokio::test]
async fn package_renewal_restarts_on_next_cycle() {
    let provider = MockProvider::new()
        .with_instance("i-1", "a", "RUNNING")
        .with_traffic("i-1", T, T);
    let channel = MockChannel::new();
    let acct = account("AKID0001");
    let cycle = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    };

    cycle.run().await.unwrap();
    assert_eq!(provider.status_of("i-1").await.as_deref(), Some("STOPPED"));

    // still over quota: already stopped, nothing new
    let second = cycle.run().await.unwrap();
    assert!(second.decision.is_empty());

    provider.set_usage("i-1", 0).await;
    let third = cycle.run().await.unwrap();
    assert_eq!(third.decision.start_ids, vec!["i-1"]);
    assert_eq!(provider.status_of("i-1").await.as_deref(), Some("RUNNING"));
    assert_eq!(channel.sent().await.len(), 2);
}

#[tokio::test]
async fn actuator_failure_aborts_before_notification() {
    let provider = MockProvider::new()
        .with_instance("i-1", "a", "RUNNING")
        .with_traffic("i-1", T, T)
        .failing_on(MockOperation::Stop);
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    let err = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.stage, FailureStage::Stop);
    assert!(channel.sent().await.is_empty());
}

#[tokio::test]
async fn fetch_failures_carry_their_stage() {
    for (op, stage) in [
        (MockOperation::ListInstances, FailureStage::Inventory),
        (MockOperation::ListTraffic, FailureStage::Traffic),
        (MockOperation::Start, FailureStage::Start),
    ] {
        let provider = MockProvider::new()
            .with_instance("i-1", "a", "STOPPED")
            .with_traffic("i-1", 0, T)
            .failing_on(op);
        let channel = MockChannel::new();
        let acct = account("AKID0001");
        let err = AccountCycle {
            account: &acct,
            policy: policy(),
            provider: &provider,
            channel: &channel,
        }
        .run()
        .await
        .unwrap_err();
        assert_eq!(err.stage, stage);
    }
}

#[tokio::test]
async fn notification_failure_is_fatal() {
    let provider = MockProvider::new()
        .with_instance("i-1", "a", "RUNNING")
        .with_traffic("i-1", T, T);
    let channel = MockChannel::failing();
    let acct = account("AKID0001");

    let err = AccountCycle {
        account: &acct,
        policy: policy(),
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap_err();
    assert_eq!(err.stage, FailureStage::Notification);
}

#[tokio::test]
async fn dry_run_decides_but_does_not_act() {
    let provider = MockProvider::new()
        .with_instance("i-1", "a", "RUNNING")
        .with_traffic("i-1", T, T);
    let channel = MockChannel::new();
    let acct = account("AKID0001");

    let summary = AccountCycle {
        account: &acct,
        policy: CyclePolicy {
            dry_run: true,
            ..policy()
        },
        provider: &provider,
        channel: &channel,
    }
    .run()
    .await
    .unwrap();

    assert_eq!(summary.decision.stop_ids, vec!["i-1"]);
    assert!(actuator_calls(&provider.calls().await).is_empty());
    assert!(channel.sent().await.is_empty());
}

fn provider_for(account: &AccountSettings) -> anyhow::Result<Box<dyn CloudProvider>> {
    let provider = match account.secret_id.as_str() {
        "bad" => MockProvider::new().failing_on(MockOperation::ListInstances),
        _ => MockProvider::new()
            .with_instance("i-1", "a", "RUNNING")
            .with_traffic("i-1", T, T),
    };
    Ok(Box::new(provider))
}

#[tokio::test]
async fn accounts_run_in_order_and_fail_stop() {
    let channel = MockChannel::new();
    let s = settings(vec![account("good1"), account("bad"), account("good2")], false);

    let mut visited = Vec::new();
    let err = run_accounts(&s, &channel, |a| {
        visited.push(a.secret_id.clone());
        provider_for(a)
    })
    .await
    .unwrap_err();

    assert_eq!(err.stage, FailureStage::Inventory);
    assert_eq!(visited, vec!["good1", "bad"]);
    assert_eq!(channel.sent().await.len(), 1);
}

#[tokio::test]
async fn continue_on_error_finishes_remaining_accounts() {
    let channel = MockChannel::new();
    let s = settings(vec![account("good1"), account("bad"), account("good2")], true);

    let mut visited = Vec::new();
    let err = run_accounts(&s, &channel, |a| {
        visited.push(a.secret_id.clone());
        provider_for(a)
    })
    .await
    .unwrap_err();

    assert_eq!(err.stage, FailureStage::Inventory);
    assert_eq!(visited, vec!["good1", "bad", "good2"]);
    assert_eq!(channel.sent().await.len(), 2);
}

#[tokio::test]
async fn provider_build_failure_is_a_setup_error() {
    let channel = MockChannel::new();
    let s = settings(vec![account("good1")], false);

    let err = run_accounts(&s, &channel, |_| {
        Err(anyhow::anyhow!("provider \"nimbus\" is not compiled into this build"))
    })
    .await
    .unwrap_err();

    assert_eq!(err.stage, FailureStage::ProviderSetup);
    assert!(err.to_string().contains("provider setup failed"));
    assert!(channel.sent().await.is_empty());
}

#[tokio::test]
async fn all_accounts_succeed() {
    let channel = MockChannel::new();
    let s = settings(vec![account("good1"), account("good2")], false);

    let summaries = run_accounts(&s, &channel, provider_for).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.dispatched.stopped == 1));
}
