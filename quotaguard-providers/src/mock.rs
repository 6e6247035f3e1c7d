use crate::{inventory, CloudProvider, NotificationChannel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

/// Operations the mock can be told to fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOperation {
    ListInstances,
    ListTraffic,
    Stop,
    Start,
}

/// A call observed by the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    ListInstances { region: String },
    ListTraffic { region: String, instance_ids: Vec<String> },
    Stop { region: String, instance_ids: Vec<String> },
    Start { region: String, instance_ids: Vec<String> },
}

#[derive(Default)]
struct MockState {
    instances: Vec<inventory::DiscoveredInstance>,
    traffic: Vec<inventory::InstanceTraffic>,
    calls: Vec<ProviderCall>,
    fail_on: Option<MockOperation>,
}

/// In-memory provider. Stop/start flip the stored status so a following cycle
/// observes the transition, like a real provider would.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    instances: Vec<FixtureInstance>,
    #[serde(default)]
    traffic: Vec<FixtureTraffic>,
}

#[derive(Debug, Deserialize)]
struct FixtureInstance {
    id: String,
    #[serde(default)]
    name: String,
    state: String,
    #[serde(default)]
    expired_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FixtureTraffic {
    instance_id: String,
    used_bytes: u64,
    total_bytes: u64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads instances and traffic from a JSON document:
    /// `{"instances":[{"id","name","state"}], "traffic":[{"instance_id","used_bytes","total_bytes"}]}`
    pub fn from_fixture(json: &str) -> Result<Self> {
        let fixture: Fixture =
            serde_json::from_str(json).context("invalid mock provider fixture")?;
        let mut provider = Self::new();
        for i in fixture.instances {
            let state = provider.state.get_mut();
            state.instances.push(inventory::DiscoveredInstance {
                provider_id: i.id,
                name: i.name,
                status: i.state,
                expired_at: i.expired_at,
                public_addresses: vec![],
            });
        }
        for t in fixture.traffic {
            provider = provider.with_traffic(&t.instance_id, t.used_bytes, t.total_bytes);
        }
        Ok(provider)
    }

    pub fn with_instance(mut self, id: &str, name: &str, status: &str) -> Self {
        self.state.get_mut().instances.push(inventory::DiscoveredInstance {
            provider_id: id.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            expired_at: None,
            public_addresses: vec![],
        });
        self
    }

    pub fn with_traffic(self, id: &str, used_bytes: u64, total_bytes: u64) -> Self {
        self.with_packages(
            id,
            vec![inventory::TrafficPackageUsage {
                package_id: None,
                used_bytes: Some(used_bytes),
                total_bytes: Some(total_bytes),
            }],
        )
    }

    pub fn with_packages(mut self, id: &str, packages: Vec<inventory::TrafficPackageUsage>) -> Self {
        self.state.get_mut().traffic.push(inventory::InstanceTraffic {
            provider_id: id.to_string(),
            packages,
        });
        self
    }

    pub fn failing_on(mut self, op: MockOperation) -> Self {
        self.state.get_mut().fail_on = Some(op);
        self
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn status_of(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .instances
            .iter()
            .find(|i| i.provider_id == id)
            .map(|i| i.status.clone())
    }

    /// Simulates a package renewal: usage for `id` drops to `used_bytes`.
    pub async fn set_usage(&self, id: &str, used_bytes: u64) {
        let mut state = self.state.lock().await;
        if let Some(t) = state.traffic.iter_mut().find(|t| t.provider_id == id) {
            for p in t.packages.iter_mut() {
                p.used_bytes = Some(used_bytes);
            }
        }
    }

    fn check(state: &MockState, op: MockOperation) -> Result<()> {
        if state.fail_on == Some(op) {
            return Err(anyhow::anyhow!("mock provider: injected failure on {:?}", op));
        }
        Ok(())
    }

    fn set_status(state: &mut MockState, ids: &[String], status: &str) {
        for inst in state.instances.iter_mut() {
            if ids.contains(&inst.provider_id) {
                inst.status = status.to_string();
            }
        }
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn code(&self) -> &'static str {
        "mock"
    }

    async fn list_instances(&self, region: &str) -> Result<Vec<inventory::DiscoveredInstance>> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::ListInstances {
            region: region.to_string(),
        });
        Self::check(&state, MockOperation::ListInstances)?;
        Ok(state.instances.clone())
    }

    async fn list_traffic_packages(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> Result<Vec<inventory::InstanceTraffic>> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::ListTraffic {
            region: region.to_string(),
            instance_ids: instance_ids.to_vec(),
        });
        Self::check(&state, MockOperation::ListTraffic)?;
        Ok(state
            .traffic
            .iter()
            .filter(|t| instance_ids.contains(&t.provider_id))
            .cloned()
            .collect())
    }

    async fn stop_instances(&self, region: &str, instance_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::Stop {
            region: region.to_string(),
            instance_ids: instance_ids.to_vec(),
        });
        Self::check(&state, MockOperation::Stop)?;
        Self::set_status(&mut state, instance_ids, "STOPPED");
        Ok(())
    }

    async fn start_instances(&self, region: &str, instance_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::Start {
            region: region.to_string(),
            instance_ids: instance_ids.to_vec(),
        });
        Self::check(&state, MockOperation::Start)?;
        Self::set_status(&mut state, instance_ids, "RUNNING");
        Ok(())
    }
}

/// Records every message instead of delivering it.
#[derive(Default)]
pub struct MockChannel {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    fn code(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, text: &str) -> Result<()> {
        if self.fail {
            return Err(anyhow::anyhow!("mock channel: injected send failure"));
        }
        tracing::info!("[mock channel] {}", text);
        self.sent.lock().await.push(text.to_string());
        Ok(())
    }
}
