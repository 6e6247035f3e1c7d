use anyhow::Result;
use async_trait::async_trait;

/// Inventory + lifecycle operations for one cloud account.
///
/// An implementation is bound to a single credential; the region is passed per call.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Short provider code used in logs ("lighthouse", "mock").
    fn code(&self) -> &'static str;

    async fn list_instances(&self, region: &str) -> Result<Vec<inventory::DiscoveredInstance>>;

    /// Traffic package usage for the given instances. Instances without a plan
    /// are simply absent from the result.
    async fn list_traffic_packages(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> Result<Vec<inventory::InstanceTraffic>>;

    /// Power off instances. Callers never pass an empty list.
    async fn stop_instances(&self, region: &str, instance_ids: &[String]) -> Result<()>;

    /// Power on instances. Callers never pass an empty list.
    async fn start_instances(&self, region: &str, instance_ids: &[String]) -> Result<()>;
}

/// Delivers a text message to a preconfigured recipient.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn code(&self) -> &'static str;

    async fn send(&self, text: &str) -> Result<()>;
}

/// Raw, provider-shaped records. Normalisation into typed domain values happens in the orchestrator.
pub mod inventory {
    #[derive(Clone, Debug, PartialEq)]
    pub struct DiscoveredInstance {
        pub provider_id: String,
        pub name: String,
        pub status: String,
        pub expired_at: Option<String>,
        pub public_addresses: Vec<String>,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct InstanceTraffic {
        pub provider_id: String,
        pub packages: Vec<TrafficPackageUsage>,
    }

    /// Byte counters stay optional: a field the provider left out is not the same as zero.
    #[derive(Clone, Debug, PartialEq)]
    pub struct TrafficPackageUsage {
        pub package_id: Option<String>,
        pub used_bytes: Option<u64>,
        pub total_bytes: Option<u64>,
    }
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "lighthouse")]
pub mod lighthouse;

#[cfg(feature = "telegram")]
pub mod telegram;
