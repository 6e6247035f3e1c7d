use chrono::{DateTime, Utc};
use quotaguard_common::{DataIntegrityError, Instance, InstanceState, PackagePolicy, TrafficPackage, UsageRecord};
use quotaguard_providers::inventory::{DiscoveredInstance, InstanceTraffic, TrafficPackageUsage};
use std::collections::HashMap;

/// Joined records for one account plus the raw rows that had to be dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    pub records: Vec<UsageRecord>,
    pub warnings: Vec<DataIntegrityError>,
}

pub fn normalize_instance(raw: &DiscoveredInstance) -> Instance {
    Instance {
        id: raw.provider_id.clone(),
        name: raw.name.clone(),
        state: InstanceState::parse(&raw.status),
        expiry: raw
            .expired_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
        public_addresses: raw.public_addresses.clone(),
    }
}

fn counters(instance_id: &str, p: &TrafficPackageUsage) -> Result<(u64, u64), DataIntegrityError> {
    let missing = |field| DataIntegrityError::MissingField {
        instance_id: instance_id.to_string(),
        field,
    };
    let used = p.used_bytes.ok_or_else(|| missing("used_bytes"))?;
    let total = p.total_bytes.ok_or_else(|| missing("total_bytes"))?;
    Ok((used, total))
}

/// Collapses the provider's package list for one instance according to `policy`.
/// Every package that takes part must carry both counters.
pub fn reduce_packages(
    raw: &InstanceTraffic,
    policy: PackagePolicy,
) -> Result<TrafficPackage, DataIntegrityError> {
    let id = raw.provider_id.as_str();
    let Some(first) = raw.packages.first() else {
        return Err(DataIntegrityError::NoPackage {
            instance_id: id.to_string(),
        });
    };
    let (used, total) = match policy {
        PackagePolicy::First => counters(id, first)?,
        PackagePolicy::Sum => {
            let mut sum = (0u64, 0u64);
            for p in &raw.packages {
                let (u, t) = counters(id, p)?;
                sum = (sum.0.saturating_add(u), sum.1.saturating_add(t));
            }
            sum
        }
    };
    TrafficPackage::new(id, used, total)
}

/// Hash-joins inventory and traffic on instance id, in inventory order.
///
/// Instances with no traffic entry are left out silently (not on a traffic plan).
/// Traffic entries that cannot be judged are left out with a warning.
pub fn build_usage_records(
    instances: &[DiscoveredInstance],
    traffic: &[InstanceTraffic],
    policy: PackagePolicy,
) -> UsageReport {
    let mut by_id: HashMap<&str, &InstanceTraffic> = HashMap::with_capacity(traffic.len());
    for t in traffic {
        // first entry for an id wins
        by_id.entry(t.provider_id.as_str()).or_insert(t);
    }

    let mut report = UsageReport::default();
    for raw in instances {
        let Some(t) = by_id.get(raw.provider_id.as_str()) else {
            continue;
        };
        match reduce_packages(t, policy) {
            Ok(package) => report.records.push(UsageRecord {
                instance: normalize_instance(raw),
                traffic: package,
            }),
            Err(e) => {
                tracing::warn!("⚠️ data integrity: {}", e);
                report.warnings.push(e);
            }
        }
    }
    report
}
