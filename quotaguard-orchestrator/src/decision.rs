use quotaguard_common::{InstanceState, NoticeAction, NoticeEntry, UsageRecord};
use serde::Serialize;
use std::collections::HashSet;

/// Output of one decision pass. `start_ids` and `stop_ids` never overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Decision {
    pub start_ids: Vec<String>,
    pub stop_ids: Vec<String>,
    pub notices: Vec<NoticeEntry>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.start_ids.is_empty() && self.stop_ids.is_empty()
    }
}

/// Applies the quota threshold to each record, in input order:
///
/// - below threshold and STOPPED: start
/// - at or above threshold and RUNNING: stop
/// - anything else: no action
///
/// State is read fresh every cycle, so an instance already in the state its usage
/// implies is never re-notified.
pub fn decide(records: &[UsageRecord], threshold: f64) -> Decision {
    let mut decision = Decision::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for record in records {
        if !seen.insert(record.instance_id()) {
            continue;
        }
        let ratio = record.usage_ratio();
        let action = match record.instance.state {
            InstanceState::Stopped if ratio < threshold => NoticeAction::Start,
            InstanceState::Running if ratio >= threshold => NoticeAction::Stop,
            _ => continue,
        };
        match action {
            NoticeAction::Start => decision.start_ids.push(record.instance.id.clone()),
            NoticeAction::Stop => decision.stop_ids.push(record.instance.id.clone()),
        }
        decision.notices.push(NoticeEntry::from_record(record, action));
    }

    decision
}
