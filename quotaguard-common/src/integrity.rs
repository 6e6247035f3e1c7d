use thiserror::Error;

/// Reasons a raw traffic record is dropped before decisioning.
/// These never abort a cycle; they are reported as warnings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIntegrityError {
    #[error("instance {instance_id}: traffic package total is 0 (used={used_bytes}), skipping")]
    ZeroTotal { instance_id: String, used_bytes: u64 },

    #[error("instance {instance_id}: provider returned an empty traffic package set, skipping")]
    NoPackage { instance_id: String },

    #[error("instance {instance_id}: traffic package has no {field}, skipping")]
    MissingField {
        instance_id: String,
        field: &'static str,
    },
}

impl DataIntegrityError {
    pub fn instance_id(&self) -> &str {
        match self {
            DataIntegrityError::ZeroTotal { instance_id, .. } => instance_id,
            DataIntegrityError::NoPackage { instance_id } => instance_id,
            DataIntegrityError::MissingField { instance_id, .. } => instance_id,
        }
    }
}
