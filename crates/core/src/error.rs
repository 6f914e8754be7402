use crate::types::DbId;

/// Domain error taxonomy shared by every layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed record{}: {reason}", raw_id.map(|id| format!(" (raw id {id})")).unwrap_or_default())]
    MalformedRecord { raw_id: Option<DbId>, reason: String },

    #[error("Insufficient data for {scope}: {available} records, need {required}")]
    InsufficientData {
        scope: String,
        available: usize,
        required: usize,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("No model available: {0}")]
    ModelUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether a retry at the I/O boundary may succeed.
    ///
    /// Only storage failures are transient; validation errors are surfaced
    /// to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_record_message_includes_raw_id() {
        let err = CoreError::MalformedRecord {
            raw_id: Some(7),
            reason: "missing timestamp".into(),
        };
        assert_eq!(err.to_string(), "Malformed record (raw id 7): missing timestamp");
    }

    #[test]
    fn malformed_record_message_without_raw_id() {
        let err = CoreError::MalformedRecord {
            raw_id: None,
            reason: "missing garage".into(),
        };
        assert_eq!(err.to_string(), "Malformed record: missing garage");
    }

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(CoreError::StorageUnavailable("down".into()).is_retryable());
        assert!(!CoreError::InvalidInput("bad".into()).is_retryable());
        assert!(!CoreError::NotFound {
            entity: "Garage",
            key: "x".into()
        }
        .is_retryable());
    }
}
