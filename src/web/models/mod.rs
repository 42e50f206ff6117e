use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub mod alert_models;
pub mod infrastructure_models;
pub mod metrics_models;
pub mod service_models;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

/// Standard `{"data": ..., "meta": ...}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
    pub meta: Meta,
}

impl<T> ApiEnvelope<T> {
    pub fn single(data: T) -> Self {
        Self {
            data,
            meta: Meta {
                timestamp: Utc::now(),
                total: None,
            },
        }
    }
}

impl<T> ApiEnvelope<Vec<T>> {
    pub fn list(data: Vec<T>) -> Self {
        let total = data.len();
        Self {
            data,
            meta: Meta {
                timestamp: Utc::now(),
                total: Some(total),
            },
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`) in partial updates.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
