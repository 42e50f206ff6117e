use serde::Deserialize;
use uuid::Uuid;

use crate::db::enums::ServiceStatus;
use crate::health::url_guard::{UrlValidationError, validate_health_check_url};
use crate::web::models::double_option;

fn default_service_type() -> String {
    "vm".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateService {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type", default = "default_service_type")]
    pub service_type: String,
    pub health_check_url: Option<String>,
    pub vm_id: Option<Uuid>,
    pub namespace: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl CreateService {
    pub fn validate(&self) -> Result<(), UrlValidationError> {
        match &self.health_check_url {
            Some(url) => validate_health_check_url(url),
            None => Ok(()),
        }
    }
}

/// Partial update. Omitted fields are left untouched; nullable fields accept an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateService {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    pub status: Option<ServiceStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub health_check_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub vm_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub namespace: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub metadata: Option<Option<serde_json::Value>>,
}

impl UpdateService {
    pub fn validate(&self) -> Result<(), UrlValidationError> {
        match &self.health_check_url {
            Some(Some(url)) => validate_health_check_url(url),
            _ => Ok(()),
        }
    }
}
