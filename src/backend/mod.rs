//! Backends for the sign-up flow.
//!
//! Two implementations satisfy the same contract:
//! - **api**: the Octobots REST API over reqwest
//! - **database**: direct reads and writes against a libSQL store
//!
//! The wizard only ever talks to `dyn SignupBackend`; which one it gets is
//! decided by [`SignupConfig::backend`](crate::config::SignupConfig).

pub mod api;
pub mod database;

pub use api::OctobotsApiClient;
pub use database::DirectDbBackend;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendKind, SignupConfig};
use crate::error::{BackendError, Error};
use crate::registration::model::{FieldErrors, RegisterRequest, VerificationKind};
use crate::store::LibSqlStore;

/// Error code the API uses when verification attempts are throttled.
pub const RATE_LIMIT_CODE: &str = "RATE_LIMIT_EXCEEDED";

/// Result of a subdomain availability check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainAvailability {
    pub available: bool,
    /// Alternatives offered when the subdomain is taken.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Successful registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One field-level validation failure reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    #[serde(default)]
    pub code: String,
    pub message: String,
}

/// Structured error detail, e.g. rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Body of a failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<FieldViolation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorDetail>,
}

impl ApiErrorBody {
    /// The server's message when the failure is a rate limit.
    pub fn rate_limit_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|e| e.code == RATE_LIMIT_CODE)
            .map(|e| e.message.as_str())
    }

    /// Field violations keyed by field name. Later entries win.
    pub fn field_errors(&self) -> FieldErrors {
        self.errors
            .iter()
            .map(|e| (e.field.clone(), e.message.clone()))
            .collect()
    }
}

/// The capability set every sign-up backend provides.
#[async_trait]
pub trait SignupBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether `subdomain` can still be claimed.
    async fn check_subdomain(&self, subdomain: &str)
        -> Result<SubdomainAvailability, BackendError>;

    /// Send a fresh code to `identifier`.
    async fn request_verification(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<(), BackendError>;

    /// Check a code. `Ok(false)` means wrong or expired.
    async fn verify_code(
        &self,
        code: &str,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<bool, BackendError>;

    /// Create the organization and its owner.
    async fn register(&self, request: &RegisterRequest)
        -> Result<RegistrationReceipt, BackendError>;
}

/// Create the backend selected by `config`.
pub async fn create_backend(config: &SignupConfig) -> Result<Arc<dyn SignupBackend>, Error> {
    match config.backend {
        BackendKind::Api => {
            let client = OctobotsApiClient::new(&config.api_base_url, config.http_timeout)?;
            tracing::info!(base_url = %config.api_base_url, "Using REST API backend");
            Ok(Arc::new(client))
        }
        BackendKind::Database => {
            let store = LibSqlStore::new_local(&config.db_path).await?;
            tracing::info!(path = %config.db_path.display(), "Using direct database backend");
            Ok(Arc::new(
                DirectDbBackend::new(Arc::new(store)).with_code_digits(config.code_length),
            ))
        }
    }
}
