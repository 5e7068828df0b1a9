//! Octobots REST API client.
//!
//! Stateless: every call is one request/response pair with a JSON body.
//! Non-2xx responses come back as [`BackendError::Rejected`] carrying the
//! parsed body so callers can pull out field errors or a rate-limit message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{ApiErrorBody, RegistrationReceipt, SignupBackend, SubdomainAvailability};
use crate::error::BackendError;
use crate::registration::model::{RegisterRequest, VerificationKind};

/// Common response envelope: `{ success, message, data }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// A parsed 2xx response plus the raw text, kept for building a rejection
/// when `success` is false.
struct Reply<T> {
    status: StatusCode,
    envelope: Envelope<T>,
    raw: String,
}

impl<T> Reply<T> {
    fn rejection(&self) -> BackendError {
        let body = serde_json::from_str::<ApiErrorBody>(&self.raw)
            .unwrap_or_else(|_| ApiErrorBody {
                message: self.envelope.message.clone(),
                ..Default::default()
            });
        BackendError::Rejected {
            status: self.status.as_u16(),
            body: Some(body),
        }
    }
}

/// Client for the four sign-up endpoints.
pub struct OctobotsApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl OctobotsApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Reply<T>, BackendError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(endpoint, error = %e, "Request failed before a response");
            BackendError::Transport(e.to_string())
        })?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            tracing::warn!(endpoint, status = status.as_u16(), "Request rejected");
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body: serde_json::from_str(&raw).ok(),
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&raw).map_err(|e| {
            tracing::warn!(endpoint, error = %e, "Unparseable response body");
            BackendError::Transport(format!("Invalid response from {endpoint}: {e}"))
        })?;

        Ok(Reply {
            status,
            envelope,
            raw,
        })
    }
}

#[async_trait]
impl SignupBackend for OctobotsApiClient {
    fn name(&self) -> &str {
        "api"
    }

    async fn check_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<SubdomainAvailability, BackendError> {
        let request = self
            .client
            .get(self.url("/v2/subdomain/check"))
            .query(&[("subdomain", subdomain)]);
        let reply: Reply<SubdomainAvailability> = self.send("subdomain/check", request).await?;
        reply.envelope.data.ok_or_else(|| {
            BackendError::Transport("subdomain/check response has no data".to_string())
        })
    }

    async fn request_verification(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<(), BackendError> {
        let mut body = serde_json::Map::new();
        body.insert(kind.as_str().to_string(), identifier.into());
        body.insert("type".to_string(), kind.as_str().into());
        let request = self
            .client
            .post(self.url("/v2/verification/request"))
            .json(&body);
        let reply: Reply<serde_json::Value> = self.send("verification/request", request).await?;
        if !reply.envelope.success {
            return Err(reply.rejection());
        }
        tracing::info!(kind = %kind, "Verification code requested");
        Ok(())
    }

    async fn verify_code(
        &self,
        code: &str,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<bool, BackendError> {
        let body = serde_json::json!({
            "code": code,
            "identifier": identifier,
            "type": kind,
        });
        let request = self
            .client
            .post(self.url("/v2/verification/verify"))
            .json(&body);
        let reply: Reply<serde_json::Value> = self.send("verification/verify", request).await?;
        Ok(reply.envelope.success)
    }

    async fn register(
        &self,
        registration: &RegisterRequest,
    ) -> Result<RegistrationReceipt, BackendError> {
        let request = self
            .client
            .post(self.url("/v2/organizations/register"))
            .json(registration);
        let reply: Reply<serde_json::Value> =
            self.send("organizations/register", request).await?;
        if !reply.envelope.success {
            return Err(reply.rejection());
        }
        tracing::info!(subdomain = %registration.subdomain, "Organization registered");
        Ok(RegistrationReceipt {
            message: reply.envelope.message,
            data: reply.envelope.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = OctobotsApiClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("/v2/subdomain/check"),
            "http://localhost:8080/v2/subdomain/check"
        );
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let env: Envelope<SubdomainAvailability> =
            serde_json::from_str(r#"{"success":true,"data":{"available":false,"suggestions":["acme-1"]}}"#)
                .unwrap();
        assert!(env.success);
        assert!(env.message.is_empty());
        assert_eq!(env.data.unwrap().suggestions, vec!["acme-1".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_failure() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let client = OctobotsApiClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.check_subdomain("acme").await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
        assert!(err.body().is_none());
    }
}
