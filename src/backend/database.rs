//! Direct-database backend.
//!
//! Same contract as the REST API, implemented with plain reads and writes
//! against a [`RegistrationStore`]. Codes are generated here and only
//! logged; delivering them by mail or SMS is someone else's job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use super::{
    ApiErrorBody, FieldViolation, RegistrationReceipt, SignupBackend, SubdomainAvailability,
};
use crate::error::{BackendError, DatabaseError};
use crate::registration::model::{
    OrgUser, Organization, RegisterRequest, VerificationCode, VerificationKind,
};
use crate::store::RegistrationStore;

/// Default number of digits in a generated code.
pub const DEFAULT_CODE_DIGITS: usize = 6;

/// How long a generated code stays usable.
pub const CODE_TTL_MINUTES: i64 = 10;

/// Backend that writes straight to the registration tables.
pub struct DirectDbBackend {
    store: Arc<dyn RegistrationStore>,
    code_digits: usize,
}

impl DirectDbBackend {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            store,
            code_digits: DEFAULT_CODE_DIGITS,
        }
    }

    /// Generate codes of `digits` length instead of the default six.
    pub fn with_code_digits(mut self, digits: usize) -> Self {
        self.code_digits = digits.max(1);
        self
    }

    /// Underlying store, for inspection.
    pub fn store(&self) -> &Arc<dyn RegistrationStore> {
        &self.store
    }

    fn subdomain_taken(subdomain: &str) -> BackendError {
        BackendError::Rejected {
            status: 409,
            body: Some(ApiErrorBody {
                success: false,
                message: "Subdomain is not available".to_string(),
                errors: vec![FieldViolation {
                    field: "subdomain".to_string(),
                    code: "SUBDOMAIN_TAKEN".to_string(),
                    message: format!("{subdomain} is already taken"),
                }],
                error: None,
            }),
        }
    }
}

/// A random numeric code whose first digit is never zero.
pub fn generate_code(digits: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(digits);
    for i in 0..digits {
        let d: u8 = if i == 0 {
            rng.gen_range(1..=9)
        } else {
            rng.gen_range(0..=9)
        };
        code.push(char::from(b'0' + d));
    }
    code
}

#[async_trait]
impl SignupBackend for DirectDbBackend {
    fn name(&self) -> &str {
        "database"
    }

    async fn check_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<SubdomainAvailability, BackendError> {
        let existing = self.store.find_organization_by_subdomain(subdomain).await?;
        Ok(SubdomainAvailability {
            available: existing.is_none(),
            suggestions: Vec::new(),
        })
    }

    async fn request_verification(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<(), BackendError> {
        let now = Utc::now();
        let code = VerificationCode {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            kind,
            code: generate_code(self.code_digits),
            verified: false,
            expires_at: now + chrono::Duration::minutes(CODE_TTL_MINUTES),
            created_at: now,
        };
        self.store.insert_verification_code(&code).await?;
        tracing::debug!(kind = %kind, code = %code.code, "Verification code issued");
        Ok(())
    }

    async fn verify_code(
        &self,
        code: &str,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<bool, BackendError> {
        let Some(row) = self
            .store
            .latest_usable_code(identifier, kind, code, Utc::now())
            .await?
        else {
            tracing::info!(kind = %kind, "Verification code rejected");
            return Ok(false);
        };

        self.store.mark_code_verified(row.id).await?;
        let users = self.store.mark_user_verified(identifier, kind).await?;
        tracing::info!(kind = %kind, users, "Verification code accepted");
        Ok(true)
    }

    async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegistrationReceipt, BackendError> {
        let subdomain = request.subdomain.to_lowercase();
        if self
            .store
            .find_organization_by_subdomain(&subdomain)
            .await?
            .is_some()
        {
            return Err(Self::subdomain_taken(&subdomain));
        }

        let now = Utc::now();
        let org = Organization {
            id: Uuid::new_v4(),
            business_name: request.business_name.clone(),
            subdomain: subdomain.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        match self.store.insert_organization(&org).await {
            Ok(()) => {}
            // Lost a race with another registration for the same subdomain.
            Err(DatabaseError::Constraint(_)) => return Err(Self::subdomain_taken(&subdomain)),
            Err(e) => return Err(e.into()),
        }

        let email = request.email.to_lowercase();
        let user = OrgUser {
            id: Uuid::new_v4(),
            organization_id: org.id,
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            email_verified: self
                .store
                .has_verified_code(&email, VerificationKind::Email)
                .await?
                || self
                    .store
                    .has_verified_code(&request.email, VerificationKind::Email)
                    .await?,
            phone_verified: self
                .store
                .has_verified_code(&request.phone, VerificationKind::Phone)
                .await?,
            email,
            phone: request.phone.clone(),
            is_owner: true,
            created_at: now,
        };
        self.store.insert_org_user(&user).await?;

        tracing::info!(
            organization_id = %org.id,
            user_id = %user.id,
            subdomain = %subdomain,
            "Organization registered"
        );

        Ok(RegistrationReceipt {
            message: "Organization registered".to_string(),
            data: Some(serde_json::json!({
                "organizationId": org.id,
                "userId": user.id,
                "subdomain": subdomain,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlStore;

    async fn backend() -> DirectDbBackend {
        let store = LibSqlStore::new_memory().await.unwrap();
        DirectDbBackend::new(Arc::new(store))
    }

    fn request(subdomain: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: "Sara".to_string(),
            last_name: "Ali".to_string(),
            email: "Sara@Acme.io".to_string(),
            phone: "+966501234567".to_string(),
            business_name: "Acme".to_string(),
            subdomain: subdomain.to_string(),
            plan_id: "free".to_string(),
        }
    }

    #[test]
    fn generated_codes_are_numeric_with_requested_length() {
        for _ in 0..50 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.chars().next(), Some('0'));
        }
        assert_eq!(generate_code(4).len(), 4);
    }

    #[tokio::test]
    async fn request_stores_a_six_digit_code_with_ten_minute_expiry() {
        let backend = backend().await;
        backend
            .request_verification("sara@acme.io", VerificationKind::Email)
            .await
            .unwrap();

        let code = backend
            .store()
            .latest_code("sara@acme.io", VerificationKind::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.code.len(), 6);
        assert!(!code.verified);
        let ttl = code.expires_at - code.created_at;
        assert_eq!(ttl.num_minutes(), CODE_TTL_MINUTES);
    }

    #[tokio::test]
    async fn verify_accepts_the_issued_code_once() {
        let backend = backend().await;
        backend
            .request_verification("+966501234567", VerificationKind::Phone)
            .await
            .unwrap();
        let code = backend
            .store()
            .latest_code("+966501234567", VerificationKind::Phone)
            .await
            .unwrap()
            .unwrap()
            .code;

        assert!(
            !backend
                .verify_code("000000", "+966501234567", VerificationKind::Phone)
                .await
                .unwrap()
        );
        assert!(
            backend
                .verify_code(&code, "+966501234567", VerificationKind::Phone)
                .await
                .unwrap()
        );
        // Already used.
        assert!(
            !backend
                .verify_code(&code, "+966501234567", VerificationKind::Phone)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn register_creates_owner_and_claims_subdomain() {
        let backend = backend().await;
        assert!(backend.check_subdomain("acme").await.unwrap().available);

        backend
            .request_verification("+966501234567", VerificationKind::Phone)
            .await
            .unwrap();
        let code = backend
            .store()
            .latest_code("+966501234567", VerificationKind::Phone)
            .await
            .unwrap()
            .unwrap()
            .code;
        backend
            .verify_code(&code, "+966501234567", VerificationKind::Phone)
            .await
            .unwrap();

        let receipt = backend.register(&request("Acme")).await.unwrap();
        let data = receipt.data.unwrap();
        assert_eq!(data["subdomain"], "acme");

        let user_id: Uuid = serde_json::from_value(data["userId"].clone()).unwrap();
        let user = backend.store().get_org_user(user_id).await.unwrap().unwrap();
        assert!(user.is_owner);
        assert_eq!(user.email, "sara@acme.io");
        assert!(user.phone_verified);
        assert!(!user.email_verified);

        assert!(!backend.check_subdomain("ACME").await.unwrap().available);
    }

    #[tokio::test]
    async fn register_rejects_taken_subdomain_as_field_error() {
        let backend = backend().await;
        backend.register(&request("acme")).await.unwrap();

        let err = backend.register(&request("acme")).await.unwrap_err();
        let body = err.body().unwrap();
        assert!(body.field_errors().contains_key("subdomain"));
    }
}
