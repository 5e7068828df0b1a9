//! `RegistrationStore` trait — the relational operations the direct-database
//! backend needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::registration::model::{Organization, OrgUser, VerificationCode, VerificationKind};

/// Backend-agnostic store for organizations, their users, and verification
/// codes.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Organizations ───────────────────────────────────────────────

    /// Look up an organization by (lowercased) subdomain.
    async fn find_organization_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Organization>, DatabaseError>;

    /// Insert an organization. A taken subdomain is a `Constraint` error.
    async fn insert_organization(&self, org: &Organization) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_org_user(&self, user: &OrgUser) -> Result<(), DatabaseError>;

    async fn get_org_user(&self, id: Uuid) -> Result<Option<OrgUser>, DatabaseError>;

    /// Set `email_verified` or `phone_verified` on every user with this
    /// identifier. Returns the number of users updated.
    async fn mark_user_verified(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<usize, DatabaseError>;

    // ── Verification codes ──────────────────────────────────────────

    async fn insert_verification_code(&self, code: &VerificationCode)
        -> Result<(), DatabaseError>;

    /// The most recently created unverified, unexpired row matching
    /// identifier, kind and code.
    async fn latest_usable_code(
        &self,
        identifier: &str,
        kind: VerificationKind,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationCode>, DatabaseError>;

    /// The most recently created row for identifier and kind, in any state.
    async fn latest_code(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<Option<VerificationCode>, DatabaseError>;

    async fn mark_code_verified(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Whether any code for identifier and kind has been verified.
    async fn has_verified_code(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<bool, DatabaseError>;
}
