//! Registration data and the records the backend creates from it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Field name → message. Used for both client-side and server-side errors.
pub type FieldErrors = BTreeMap<String, String>;

/// Which identifier a verification code proves control of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    Email,
    Phone,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }
}

impl std::fmt::Display for VerificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            other => Err(format!("unknown verification kind: {other}")),
        }
    }
}

/// Everything collected by the wizard.
///
/// Filled step by step and submitted once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
    pub business_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub subdomain: String,
}

impl RegistrationData {
    /// Copy every field present in `patch`.
    pub fn merge(&mut self, patch: RegistrationPatch) {
        let RegistrationPatch {
            business_name,
            first_name,
            last_name,
            email,
            phone,
            subdomain,
        } = patch;
        if let Some(v) = business_name {
            self.business_name = v;
        }
        if let Some(v) = first_name {
            self.first_name = v;
        }
        if let Some(v) = last_name {
            self.last_name = v;
        }
        if let Some(v) = email {
            self.email = v;
        }
        if let Some(v) = phone {
            self.phone = v;
        }
        if let Some(v) = subdomain {
            self.subdomain = v;
        }
    }

    /// The identifier a verification step targets.
    pub fn identifier(&self, kind: VerificationKind) -> &str {
        match kind {
            VerificationKind::Email => &self.email,
            VerificationKind::Phone => &self.phone,
        }
    }
}

/// The subset of [`RegistrationData`] a single step produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationPatch {
    pub business_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subdomain: Option<String>,
}

impl RegistrationPatch {
    pub fn business_name(name: impl Into<String>) -> Self {
        Self {
            business_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn user_details(details: UserDetails) -> Self {
        Self {
            first_name: Some(details.first_name),
            last_name: Some(details.last_name),
            email: Some(details.email),
            phone: Some(details.phone),
            ..Default::default()
        }
    }

    pub fn subdomain(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: Some(subdomain.into()),
            ..Default::default()
        }
    }
}

/// The user-details form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// Body of the final registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub business_name: String,
    pub subdomain: String,
    pub plan_id: String,
}

/// Tenant record created at registration completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub business_name: String,
    pub subdomain: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user belonging to an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUser {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub is_owner: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored verification code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: Uuid,
    pub identifier: String,
    pub kind: VerificationKind,
    pub code: String,
    pub verified: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Unverified and not yet expired at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.verified && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_present_fields() {
        let mut data = RegistrationData {
            business_name: "Acme".to_string(),
            ..Default::default()
        };
        data.merge(RegistrationPatch::user_details(UserDetails {
            first_name: "Sara".to_string(),
            last_name: "Ali".to_string(),
            email: "sara@acme.io".to_string(),
            phone: "+966501234567".to_string(),
        }));
        assert_eq!(data.business_name, "Acme");
        assert_eq!(data.email, "sara@acme.io");
        assert!(data.subdomain.is_empty());
    }

    #[test]
    fn register_request_uses_camel_case() {
        let req = RegisterRequest {
            first_name: "Sara".to_string(),
            last_name: "Ali".to_string(),
            email: "sara@acme.io".to_string(),
            phone: "+966501234567".to_string(),
            business_name: "Acme".to_string(),
            subdomain: "acme".to_string(),
            plan_id: "free".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["firstName"], "Sara");
        assert_eq!(json["businessName"], "Acme");
        assert_eq!(json["planId"], "free");
    }

    #[test]
    fn verification_code_usability() {
        let now = Utc::now();
        let mut code = VerificationCode {
            id: Uuid::new_v4(),
            identifier: "sara@acme.io".to_string(),
            kind: VerificationKind::Email,
            code: "123456".to_string(),
            verified: false,
            expires_at: now + chrono::Duration::minutes(10),
            created_at: now,
        };
        assert!(code.is_usable(now));
        assert!(!code.is_usable(now + chrono::Duration::minutes(11)));
        code.verified = true;
        assert!(!code.is_usable(now));
    }
}
