//! libSQL store — async `RegistrationStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::registration::model::{Organization, OrgUser, VerificationCode, VerificationKind};
use crate::store::migrations;
use crate::store::traits::RegistrationStore;

/// libSQL database store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    _db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        Ok(store)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            _db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn flag(value: bool) -> i64 {
    i64::from(value)
}

fn query_err(op: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| {
        let message = e.to_string();
        if message.contains("UNIQUE constraint failed") {
            DatabaseError::Constraint(format!("{op}: {message}"))
        } else {
            DatabaseError::Query(format!("{op}: {message}"))
        }
    }
}

/// Map a libsql Row to an Organization.
///
/// Column order matches ORG_COLUMNS.
fn row_to_organization(row: &libsql::Row) -> Result<Organization, libsql::Error> {
    let id: String = row.get(0)?;
    let is_active: i64 = row.get(3)?;
    let created: String = row.get(4)?;
    let updated: String = row.get(5)?;
    Ok(Organization {
        id: parse_uuid(&id),
        business_name: row.get(1)?,
        subdomain: row.get(2)?,
        is_active: is_active != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_user(row: &libsql::Row) -> Result<OrgUser, libsql::Error> {
    let id: String = row.get(0)?;
    let org_id: String = row.get(1)?;
    let email_verified: i64 = row.get(6)?;
    let phone_verified: i64 = row.get(7)?;
    let is_owner: i64 = row.get(8)?;
    let created: String = row.get(9)?;
    Ok(OrgUser {
        id: parse_uuid(&id),
        organization_id: parse_uuid(&org_id),
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        email_verified: email_verified != 0,
        phone_verified: phone_verified != 0,
        is_owner: is_owner != 0,
        created_at: parse_datetime(&created),
    })
}

fn row_to_code(row: &libsql::Row) -> Result<VerificationCode, libsql::Error> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let verified: i64 = row.get(4)?;
    let expires: String = row.get(5)?;
    let created: String = row.get(6)?;
    Ok(VerificationCode {
        id: parse_uuid(&id),
        identifier: row.get(1)?,
        kind: kind.parse().unwrap_or(VerificationKind::Email),
        code: row.get(3)?,
        verified: verified != 0,
        expires_at: parse_datetime(&expires),
        created_at: parse_datetime(&created),
    })
}

const ORG_COLUMNS: &str = "id, business_name, subdomain, is_active, created_at, updated_at";

const USER_COLUMNS: &str = "id, organization_id, first_name, last_name, email, phone, email_verified, phone_verified, is_owner, created_at";

const CODE_COLUMNS: &str = "id, identifier, kind, code, verified, expires_at, created_at";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RegistrationStore for LibSqlStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Organizations ───────────────────────────────────────────────

    async fn find_organization_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Organization>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE subdomain = ?1"),
                params![subdomain.to_lowercase()],
            )
            .await
            .map_err(query_err("find_organization_by_subdomain"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_organization(&row).map_err(query_err("find_organization_by_subdomain"))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(query_err("find_organization_by_subdomain")(e)),
        }
    }

    async fn insert_organization(&self, org: &Organization) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO organizations ({ORG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    org.id.to_string(),
                    org.business_name.clone(),
                    org.subdomain.to_lowercase(),
                    flag(org.is_active),
                    format_datetime(org.created_at),
                    format_datetime(org.updated_at),
                ],
            )
            .await
            .map_err(query_err("insert_organization"))?;
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_org_user(&self, user: &OrgUser) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO org_users ({USER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    user.id.to_string(),
                    user.organization_id.to_string(),
                    user.first_name.clone(),
                    user.last_name.clone(),
                    user.email.clone(),
                    user.phone.clone(),
                    flag(user.email_verified),
                    flag(user.phone_verified),
                    flag(user.is_owner),
                    format_datetime(user.created_at),
                ],
            )
            .await
            .map_err(query_err("insert_org_user"))?;
        Ok(())
    }

    async fn get_org_user(&self, id: Uuid) -> Result<Option<OrgUser>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM org_users WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_org_user"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row).map_err(query_err("get_org_user"))?)),
            Ok(None) => Ok(None),
            Err(e) => Err(query_err("get_org_user")(e)),
        }
    }

    async fn mark_user_verified(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<usize, DatabaseError> {
        let sql = match kind {
            VerificationKind::Email => {
                "UPDATE org_users SET email_verified = 1 WHERE email = ?1"
            }
            VerificationKind::Phone => {
                "UPDATE org_users SET phone_verified = 1 WHERE phone = ?1"
            }
        };
        let count = self
            .conn()
            .execute(sql, params![identifier])
            .await
            .map_err(query_err("mark_user_verified"))?;
        Ok(count as usize)
    }

    // ── Verification codes ──────────────────────────────────────────

    async fn insert_verification_code(
        &self,
        code: &VerificationCode,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO verification_codes ({CODE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    code.id.to_string(),
                    code.identifier.clone(),
                    code.kind.as_str(),
                    code.code.clone(),
                    flag(code.verified),
                    format_datetime(code.expires_at),
                    format_datetime(code.created_at),
                ],
            )
            .await
            .map_err(query_err("insert_verification_code"))?;
        Ok(())
    }

    async fn latest_usable_code(
        &self,
        identifier: &str,
        kind: VerificationKind,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationCode>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CODE_COLUMNS} FROM verification_codes
                     WHERE identifier = ?1 AND kind = ?2 AND code = ?3
                       AND verified = 0 AND expires_at > ?4
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![identifier, kind.as_str(), code, format_datetime(now)],
            )
            .await
            .map_err(query_err("latest_usable_code"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_code(&row).map_err(query_err("latest_usable_code"))?)),
            Ok(None) => Ok(None),
            Err(e) => Err(query_err("latest_usable_code")(e)),
        }
    }

    async fn latest_code(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<Option<VerificationCode>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CODE_COLUMNS} FROM verification_codes
                     WHERE identifier = ?1 AND kind = ?2
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![identifier, kind.as_str()],
            )
            .await
            .map_err(query_err("latest_code"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_code(&row).map_err(query_err("latest_code"))?)),
            Ok(None) => Ok(None),
            Err(e) => Err(query_err("latest_code")(e)),
        }
    }

    async fn mark_code_verified(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE verification_codes SET verified = 1 WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err("mark_code_verified"))?;
        Ok(())
    }

    async fn has_verified_code(
        &self,
        identifier: &str,
        kind: VerificationKind,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM verification_codes
                 WHERE identifier = ?1 AND kind = ?2 AND verified = 1",
                params![identifier, kind.as_str()],
            )
            .await
            .map_err(query_err("has_verified_code"))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(query_err("has_verified_code")(e)),
        }
    }
}
