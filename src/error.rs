//! Error types for the sign-up flow.

use crate::backend::ApiErrorBody;
use crate::registration::step::RegistrationStep;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors surfaced by a [`SignupBackend`](crate::backend::SignupBackend).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    ///
    /// `body` is `None` when the response could not be parsed.
    #[error("Request rejected with status {status}")]
    Rejected {
        status: u16,
        body: Option<ApiErrorBody>,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl BackendError {
    /// The parsed error body, if the backend sent one.
    pub fn body(&self) -> Option<&ApiErrorBody> {
        match self {
            Self::Rejected { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Misuse of the wizard state machine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("Step {attempted} submitted while the wizard is on {current}")]
    StepMismatch {
        attempted: RegistrationStep,
        current: RegistrationStep,
    },

    #[error("Registration is already complete")]
    AlreadyComplete,

    #[error("No verification in progress")]
    NoVerification,
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
