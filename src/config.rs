//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default REST API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.staging.karzoun.chat";

/// Domain under which a registered workspace is hosted.
pub const DEFAULT_REDIRECT_DOMAIN: &str = "staging.karzoun.chat";

/// Which implementation of the backend contract to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The Octobots REST API.
    Api,
    /// Direct reads and writes against the relational store.
    Database,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" | "rest" => Ok(Self::Api),
            "database" | "db" => Ok(Self::Database),
            other => Err(ConfigError::InvalidValue {
                key: "SIGNUP_BACKEND".to_string(),
                message: format!("expected `api` or `database`, got `{other}`"),
            }),
        }
    }
}

/// Sign-up flow configuration.
#[derive(Debug, Clone)]
pub struct SignupConfig {
    pub backend: BackendKind,
    pub api_base_url: String,
    pub db_path: PathBuf,
    /// Workspaces live at `https://{subdomain}.{redirect_domain}`.
    pub redirect_domain: String,
    /// Plan attached to every registration.
    pub plan_id: String,
    /// Number of code-entry cells.
    pub code_length: usize,
    pub resend_cooldown_secs: u32,
    /// Quiet period before a subdomain availability check fires.
    pub debounce: Duration,
    /// Pause between a successful verification and the next step.
    pub success_delay: Duration,
    pub http_timeout: Duration,
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Api,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            db_path: PathBuf::from("./data/signup.db"),
            redirect_domain: DEFAULT_REDIRECT_DOMAIN.to_string(),
            plan_id: "free".to_string(),
            code_length: 4,
            resend_cooldown_secs: 60,
            debounce: Duration::from_millis(500),
            success_delay: Duration::from_millis(500),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl SignupConfig {
    /// Build config from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup("SIGNUP_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };

        let api_base_url = lookup("SIGNUP_API_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);

        let db_path = lookup("SIGNUP_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let redirect_domain =
            lookup("SIGNUP_REDIRECT_DOMAIN").unwrap_or(defaults.redirect_domain);
        let plan_id = lookup("SIGNUP_PLAN_ID").unwrap_or(defaults.plan_id);

        let code_length: usize = parse_number(&lookup, "SIGNUP_CODE_LENGTH")?
            .unwrap_or(defaults.code_length);
        if !(1..=10).contains(&code_length) {
            return Err(ConfigError::InvalidValue {
                key: "SIGNUP_CODE_LENGTH".to_string(),
                message: format!("must be between 1 and 10, got {code_length}"),
            });
        }

        let resend_cooldown_secs = parse_number(&lookup, "SIGNUP_RESEND_COOLDOWN_SECS")?
            .unwrap_or(defaults.resend_cooldown_secs);

        let debounce = parse_number(&lookup, "SIGNUP_DEBOUNCE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.debounce);

        let success_delay = parse_number(&lookup, "SIGNUP_SUCCESS_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.success_delay);

        let http_timeout = parse_number(&lookup, "SIGNUP_HTTP_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        Ok(Self {
            backend,
            api_base_url,
            db_path,
            redirect_domain,
            plan_id,
            code_length,
            resend_cooldown_secs,
            debounce,
            success_delay,
            http_timeout,
        })
    }

    /// The URL the user lands on once registration succeeds.
    pub fn workspace_url(&self, subdomain: &str) -> String {
        format!("https://{subdomain}.{}", self.redirect_domain)
    }
}

fn parse_number<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = SignupConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.backend, BackendKind::Api);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.code_length, 4);
        assert_eq!(config.resend_cooldown_secs, 60);
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.plan_id, "free");
    }

    #[test]
    fn overrides_are_applied() {
        let config = SignupConfig::from_lookup(lookup_from(&[
            ("SIGNUP_BACKEND", "database"),
            ("SIGNUP_API_BASE_URL", "http://localhost:9000/"),
            ("SIGNUP_CODE_LENGTH", "6"),
            ("SIGNUP_DEBOUNCE_MS", "20"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Database);
        assert_eq!(config.api_base_url, "http://localhost:9000");
        assert_eq!(config.code_length, 6);
        assert_eq!(config.debounce, Duration::from_millis(20));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = SignupConfig::from_lookup(lookup_from(&[("SIGNUP_BACKEND", "carrier-pigeon")]))
            .unwrap_err();
        assert!(err.to_string().contains("SIGNUP_BACKEND"));

        let err = SignupConfig::from_lookup(lookup_from(&[("SIGNUP_DEBOUNCE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("SIGNUP_DEBOUNCE_MS"));

        assert!(SignupConfig::from_lookup(lookup_from(&[("SIGNUP_CODE_LENGTH", "0")])).is_err());
    }

    #[test]
    fn workspace_url_uses_redirect_domain() {
        let config = SignupConfig::default();
        assert_eq!(
            config.workspace_url("acme"),
            "https://acme.staging.karzoun.chat"
        );
    }
}
