//! Subdomain selection and the debounced availability check.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::validation::{
    FieldError, is_valid_subdomain, sanitize_subdomain_input, suggest_subdomain,
};
use crate::backend::{SignupBackend, SubdomainAvailability};

pub const CHECK_FAILED: &str = "Failed to check availability";

/// What is known about the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Availability {
    Unknown,
    Checking,
    Available,
    Unavailable { suggestions: Vec<String> },
}

/// Why the picker refused to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubdomainRejection {
    #[error("Please enter a subdomain")]
    Empty,
    #[error("{}", FieldError::InvalidSubdomain)]
    Invalid,
    #[error("This subdomain is not available")]
    Unavailable,
    #[error("Availability has not been confirmed yet")]
    NotChecked,
}

/// A check issued for one specific edit of the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTicket {
    pub generation: u64,
    pub value: String,
}

/// A finished availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub ticket: CheckTicket,
    /// The error side carries a display string; transport details are logged
    /// where the check ran.
    pub result: Result<SubdomainAvailability, String>,
}

/// Progress of a debounced check, as seen by whoever renders the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckEvent {
    /// The quiet period ended and the request went out.
    Started(CheckTicket),
    Finished(CheckOutcome),
}

/// State of the subdomain step.
#[derive(Debug, Clone, Serialize)]
pub struct SubdomainPicker {
    value: String,
    availability: Availability,
    error: Option<String>,
    #[serde(skip)]
    generation: u64,
}

impl SubdomainPicker {
    /// Start from `initial` if the user already chose one, otherwise from a
    /// suggestion derived from the business name.
    pub fn new(initial: &str, business_name: &str) -> Self {
        let value = if initial.is_empty() {
            suggest_subdomain(business_name)
        } else {
            sanitize_subdomain_input(initial)
        };
        Self {
            value,
            availability: Availability::Unknown,
            error: None,
            generation: 0,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Show an error that came from somewhere else, e.g. the final
    /// registration call.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Apply a keystroke. Any earlier check result no longer applies.
    pub fn edit(&mut self, raw: &str) {
        self.value = sanitize_subdomain_input(raw);
        self.availability = Availability::Unknown;
        self.error = None;
        self.generation += 1;
    }

    pub fn select_suggestion(&mut self, suggestion: &str) {
        self.edit(suggestion);
    }

    /// A ticket for the current value, leaving the state untouched.
    ///
    /// Returns `None` when the value does not have a valid shape; such values
    /// are never sent.
    pub fn ticket(&self) -> Option<CheckTicket> {
        is_valid_subdomain(&self.value).then(|| CheckTicket {
            generation: self.generation,
            value: self.value.clone(),
        })
    }

    fn is_current(&self, ticket: &CheckTicket) -> bool {
        ticket.generation == self.generation && ticket.value == self.value
    }

    /// Start a check of the current value right away.
    pub fn begin_check(&mut self) -> Option<CheckTicket> {
        let ticket = self.ticket()?;
        self.check_started(&ticket);
        Some(ticket)
    }

    /// The request for `ticket` went out. Ignored once the value has moved on.
    pub fn check_started(&mut self, ticket: &CheckTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.availability = Availability::Checking;
        self.error = None;
        true
    }

    /// Apply an event from the debounced checker.
    pub fn apply(&mut self, event: &CheckEvent) -> bool {
        match event {
            CheckEvent::Started(ticket) => self.check_started(ticket),
            CheckEvent::Finished(outcome) => self.finish_check(outcome),
        }
    }

    /// Record a check result. Returns false, changing nothing, when the value
    /// was edited after the check was issued.
    pub fn finish_check(&mut self, outcome: &CheckOutcome) -> bool {
        if !self.is_current(&outcome.ticket) {
            tracing::debug!(
                value = %outcome.ticket.value,
                "Discarding stale subdomain check"
            );
            return false;
        }
        match &outcome.result {
            Ok(a) if a.available => self.availability = Availability::Available,
            Ok(a) => {
                self.availability = Availability::Unavailable {
                    suggestions: a.suggestions.clone(),
                }
            }
            Err(_) => {
                self.availability = Availability::Unknown;
                self.error = Some(CHECK_FAILED.to_string());
            }
        }
        true
    }

    /// The subdomain to register, if it may be submitted.
    pub fn submit(&mut self) -> Result<String, SubdomainRejection> {
        let rejection = if self.value.is_empty() {
            SubdomainRejection::Empty
        } else if !is_valid_subdomain(&self.value) {
            SubdomainRejection::Invalid
        } else {
            match self.availability {
                Availability::Available => return Ok(self.value.clone()),
                Availability::Unavailable { .. } => SubdomainRejection::Unavailable,
                Availability::Unknown | Availability::Checking => SubdomainRejection::NotChecked,
            }
        };
        self.error = Some(rejection.to_string());
        Err(rejection)
    }
}

/// Run one availability check against the backend.
pub async fn run_check(backend: &dyn SignupBackend, ticket: CheckTicket) -> CheckOutcome {
    let result = match backend.check_subdomain(&ticket.value).await {
        Ok(availability) => Ok(availability),
        Err(e) => {
            tracing::warn!(
                backend = backend.name(),
                subdomain = %ticket.value,
                error = %e,
                "Subdomain check failed"
            );
            Err(CHECK_FAILED.to_string())
        }
    };
    CheckOutcome { ticket, result }
}

/// Background task that checks availability once input has been quiet for
/// the debounce period.
///
/// Only the latest value is ever checked, and only if it has a valid shape.
/// Each check publishes `Started` when its request goes out and `Finished`
/// when it returns.
pub struct DebouncedChecker {
    input: watch::Sender<Option<CheckTicket>>,
    events: watch::Receiver<Option<CheckEvent>>,
    handle: JoinHandle<()>,
}

impl DebouncedChecker {
    pub fn spawn(backend: Arc<dyn SignupBackend>, debounce: Duration) -> Self {
        let (input, mut input_rx) = watch::channel(None::<CheckTicket>);
        let (event_tx, events) = watch::channel(None::<CheckEvent>);

        let handle = tokio::spawn(async move {
            while input_rx.changed().await.is_ok() {
                // Restart the quiet period on every new value.
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(debounce) => break,
                        changed = input_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }

                let Some(ticket) = input_rx.borrow_and_update().clone() else {
                    continue;
                };
                if !is_valid_subdomain(&ticket.value) {
                    continue;
                }

                tracing::debug!(subdomain = %ticket.value, "Debounced subdomain check firing");
                if event_tx
                    .send(Some(CheckEvent::Started(ticket.clone())))
                    .is_err()
                {
                    return;
                }
                let outcome = run_check(backend.as_ref(), ticket).await;
                if event_tx.send(Some(CheckEvent::Finished(outcome))).is_err() {
                    return;
                }
            }
        });

        Self {
            input,
            events,
            handle,
        }
    }

    /// Queue `ticket`, replacing anything not yet checked.
    pub fn push(&self, ticket: CheckTicket) {
        self.input.send_replace(Some(ticket));
    }

    /// Receiver for check progress.
    pub fn events(&self) -> watch::Receiver<Option<CheckEvent>> {
        self.events.clone()
    }
}

impl Drop for DebouncedChecker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
