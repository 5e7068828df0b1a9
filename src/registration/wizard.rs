//! RegistrationWizard — step pointer, collected data, and final submission
//! routing.

use serde::Serialize;

use super::model::{
    FieldErrors, RegisterRequest, RegistrationData, RegistrationPatch, VerificationKind,
};
use super::step::{self, RegistrationStep, StepStatus};
use super::validation::strip_whitespace;
use crate::backend::RegistrationReceipt;
use crate::config::SignupConfig;
use crate::error::{BackendError, WizardError};

pub const REGISTRATION_FAILED: &str = "Failed to complete registration. Please try again.";

/// What the final registration call came back with.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Registered(RegistrationReceipt),
    /// The server named specific fields.
    FieldErrors(FieldErrors),
    /// Transport failure, or a rejection without field detail.
    Failed,
}

impl SubmitOutcome {
    pub fn from_result(result: Result<RegistrationReceipt, BackendError>) -> Self {
        match result {
            Ok(receipt) => Self::Registered(receipt),
            Err(e) => match e.body().map(|b| b.field_errors()) {
                Some(errors) if !errors.is_empty() => Self::FieldErrors(errors),
                _ => Self::Failed,
            },
        }
    }
}

/// Unknown fields are assumed to live on the user-details form.
fn owning_step(field: &str) -> RegistrationStep {
    RegistrationStep::owning(field).unwrap_or(RegistrationStep::UserDetails)
}

/// Where the wizard went after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEvent {
    /// Registration succeeded; send the user here.
    Redirect(String),
    /// Sent back to `step` to fix the fields in `errors`.
    Returned {
        step: RegistrationStep,
        errors: FieldErrors,
    },
    /// Stayed put with a generic message.
    Failed(String),
}

/// The top-level sign-up state.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationWizard {
    current: RegistrationStep,
    completed: Vec<RegistrationStep>,
    data: RegistrationData,
    verified_email: Option<String>,
    verified_phone: Option<String>,
    field_errors: FieldErrors,
    loading: bool,
    error: Option<String>,
    redirect_url: Option<String>,
    #[serde(skip)]
    config: SignupConfig,
}

impl RegistrationWizard {
    pub fn new(config: &SignupConfig) -> Self {
        Self {
            current: RegistrationStep::BusinessName,
            completed: Vec::new(),
            data: RegistrationData::default(),
            verified_email: None,
            verified_phone: None,
            field_errors: FieldErrors::new(),
            loading: false,
            error: None,
            redirect_url: None,
            config: config.clone(),
        }
    }

    pub fn current(&self) -> RegistrationStep {
        self.current
    }

    pub fn completed(&self) -> &[RegistrationStep] {
        &self.completed
    }

    pub fn data(&self) -> &RegistrationData {
        &self.data
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    /// Server field errors belonging to `step`'s form.
    pub fn field_errors_for(&self, step: RegistrationStep) -> FieldErrors {
        self.field_errors
            .iter()
            .filter(|(field, _)| owning_step(field) == step)
            .map(|(f, m)| (f.clone(), m.clone()))
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.redirect_url.is_some()
    }

    pub fn progress(&self) -> Vec<(RegistrationStep, StepStatus)> {
        step::progress(self.current, &self.completed)
    }

    fn ensure_on(&self, step: RegistrationStep) -> Result<(), WizardError> {
        if self.is_finished() {
            return Err(WizardError::AlreadyComplete);
        }
        if step != self.current {
            return Err(WizardError::StepMismatch {
                attempted: step,
                current: self.current,
            });
        }
        Ok(())
    }

    fn complete(&mut self, step: RegistrationStep) {
        if !self.completed.contains(&step) {
            self.completed.push(step);
        }
    }

    /// Finish `step` with the data it collected and move on.
    ///
    /// Field errors owned by `step` are dropped since the form was just
    /// resubmitted. Returns the new current step.
    pub fn advance(
        &mut self,
        step: RegistrationStep,
        patch: RegistrationPatch,
    ) -> Result<RegistrationStep, WizardError> {
        self.ensure_on(step)?;

        self.data.merge(patch);
        self.field_errors.retain(|field, _| owning_step(field) != step);
        self.error = None;
        self.complete(step);
        self.current = step.next().unwrap_or(step);

        tracing::info!(from = %step, to = %self.current, "Registration step completed");
        Ok(self.current)
    }

    /// Go to the previous step. Completion marks are kept.
    pub fn go_back(&mut self) -> RegistrationStep {
        if self.loading {
            return self.current;
        }
        if let Some(previous) = self.current.previous() {
            tracing::debug!(from = %self.current, to = %previous, "Registration step back");
            self.current = previous;
        }
        self.current
    }

    fn verified(&self, kind: VerificationKind) -> Option<&str> {
        match kind {
            VerificationKind::Email => self.verified_email.as_deref(),
            VerificationKind::Phone => self.verified_phone.as_deref(),
        }
    }

    /// Whether `kind`'s identifier was already verified this session and is
    /// unchanged, so no code needs to be sent on entry.
    pub fn skip_initial_send(&self, kind: VerificationKind) -> bool {
        let current = self.data.identifier(kind);
        self.verified(kind).is_some_and(|v| match kind {
            VerificationKind::Email => v == current,
            VerificationKind::Phone => strip_whitespace(v) == strip_whitespace(current),
        })
    }

    /// Record a successful verification and advance past its step.
    pub fn mark_verified(
        &mut self,
        kind: VerificationKind,
    ) -> Result<RegistrationStep, WizardError> {
        let step = match kind {
            VerificationKind::Email => RegistrationStep::EmailVerification,
            VerificationKind::Phone => RegistrationStep::PhoneVerification,
        };
        self.ensure_on(step)?;

        let identifier = self.data.identifier(kind).to_string();
        match kind {
            VerificationKind::Email => self.verified_email = Some(identifier),
            VerificationKind::Phone => self.verified_phone = Some(identifier),
        }
        self.advance(step, RegistrationPatch::default())
    }

    /// The registration body for `subdomain`.
    pub fn final_payload(&self, subdomain: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: self.data.first_name.clone(),
            last_name: self.data.last_name.clone(),
            email: self.data.email.clone(),
            phone: strip_whitespace(&self.data.phone),
            business_name: self.data.business_name.clone(),
            subdomain: subdomain.to_string(),
            plan_id: self.config.plan_id.clone(),
        }
    }

    /// Mark the final submission as in flight.
    pub fn begin_submit(&mut self) -> Result<(), WizardError> {
        self.ensure_on(RegistrationStep::Subdomain)?;
        self.loading = true;
        self.error = None;
        Ok(())
    }

    /// Apply the final registration result.
    pub fn apply_outcome(&mut self, subdomain: &str, outcome: SubmitOutcome) -> WizardEvent {
        self.loading = false;
        match outcome {
            SubmitOutcome::Registered(_) => {
                self.data.subdomain = subdomain.to_string();
                self.complete(RegistrationStep::Subdomain);
                let url = self.config.workspace_url(subdomain);
                self.redirect_url = Some(url.clone());
                tracing::info!(subdomain = %subdomain, "Registration complete");
                WizardEvent::Redirect(url)
            }
            SubmitOutcome::FieldErrors(errors) => {
                let target = errors
                    .keys()
                    .map(|f| owning_step(f))
                    .min_by_key(RegistrationStep::index)
                    .unwrap_or(RegistrationStep::UserDetails);
                tracing::info!(
                    step = %target,
                    fields = ?errors.keys().collect::<Vec<_>>(),
                    "Registration rejected with field errors"
                );
                self.field_errors = errors.clone();
                self.current = target;
                WizardEvent::Returned {
                    step: target,
                    errors,
                }
            }
            SubmitOutcome::Failed => {
                self.error = Some(REGISTRATION_FAILED.to_string());
                WizardEvent::Failed(REGISTRATION_FAILED.to_string())
            }
        }
    }
}
