//! RegistrationManager — drives the wizard against a backend.
//!
//! Owns the wizard, the active verification flow and the subdomain picker,
//! each behind its own `RwLock`. Every network call the sign-up flow makes
//! goes through here. When more than one lock is needed they are taken one at
//! a time, never nested.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::model::{FieldErrors, RegistrationPatch, UserDetails, VerificationKind};
use super::step::{RegistrationStep, progress_percent};
use super::subdomain::{
    Availability, DebouncedChecker, SubdomainPicker, SubdomainRejection, run_check,
};
use super::validation::{validate_business_name, validate_user_details};
use super::verification::{SendKind, VerificationFlow, VerificationPhase, VerifyFailure};
use super::wizard::{RegistrationWizard, SubmitOutcome, WizardEvent};
use crate::backend::SignupBackend;
use crate::config::SignupConfig;
use crate::error::{Error, Result, WizardError};

/// Reply to a form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepReply {
    /// Moved on to this step.
    Advanced(RegistrationStep),
    /// Client-side validation failed; nothing was sent.
    Invalid(FieldErrors),
}

/// Reply to code entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyReply {
    /// No full code yet, or a check is already running.
    Pending,
    /// Code accepted; the wizard moved on to this step.
    Verified(RegistrationStep),
    /// Code refused, with the message shown to the user.
    Rejected(String),
}

/// Reply to the final subdomain submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubdomainReply {
    /// Refused locally; nothing was sent.
    Rejected(SubdomainRejection),
    /// The registration call ran.
    Submitted(WizardEvent),
}

/// Snapshot of everything a front end needs to render.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStatus {
    pub wizard: RegistrationWizard,
    pub progress_percent: u8,
    pub verification: Option<VerificationFlow>,
    pub subdomain: Option<SubdomainPicker>,
}

/// Debounced checker plus the task that feeds its results into the picker.
struct CheckerTask {
    checker: DebouncedChecker,
    forwarder: JoinHandle<()>,
}

impl CheckerTask {
    fn spawn(
        backend: Arc<dyn SignupBackend>,
        debounce: Duration,
        picker: Arc<RwLock<Option<SubdomainPicker>>>,
    ) -> Self {
        let checker = DebouncedChecker::spawn(backend, debounce);
        let mut events = checker.events();
        let forwarder = tokio::spawn(async move {
            while events.changed().await.is_ok() {
                let event = events.borrow_and_update().clone();
                if let (Some(event), Some(picker)) = (event, picker.write().await.as_mut()) {
                    picker.apply(&event);
                }
            }
        });
        Self { checker, forwarder }
    }
}

impl Drop for CheckerTask {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

fn verification_kind(step: RegistrationStep) -> Option<VerificationKind> {
    match step {
        RegistrationStep::EmailVerification => Some(VerificationKind::Email),
        RegistrationStep::PhoneVerification => Some(VerificationKind::Phone),
        _ => None,
    }
}

/// Coordinates the sign-up flow.
pub struct RegistrationManager {
    backend: Arc<dyn SignupBackend>,
    config: SignupConfig,
    wizard: Arc<RwLock<RegistrationWizard>>,
    verification: Arc<RwLock<Option<VerificationFlow>>>,
    subdomain: Arc<RwLock<Option<SubdomainPicker>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    checker: Mutex<Option<CheckerTask>>,
}

impl RegistrationManager {
    pub fn new(backend: Arc<dyn SignupBackend>, config: SignupConfig) -> Self {
        let wizard = RegistrationWizard::new(&config);
        Self {
            backend,
            config,
            wizard: Arc::new(RwLock::new(wizard)),
            verification: Arc::new(RwLock::new(None)),
            subdomain: Arc::new(RwLock::new(None)),
            ticker: Mutex::new(None),
            checker: Mutex::new(None),
        }
    }

    pub async fn current_step(&self) -> RegistrationStep {
        self.wizard.read().await.current()
    }

    pub async fn status(&self) -> RegistrationStatus {
        let wizard = self.wizard.read().await.clone();
        let verification = self.verification.read().await.clone();
        let subdomain = self.subdomain.read().await.clone();
        RegistrationStatus {
            progress_percent: progress_percent(wizard.current()),
            wizard,
            verification,
            subdomain,
        }
    }

    async fn step_mismatch(&self, attempted: RegistrationStep) -> Error {
        WizardError::StepMismatch {
            attempted,
            current: self.current_step().await,
        }
        .into()
    }

    // ── Forms ───────────────────────────────────────────────────────

    pub async fn submit_business_name(&self, name: &str) -> Result<StepReply> {
        let name = match validate_business_name(name) {
            Ok(name) => name,
            Err(e) => {
                return Ok(StepReply::Invalid(FieldErrors::from([(
                    "businessName".to_string(),
                    e.to_string(),
                )])));
            }
        };
        let next = self
            .wizard
            .write()
            .await
            .advance(RegistrationStep::BusinessName, RegistrationPatch::business_name(name))?;
        self.enter_step(next).await?;
        Ok(StepReply::Advanced(next))
    }

    pub async fn submit_user_details(&self, details: &UserDetails) -> Result<StepReply> {
        let details = match validate_user_details(details) {
            Ok(details) => details,
            Err(errors) => return Ok(StepReply::Invalid(errors)),
        };
        let next = self.wizard.write().await.advance(
            RegistrationStep::UserDetails,
            RegistrationPatch::user_details(details),
        )?;
        self.enter_step(next).await?;
        Ok(StepReply::Advanced(next))
    }

    /// Go back one step and set that step up again.
    pub async fn go_back(&self) -> Result<RegistrationStep> {
        let (before, after) = {
            let mut wizard = self.wizard.write().await;
            let before = wizard.current();
            (before, wizard.go_back())
        };
        if before != after {
            self.enter_step(after).await?;
        }
        Ok(after)
    }

    async fn enter_step(&self, step: RegistrationStep) -> Result<()> {
        match step {
            RegistrationStep::EmailVerification | RegistrationStep::PhoneVerification => {
                self.clear_subdomain().await;
                self.enter_verification().await
            }
            RegistrationStep::Subdomain => {
                self.clear_verification().await;
                self.enter_subdomain().await;
                Ok(())
            }
            RegistrationStep::BusinessName | RegistrationStep::UserDetails => {
                self.clear_verification().await;
                self.clear_subdomain().await;
                Ok(())
            }
        }
    }

    // ── Verification ────────────────────────────────────────────────

    /// Start a fresh verification flow for the current step.
    ///
    /// A code is sent right away unless this identifier was already verified
    /// earlier in the session.
    pub async fn enter_verification(&self) -> Result<()> {
        let (kind, identifier, skip) = {
            let wizard = self.wizard.read().await;
            let kind = verification_kind(wizard.current()).ok_or(WizardError::NoVerification)?;
            (
                kind,
                wizard.data().identifier(kind).to_string(),
                wizard.skip_initial_send(kind),
            )
        };

        let mut flow = VerificationFlow::new(
            kind,
            &identifier,
            self.config.code_length,
            self.config.resend_cooldown_secs,
        );
        let send = flow.needs_initial_send(skip);
        *self.verification.write().await = Some(flow);
        tracing::info!(kind = %kind, skip_send = skip, "Verification started");

        self.spawn_cooldown_ticker().await;
        if send {
            self.send_code(SendKind::Initial).await?;
        }
        Ok(())
    }

    async fn clear_verification(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.abort();
        }
        self.verification.write().await.take();
    }

    async fn send_code(&self, send: SendKind) -> Result<bool> {
        let (kind, identifier) = {
            let mut guard = self.verification.write().await;
            let flow = guard.as_mut().ok_or(WizardError::NoVerification)?;
            flow.begin_send();
            (flow.kind(), flow.identifier().to_string())
        };

        let result = self.backend.request_verification(&identifier, kind).await;

        let mut guard = self.verification.write().await;
        // The user may have navigated away while the request was in flight.
        let Some(flow) = guard
            .as_mut()
            .filter(|f| f.kind() == kind && f.identifier() == identifier)
        else {
            return Ok(false);
        };

        match result {
            Ok(()) => {
                flow.send_succeeded(send);
                drop(guard);
                let resend = send == SendKind::Resend;
                tracing::info!(kind = %kind, resend, "Verification code sent");
                if resend {
                    self.spawn_cooldown_ticker().await;
                }
                Ok(true)
            }
            Err(e) => {
                flow.send_failed(send);
                tracing::warn!(
                    backend = self.backend.name(),
                    kind = %kind,
                    error = %e,
                    "Failed to send verification code"
                );
                Ok(false)
            }
        }
    }

    /// Send a new code if the cooldown has run out. Returns whether a code
    /// went out.
    pub async fn resend_code(&self) -> Result<bool> {
        let allowed = self
            .verification
            .read()
            .await
            .as_ref()
            .ok_or(WizardError::NoVerification)?
            .can_resend();
        if !allowed {
            return Ok(false);
        }
        self.send_code(SendKind::Resend).await
    }

    /// One second of resend cooldown elapsed. Returns the remaining seconds.
    pub async fn tick_cooldown(&self) -> Option<u32> {
        self.verification.write().await.as_mut().map(VerificationFlow::tick)
    }

    /// Tick the cooldown once per second until it reaches zero. Replaces any
    /// ticker already running.
    pub async fn spawn_cooldown_ticker(&self) {
        let verification = Arc::clone(&self.verification);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut guard = verification.write().await;
                let Some(flow) = guard.as_mut() else {
                    break;
                };
                if flow.tick() == 0 {
                    break;
                }
            }
        });
        if let Some(previous) = self.ticker.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Type into one code cell. A completed code is verified right away.
    pub async fn input_digit(&self, index: usize, text: &str) -> Result<VerifyReply> {
        let code = self
            .verification
            .write()
            .await
            .as_mut()
            .ok_or(WizardError::NoVerification)?
            .input(index, text);
        match code {
            Some(code) => self.verify(code).await,
            None => Ok(VerifyReply::Pending),
        }
    }

    pub async fn backspace(&self, index: usize) -> Result<()> {
        self.verification
            .write()
            .await
            .as_mut()
            .ok_or(WizardError::NoVerification)?
            .backspace(index);
        Ok(())
    }

    /// Paste into the code field. A completed code is verified right away.
    pub async fn paste_code(&self, text: &str) -> Result<VerifyReply> {
        let code = self
            .verification
            .write()
            .await
            .as_mut()
            .ok_or(WizardError::NoVerification)?
            .paste(text);
        match code {
            Some(code) => self.verify(code).await,
            None => Ok(VerifyReply::Pending),
        }
    }

    /// Verify whatever is in the cells now.
    pub async fn submit_code(&self) -> Result<VerifyReply> {
        let code = {
            let guard = self.verification.read().await;
            let flow = guard.as_ref().ok_or(WizardError::NoVerification)?;
            match flow.phase() {
                VerificationPhase::Verifying | VerificationPhase::Success => None,
                _ => flow.code(),
            }
        };
        match code {
            Some(code) => self.verify(code).await,
            None => Ok(VerifyReply::Pending),
        }
    }

    async fn verify(&self, code: String) -> Result<VerifyReply> {
        let (kind, identifier) = {
            let mut guard = self.verification.write().await;
            let flow = guard.as_mut().ok_or(WizardError::NoVerification)?;
            flow.begin_verify();
            (flow.kind(), flow.identifier().to_string())
        };

        let failure = match self.backend.verify_code(&code, &identifier, kind).await {
            Ok(true) => None,
            Ok(false) => Some(VerifyFailure::Invalid),
            Err(e) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    kind = %kind,
                    error = %e,
                    "Verification request failed"
                );
                Some(VerifyFailure::from_error(&e))
            }
        };

        if let Some(failure) = failure {
            let message = failure.message().to_string();
            tracing::info!(kind = %kind, "Verification code refused");
            if let Some(flow) = self.verification.write().await.as_mut() {
                flow.verify_failed(failure);
            }
            return Ok(VerifyReply::Rejected(message));
        }

        if let Some(flow) = self.verification.write().await.as_mut() {
            flow.verify_succeeded();
        }
        tracing::info!(kind = %kind, "Verification succeeded");

        tokio::time::sleep(self.config.success_delay).await;

        let next = self.wizard.write().await.mark_verified(kind)?;
        self.enter_step(next).await?;
        Ok(VerifyReply::Verified(next))
    }

    // ── Subdomain ───────────────────────────────────────────────────

    async fn enter_subdomain(&self) {
        let picker = {
            let wizard = self.wizard.read().await;
            SubdomainPicker::new(&wizard.data().subdomain, &wizard.data().business_name)
        };
        tracing::debug!(suggested = %picker.value(), "Subdomain step entered");
        *self.subdomain.write().await = Some(picker);
        self.queue_check().await;
    }

    async fn clear_subdomain(&self) {
        self.checker.lock().await.take();
        self.subdomain.write().await.take();
    }

    async fn queue_check(&self) {
        let ticket = self
            .subdomain
            .read()
            .await
            .as_ref()
            .and_then(SubdomainPicker::ticket);
        let Some(ticket) = ticket else {
            return;
        };

        let mut checker = self.checker.lock().await;
        let task = checker.get_or_insert_with(|| {
            CheckerTask::spawn(
                Arc::clone(&self.backend),
                self.config.debounce,
                Arc::clone(&self.subdomain),
            )
        });
        task.checker.push(ticket);
    }

    /// Apply a keystroke and schedule a debounced availability check.
    pub async fn edit_subdomain(&self, raw: &str) -> Result<()> {
        let edited = {
            let mut guard = self.subdomain.write().await;
            if let Some(picker) = guard.as_mut() {
                picker.edit(raw);
            }
            guard.is_some()
        };
        if !edited {
            return Err(self.step_mismatch(RegistrationStep::Subdomain).await);
        }
        self.queue_check().await;
        Ok(())
    }

    /// Check the current value now, skipping the debounce.
    pub async fn check_subdomain(&self) -> Result<Availability> {
        let ticket = self
            .subdomain
            .write()
            .await
            .as_mut()
            .map(SubdomainPicker::begin_check);
        let Some(ticket) = ticket else {
            return Err(self.step_mismatch(RegistrationStep::Subdomain).await);
        };
        let Some(ticket) = ticket else {
            return Ok(Availability::Unknown);
        };

        let outcome = run_check(self.backend.as_ref(), ticket).await;

        let mut guard = self.subdomain.write().await;
        let Some(picker) = guard.as_mut() else {
            return Ok(Availability::Unknown);
        };
        picker.finish_check(&outcome);
        Ok(picker.availability().clone())
    }

    /// Register the organization with the chosen subdomain.
    pub async fn submit_subdomain(&self) -> Result<SubdomainReply> {
        let submitted = self
            .subdomain
            .write()
            .await
            .as_mut()
            .map(SubdomainPicker::submit);
        let Some(submitted) = submitted else {
            return Err(self.step_mismatch(RegistrationStep::Subdomain).await);
        };
        let subdomain = match submitted {
            Ok(subdomain) => subdomain,
            Err(rejection) => return Ok(SubdomainReply::Rejected(rejection)),
        };

        let payload = {
            let mut wizard = self.wizard.write().await;
            wizard.begin_submit()?;
            wizard.final_payload(&subdomain)
        };

        tracing::info!(
            backend = self.backend.name(),
            subdomain = %subdomain,
            "Submitting registration"
        );
        let result = self.backend.register(&payload).await;
        if let Err(e) = &result {
            tracing::warn!(
                backend = self.backend.name(),
                subdomain = %subdomain,
                error = %e,
                "Registration request failed"
            );
        }

        let event = self
            .wizard
            .write()
            .await
            .apply_outcome(&subdomain, SubmitOutcome::from_result(result));

        match &event {
            WizardEvent::Redirect(_) => self.clear_subdomain().await,
            WizardEvent::Returned { step, errors } if *step == RegistrationStep::Subdomain => {
                if let (Some(message), Some(picker)) =
                    (errors.get("subdomain"), self.subdomain.write().await.as_mut())
                {
                    picker.set_error(message.as_str());
                }
            }
            WizardEvent::Returned { step, .. } => self.enter_step(*step).await?,
            WizardEvent::Failed(_) => {}
        }

        Ok(SubdomainReply::Submitted(event))
    }
}

impl Drop for RegistrationManager {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::{
        ApiErrorBody, ApiErrorDetail, FieldViolation, RegistrationReceipt, SubdomainAvailability,
    };
    use crate::error::BackendError;
    use crate::registration::model::RegisterRequest;
    use crate::registration::verification::INVALID_CODE;

    const GOOD_CODE: &str = "1234";

    /// In-memory backend: "1234" verifies, "taken" is unavailable.
    #[derive(Default)]
    struct StubBackend {
        sent: StdMutex<Vec<(String, VerificationKind)>>,
        registered: StdMutex<Vec<RegisterRequest>>,
        register_errors: StdMutex<Vec<(String, String)>>,
        rate_limited: StdMutex<bool>,
    }

    #[async_trait]
    impl SignupBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn check_subdomain(
            &self,
            subdomain: &str,
        ) -> std::result::Result<SubdomainAvailability, BackendError> {
            let taken = subdomain == "taken";
            Ok(SubdomainAvailability {
                available: !taken,
                suggestions: if taken {
                    vec!["taken-hq".to_string()]
                } else {
                    Vec::new()
                },
            })
        }

        async fn request_verification(
            &self,
            identifier: &str,
            kind: VerificationKind,
        ) -> std::result::Result<(), BackendError> {
            self.sent.lock().unwrap().push((identifier.to_string(), kind));
            Ok(())
        }

        async fn verify_code(
            &self,
            code: &str,
            _identifier: &str,
            _kind: VerificationKind,
        ) -> std::result::Result<bool, BackendError> {
            if *self.rate_limited.lock().unwrap() {
                return Err(BackendError::Rejected {
                    status: 429,
                    body: Some(ApiErrorBody {
                        error: Some(ApiErrorDetail {
                            code: "RATE_LIMIT_EXCEEDED".to_string(),
                            message: "Slow down".to_string(),
                        }),
                        ..Default::default()
                    }),
                });
            }
            Ok(code == GOOD_CODE)
        }

        async fn register(
            &self,
            request: &RegisterRequest,
        ) -> std::result::Result<RegistrationReceipt, BackendError> {
            let errors = self.register_errors.lock().unwrap().clone();
            if !errors.is_empty() {
                return Err(BackendError::Rejected {
                    status: 422,
                    body: Some(ApiErrorBody {
                        errors: errors
                            .into_iter()
                            .map(|(field, message)| FieldViolation {
                                field,
                                code: "INVALID".to_string(),
                                message,
                            })
                            .collect(),
                        ..Default::default()
                    }),
                });
            }
            self.registered.lock().unwrap().push(request.clone());
            Ok(RegistrationReceipt::default())
        }
    }

    fn config() -> SignupConfig {
        SignupConfig {
            success_delay: Duration::ZERO,
            debounce: Duration::from_millis(20),
            ..SignupConfig::default()
        }
    }

    fn manager() -> (Arc<StubBackend>, RegistrationManager) {
        let backend = Arc::new(StubBackend::default());
        let manager = RegistrationManager::new(backend.clone(), config());
        (backend, manager)
    }

    fn details() -> UserDetails {
        UserDetails {
            first_name: "Sara".into(),
            last_name: "Ali".into(),
            email: "sara@acme.io".into(),
            phone: "+966 50 123 4567".into(),
        }
    }

    async fn through_user_details(manager: &RegistrationManager) {
        manager.submit_business_name("Acme").await.unwrap();
        let reply = manager.submit_user_details(&details()).await.unwrap();
        assert_eq!(
            reply,
            StepReply::Advanced(RegistrationStep::EmailVerification)
        );
    }

    async fn through_verification(manager: &RegistrationManager) {
        through_user_details(manager).await;
        manager.paste_code(GOOD_CODE).await.unwrap();
        for (i, digit) in GOOD_CODE.chars().enumerate() {
            manager.input_digit(i, &digit.to_string()).await.unwrap();
        }
        assert_eq!(manager.current_step().await, RegistrationStep::Subdomain);
    }

    #[tokio::test]
    async fn happy_path_registers_and_redirects() {
        let (backend, manager) = manager();
        through_user_details(&manager).await;
        assert_eq!(
            backend.sent.lock().unwrap().clone(),
            vec![("sara@acme.io".to_string(), VerificationKind::Email)]
        );

        let reply = manager.paste_code("1234").await.unwrap();
        assert_eq!(
            reply,
            VerifyReply::Verified(RegistrationStep::PhoneVerification)
        );
        assert_eq!(
            backend.sent.lock().unwrap().last().cloned(),
            Some(("+966501234567".to_string(), VerificationKind::Phone))
        );

        for (i, digit) in ["1", "2", "3"].into_iter().enumerate() {
            assert_eq!(
                manager.input_digit(i, digit).await.unwrap(),
                VerifyReply::Pending
            );
        }
        let reply = manager.input_digit(3, "4").await.unwrap();
        assert_eq!(reply, VerifyReply::Verified(RegistrationStep::Subdomain));

        let status = manager.status().await;
        assert!(status.verification.is_none());
        assert_eq!(status.subdomain.as_ref().unwrap().value(), "acme");
        assert_eq!(status.progress_percent, 100);

        assert_eq!(
            manager.check_subdomain().await.unwrap(),
            Availability::Available
        );
        let reply = manager.submit_subdomain().await.unwrap();
        assert_eq!(
            reply,
            SubdomainReply::Submitted(WizardEvent::Redirect(
                "https://acme.staging.karzoun.chat".to_string()
            ))
        );

        let registered = backend.registered.lock().unwrap().clone();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].phone, "+966501234567");
        assert_eq!(registered[0].plan_id, "free");
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_backend() {
        let (backend, manager) = manager();
        let reply = manager.submit_business_name("A").await.unwrap();
        assert!(matches!(reply, StepReply::Invalid(e) if e.contains_key("businessName")));

        manager.submit_business_name("Acme").await.unwrap();
        let reply = manager
            .submit_user_details(&UserDetails {
                phone: "+966 123".into(),
                ..details()
            })
            .await
            .unwrap();
        assert!(matches!(reply, StepReply::Invalid(e) if e.contains_key("phone")));
        assert!(backend.sent.lock().unwrap().is_empty());
        assert_eq!(manager.current_step().await, RegistrationStep::UserDetails);
    }

    #[tokio::test]
    async fn wrong_code_clears_cells_for_retry() {
        let (_backend, manager) = manager();
        through_user_details(&manager).await;

        let reply = manager.paste_code("9999").await.unwrap();
        assert_eq!(reply, VerifyReply::Rejected(INVALID_CODE.to_string()));

        let status = manager.status().await;
        let flow = status.verification.unwrap();
        assert_eq!(flow.phase(), VerificationPhase::InvalidRetry);
        assert!(flow.cells().iter().all(Option::is_none));
        assert_eq!(flow.focus(), 0);
        assert_eq!(
            manager.current_step().await,
            RegistrationStep::EmailVerification
        );
    }

    #[tokio::test]
    async fn rate_limit_message_is_passed_through() {
        let (backend, manager) = manager();
        through_user_details(&manager).await;
        *backend.rate_limited.lock().unwrap() = true;

        let reply = manager.paste_code("1234").await.unwrap();
        assert_eq!(reply, VerifyReply::Rejected("Slow down".to_string()));
    }

    #[tokio::test]
    async fn resend_waits_for_cooldown() {
        let (backend, manager) = manager();
        through_user_details(&manager).await;

        assert!(!manager.resend_code().await.unwrap());
        for _ in 0..60 {
            manager.tick_cooldown().await;
        }
        assert!(manager.resend_code().await.unwrap());
        assert_eq!(backend.sent.lock().unwrap().len(), 2);
        let status = manager.status().await;
        assert_eq!(status.verification.unwrap().cooldown(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_ticker_counts_down_each_second_and_stops_at_zero() {
        let (_backend, manager) = manager();
        through_user_details(&manager).await;

        tokio::time::sleep(Duration::from_millis(59_500)).await;
        let flow = manager.status().await.verification.unwrap();
        assert_eq!(flow.cooldown(), 1);
        assert!(!flow.can_resend());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let flow = manager.status().await.verification.unwrap();
        assert_eq!(flow.cooldown(), 0);
        assert!(flow.can_resend());

        let ticker = manager.ticker.lock().await;
        assert!(ticker.as_ref().unwrap().is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_the_step_stops_the_cooldown_ticker() {
        let (_backend, manager) = manager();
        through_user_details(&manager).await;
        let ticker = manager.ticker.lock().await.as_ref().unwrap().abort_handle();

        manager.go_back().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ticker.is_finished());
        assert!(manager.ticker.lock().await.is_none());
        assert!(manager.status().await.verification.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_manager_stops_the_cooldown_ticker() {
        let (_backend, manager) = manager();
        through_user_details(&manager).await;
        let ticker = manager.ticker.lock().await.as_ref().unwrap().abort_handle();

        drop(manager);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ticker.is_finished());
    }

    #[tokio::test]
    async fn going_back_to_a_verified_step_does_not_resend() {
        let (backend, manager) = manager();
        through_user_details(&manager).await;
        manager.paste_code(GOOD_CODE).await.unwrap();
        assert_eq!(backend.sent.lock().unwrap().len(), 2);

        assert_eq!(
            manager.go_back().await.unwrap(),
            RegistrationStep::EmailVerification
        );
        assert_eq!(backend.sent.lock().unwrap().len(), 2);

        let status = manager.status().await;
        let flow = status.verification.unwrap();
        assert_eq!(flow.kind(), VerificationKind::Email);
        assert_eq!(status.wizard.completed().len(), 3);
    }

    #[tokio::test]
    async fn email_field_error_routes_back_and_keeps_data() {
        let (backend, manager) = manager();
        through_verification(&manager).await;
        backend
            .register_errors
            .lock()
            .unwrap()
            .push(("email".to_string(), "taken".to_string()));

        manager.check_subdomain().await.unwrap();
        let reply = manager.submit_subdomain().await.unwrap();
        assert!(matches!(
            reply,
            SubdomainReply::Submitted(WizardEvent::Returned {
                step: RegistrationStep::UserDetails,
                ..
            })
        ));

        let status = manager.status().await;
        assert_eq!(status.wizard.current(), RegistrationStep::UserDetails);
        assert_eq!(
            status.wizard.field_errors().get("email").map(String::as_str),
            Some("taken")
        );
        assert_eq!(status.wizard.data().business_name, "Acme");
        assert!(status.subdomain.is_none());
    }

    #[tokio::test]
    async fn subdomain_field_error_stays_on_subdomain() {
        let (backend, manager) = manager();
        through_verification(&manager).await;
        backend
            .register_errors
            .lock()
            .unwrap()
            .push(("subdomain".to_string(), "reserved".to_string()));

        manager.check_subdomain().await.unwrap();
        manager.submit_subdomain().await.unwrap();

        let status = manager.status().await;
        assert_eq!(status.wizard.current(), RegistrationStep::Subdomain);
        assert_eq!(status.subdomain.unwrap().error(), Some("reserved"));
    }

    #[tokio::test]
    async fn unchecked_subdomain_is_not_submitted() {
        let (backend, manager) = manager();
        through_verification(&manager).await;

        manager.edit_subdomain("acme-new").await.unwrap();
        let reply = manager.submit_subdomain().await.unwrap();
        assert_eq!(reply, SubdomainReply::Rejected(SubdomainRejection::NotChecked));
        assert!(backend.registered.lock().unwrap().is_empty());
    }

    async fn subdomain_availability(manager: &RegistrationManager) -> Availability {
        let status = manager.status().await;
        status.subdomain.unwrap().availability().clone()
    }

    #[tokio::test]
    async fn debounced_edit_reports_unavailable_with_suggestions() {
        let backend = Arc::new(StubBackend::default());
        let manager = RegistrationManager::new(
            backend,
            SignupConfig {
                debounce: Duration::from_millis(200),
                ..config()
            },
        );
        through_verification(&manager).await;

        manager.edit_subdomain("Taken").await.unwrap();
        assert_eq!(subdomain_availability(&manager).await, Availability::Unknown);

        let mut availability = Availability::Unknown;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            availability = subdomain_availability(&manager).await;
            if matches!(availability, Availability::Unavailable { .. }) {
                break;
            }
        }
        assert_eq!(
            availability,
            Availability::Unavailable {
                suggestions: vec!["taken-hq".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn operations_on_the_wrong_step_fail() {
        let (_backend, manager) = manager();
        assert!(manager.paste_code("1234").await.is_err());
        assert!(manager.edit_subdomain("acme").await.is_err());
        assert!(manager.enter_verification().await.is_err());
    }
}
