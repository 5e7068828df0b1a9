//! Verification code entry — the state machine behind one email or phone
//! verification step.
//!
//! This type is pure: it never talks to a backend. The manager performs the
//! network calls and reports their results through `send_*` / `verify_*`.

use serde::Serialize;

use super::model::VerificationKind;
use super::validation::strip_whitespace;
use crate::error::BackendError;

pub const SEND_FAILED: &str = "Failed to send the verification code";
pub const RESEND_FAILED: &str = "Failed to resend the code";
pub const INVALID_CODE: &str = "Invalid or expired code. Please try again.";
pub const VERIFY_FAILED: &str = "Verification failed. Please try again.";

/// Where the flow is.
///
/// Idle → Sending → AwaitingInput → Verifying → (Success | InvalidRetry).
/// InvalidRetry accepts input again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPhase {
    Idle,
    Sending,
    AwaitingInput,
    Verifying,
    Success,
    InvalidRetry,
}

/// Which send the result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    Initial,
    Resend,
}

/// Why a verification attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// Wrong or expired code.
    Invalid,
    /// Throttled; the message comes from the server and is shown verbatim.
    RateLimited(String),
    /// Anything else.
    Other,
}

impl VerifyFailure {
    pub fn from_error(err: &BackendError) -> Self {
        match err.body().and_then(|b| b.rate_limit_message()) {
            Some(message) => Self::RateLimited(message.to_string()),
            None => Self::Other,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Invalid => INVALID_CODE,
            Self::RateLimited(message) => message,
            Self::Other => VERIFY_FAILED,
        }
    }
}

/// State of one verification step.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationFlow {
    kind: VerificationKind,
    identifier: String,
    cells: Vec<Option<char>>,
    focus: usize,
    phase: VerificationPhase,
    cooldown: u32,
    cooldown_secs: u32,
    error: Option<String>,
    #[serde(skip)]
    initial_send_done: bool,
}

impl VerificationFlow {
    /// Phone identifiers are stored with whitespace removed.
    pub fn new(
        kind: VerificationKind,
        identifier: &str,
        code_length: usize,
        cooldown_secs: u32,
    ) -> Self {
        let identifier = match kind {
            VerificationKind::Phone => strip_whitespace(identifier),
            VerificationKind::Email => identifier.to_string(),
        };
        Self {
            kind,
            identifier,
            cells: vec![None; code_length.max(1)],
            focus: 0,
            phase: VerificationPhase::Idle,
            cooldown: cooldown_secs,
            cooldown_secs,
            error: None,
            initial_send_done: false,
        }
    }

    pub fn kind(&self) -> VerificationKind {
        self.kind
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn phase(&self) -> VerificationPhase {
        self.phase
    }

    /// Index of the cell that has focus.
    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn cells(&self) -> &[Option<char>] {
        &self.cells
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Seconds until resend is allowed.
    pub fn cooldown(&self) -> u32 {
        self.cooldown
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// The entered code, once every cell is filled.
    pub fn code(&self) -> Option<String> {
        self.cells.iter().copied().collect()
    }

    fn is_busy(&self) -> bool {
        matches!(
            self.phase,
            VerificationPhase::Sending | VerificationPhase::Verifying | VerificationPhase::Success
        )
    }

    pub fn can_resend(&self) -> bool {
        self.cooldown == 0 && !self.is_busy()
    }

    /// Whether the automatic first send should go out now.
    ///
    /// Returns true at most once per flow, and never when `skip` is set.
    pub fn needs_initial_send(&mut self, skip: bool) -> bool {
        if self.initial_send_done || skip {
            self.initial_send_done = true;
            if self.phase == VerificationPhase::Idle {
                self.phase = VerificationPhase::AwaitingInput;
            }
            return false;
        }
        self.initial_send_done = true;
        true
    }

    pub fn begin_send(&mut self) {
        self.phase = VerificationPhase::Sending;
        self.error = None;
    }

    /// Every successful send restarts the cooldown. A resend also clears the
    /// entered digits.
    pub fn send_succeeded(&mut self, kind: SendKind) {
        self.cooldown = self.cooldown_secs;
        if kind == SendKind::Resend {
            self.clear_cells();
        }
        self.phase = VerificationPhase::AwaitingInput;
    }

    pub fn send_failed(&mut self, kind: SendKind) {
        self.error = Some(
            match kind {
                SendKind::Initial => SEND_FAILED,
                SendKind::Resend => RESEND_FAILED,
            }
            .to_string(),
        );
        self.phase = VerificationPhase::AwaitingInput;
    }

    /// Type into cell `index`.
    ///
    /// Non-digit input is ignored. Only the last character typed is kept.
    /// Returns the full code exactly when this input fills the last empty
    /// cell, which should trigger verification.
    pub fn input(&mut self, index: usize, text: &str) -> Option<String> {
        if self.is_busy() || index >= self.cells.len() {
            return None;
        }
        if !text.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        self.cells[index] = text.chars().last();
        self.error = None;

        if !text.is_empty() && index + 1 < self.cells.len() {
            self.focus = index + 1;
        }

        self.code()
    }

    /// Backspace on an empty cell moves focus to the previous one.
    pub fn backspace(&mut self, index: usize) {
        let empty = self.cells.get(index).is_some_and(Option::is_none);
        if empty && index > 0 {
            self.focus = index - 1;
        }
    }

    /// Paste into the code field.
    ///
    /// Only digits are kept, up to the number of cells. A full code is
    /// returned for immediate verification; otherwise focus lands on the
    /// first unfilled cell.
    pub fn paste(&mut self, text: &str) -> Option<String> {
        if self.is_busy() {
            return None;
        }
        let digits: Vec<char> = text
            .chars()
            .filter(char::is_ascii_digit)
            .take(self.cells.len())
            .collect();

        for (i, cell) in self.cells.iter_mut().enumerate() {
            *cell = digits.get(i).copied();
        }

        if digits.len() == self.cells.len() {
            return self.code();
        }
        self.focus = digits.len();
        None
    }

    pub fn begin_verify(&mut self) {
        self.phase = VerificationPhase::Verifying;
        self.error = None;
    }

    pub fn verify_succeeded(&mut self) {
        self.phase = VerificationPhase::Success;
    }

    /// Clear the cells, refocus the first one, and show why.
    pub fn verify_failed(&mut self, failure: VerifyFailure) {
        self.error = Some(failure.message().to_string());
        self.clear_cells();
        self.phase = VerificationPhase::InvalidRetry;
    }

    /// One second of cooldown elapsed. Returns the remaining seconds.
    pub fn tick(&mut self) -> u32 {
        self.cooldown = self.cooldown.saturating_sub(1);
        self.cooldown
    }

    fn clear_cells(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
        self.focus = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ApiErrorBody, ApiErrorDetail};

    fn flow() -> VerificationFlow {
        VerificationFlow::new(VerificationKind::Email, "sara@acme.io", 4, 60)
    }

    fn ready_flow() -> VerificationFlow {
        let mut f = flow();
        assert!(f.needs_initial_send(false));
        f.begin_send();
        f.send_succeeded(SendKind::Initial);
        f
    }

    #[test]
    fn phone_identifier_is_stripped() {
        let f = VerificationFlow::new(VerificationKind::Phone, "+966 50 123 4567", 4, 60);
        assert_eq!(f.identifier(), "+966501234567");
    }

    #[test]
    fn initial_send_happens_once_and_can_be_skipped() {
        let mut f = flow();
        assert!(f.needs_initial_send(false));
        assert!(!f.needs_initial_send(false));

        let mut skipped = flow();
        assert!(!skipped.needs_initial_send(true));
        assert_eq!(skipped.phase(), VerificationPhase::AwaitingInput);
        assert!(!skipped.needs_initial_send(false));
    }

    #[test]
    fn typing_advances_focus_and_auto_submits_when_full() {
        let mut f = ready_flow();
        assert_eq!(f.input(0, "1"), None);
        assert_eq!(f.focus(), 1);
        assert_eq!(f.input(1, "2"), None);
        assert_eq!(f.input(2, "3"), None);
        assert_eq!(f.focus(), 3);
        assert_eq!(f.input(3, "4"), Some("1234".to_string()));
        // Focus stays on the last cell.
        assert_eq!(f.focus(), 3);
    }

    #[test]
    fn non_digits_are_ignored_and_last_char_wins() {
        let mut f = ready_flow();
        assert_eq!(f.input(0, "a"), None);
        assert_eq!(f.cells()[0], None);
        f.input(0, "17");
        assert_eq!(f.cells()[0], Some('7'));
    }

    #[test]
    fn clearing_a_cell_keeps_focus() {
        let mut f = ready_flow();
        f.input(0, "1");
        f.input(1, "2");
        assert_eq!(f.input(1, ""), None);
        assert_eq!(f.cells()[1], None);
        assert_eq!(f.focus(), 2);
    }

    #[test]
    fn backspace_on_empty_cell_moves_back() {
        let mut f = ready_flow();
        f.input(0, "1");
        f.backspace(1);
        assert_eq!(f.focus(), 0);
        // Non-empty cell: no focus move.
        f.input(0, "1");
        f.backspace(0);
        assert_eq!(f.focus(), 1);
    }

    #[test]
    fn paste_full_code_submits_and_strips_junk() {
        let mut f = ready_flow();
        assert_eq!(f.paste("1234abc"), Some("1234".to_string()));
        assert!(f.is_complete());
    }

    #[test]
    fn paste_partial_code_focuses_next_cell() {
        let mut f = ready_flow();
        assert_eq!(f.paste("12"), None);
        assert_eq!(f.cells(), &[Some('1'), Some('2'), None, None]);
        assert_eq!(f.focus(), 2);

        assert_eq!(f.paste("no digits"), None);
        assert_eq!(f.focus(), 0);
        assert!(f.cells().iter().all(Option::is_none));
    }

    #[test]
    fn invalid_code_clears_and_refocuses() {
        let mut f = ready_flow();
        f.paste("9999");
        f.begin_verify();
        assert_eq!(f.phase(), VerificationPhase::Verifying);
        f.verify_failed(VerifyFailure::Invalid);
        assert_eq!(f.phase(), VerificationPhase::InvalidRetry);
        assert_eq!(f.error(), Some(INVALID_CODE));
        assert_eq!(f.focus(), 0);
        assert!(f.cells().iter().all(Option::is_none));

        // Typing again clears the error.
        f.input(0, "1");
        assert!(f.error().is_none());
    }

    #[test]
    fn rate_limit_message_is_shown_verbatim() {
        let err = BackendError::Rejected {
            status: 429,
            body: Some(ApiErrorBody {
                error: Some(ApiErrorDetail {
                    code: "RATE_LIMIT_EXCEEDED".to_string(),
                    message: "Too many attempts, wait 10 minutes".to_string(),
                }),
                ..Default::default()
            }),
        };
        let mut f = ready_flow();
        f.paste("1234");
        f.begin_verify();
        f.verify_failed(VerifyFailure::from_error(&err));
        assert_eq!(f.error(), Some("Too many attempts, wait 10 minutes"));

        let generic = VerifyFailure::from_error(&BackendError::Transport("timeout".into()));
        assert_eq!(generic.message(), VERIFY_FAILED);
    }

    #[test]
    fn resend_is_blocked_for_exactly_the_cooldown() {
        let mut f = ready_flow();
        for _ in 0..59 {
            f.tick();
            assert!(!f.can_resend());
        }
        assert_eq!(f.tick(), 0);
        assert!(f.can_resend());
        // Stays at zero.
        assert_eq!(f.tick(), 0);
    }

    #[test]
    fn resend_resets_cooldown_and_clears_digits() {
        let mut f = ready_flow();
        f.input(0, "5");
        for _ in 0..60 {
            f.tick();
        }
        assert!(f.can_resend());
        f.begin_send();
        assert!(!f.can_resend());
        f.send_succeeded(SendKind::Resend);
        assert_eq!(f.cooldown(), 60);
        assert!(f.cells().iter().all(Option::is_none));
        assert_eq!(f.focus(), 0);
    }

    #[test]
    fn failed_sends_report_which_send_failed() {
        let mut f = flow();
        f.needs_initial_send(false);
        f.begin_send();
        f.send_failed(SendKind::Initial);
        assert_eq!(f.error(), Some(SEND_FAILED));
        assert_eq!(f.phase(), VerificationPhase::AwaitingInput);

        f.begin_send();
        f.send_failed(SendKind::Resend);
        assert_eq!(f.error(), Some(RESEND_FAILED));
    }

    #[test]
    fn input_is_ignored_while_verifying() {
        let mut f = ready_flow();
        f.paste("1234");
        f.begin_verify();
        assert_eq!(f.input(0, "5"), None);
        assert_eq!(f.paste("5678"), None);
        assert_eq!(f.cells()[0], Some('1'));
    }
}
