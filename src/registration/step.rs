//! Registration steps — the one ordered list every transition consults.

use serde::{Deserialize, Serialize};

/// The steps of the sign-up wizard.
///
/// Progresses linearly: BusinessName → UserDetails → EmailVerification →
/// PhoneVerification → Subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationStep {
    BusinessName,
    UserDetails,
    EmailVerification,
    PhoneVerification,
    Subdomain,
}

impl RegistrationStep {
    /// Every step, in order.
    pub const ALL: [RegistrationStep; 5] = [
        Self::BusinessName,
        Self::UserDetails,
        Self::EmailVerification,
        Self::PhoneVerification,
        Self::Subdomain,
    ];

    /// Position of this step in [`Self::ALL`].
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    /// The step after this one, if any.
    pub fn next(&self) -> Option<RegistrationStep> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The step before this one, if any.
    pub fn previous(&self) -> Option<RegistrationStep> {
        self.index()
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Whether this is the last step.
    pub fn is_final(&self) -> bool {
        self.next().is_none()
    }

    /// The step whose form collects `field`.
    ///
    /// Accepts both the camelCase names the API reports and snake_case.
    pub fn owning(field: &str) -> Option<RegistrationStep> {
        match field {
            "businessName" | "business_name" => Some(Self::BusinessName),
            "firstName" | "first_name" | "lastName" | "last_name" | "email" | "phone" => {
                Some(Self::UserDetails)
            }
            "subdomain" => Some(Self::Subdomain),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BusinessName => "business-name",
            Self::UserDetails => "user-details",
            Self::EmailVerification => "email-verification",
            Self::PhoneVerification => "phone-verification",
            Self::Subdomain => "subdomain",
        };
        write!(f, "{s}")
    }
}

/// How a step renders in the progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Current,
    Upcoming,
}

/// Status of every step, in order.
///
/// A completed step stays `Completed` even when the user navigates back to it.
pub fn progress(
    current: RegistrationStep,
    completed: &[RegistrationStep],
) -> Vec<(RegistrationStep, StepStatus)> {
    RegistrationStep::ALL
        .iter()
        .map(|&step| {
            let status = if completed.contains(&step) {
                StepStatus::Completed
            } else if step == current {
                StepStatus::Current
            } else {
                StepStatus::Upcoming
            };
            (step, status)
        })
        .collect()
}

/// Width of the progress bar, 0 on the first step and 100 on the last.
pub fn progress_percent(current: RegistrationStep) -> u8 {
    let last = RegistrationStep::ALL.len() - 1;
    (current.index() * 100 / last) as u8
}
