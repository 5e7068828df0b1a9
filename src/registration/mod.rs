//! The sign-up wizard: steps, validation, verification, subdomain choice,
//! and the manager that drives them against a backend.

pub mod manager;
pub mod model;
pub mod step;
pub mod subdomain;
pub mod validation;
pub mod verification;
pub mod wizard;

pub use manager::{RegistrationManager, RegistrationStatus, StepReply, SubdomainReply, VerifyReply};
pub use model::{RegistrationData, UserDetails, VerificationKind};
pub use step::RegistrationStep;
pub use subdomain::{Availability, SubdomainPicker};
pub use verification::{VerificationFlow, VerificationPhase};
pub use wizard::{RegistrationWizard, WizardEvent};
