use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use karzoun_signup::backend::create_backend;
use karzoun_signup::config::SignupConfig;
use karzoun_signup::registration::model::FieldErrors;
use karzoun_signup::registration::step::StepStatus;
use karzoun_signup::registration::validation::{
    DEFAULT_DIAL_CODE, format_phone_number, split_phone,
};
use karzoun_signup::registration::{
    Availability, RegistrationManager, RegistrationStep, StepReply, SubdomainReply, UserDetails,
    VerifyReply, WizardEvent,
};

type Input = Lines<BufReader<Stdin>>;

/// One line of terminal input.
enum Line {
    Text(String),
    Back,
    Resend,
    Quit,
}

async fn read_line(input: &mut Input, label: &str) -> anyhow::Result<Line> {
    eprint!("{label} ");
    let Some(raw) = input.next_line().await.context("failed to read stdin")? else {
        return Ok(Line::Quit);
    };
    Ok(match raw.trim() {
        "/quit" => Line::Quit,
        "/back" => Line::Back,
        "/resend" => Line::Resend,
        text => Line::Text(text.to_string()),
    })
}

/// `+966 501234567` stays as typed; a bare national number gets the default
/// dial code. Either way the digits are grouped for display.
fn normalize_phone(raw: &str) -> String {
    let (dial_code, national) = if raw.starts_with('+') {
        split_phone(raw)
    } else {
        (DEFAULT_DIAL_CODE.to_string(), raw.to_string())
    };
    format!("{dial_code} {}", format_phone_number(&national, &dial_code))
}

fn print_errors(errors: &FieldErrors) {
    for (field, message) in errors {
        eprintln!("   ✗ {field}: {message}");
    }
}

async fn print_progress(manager: &RegistrationManager) {
    let status = manager.status().await;
    let steps: Vec<String> = status
        .wizard
        .progress()
        .into_iter()
        .map(|(step, state)| match state {
            StepStatus::Completed => format!("✓ {step}"),
            StepStatus::Current => format!("[{step}]"),
            StepStatus::Upcoming => step.to_string(),
        })
        .collect();
    eprintln!("\n{} ({}%)", steps.join(" → "), status.progress_percent);
}

enum Outcome {
    Continue,
    Quit,
    Done(String),
}

async fn business_name_step(
    manager: &RegistrationManager,
    input: &mut Input,
) -> anyhow::Result<Outcome> {
    match read_line(input, "Business name:").await? {
        Line::Text(name) => {
            if let StepReply::Invalid(errors) = manager.submit_business_name(&name).await? {
                print_errors(&errors);
            }
        }
        Line::Quit => return Ok(Outcome::Quit),
        Line::Back | Line::Resend => {}
    }
    Ok(Outcome::Continue)
}

async fn user_details_step(
    manager: &RegistrationManager,
    input: &mut Input,
) -> anyhow::Result<Outcome> {
    let status = manager.status().await;
    print_errors(&status.wizard.field_errors_for(RegistrationStep::UserDetails));

    let mut values = Vec::with_capacity(4);
    for label in ["First name:", "Last name:", "Email:", "Phone:"] {
        match read_line(input, label).await? {
            Line::Text(text) => values.push(text),
            Line::Back => {
                manager.go_back().await?;
                return Ok(Outcome::Continue);
            }
            Line::Quit => return Ok(Outcome::Quit),
            Line::Resend => return Ok(Outcome::Continue),
        }
    }

    let [first_name, last_name, email, phone]: [String; 4] = values
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected four user-details fields"))?;
    let details = UserDetails {
        first_name,
        last_name,
        email,
        phone: normalize_phone(&phone),
    };
    if let StepReply::Invalid(errors) = manager.submit_user_details(&details).await? {
        print_errors(&errors);
    }
    Ok(Outcome::Continue)
}

async fn verification_step(
    manager: &RegistrationManager,
    input: &mut Input,
) -> anyhow::Result<Outcome> {
    let status = manager.status().await;
    let Some(flow) = status.verification else {
        manager.enter_verification().await?;
        return Ok(Outcome::Continue);
    };
    if let Some(error) = flow.error() {
        eprintln!("   ✗ {error}");
    }
    let label = format!(
        "Enter the {}-digit code sent to {} (resend in {}s):",
        flow.cells().len(),
        flow.identifier(),
        flow.cooldown()
    );

    match read_line(input, &label).await? {
        Line::Text(code) => match manager.paste_code(&code).await? {
            VerifyReply::Verified(_) => eprintln!("   ✓ Verified"),
            VerifyReply::Rejected(message) => eprintln!("   ✗ {message}"),
            VerifyReply::Pending => eprintln!("   Enter all {} digits", flow.cells().len()),
        },
        Line::Resend => {
            if manager.resend_code().await? {
                eprintln!("   A new code is on its way");
            } else {
                eprintln!("   Please wait before requesting another code");
            }
        }
        Line::Back => {
            manager.go_back().await?;
        }
        Line::Quit => return Ok(Outcome::Quit),
    }
    Ok(Outcome::Continue)
}

async fn subdomain_step(
    manager: &RegistrationManager,
    input: &mut Input,
) -> anyhow::Result<Outcome> {
    let current = manager
        .status()
        .await
        .subdomain
        .map(|p| p.value().to_string())
        .unwrap_or_default();

    match read_line(input, &format!("Subdomain [{current}]:")).await? {
        Line::Text(text) => {
            if !text.is_empty() {
                manager.edit_subdomain(&text).await?;
            }
        }
        Line::Back => {
            manager.go_back().await?;
            return Ok(Outcome::Continue);
        }
        Line::Quit => return Ok(Outcome::Quit),
        Line::Resend => return Ok(Outcome::Continue),
    }

    match manager.check_subdomain().await? {
        Availability::Available => {}
        Availability::Unavailable { suggestions } => {
            eprintln!("   ✗ Not available");
            if !suggestions.is_empty() {
                eprintln!("   Try: {}", suggestions.join(", "));
            }
            return Ok(Outcome::Continue);
        }
        Availability::Unknown | Availability::Checking => {}
    }

    match manager.submit_subdomain().await? {
        SubdomainReply::Rejected(rejection) => eprintln!("   ✗ {rejection}"),
        SubdomainReply::Submitted(WizardEvent::Redirect(url)) => return Ok(Outcome::Done(url)),
        SubdomainReply::Submitted(WizardEvent::Returned { step, errors }) => {
            eprintln!("   Please fix the following on {step}:");
            print_errors(&errors);
        }
        SubdomainReply::Submitted(WizardEvent::Failed(message)) => eprintln!("   ✗ {message}"),
    }
    Ok(Outcome::Continue)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SignupConfig::from_env().context("invalid configuration")?;
    let backend = create_backend(&config)
        .await
        .context("failed to set up the sign-up backend")?;

    eprintln!("Karzoun sign-up v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", backend.name());
    eprintln!("   Workspaces: https://<subdomain>.{}", config.redirect_domain);
    eprintln!("   /back returns to the previous step, /resend sends a new code, /quit exits.");

    let manager = RegistrationManager::new(backend, config);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_progress(&manager).await;
        let outcome = match manager.current_step().await {
            RegistrationStep::BusinessName => business_name_step(&manager, &mut input).await?,
            RegistrationStep::UserDetails => user_details_step(&manager, &mut input).await?,
            RegistrationStep::EmailVerification | RegistrationStep::PhoneVerification => {
                verification_step(&manager, &mut input).await?
            }
            RegistrationStep::Subdomain => subdomain_step(&manager, &mut input).await?,
        };

        match outcome {
            Outcome::Continue => {}
            Outcome::Quit => {
                eprintln!("Sign-up cancelled.");
                return Ok(());
            }
            Outcome::Done(url) => {
                println!("{url}");
                eprintln!("Your workspace is ready.");
                return Ok(());
            }
        }
    }
}
