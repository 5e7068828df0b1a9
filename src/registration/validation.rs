//! Client-side field validation.
//!
//! Everything here is pure. A value that fails these checks never reaches a
//! backend.

use std::sync::LazyLock;

use regex::Regex;

use super::model::{FieldErrors, UserDetails};

pub const BUSINESS_NAME_MIN: usize = 2;
pub const BUSINESS_NAME_MAX: usize = 50;
pub const PHONE_DIGITS_MIN: usize = 10;
pub const PHONE_DIGITS_MAX: usize = 15;
pub const SUBDOMAIN_MIN: usize = 3;
pub const SUBDOMAIN_MAX: usize = 30;

/// Dial code assumed when a phone number carries none.
pub const DEFAULT_DIAL_CODE: &str = "+966";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static SUBDOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("valid subdomain regex")
});

static PHONE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+\d+)\s*(.*)$").expect("valid phone prefix regex"));

/// Why a single field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Required,
    TooShort { min: usize },
    TooLong { max: usize },
    InvalidEmail,
    InvalidPhone,
    InvalidSubdomain,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => write!(f, "This field is required"),
            Self::TooShort { min } => write!(f, "Must be at least {min} characters"),
            Self::TooLong { max } => write!(f, "Must be at most {max} characters"),
            Self::InvalidEmail => write!(f, "Please enter a valid email address"),
            Self::InvalidPhone => write!(f, "Please enter a valid phone number"),
            Self::InvalidSubdomain => write!(
                f,
                "Use {SUBDOMAIN_MIN}-{SUBDOMAIN_MAX} lowercase letters, digits or hyphens, \
                 not starting or ending with a hyphen"
            ),
        }
    }
}

/// Validate a business name, returning it trimmed.
pub fn validate_business_name(name: &str) -> Result<String, FieldError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(FieldError::Required);
    }
    if len < BUSINESS_NAME_MIN {
        return Err(FieldError::TooShort {
            min: BUSINESS_NAME_MIN,
        });
    }
    if len > BUSINESS_NAME_MAX {
        return Err(FieldError::TooLong {
            max: BUSINESS_NAME_MAX,
        });
    }
    Ok(trimmed.to_string())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Phone numbers are judged on their digits alone.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    (PHONE_DIGITS_MIN..=PHONE_DIGITS_MAX).contains(&digits)
}

pub fn is_valid_subdomain(subdomain: &str) -> bool {
    (SUBDOMAIN_MIN..=SUBDOMAIN_MAX).contains(&subdomain.len()) && SUBDOMAIN_RE.is_match(subdomain)
}

pub fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Validate the user-details form.
///
/// All failing fields are reported together, keyed by their camelCase
/// names. On success the phone comes back with whitespace removed.
pub fn validate_user_details(details: &UserDetails) -> Result<UserDetails, FieldErrors> {
    let mut errors = FieldErrors::new();

    if details.first_name.trim().is_empty() {
        errors.insert("firstName".to_string(), FieldError::Required.to_string());
    }
    if details.last_name.trim().is_empty() {
        errors.insert("lastName".to_string(), FieldError::Required.to_string());
    }

    if details.email.trim().is_empty() {
        errors.insert("email".to_string(), FieldError::Required.to_string());
    } else if !is_valid_email(&details.email) {
        errors.insert("email".to_string(), FieldError::InvalidEmail.to_string());
    }

    if details.phone.trim().is_empty() {
        errors.insert("phone".to_string(), FieldError::Required.to_string());
    } else if !is_valid_phone(&details.phone) {
        errors.insert("phone".to_string(), FieldError::InvalidPhone.to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(UserDetails {
        phone: strip_whitespace(&details.phone),
        ..details.clone()
    })
}

/// Derive a default subdomain from a business name.
///
/// Non-alphanumeric runs (including non-ASCII letters) become a single
/// hyphen, edges are trimmed, and the result is capped at
/// [`SUBDOMAIN_MAX`] characters.
pub fn suggest_subdomain(business_name: &str) -> String {
    let mut out = String::with_capacity(business_name.len());
    for c in business_name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    // Only ASCII survives the loop above, so byte slicing is safe.
    let capped = &trimmed[..trimmed.len().min(SUBDOMAIN_MAX)];
    capped.trim_end_matches('-').to_string()
}

/// What the subdomain field keeps from a keystroke: lowercase ASCII letters,
/// digits and hyphens.
pub fn sanitize_subdomain_input(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// A selectable country in the phone field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Country {
    pub iso: &'static str,
    pub dial_code: &'static str,
    /// Digit grouping mask; `X` is a digit slot.
    pub format: &'static str,
}

pub const COUNTRIES: &[Country] = &[
    Country { iso: "SA", dial_code: "+966", format: "XX XXX XXXX" },
    Country { iso: "AE", dial_code: "+971", format: "XX XXX XXXX" },
    Country { iso: "EG", dial_code: "+20", format: "XXX XXX XXXX" },
    Country { iso: "JO", dial_code: "+962", format: "X XXXX XXXX" },
    Country { iso: "KW", dial_code: "+965", format: "XXXX XXXX" },
    Country { iso: "BH", dial_code: "+973", format: "XXXX XXXX" },
    Country { iso: "OM", dial_code: "+968", format: "XXXX XXXX" },
    Country { iso: "QA", dial_code: "+974", format: "XXXX XXXX" },
    Country { iso: "LB", dial_code: "+961", format: "XX XXX XXX" },
    Country { iso: "SY", dial_code: "+963", format: "XXX XXX XXX" },
    Country { iso: "IQ", dial_code: "+964", format: "XXX XXX XXXX" },
    Country { iso: "YE", dial_code: "+967", format: "XXX XXX XXX" },
    Country { iso: "LY", dial_code: "+218", format: "XX XXX XXXX" },
    Country { iso: "TN", dial_code: "+216", format: "XX XXX XXX" },
    Country { iso: "DZ", dial_code: "+213", format: "XXX XX XX XX" },
    Country { iso: "MA", dial_code: "+212", format: "XXX XXX XXX" },
    Country { iso: "SD", dial_code: "+249", format: "XX XXX XXXX" },
    Country { iso: "PS", dial_code: "+970", format: "XXX XXX XXX" },
    Country { iso: "TR", dial_code: "+90", format: "XX XXX XXXX" },
];

const FALLBACK_PHONE_FORMAT: &str = "XXX XXX XXXX";

/// Group the digits of `value` using the mask of the country with
/// `dial_code`. Digits beyond the mask are appended unformatted.
pub fn format_phone_number(value: &str, dial_code: &str) -> String {
    let format = COUNTRIES
        .iter()
        .find(|c| c.dial_code == dial_code)
        .map(|c| c.format)
        .unwrap_or(FALLBACK_PHONE_FORMAT);

    let mut digits = value.chars().filter(char::is_ascii_digit).peekable();
    let mut formatted = String::new();

    for slot in format.chars() {
        if digits.peek().is_none() {
            break;
        }
        if slot == 'X' {
            if let Some(d) = digits.next() {
                formatted.push(d);
            }
        } else {
            formatted.push(slot);
        }
    }
    formatted.extend(digits);
    formatted
}

/// Split a stored phone number into dial code and national part.
pub fn split_phone(full: &str) -> (String, String) {
    PHONE_PREFIX_RE
        .captures(full)
        .and_then(|caps| {
            let code = caps.get(1)?.as_str().to_string();
            let number = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            Some((code, number.to_string()))
        })
        .unwrap_or_else(|| (DEFAULT_DIAL_CODE.to_string(), String::new()))
}
