//! Validation of member registration parameters.
//!
//! Checks run in a fixed order and the first failure wins, so clients always
//! see the most basic problem with their submission first.

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::http::StatusCode;
use regex::Regex;
use thiserror::Error;

/// Fields every registration must supply.
pub const REQUIRED_REGISTRATION_FIELDS: [&str; 6] = [
    "longitude",
    "latitude",
    "email",
    "company",
    "last_name",
    "first_name",
];

/// The only field a registration may carry besides the required ones.
pub const OPTIONAL_PASSWORD_FIELD: &str = "password";

/// Conventional `local@domain` address grammar. Domain labels are 1-63
/// alphanumerics or hyphens and never start or end with a hyphen.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern compiles")
});

/// Reasons a registration is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("The following user fields must be specified: {}.", REQUIRED_REGISTRATION_FIELDS.join(", "))]
    MissingFields,

    #[error("Unexpected parameter{}: {}.", plural_suffix(.0), .0.join(", "))]
    UnexpectedFields(Vec<String>),

    #[error("latitude and longitude must be numbers.")]
    NonNumericCoordinate,

    #[error("latitude must be between -90 and 90.")]
    LatitudeOutOfRange,

    #[error("longitude must be between -180 and 180.")]
    LongitudeOutOfRange,

    #[error("email must be a valid email address.")]
    InvalidEmail,

    #[error("User '{0}' already exists.")]
    AlreadyExists(String),
}

fn plural_suffix(items: &[String]) -> &'static str {
    if items.len() > 1 { "s" } else { "" }
}

impl RegistrationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistrationError::AlreadyExists(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// A registration that passed every field check.
///
/// Uniqueness of the email is checked separately against storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub email: String,
    pub latitude: f64,
    pub longitude: f64,
    /// `None` when the field was omitted or submitted empty. Either way the
    /// member is stored without a digest and cannot log in.
    pub password: Option<String>,
}

/// Validate raw registration form parameters.
///
/// Covers presence, unexpected fields, coordinate parsing and ranges, and the
/// email format.
pub fn validate_registration(
    params: &HashMap<String, String>,
) -> Result<Registration, RegistrationError> {
    let field = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();

    if REQUIRED_REGISTRATION_FIELDS
        .iter()
        .any(|&name| field(name).is_empty())
    {
        return Err(RegistrationError::MissingFields);
    }

    let mut unexpected: Vec<String> = params
        .keys()
        .filter(|key| {
            key.as_str() != OPTIONAL_PASSWORD_FIELD
                && !REQUIRED_REGISTRATION_FIELDS.contains(&key.as_str())
        })
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        unexpected.sort();
        return Err(RegistrationError::UnexpectedFields(unexpected));
    }

    let latitude = parse_degrees(field("latitude"))?;
    let longitude = parse_degrees(field("longitude"))?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(RegistrationError::LatitudeOutOfRange);
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(RegistrationError::LongitudeOutOfRange);
    }

    let email = field("email");
    if !is_valid_email(email) {
        return Err(RegistrationError::InvalidEmail);
    }

    Ok(Registration {
        first_name: field("first_name").to_string(),
        last_name: field("last_name").to_string(),
        company: field("company").to_string(),
        email: email.to_string(),
        latitude,
        longitude,
        password: params
            .get(OPTIONAL_PASSWORD_FIELD)
            .filter(|password| !password.is_empty())
            .cloned(),
    })
}

fn parse_degrees(raw: &str) -> Result<f64, RegistrationError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RegistrationError::NonNumericCoordinate),
    }
}

/// Check an address against the usual `local@domain` grammar.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}
