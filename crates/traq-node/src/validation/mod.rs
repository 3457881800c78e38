//! # Input Validation
//!
//! Field checks for API request bodies:
//!
//! - User, group and tag names
//! - Display names and passwords
//! - Free-form descriptions
//!
//! Request types implement [`validator::Validate`] by collecting the
//! individual checks into a [`ValidationErrors`]; handlers call
//! `body.validate()?` and the API error type renders the result as a
//! [`ValidationErrorResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use traq_types::USER_NAME_REGEX;
use validator::{ValidationError, ValidationErrors};

/// Group names: any printable characters except whitespace and `@`.
pub static GROUP_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]{1,30}$").expect("Invalid regex"));

/// Names that cannot be registered because routes or mentions use them.
pub static RESERVED_USER_NAMES: Lazy<Vec<&str>> =
    Lazy::new(|| vec!["me", "all", "here", "channel", "traq-system"]);

pub const MAX_DISPLAY_NAME_LENGTH: usize = 32;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_TAG_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 4;
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Validation error response.
#[derive(Debug, Serialize)]
pub struct ValidationErrorResponse {
    pub error: String,
    pub message: String,
    pub details: Vec<FieldError>,
}

/// Field-level validation error.
#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl IntoResponse for ValidationErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

impl From<ValidationErrors> for ValidationErrorResponse {
    fn from(errors: ValidationErrors) -> Self {
        let mut details: Vec<FieldError> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| FieldError {
                    field: field.to_string(),
                    code: e.code.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Validation failed for field '{}'", field)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        let message = details
            .first()
            .map(|d| d.message.clone())
            .unwrap_or_else(|| "Validation failed".to_string());
        ValidationErrorResponse {
            error: "validation_error".to_string(),
            message,
            details,
        }
    }
}

fn error(code: &'static str, message: impl Into<String>) -> ValidationError {
    let message: String = message.into();
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Accumulates per-field results into a [`ValidationErrors`].
#[derive(Debug, Default)]
pub struct Checker {
    errors: ValidationErrors,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, field: &'static str, result: Result<(), ValidationError>) -> Self {
        if let Err(e) = result {
            self.errors.add(field, e);
        }
        self
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Validate a user name.
pub fn validate_user_name(name: &str) -> Result<(), ValidationError> {
    if !USER_NAME_REGEX.is_match(name) {
        return Err(error(
            "pattern",
            "Name must be 1 to 32 letters, numbers, hyphens or underscores",
        ));
    }
    if RESERVED_USER_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(error("reserved", "This name is reserved and cannot be used"));
    }
    Ok(())
}

pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(error(
            "length",
            format!("Display name must be at most {} characters", MAX_DISPLAY_NAME_LENGTH),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Err(error(
            "length",
            format!(
                "Password must be between {} and {} characters",
                MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
            ),
        ));
    }
    if password.chars().any(char::is_control) {
        return Err(error("pattern", "Password cannot contain control characters"));
    }
    Ok(())
}

pub fn validate_group_name(name: &str) -> Result<(), ValidationError> {
    if !GROUP_NAME_REGEX.is_match(name) {
        return Err(error(
            "pattern",
            "Group name must be 1 to 30 characters without spaces or '@'",
        ));
    }
    Ok(())
}

pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    let len = tag.chars().count();
    if len == 0 || len > MAX_TAG_LENGTH {
        return Err(error(
            "length",
            format!("Tag must be between 1 and {} characters", MAX_TAG_LENGTH),
        ));
    }
    if tag.trim() != tag {
        return Err(error("pattern", "Tag cannot start or end with whitespace"));
    }
    Ok(())
}

pub fn validate_description(text: &str) -> Result<(), ValidationError> {
    if text.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(error(
            "length",
            format!("Description must be at most {} characters", MAX_DESCRIPTION_LENGTH),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_user_name() {
        assert!(validate_user_name("alice").is_ok());
        assert!(validate_user_name("BOT_x-1").is_ok());

        assert!(validate_user_name("").is_err());
        assert!(validate_user_name("has space").is_err());
        assert!(validate_user_name(&"a".repeat(33)).is_err());
        assert!(validate_user_name("me").is_err());
        assert!(validate_user_name("ALL").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("traq").is_ok());
        assert!(validate_password("abc").is_err());
        assert!(validate_password(&"x".repeat(73)).is_err());
        assert!(validate_password("pass\nword").is_err());
    }

    #[test]
    fn test_validate_group_and_tag() {
        assert!(validate_group_name("core-team").is_ok());
        assert!(validate_group_name("a b").is_err());
        assert!(validate_group_name("@team").is_err());

        assert!(validate_tag("rustacean").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag(" padded").is_err());
    }

    #[test]
    fn test_checker_collects_fields() {
        let result = Checker::new()
            .check("name", validate_user_name("bad name"))
            .check("password", validate_password("ok-password"))
            .check("displayName", validate_display_name(&"d".repeat(40)))
            .finish();

        let response = ValidationErrorResponse::from(result.unwrap_err());
        let fields: Vec<_> = response.details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["displayName", "name"]);
        assert_eq!(response.error, "validation_error");
    }

    proptest! {
        #[test]
        fn prop_pattern_names_are_accepted(name in "[a-zA-Z0-9_-]{1,32}") {
            prop_assume!(!RESERVED_USER_NAMES.contains(&name.to_lowercase().as_str()));
            prop_assert!(validate_user_name(&name).is_ok());
        }

        #[test]
        fn prop_password_length_bounds(len in 0usize..100) {
            let password = "p".repeat(len);
            let in_range = (MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len);
            prop_assert_eq!(validate_password(&password).is_ok(), in_range);
        }
    }
}
