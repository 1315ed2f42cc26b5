//! Field checks for submitted forms.
//!
//! Every check runs, so a response lists all problems at once.

use warbler_db::models::MAX_MESSAGE_LEN;
use warbler_types::api::{FieldErrors, LoginForm, MessageForm, UserAddForm};

use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 6;

pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

impl Validate for MessageForm {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Errors::default();
        errors.required("text", &self.text);
        errors.max_len("text", &self.text, MAX_MESSAGE_LEN);
        errors.printable("text", &self.text);
        errors.finish()
    }
}

impl Validate for UserAddForm {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Errors::default();
        errors.required("username", &self.username);
        errors.required("email", &self.email);
        errors.email("email", &self.email);
        errors.min_len("password", &self.password, MIN_PASSWORD_LEN);
        errors.finish()
    }
}

impl Validate for LoginForm {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Errors::default();
        errors.required("username", &self.username);
        errors.min_len("password", &self.password, MIN_PASSWORD_LEN);
        errors.finish()
    }
}

/// Optional text field: blank means absent.
pub fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Default)]
struct Errors(FieldErrors);

impl Errors {
    fn add(&mut self, field: &str, message: String) {
        self.0.entry(field.to_string()).or_default().push(message);
    }

    fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "This field is required.".into());
        }
    }

    fn min_len(&mut self, field: &str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.add(field, format!("Field must be at least {min} characters long."));
        }
    }

    fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(field, format!("Field cannot be longer than {max} characters."));
        }
    }

    // Line breaks and tabs are fine; NUL and other control characters are not.
    fn printable(&mut self, field: &str, value: &str) {
        if value.chars().any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
            self.add(field, "Field contains invalid characters.".into());
        }
    }

    // Blank values are left to `required`.
    fn email(&mut self, field: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() && !is_valid_email(value) {
            self.add(field, "Invalid email address.".into());
        }
    }

    fn finish(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.0))
        }
    }
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}
