use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, FieldError};

pub const MIN_NAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lowercased, URL-safe form of a display name.
pub fn slugify(name: &str) -> String {
    lazy_static! {
        static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    }
    let lowered = name.trim().to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Collects field-level failures so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, field: &str, message: &str) -> &mut Self {
        self.errors.push(FieldError::new(field, message));
        self
    }

    pub fn name(&mut self, field: &str, value: &str) -> &mut Self {
        let value = value.trim();
        if value.is_empty() {
            self.fail(field, "User required")
        } else if value.chars().count() < MIN_NAME_LEN {
            self.fail(field, "Too short User name")
        } else {
            self
        }
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, "Email required")
        } else if !is_valid_email(value) {
            self.fail(field, "Invalid email address")
        } else {
            self
        }
    }

    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, "Password required")
        } else if value.chars().count() < MIN_PASSWORD_LEN {
            self.fail(field, "Password must be at least 6 characters")
        } else {
            self
        }
    }

    /// `confirm` must be present and equal to `password`.
    pub fn confirmation(&mut self, field: &str, password: &str, confirm: &str) -> &mut Self {
        if confirm.is_empty() {
            self.fail(field, "Password confirmation required")
        } else if password != confirm {
            self.fail(field, "Password Confirmation incorrect")
        } else {
            self
        }
    }

    pub fn required(&mut self, field: &str, value: &str, message: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.fail(field, message)
        } else {
            self
        }
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}
