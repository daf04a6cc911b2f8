//! Field-level payload checks shared by the contact, advisor and provisioning paths.
//! Each helper records a [`FieldError`] instead of failing fast so a response can list every
//! offending field at once.

use crate::error::{AppError, AppResult, FieldError};

#[derive(Debug, Default)]
pub struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    pub fn new() -> Self { Self::default() }

    pub fn fail(&mut self, field: &str, reason: &str) {
        self.errors.push(FieldError::new(field, reason));
    }

    /// Trimmed value of a required text field; blank records `required`.
    pub fn required(&mut self, field: &str, value: &str) -> String {
        let v = value.trim();
        if v.is_empty() {
            self.fail(field, "required");
        }
        v.to_string()
    }

    /// Trimmed value of an optional text field; blank becomes `None`.
    pub fn optional(&mut self, value: Option<&str>) -> Option<String> {
        value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// Optional email; when present it must look like an address.
    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let v = self.optional(value)?;
        if !looks_like_email(&v) {
            self.fail(field, "must be an email address");
        }
        Some(v)
    }

    pub fn required_email(&mut self, field: &str, value: &str) -> String {
        let v = self.required(field, value);
        if !v.is_empty() && !looks_like_email(&v) {
            self.fail(field, "must be an email address");
        }
        v
    }

    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(self.errors))
        }
    }
}

fn looks_like_email(v: &str) -> bool {
    match v.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}
