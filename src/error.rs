//! Unified application error model and mapping helpers.
//! Every failure that reaches the HTTP layer is one of a small closed set of kinds; store
//! errors are folded into it here so raw persistence messages never reach a client.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::error;

use crate::store::StoreError;

/// Where an unregistered identity is sent to become an advisor.
pub const REGISTER_ADVISOR_PATH: &str = "/create-advisor";
/// Where an unauthenticated caller is sent to sign in.
pub const LOGIN_PATH: &str = "/auth/login";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Unauthenticated { code: String, message: String },
    NotRegistered { code: String, message: String },
    Forbidden { code: String, message: String },
    Validation { code: String, message: String, fields: Vec<FieldError> },
    Unavailable { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::NotRegistered { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Validation { code, .. }
            | AppError::Unavailable { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::NotRegistered { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Validation { message, .. }
            | AppError::Unavailable { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn unavailable<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unavailable { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    pub fn not_registered() -> Self {
        AppError::NotRegistered {
            code: "not_registered".into(),
            message: "You need to be registered as an advisor to access this page.".into(),
        }
    }

    /// The single response for "does not exist" and "belongs to another firm".
    pub fn not_accessible(kind: &str) -> Self {
        AppError::Forbidden { code: "forbidden".into(), message: format!("{} not found or not accessible", kind) }
    }

    pub fn validation(fields: Vec<FieldError>) -> Self {
        let names = fields.iter().map(|f| f.field.as_str()).collect::<Vec<_>>().join(", ");
        AppError::Validation { code: "validation_failed".into(), message: format!("invalid fields: {}", names), fields }
    }

    pub fn invalid_field<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::validation(vec![FieldError::new(field, reason)])
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } => 401,
            AppError::NotRegistered { .. } => 403,
            AppError::Forbidden { .. } => 403,
            AppError::Validation { .. } => 400,
            AppError::Unavailable { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Follow-up link surfaced to the presentation layer, if the kind has one.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            AppError::Unauthenticated { .. } => Some(LOGIN_PATH),
            AppError::NotRegistered { .. } => Some(REGISTER_ADVISOR_PATH),
            _ => None,
        }
    }

    pub fn is_not_registered(&self) -> bool { matches!(self, AppError::NotRegistered { .. }) }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(target: "http", "internal error: {:#}", err);
        AppError::internal("internal_error", "internal error")
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => {
                error!(target: "store", "store unavailable: {}", detail);
                AppError::unavailable("store_unavailable", "the data store is currently unavailable")
            }
            StoreError::UniqueViolation { field } => {
                AppError::invalid_field(field, "already in use")
            }
            StoreError::MissingReference { field } => {
                AppError::invalid_field(field, "does not reference an existing record")
            }
            StoreError::PolicyViolation { policy, table, command } => {
                // Row policy caught something the application layer let through.
                error!(target: "store", "row policy rejected write: policy={} table={} command={}", policy, table, command);
                AppError::forbidden("forbidden", "operation not permitted")
            }
            StoreError::Backend(detail) => {
                error!(target: "store", "store error: {}", detail);
                AppError::internal("store_error", "internal error")
            }
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
