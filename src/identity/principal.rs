use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated identity, as returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
}

/// Emails are compared trimmed and lowercased everywhere identities are looked up.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
