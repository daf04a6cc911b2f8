//! Tenant data model: firms, advisors and contacts.
//!
//! A firm is the unit of isolation. Advisors and contacts each carry exactly one `firm_id`.
//! JSON uses camelCase field names and lowercase enum values.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Default number of contacts returned when the caller does not ask for a page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
/// Upper bound for a single page; larger requests are clamped and the clamped value is reported.
pub const MAX_PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorRole {
    Owner,
    #[default]
    Advisor,
    Assistant,
}

impl AdvisorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisorRole::Owner => "owner",
            AdvisorRole::Advisor => "advisor",
            AdvisorRole::Assistant => "assistant",
        }
    }
}

impl FromStr for AdvisorRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(AdvisorRole::Owner),
            "advisor" => Ok(AdvisorRole::Advisor),
            "assistant" => Ok(AdvisorRole::Assistant),
            other => Err(format!("unknown advisor role '{}'", other)),
        }
    }
}

impl Display for AdvisorRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Prospect,
    Active,
    Inactive,
    Former,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 4] = [
        ContactStatus::Prospect,
        ContactStatus::Active,
        ContactStatus::Inactive,
        ContactStatus::Former,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Prospect => "prospect",
            ContactStatus::Active => "active",
            ContactStatus::Inactive => "inactive",
            ContactStatus::Former => "former",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prospect" => Ok(ContactStatus::Prospect),
            "active" => Ok(ContactStatus::Active),
            "inactive" => Ok(ContactStatus::Inactive),
            "former" => Ok(ContactStatus::Former),
            other => Err(format!("unknown contact status '{}'", other)),
        }
    }
}

impl Display for ContactStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firm {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Firm {
    pub fn new(id: Uuid, name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self { id, name: name.into(), slug: slug.into(), created_at: now, updated_at: now }
    }
}

/// A firm-scoped user account. `id` is the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisor {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: AdvisorRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An advisor joined with the firm it belongs to.
///
/// Only the tenant directory builds these; `new` refuses a pair whose firm ids disagree so a
/// mismatched join can never be mistaken for a tenant membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorWithFirm {
    #[serde(flatten)]
    advisor: Advisor,
    firm: Firm,
}

impl AdvisorWithFirm {
    pub fn new(advisor: Advisor, firm: Firm) -> Option<Self> {
        if advisor.firm_id != firm.id { return None; }
        Some(Self { advisor, firm })
    }

    pub fn user_id(&self) -> Uuid { self.advisor.id }
    pub fn firm_id(&self) -> Uuid { self.firm.id }
    pub fn advisor(&self) -> &Advisor { &self.advisor }
    pub fn firm(&self) -> &Firm { &self.firm }

}

/// Create-contact payload. `firm_id` is accepted so forged values can be detected, but the
/// repository always persists the caller's own firm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    #[serde(default)]
    pub firm_id: Option<Uuid>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<ContactStatus>,
}

/// Partial contact update. For `email` and `phone` an absent key leaves the value alone and an
/// explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPatch {
    #[serde(default)]
    pub firm_id: Option<Uuid>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<ContactStatus>,
}

/// Own-profile update. Role, firm and email are deliberately not part of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorPatch {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Explicit page request for contact listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self { Self { limit: DEFAULT_PAGE_LIMIT, offset: 0 } }
}

impl Page {
    /// Build a page from optional query parameters, clamping the limit to `1..=MAX_PAGE_LIMIT`.
    pub fn from_params(limit: Option<u32>, offset: Option<u32>) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        Self { limit, offset: offset.unwrap_or(0) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    /// Contacts matching the search across all pages.
    pub matched: u64,
    /// Number of contacts the firm holds in total, independent of the page window.
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}
