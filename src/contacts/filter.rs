//! Search and status filter for contact listings.
//!
//! The store applies it to the firm's authorized contacts before paging.

use std::str::FromStr;

use crate::model::{Contact, ContactStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ContactStatus),
}

impl FromStr for StatusFilter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse::<ContactStatus>().map(StatusFilter::Only)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub query: String,
    pub status: StatusFilter,
}

impl ContactFilter {
    pub fn new(query: impl Into<String>, status: StatusFilter) -> Self {
        Self { query: query.into(), status }
    }

    /// Trimmed, lowercased query; empty matches everything.
    pub fn needle(&self) -> String {
        self.query.trim().to_lowercase()
    }

    pub fn status_name(&self) -> Option<&'static str> {
        match self.status {
            StatusFilter::All => None,
            StatusFilter::Only(s) => Some(s.as_str()),
        }
    }

    /// Case-insensitive substring match over names, email and phone, plus the status filter.
    pub fn matches(&self, c: &Contact) -> bool {
        if let StatusFilter::Only(s) = self.status {
            if c.status != s {
                return false;
            }
        }
        let q = self.needle();
        if q.is_empty() {
            return true;
        }
        [Some(c.first_name.as_str()), Some(c.last_name.as_str()), c.email.as_deref(), c.phone.as_deref()]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&q))
    }
}
