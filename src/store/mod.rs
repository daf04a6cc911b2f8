//!
//! advisorhub store module
//! ------------------------
//! Persistence boundary for firms, advisors and contacts.
//!
//! Every operation names the `Actor` it runs as. `Actor::User` operations are subject to the
//! declarative row policies in [`policy`]; `Actor::Service` is the operator/seed path and
//! bypasses them, the way a database owner bypasses row-level security.
//!
//! Two implementations exist:
//! - [`MemoryStore`]: in-process tables guarded by a `parking_lot::RwLock`, evaluating the
//!   row policies itself. Used by tests and by the server when no endpoint is configured.
//! - `PostgresStore` (feature `postgres`): the same tables in PostgreSQL with the policies
//!   installed as `CREATE POLICY` statements rendered from the same policy table.

use async_trait::async_trait;
use uuid::Uuid;

use crate::contacts::ContactFilter;
use crate::model::{Advisor, Contact, Firm, Page};

pub mod policy;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Principal a store operation runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    /// Operator, seed and provisioning paths. Row policies do not apply.
    Service,
    /// An authenticated identity; row policies are evaluated against this user id.
    User(Uuid),
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Service => None,
            Actor::User(id) => Some(*id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate value for unique field {field}")]
    UniqueViolation { field: String },
    #[error("{field} does not reference an existing row")]
    MissingReference { field: String },
    #[error("new row violates row policy {policy} for {command} on {table}")]
    PolicyViolation { policy: String, table: String, command: String },
    #[error("store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One window of a firm's contacts after filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactSlice {
    pub contacts: Vec<Contact>,
    /// Contacts of the firm that pass the filter, across all pages.
    pub matched: u64,
    /// Contacts of the firm, ignoring the filter.
    pub total: u64,
}

/// Relational store holding the three tenant tables.
///
/// Reads that a row policy hides behave as if the row did not exist (`None`, `false`, or an
/// omitted list entry). Writes whose resulting row fails a policy check return
/// [`StoreError::PolicyViolation`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_firm(&self, actor: Actor, firm: Firm) -> StoreResult<Firm>;
    async fn firm(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Firm>>;
    /// Every visible firm with the number of contacts it holds, in firm creation order.
    async fn firms_with_contact_counts(&self, actor: Actor) -> StoreResult<Vec<(Firm, u64)>>;

    /// Insert the advisor, or replace firm, email, names and role of the row with the same id.
    async fn upsert_advisor(&self, actor: Actor, advisor: Advisor) -> StoreResult<Advisor>;
    async fn advisor(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Advisor>>;
    /// Advisor row joined with its firm; `None` when either side is missing or hidden.
    async fn advisor_with_firm(&self, actor: Actor, id: Uuid) -> StoreResult<Option<(Advisor, Firm)>>;
    /// Advisors of `firm_id`, ordered by last name then first name.
    async fn list_advisors(&self, actor: Actor, firm_id: Uuid) -> StoreResult<Vec<Advisor>>;
    async fn update_advisor(&self, actor: Actor, advisor: Advisor) -> StoreResult<Option<Advisor>>;

    async fn count_contacts(&self, actor: Actor, firm_id: Uuid) -> StoreResult<u64>;
    /// `firm_id`'s contacts passing `filter`, newest first. The filter is applied before the
    /// page window, so `matched` counts every hit and `total` the whole firm.
    async fn list_contacts(&self, actor: Actor, firm_id: Uuid, filter: &ContactFilter, page: Page) -> StoreResult<ContactSlice>;
    async fn contact(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Contact>>;
    async fn insert_contact(&self, actor: Actor, contact: Contact) -> StoreResult<Contact>;
    async fn update_contact(&self, actor: Actor, contact: Contact) -> StoreResult<Option<Contact>>;
    async fn delete_contact(&self, actor: Actor, firm_id: Uuid, id: Uuid) -> StoreResult<bool>;

    /// True when no firm exists yet.
    async fn is_empty(&self) -> StoreResult<bool>;
}
