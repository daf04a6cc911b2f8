//! Firm co-membership access rules.
//!
//! The pure functions decide over an already resolved [`AdvisorWithFirm`] and are what the
//! repositories call on every operation. [`AccessPolicy`] wraps them in the async, user-id keyed
//! form: it resolves the caller first and answers `false` whenever that fails.
//!
//! These decisions must agree with `store::policy::ROW_POLICIES`; the store enforces the same
//! rules a second time underneath the application.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::TenantDirectory;
use crate::model::{Advisor, AdvisorWithFirm, Contact};
use crate::store::policy::Command;
use crate::store::{Actor, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactOp {
    Select,
    Insert,
    Update,
    Delete,
}

impl ContactOp {
    pub const ALL: [ContactOp; 4] = [ContactOp::Select, ContactOp::Insert, ContactOp::Update, ContactOp::Delete];
}

impl From<ContactOp> for Command {
    fn from(op: ContactOp) -> Self {
        match op {
            ContactOp::Select => Command::Select,
            ContactOp::Insert => Command::Insert,
            ContactOp::Update => Command::Update,
            ContactOp::Delete => Command::Delete,
        }
    }
}

pub fn firm_visible(me: &AdvisorWithFirm, firm_id: Uuid) -> bool {
    me.firm_id() == firm_id
}

/// Own row, or any advisor of the same firm.
pub fn advisor_visible(me: &AdvisorWithFirm, advisor: &Advisor) -> bool {
    advisor.id == me.user_id() || advisor.firm_id == me.firm_id()
}

pub fn advisor_mutable(me: &AdvisorWithFirm, advisor_id: Uuid) -> bool {
    advisor_id == me.user_id()
}

/// Same predicate for every [`ContactOp`].
pub fn contact_accessible(me: &AdvisorWithFirm, contact_firm_id: Uuid) -> bool {
    me.firm_id() == contact_firm_id
}

/// Firm a newly written contact is stored under. Whatever the payload asked for, it is the
/// caller's own firm; a request naming another firm is logged as a forgery attempt.
pub fn contact_write_firm(me: &AdvisorWithFirm, requested: Option<Uuid>) -> Uuid {
    if let Some(forged) = requested.filter(|f| *f != me.firm_id()) {
        warn!(target: "contacts", "user={} supplied firmId={} outside own firm={}; using own firm", me.user_id(), forged, me.firm_id());
    }
    me.firm_id()
}

/// User-id keyed predicates. Every check fails closed when the caller has no advisor row or
/// the store cannot be reached.
#[derive(Clone)]
pub struct AccessPolicy {
    store: Arc<dyn Store>,
    directory: TenantDirectory,
}

impl AccessPolicy {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let directory = TenantDirectory::new(store.clone());
        Self { store, directory }
    }

    async fn me(&self, user_id: Uuid) -> Option<AdvisorWithFirm> {
        match self.directory.lookup(user_id).await {
            Ok(found) => found,
            Err(e) => {
                debug!(target: "tenancy", "access check for user={} failed closed: {}", user_id, e);
                None
            }
        }
    }

    pub async fn can_view_firm(&self, user_id: Uuid, firm_id: Uuid) -> bool {
        self.me(user_id).await.is_some_and(|me| firm_visible(&me, firm_id))
    }

    pub async fn can_view_advisor(&self, user_id: Uuid, advisor_id: Uuid) -> bool {
        let Some(me) = self.me(user_id).await else { return false };
        if advisor_mutable(&me, advisor_id) {
            return true;
        }
        match self.store.advisor(Actor::User(user_id), advisor_id).await {
            Ok(Some(target)) => advisor_visible(&me, &target),
            _ => false,
        }
    }

    pub async fn can_mutate_advisor(&self, user_id: Uuid, advisor_id: Uuid) -> bool {
        self.me(user_id).await.is_some_and(|me| advisor_mutable(&me, advisor_id))
    }

    pub async fn can_access_contact(&self, user_id: Uuid, contact: &Contact, op: ContactOp) -> bool {
        let allowed = self.me(user_id).await.is_some_and(|me| contact_accessible(&me, contact.firm_id));
        debug!(target: "tenancy", "contact access user={} contact={} op={:?} allowed={}", user_id, contact.id, op, allowed);
        allowed
    }
}
