//! Contact CRUD for the caller's firm.
//!
//! Every operation resolves the caller through the [`TenantDirectory`] first, filters by the
//! resolved firm explicitly and then runs the store call as that user, so row policies check the
//! same decision again. A contact that is missing and one that belongs to another firm produce
//! the same `Forbidden`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contacts::ContactFilter;
use crate::error::{AppError, AppResult};
use crate::model::{Contact, ContactPage, ContactPatch, NewContact, Page};
use crate::store::{Actor, Store};
use crate::tenancy::access::{contact_accessible, contact_write_firm};
use crate::tenancy::TenantDirectory;
use crate::validation::Checker;

#[derive(Clone)]
pub struct ContactRepository {
    store: Arc<dyn Store>,
    directory: TenantDirectory,
}

impl ContactRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let directory = TenantDirectory::new(store.clone());
        Self { store, directory }
    }

    /// One page of the caller's firm contacts, newest first.
    pub async fn list_contacts(&self, user_id: Uuid, page: Page) -> AppResult<ContactPage> {
        self.search_contacts(user_id, &ContactFilter::default(), page).await
    }

    /// Like [`list_contacts`](Self::list_contacts), narrowed by `filter` before paging.
    pub async fn search_contacts(&self, user_id: Uuid, filter: &ContactFilter, page: Page) -> AppResult<ContactPage> {
        let me = self.directory.resolve_advisor(user_id).await?;
        let slice = self.store.list_contacts(Actor::User(user_id), me.firm_id(), filter, page).await?;
        debug!(target: "contacts", "list user={} firm={} returned={} matched={} total={}", user_id, me.firm_id(), slice.contacts.len(), slice.matched, slice.total);
        Ok(ContactPage {
            contacts: slice.contacts,
            matched: slice.matched,
            total: slice.total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    pub async fn get_contact(&self, user_id: Uuid, contact_id: Uuid) -> AppResult<Contact> {
        let me = self.directory.resolve_advisor(user_id).await?;
        match self.store.contact(Actor::User(user_id), contact_id).await? {
            Some(c) if contact_accessible(&me, c.firm_id) => Ok(c),
            _ => Err(AppError::not_accessible("contact")),
        }
    }

    pub async fn create_contact(&self, user_id: Uuid, payload: NewContact) -> AppResult<Contact> {
        let me = self.directory.resolve_advisor(user_id).await?;
        let mut check = Checker::new();
        let first_name = check.required("firstName", &payload.first_name);
        let last_name = check.required("lastName", &payload.last_name);
        let email = check.optional_email("email", payload.email.as_deref());
        let phone = check.optional(payload.phone.as_deref());
        check.finish()?;

        let now = Utc::now();
        let contact = Contact {
            id: Uuid::new_v4(),
            firm_id: contact_write_firm(&me, payload.firm_id),
            first_name,
            last_name,
            email,
            phone,
            status: payload.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        let stored = self.store.insert_contact(Actor::User(user_id), contact).await?;
        info!(target: "contacts", "created contact={} firm={} by user={}", stored.id, stored.firm_id, user_id);
        Ok(stored)
    }

    /// Apply `patch` to a contact of the caller's firm. A patch naming another firm is refused.
    pub async fn update_contact(&self, user_id: Uuid, contact_id: Uuid, patch: ContactPatch) -> AppResult<Contact> {
        let current = self.get_contact(user_id, contact_id).await?;
        if let Some(requested) = patch.firm_id.filter(|f| *f != current.firm_id) {
            warn!(target: "contacts", "update_contact: user={} tried to move contact={} to firm={}", user_id, contact_id, requested);
            return Err(AppError::forbidden("forbidden", "contacts cannot be moved between firms"));
        }

        let mut check = Checker::new();
        let mut next = current.clone();
        if let Some(v) = &patch.first_name {
            next.first_name = check.required("firstName", v);
        }
        if let Some(v) = &patch.last_name {
            next.last_name = check.required("lastName", v);
        }
        if let Some(v) = &patch.email {
            next.email = check.optional_email("email", v.as_deref());
        }
        if let Some(v) = &patch.phone {
            next.phone = check.optional(v.as_deref());
        }
        if let Some(s) = patch.status {
            next.status = s;
        }
        check.finish()?;
        next.updated_at = Utc::now();

        let stored = self
            .store
            .update_contact(Actor::User(user_id), next)
            .await?
            .ok_or_else(|| AppError::not_accessible("contact"))?;
        debug!(target: "contacts", "updated contact={} by user={}", stored.id, user_id);
        Ok(stored)
    }

    pub async fn delete_contact(&self, user_id: Uuid, contact_id: Uuid) -> AppResult<()> {
        let current = self.get_contact(user_id, contact_id).await?;
        if !self.store.delete_contact(Actor::User(user_id), current.firm_id, contact_id).await? {
            return Err(AppError::not_accessible("contact"));
        }
        info!(target: "contacts", "deleted contact={} firm={} by user={}", contact_id, current.firm_id, user_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod repository_tests;
