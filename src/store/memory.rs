//! In-process implementation of [`Store`].
//!
//! Tables live behind one `parking_lot::RwLock`; the lock is never held across an await.
//! Row policies are evaluated on every `Actor::User` operation exactly as PostgreSQL would
//! evaluate the generated `CREATE POLICY` statements: hidden rows are invisible to reads,
//! updates and deletes, and inserted or updated rows must pass the policy check.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::policy::{self, Command, PolicyContext, RowRef, Table};
use super::{Actor, ContactSlice, Store, StoreError, StoreResult};
use crate::contacts::ContactFilter;
use crate::model::{Advisor, Contact, Firm, Page};

#[derive(Debug, Clone)]
struct ContactRow {
    seq: u64,
    contact: Contact,
}

#[derive(Debug, Default)]
struct Tables {
    firms: Vec<Firm>,
    advisors: HashMap<Uuid, Advisor>,
    contacts: Vec<ContactRow>,
    next_seq: u64,
}

impl Tables {
    /// Resolve the policy context the way `app_current_firm()` does: straight from the
    /// advisors table, without applying policies to the lookup itself.
    fn context(&self, actor: Actor) -> Option<PolicyContext> {
        let user_id = actor.user_id()?;
        let firm_id = self.advisors.get(&user_id).map(|a| a.firm_id);
        Some(PolicyContext { user_id, firm_id })
    }

    fn firm_exists(&self, id: Uuid) -> bool { self.firms.iter().any(|f| f.id == id) }
}

fn firm_ref(f: &Firm) -> RowRef { RowRef { id: f.id, firm_id: f.id } }
fn advisor_ref(a: &Advisor) -> RowRef { RowRef { id: a.id, firm_id: a.firm_id } }
fn contact_ref(c: &Contact) -> RowRef { RowRef { id: c.id, firm_id: c.firm_id } }

/// `true` for the service actor, otherwise the policy decision.
fn visible(ctx: Option<&PolicyContext>, table: Table, command: Command, row: RowRef) -> bool {
    match ctx {
        None => true,
        Some(c) => policy::permits(table, command, c, row),
    }
}

fn check(ctx: Option<&PolicyContext>, table: Table, command: Command, row: RowRef) -> StoreResult<()> {
    if visible(ctx, table, command, row) {
        return Ok(());
    }
    Err(StoreError::PolicyViolation {
        policy: policy::violated_policy_name(table, command),
        table: table.name().to_string(),
        command: command.name().to_string(),
    })
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Tables::default()), available: AtomicBool::new(true) }
    }

    /// Simulate losing (or regaining) the backing store.
    pub fn set_available(&self, up: bool) {
        self.available.store(up, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_firm(&self, actor: Actor, firm: Firm) -> StoreResult<Firm> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let ctx = t.context(actor);
        check(ctx.as_ref(), Table::Firms, Command::Insert, firm_ref(&firm))?;
        if t.firms.iter().any(|f| f.id == firm.id) {
            return Err(StoreError::UniqueViolation { field: "id".into() });
        }
        if t.firms.iter().any(|f| f.slug == firm.slug) {
            return Err(StoreError::UniqueViolation { field: "slug".into() });
        }
        t.firms.push(firm.clone());
        debug!(target: "store", "memory.insert_firm id={} slug={}", firm.id, firm.slug);
        Ok(firm)
    }

    async fn firm(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Firm>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        Ok(t.firms
            .iter()
            .find(|f| f.id == id && visible(ctx.as_ref(), Table::Firms, Command::Select, firm_ref(f)))
            .cloned())
    }

    async fn firms_with_contact_counts(&self, actor: Actor) -> StoreResult<Vec<(Firm, u64)>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        let out = t
            .firms
            .iter()
            .filter(|f| visible(ctx.as_ref(), Table::Firms, Command::Select, firm_ref(f)))
            .map(|f| {
                let n = t
                    .contacts
                    .iter()
                    .filter(|r| r.contact.firm_id == f.id)
                    .filter(|r| visible(ctx.as_ref(), Table::Contacts, Command::Select, contact_ref(&r.contact)))
                    .count() as u64;
                (f.clone(), n)
            })
            .collect();
        Ok(out)
    }

    async fn upsert_advisor(&self, actor: Actor, advisor: Advisor) -> StoreResult<Advisor> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let ctx = t.context(actor);
        let existing = t.advisors.get(&advisor.id).cloned();
        match &existing {
            Some(old) => {
                if !visible(ctx.as_ref(), Table::Advisors, Command::Update, advisor_ref(old)) {
                    // Conflicting row is hidden from this actor: the upsert cannot proceed.
                    return Err(StoreError::PolicyViolation {
                        policy: policy::violated_policy_name(Table::Advisors, Command::Update),
                        table: Table::Advisors.name().to_string(),
                        command: Command::Update.name().to_string(),
                    });
                }
                check(ctx.as_ref(), Table::Advisors, Command::Update, advisor_ref(&advisor))?;
            }
            None => check(ctx.as_ref(), Table::Advisors, Command::Insert, advisor_ref(&advisor))?,
        }
        if !t.firm_exists(advisor.firm_id) {
            return Err(StoreError::MissingReference { field: "firmId".into() });
        }
        if t.advisors.values().any(|a| a.id != advisor.id && a.email == advisor.email) {
            return Err(StoreError::UniqueViolation { field: "email".into() });
        }
        let stored = match existing {
            Some(old) => Advisor { created_at: old.created_at, ..advisor },
            None => advisor,
        };
        t.advisors.insert(stored.id, stored.clone());
        debug!(target: "store", "memory.upsert_advisor id={} firm={}", stored.id, stored.firm_id);
        Ok(stored)
    }

    async fn advisor(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Advisor>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        Ok(t.advisors
            .get(&id)
            .filter(|a| visible(ctx.as_ref(), Table::Advisors, Command::Select, advisor_ref(a)))
            .cloned())
    }

    async fn advisor_with_firm(&self, actor: Actor, id: Uuid) -> StoreResult<Option<(Advisor, Firm)>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        let Some(advisor) = t
            .advisors
            .get(&id)
            .filter(|a| visible(ctx.as_ref(), Table::Advisors, Command::Select, advisor_ref(a)))
        else {
            return Ok(None);
        };
        let firm = t
            .firms
            .iter()
            .find(|f| f.id == advisor.firm_id && visible(ctx.as_ref(), Table::Firms, Command::Select, firm_ref(f)));
        Ok(firm.map(|f| (advisor.clone(), f.clone())))
    }

    async fn list_advisors(&self, actor: Actor, firm_id: Uuid) -> StoreResult<Vec<Advisor>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        let mut out: Vec<Advisor> = t
            .advisors
            .values()
            .filter(|a| a.firm_id == firm_id)
            .filter(|a| visible(ctx.as_ref(), Table::Advisors, Command::Select, advisor_ref(a)))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id)));
        Ok(out)
    }

    async fn update_advisor(&self, actor: Actor, advisor: Advisor) -> StoreResult<Option<Advisor>> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let ctx = t.context(actor);
        let Some(old) = t.advisors.get(&advisor.id).cloned() else { return Ok(None) };
        if !visible(ctx.as_ref(), Table::Advisors, Command::Update, advisor_ref(&old)) {
            return Ok(None);
        }
        check(ctx.as_ref(), Table::Advisors, Command::Update, advisor_ref(&advisor))?;
        if !t.firm_exists(advisor.firm_id) {
            return Err(StoreError::MissingReference { field: "firmId".into() });
        }
        if t.advisors.values().any(|a| a.id != advisor.id && a.email == advisor.email) {
            return Err(StoreError::UniqueViolation { field: "email".into() });
        }
        let stored = Advisor { created_at: old.created_at, ..advisor };
        t.advisors.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn count_contacts(&self, actor: Actor, firm_id: Uuid) -> StoreResult<u64> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        Ok(t.contacts
            .iter()
            .filter(|r| r.contact.firm_id == firm_id)
            .filter(|r| visible(ctx.as_ref(), Table::Contacts, Command::Select, contact_ref(&r.contact)))
            .count() as u64)
    }

    async fn list_contacts(&self, actor: Actor, firm_id: Uuid, filter: &ContactFilter, page: Page) -> StoreResult<ContactSlice> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        let firm_rows: Vec<&ContactRow> = t
            .contacts
            .iter()
            .filter(|r| r.contact.firm_id == firm_id)
            .filter(|r| visible(ctx.as_ref(), Table::Contacts, Command::Select, contact_ref(&r.contact)))
            .collect();
        let total = firm_rows.len() as u64;
        let mut rows: Vec<&ContactRow> = firm_rows.into_iter().filter(|r| filter.matches(&r.contact)).collect();
        rows.sort_by(|a, b| {
            b.contact.created_at.cmp(&a.contact.created_at).then_with(|| b.seq.cmp(&a.seq))
        });
        let matched = rows.len() as u64;
        let contacts = rows
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|r| r.contact.clone())
            .collect();
        Ok(ContactSlice { contacts, matched, total })
    }

    async fn contact(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Contact>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let ctx = t.context(actor);
        Ok(t.contacts
            .iter()
            .find(|r| r.contact.id == id)
            .filter(|r| visible(ctx.as_ref(), Table::Contacts, Command::Select, contact_ref(&r.contact)))
            .map(|r| r.contact.clone()))
    }

    async fn insert_contact(&self, actor: Actor, contact: Contact) -> StoreResult<Contact> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let ctx = t.context(actor);
        check(ctx.as_ref(), Table::Contacts, Command::Insert, contact_ref(&contact))?;
        if !t.firm_exists(contact.firm_id) {
            return Err(StoreError::MissingReference { field: "firmId".into() });
        }
        if t.contacts.iter().any(|r| r.contact.id == contact.id) {
            return Err(StoreError::UniqueViolation { field: "id".into() });
        }
        if let Some(email) = &contact.email {
            if t.contacts.iter().any(|r| r.contact.email.as_ref() == Some(email)) {
                return Err(StoreError::UniqueViolation { field: "email".into() });
            }
        }
        let seq = t.next_seq;
        t.next_seq += 1;
        t.contacts.push(ContactRow { seq, contact: contact.clone() });
        Ok(contact)
    }

    async fn update_contact(&self, actor: Actor, contact: Contact) -> StoreResult<Option<Contact>> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let ctx = t.context(actor);
        let Some(idx) = t.contacts.iter().position(|r| r.contact.id == contact.id) else { return Ok(None) };
        if !visible(ctx.as_ref(), Table::Contacts, Command::Update, contact_ref(&t.contacts[idx].contact)) {
            return Ok(None);
        }
        check(ctx.as_ref(), Table::Contacts, Command::Update, contact_ref(&contact))?;
        if !t.firm_exists(contact.firm_id) {
            return Err(StoreError::MissingReference { field: "firmId".into() });
        }
        if let Some(email) = &contact.email {
            if t.contacts.iter().any(|r| r.contact.id != contact.id && r.contact.email.as_ref() == Some(email)) {
                return Err(StoreError::UniqueViolation { field: "email".into() });
            }
        }
        let stored = Contact { created_at: t.contacts[idx].contact.created_at, ..contact };
        t.contacts[idx].contact = stored.clone();
        Ok(Some(stored))
    }

    async fn delete_contact(&self, actor: Actor, firm_id: Uuid, id: Uuid) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let ctx = t.context(actor);
        let Some(idx) = t.contacts.iter().position(|r| r.contact.id == id && r.contact.firm_id == firm_id) else {
            return Ok(false);
        };
        if !visible(ctx.as_ref(), Table::Contacts, Command::Delete, contact_ref(&t.contacts[idx].contact)) {
            return Ok(false);
        }
        t.contacts.remove(idx);
        Ok(true)
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        self.ensure_available()?;
        Ok(self.tables.read().firms.is_empty())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
