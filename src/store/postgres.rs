//! PostgreSQL implementation of [`Store`] (feature `postgres`).
//!
//! Scoped operations run inside a transaction that switches to [`APP_ROLE`] and sets
//! [`CURRENT_USER_SETTING`], so the database evaluates the row policies rendered by
//! [`policy_ddl`]. Queries still carry explicit `firm_id` predicates; the policies are the
//! second layer, not the only one.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Transaction};
use tracing::{error, info};
use uuid::Uuid;

use super::policy::{policy_ddl, violated_policy_name, Command, Table, APP_ROLE, CURRENT_USER_SETTING};
use super::{Actor, ContactSlice, Store, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::contacts::ContactFilter;
use crate::model::{Advisor, Contact, Firm, Page};

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

const FIRM_COLS: &str = "id, name, slug, created_at, updated_at";
const ADVISOR_COLS: &str = "id, firm_id, email, first_name, last_name, role::text AS role, created_at, updated_at";
const CONTACT_COLS: &str = "id, firm_id, first_name, last_name, email, phone, status::text AS status, created_at, updated_at";

/// Search predicate over `$2` (lowercased needle, empty matches all) and `$3` (status or NULL).
const CONTACT_MATCH: &str = "($2 = '' \
     OR strpos(lower(first_name), $2) > 0 OR strpos(lower(last_name), $2) > 0 \
     OR strpos(lower(coalesce(email, '')), $2) > 0 OR strpos(lower(coalesce(phone, '')), $2) > 0) \
     AND ($3::text IS NULL OR status::text = $3)";

fn field_for_constraint(constraint: &str) -> String {
    match constraint {
        "firms_slug_key" => "slug".into(),
        "advisors_email_key" | "contacts_email_key" => "email".into(),
        "firms_pkey" | "advisors_pkey" | "contacts_pkey" => "id".into(),
        other => other.to_string(),
    }
}

/// Error mapper for one (table, command) so policy rejections name the right policy.
fn pg_err(table: Table, command: Command) -> impl Fn(tokio_postgres::Error) -> StoreError {
    move |e: tokio_postgres::Error| {
        if e.is_closed() {
            return StoreError::Unavailable(e.to_string());
        }
        if let Some(db) = e.as_db_error() {
            let code = db.code();
            if code == &SqlState::UNIQUE_VIOLATION {
                return StoreError::UniqueViolation { field: field_for_constraint(db.constraint().unwrap_or("")) };
            }
            if code == &SqlState::FOREIGN_KEY_VIOLATION {
                return StoreError::MissingReference { field: "firmId".into() };
            }
            if code == &SqlState::INSUFFICIENT_PRIVILEGE {
                return StoreError::PolicyViolation {
                    policy: violated_policy_name(table, command),
                    table: table.name().to_string(),
                    command: command.name().to_string(),
                };
            }
            return StoreError::Backend(db.message().to_string());
        }
        let io = std::error::Error::source(&e).and_then(|s| s.downcast_ref::<std::io::Error>()).is_some();
        if io {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

fn firm_from_row(r: &Row) -> Result<Firm, tokio_postgres::Error> {
    Ok(Firm {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        slug: r.try_get("slug")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn advisor_from_row(r: &Row) -> StoreResult<Advisor> {
    let err = pg_err(Table::Advisors, Command::Select);
    let role: String = r.try_get("role").map_err(&err)?;
    Ok(Advisor {
        id: r.try_get("id").map_err(&err)?,
        firm_id: r.try_get("firm_id").map_err(&err)?,
        email: r.try_get("email").map_err(&err)?,
        first_name: r.try_get("first_name").map_err(&err)?,
        last_name: r.try_get("last_name").map_err(&err)?,
        role: role.parse().map_err(StoreError::Backend)?,
        created_at: r.try_get("created_at").map_err(&err)?,
        updated_at: r.try_get("updated_at").map_err(&err)?,
    })
}

fn contact_from_row(r: &Row) -> StoreResult<Contact> {
    let err = pg_err(Table::Contacts, Command::Select);
    let status: String = r.try_get("status").map_err(&err)?;
    Ok(Contact {
        id: r.try_get("id").map_err(&err)?,
        firm_id: r.try_get("firm_id").map_err(&err)?,
        first_name: r.try_get("first_name").map_err(&err)?,
        last_name: r.try_get("last_name").map_err(&err)?,
        email: r.try_get("email").map_err(&err)?,
        phone: r.try_get("phone").map_err(&err)?,
        status: status.parse().map_err(StoreError::Backend)?,
        created_at: r.try_get("created_at").map_err(&err)?,
        updated_at: r.try_get("updated_at").map_err(&err)?,
    })
}

/// Open a transaction running as `actor`.
async fn begin(client: &mut Client, actor: Actor) -> Result<Transaction<'_>, tokio_postgres::Error> {
    let tx = client.transaction().await?;
    if let Actor::User(uid) = actor {
        tx.batch_execute(&format!("SET LOCAL ROLE {}", APP_ROLE)).await?;
        tx.execute("SELECT set_config($1, $2, true)", &[&CURRENT_USER_SETTING, &uid.to_string()]).await?;
    }
    Ok(tx)
}

pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    pub async fn connect(cfg: &StoreConfig) -> StoreResult<Self> {
        let Some(endpoint) = cfg.endpoint.as_deref() else {
            return Err(StoreError::Backend("no database endpoint configured".into()));
        };
        let mut pg: tokio_postgres::Config = endpoint
            .parse()
            .map_err(|e: tokio_postgres::Error| StoreError::Backend(format!("invalid database url: {}", e)))?;
        if let Some(c) = &cfg.credentials {
            pg.user(&c.user);
            pg.password(&c.password);
        }
        let (client, conn) = pg.connect(NoTls).await.map_err(pg_err(Table::Firms, Command::Select))?;
        // drive the connection in background
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                error!(target: "store", "postgres connection error: {}", e);
            }
        });
        Ok(Self { client: Mutex::new(client) })
    }

    /// Create types, tables, helper functions and row policies. Safe to run repeatedly.
    pub async fn migrate(&self) -> StoreResult<()> {
        let client = self.client.lock().await;
        let err = pg_err(Table::Firms, Command::Select);
        client.batch_execute(SCHEMA_SQL).await.map_err(&err)?;
        client.batch_execute(&policy_ddl()).await.map_err(&err)?;
        info!(target: "store", "postgres schema and row policies installed");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_firm(&self, actor: Actor, firm: Firm) -> StoreResult<Firm> {
        let err = pg_err(Table::Firms, Command::Insert);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let sql = format!(
            "INSERT INTO firms (id, name, slug, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            FIRM_COLS
        );
        let row = tx
            .query_one(&sql, &[&firm.id, &firm.name, &firm.slug, &firm.created_at, &firm.updated_at])
            .await
            .map_err(&err)?;
        let out = firm_from_row(&row).map_err(&err)?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn firm(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Firm>> {
        let err = pg_err(Table::Firms, Command::Select);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let row = tx
            .query_opt(&format!("SELECT {} FROM firms WHERE id = $1", FIRM_COLS), &[&id])
            .await
            .map_err(&err)?;
        let out = row.as_ref().map(firm_from_row).transpose().map_err(&err)?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn firms_with_contact_counts(&self, actor: Actor) -> StoreResult<Vec<(Firm, u64)>> {
        let err = pg_err(Table::Firms, Command::Select);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let rows = tx
            .query(
                "SELECT f.id, f.name, f.slug, f.created_at, f.updated_at, \
                 (SELECT COUNT(*) FROM contacts c WHERE c.firm_id = f.id) AS contact_count \
                 FROM firms f ORDER BY f.created_at, f.seq",
                &[],
            )
            .await
            .map_err(&err)?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows.iter() {
            let n: i64 = r.try_get("contact_count").map_err(&err)?;
            out.push((firm_from_row(r).map_err(&err)?, n.max(0) as u64));
        }
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn upsert_advisor(&self, actor: Actor, advisor: Advisor) -> StoreResult<Advisor> {
        let err = pg_err(Table::Advisors, Command::Insert);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let sql = format!(
            "INSERT INTO advisors (id, firm_id, email, first_name, last_name, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6::text::advisor_role, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET firm_id = EXCLUDED.firm_id, email = EXCLUDED.email, \
             first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, role = EXCLUDED.role, \
             updated_at = EXCLUDED.updated_at RETURNING {}",
            ADVISOR_COLS
        );
        let row = tx
            .query_one(
                &sql,
                &[
                    &advisor.id,
                    &advisor.firm_id,
                    &advisor.email,
                    &advisor.first_name,
                    &advisor.last_name,
                    &advisor.role.as_str(),
                    &advisor.created_at,
                    &advisor.updated_at,
                ],
            )
            .await
            .map_err(&err)?;
        let out = advisor_from_row(&row)?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn advisor(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Advisor>> {
        let err = pg_err(Table::Advisors, Command::Select);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let row = tx
            .query_opt(&format!("SELECT {} FROM advisors WHERE id = $1", ADVISOR_COLS), &[&id])
            .await
            .map_err(&err)?;
        let out = row.as_ref().map(advisor_from_row).transpose()?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn advisor_with_firm(&self, actor: Actor, id: Uuid) -> StoreResult<Option<(Advisor, Firm)>> {
        let err = pg_err(Table::Advisors, Command::Select);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let row = tx
            .query_opt(
                "SELECT a.id, a.firm_id, a.email, a.first_name, a.last_name, a.role::text AS role, \
                 a.created_at, a.updated_at, f.name AS firm_name, f.slug AS firm_slug, \
                 f.created_at AS firm_created_at, f.updated_at AS firm_updated_at \
                 FROM advisors a JOIN firms f ON f.id = a.firm_id WHERE a.id = $1",
                &[&id],
            )
            .await
            .map_err(&err)?;
        let out = match row {
            None => None,
            Some(r) => {
                let advisor = advisor_from_row(&r)?;
                let firm = Firm {
                    id: advisor.firm_id,
                    name: r.try_get("firm_name").map_err(&err)?,
                    slug: r.try_get("firm_slug").map_err(&err)?,
                    created_at: r.try_get("firm_created_at").map_err(&err)?,
                    updated_at: r.try_get("firm_updated_at").map_err(&err)?,
                };
                Some((advisor, firm))
            }
        };
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn list_advisors(&self, actor: Actor, firm_id: Uuid) -> StoreResult<Vec<Advisor>> {
        let err = pg_err(Table::Advisors, Command::Select);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let rows = tx
            .query(
                &format!("SELECT {} FROM advisors WHERE firm_id = $1 ORDER BY last_name, first_name, id", ADVISOR_COLS),
                &[&firm_id],
            )
            .await
            .map_err(&err)?;
        let out = rows.iter().map(advisor_from_row).collect::<StoreResult<Vec<_>>>()?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn update_advisor(&self, actor: Actor, advisor: Advisor) -> StoreResult<Option<Advisor>> {
        let err = pg_err(Table::Advisors, Command::Update);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let sql = format!(
            "UPDATE advisors SET firm_id = $2, email = $3, first_name = $4, last_name = $5, \
             role = $6::text::advisor_role, updated_at = $7 WHERE id = $1 RETURNING {}",
            ADVISOR_COLS
        );
        let row = tx
            .query_opt(
                &sql,
                &[
                    &advisor.id,
                    &advisor.firm_id,
                    &advisor.email,
                    &advisor.first_name,
                    &advisor.last_name,
                    &advisor.role.as_str(),
                    &advisor.updated_at,
                ],
            )
            .await
            .map_err(&err)?;
        let out = row.as_ref().map(advisor_from_row).transpose()?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn count_contacts(&self, actor: Actor, firm_id: Uuid) -> StoreResult<u64> {
        let err = pg_err(Table::Contacts, Command::Select);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let row = tx
            .query_one("SELECT COUNT(*) AS n FROM contacts WHERE firm_id = $1", &[&firm_id])
            .await
            .map_err(&err)?;
        let n: i64 = row.try_get("n").map_err(&err)?;
        tx.commit().await.map_err(&err)?;
        Ok(n.max(0) as u64)
    }

    async fn list_contacts(&self, actor: Actor, firm_id: Uuid, filter: &ContactFilter, page: Page) -> StoreResult<ContactSlice> {
        let err = pg_err(Table::Contacts, Command::Select);
        let needle = filter.needle();
        let status = filter.status_name();
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let sql = format!(
            "SELECT {} FROM contacts WHERE firm_id = $1 AND {} ORDER BY created_at DESC, seq DESC LIMIT $4 OFFSET $5",
            CONTACT_COLS, CONTACT_MATCH
        );
        let rows = tx
            .query(&sql, &[&firm_id, &needle, &status, &(page.limit as i64), &(page.offset as i64)])
            .await
            .map_err(&err)?;
        let contacts = rows.iter().map(contact_from_row).collect::<StoreResult<Vec<_>>>()?;
        let counts = tx
            .query_one(
                &format!(
                    "SELECT COUNT(*) FILTER (WHERE {}) AS matched, COUNT(*) AS total FROM contacts WHERE firm_id = $1",
                    CONTACT_MATCH
                ),
                &[&firm_id, &needle, &status],
            )
            .await
            .map_err(&err)?;
        let matched: i64 = counts.try_get("matched").map_err(&err)?;
        let total: i64 = counts.try_get("total").map_err(&err)?;
        tx.commit().await.map_err(&err)?;
        Ok(ContactSlice { contacts, matched: matched.max(0) as u64, total: total.max(0) as u64 })
    }

    async fn contact(&self, actor: Actor, id: Uuid) -> StoreResult<Option<Contact>> {
        let err = pg_err(Table::Contacts, Command::Select);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let row = tx
            .query_opt(&format!("SELECT {} FROM contacts WHERE id = $1", CONTACT_COLS), &[&id])
            .await
            .map_err(&err)?;
        let out = row.as_ref().map(contact_from_row).transpose()?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn insert_contact(&self, actor: Actor, contact: Contact) -> StoreResult<Contact> {
        let err = pg_err(Table::Contacts, Command::Insert);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let sql = format!(
            "INSERT INTO contacts (id, firm_id, first_name, last_name, email, phone, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7::text::contact_status, $8, $9) RETURNING {}",
            CONTACT_COLS
        );
        let row = tx
            .query_one(
                &sql,
                &[
                    &contact.id,
                    &contact.firm_id,
                    &contact.first_name,
                    &contact.last_name,
                    &contact.email,
                    &contact.phone,
                    &contact.status.as_str(),
                    &contact.created_at,
                    &contact.updated_at,
                ],
            )
            .await
            .map_err(&err)?;
        let out = contact_from_row(&row)?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn update_contact(&self, actor: Actor, contact: Contact) -> StoreResult<Option<Contact>> {
        let err = pg_err(Table::Contacts, Command::Update);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let sql = format!(
            "UPDATE contacts SET firm_id = $2, first_name = $3, last_name = $4, email = $5, phone = $6, \
             status = $7::text::contact_status, updated_at = $8 WHERE id = $1 RETURNING {}",
            CONTACT_COLS
        );
        let row = tx
            .query_opt(
                &sql,
                &[
                    &contact.id,
                    &contact.firm_id,
                    &contact.first_name,
                    &contact.last_name,
                    &contact.email,
                    &contact.phone,
                    &contact.status.as_str(),
                    &contact.updated_at,
                ],
            )
            .await
            .map_err(&err)?;
        let out = row.as_ref().map(contact_from_row).transpose()?;
        tx.commit().await.map_err(&err)?;
        Ok(out)
    }

    async fn delete_contact(&self, actor: Actor, firm_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let err = pg_err(Table::Contacts, Command::Delete);
        let mut client = self.client.lock().await;
        let tx = begin(&mut client, actor).await.map_err(&err)?;
        let n = tx
            .execute("DELETE FROM contacts WHERE id = $1 AND firm_id = $2", &[&id, &firm_id])
            .await
            .map_err(&err)?;
        tx.commit().await.map_err(&err)?;
        Ok(n > 0)
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        let err = pg_err(Table::Firms, Command::Select);
        let client = self.client.lock().await;
        let row = client
            .query_one("SELECT NOT EXISTS (SELECT 1 FROM firms) AS empty", &[])
            .await
            .map_err(&err)?;
        row.try_get("empty").map_err(&err)
    }
}
