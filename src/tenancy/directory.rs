use std::sync::Arc;

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::AdvisorWithFirm;
use crate::store::{Actor, Store};

/// Maps an identity-provider user id to its advisor row and firm.
#[derive(Clone)]
pub struct TenantDirectory {
    store: Arc<dyn Store>,
}

impl TenantDirectory {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Like [`resolve_advisor`](Self::resolve_advisor) but reports "no advisor row" as `None`.
    pub async fn lookup(&self, user_id: Uuid) -> AppResult<Option<AdvisorWithFirm>> {
        let Some((advisor, firm)) = self.store.advisor_with_firm(Actor::User(user_id), user_id).await? else {
            debug!(target: "tenancy", "resolve user={} -> not registered", user_id);
            return Ok(None);
        };
        match AdvisorWithFirm::new(advisor, firm) {
            Some(joined) => {
                debug!(target: "tenancy", "resolve user={} -> firm={}", user_id, joined.firm_id());
                Ok(Some(joined))
            }
            None => {
                error!(target: "tenancy", "advisor {} joined to a firm it does not reference", user_id);
                Err(AppError::internal("tenant_mismatch", "internal error"))
            }
        }
    }

    /// The advisor (and firm) for `user_id`, or `NotRegistered` when the identity has no
    /// advisor row yet.
    pub async fn resolve_advisor(&self, user_id: Uuid) -> AppResult<AdvisorWithFirm> {
        self.lookup(user_id).await?.ok_or_else(AppError::not_registered)
    }
}
