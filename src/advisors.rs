//! Advisor-facing views: who am I, my firm, my colleagues, and my own profile.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{Advisor, AdvisorPatch, AdvisorWithFirm, Firm};
use crate::store::{Actor, Store};
use crate::tenancy::access::{advisor_mutable, advisor_visible, firm_visible};
use crate::tenancy::TenantDirectory;
use crate::validation::Checker;

#[derive(Clone)]
pub struct AdvisorService {
    store: Arc<dyn Store>,
    directory: TenantDirectory,
}

impl AdvisorService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let directory = TenantDirectory::new(store.clone());
        Self { store, directory }
    }

    pub async fn current_advisor(&self, user_id: Uuid) -> AppResult<AdvisorWithFirm> {
        self.directory.resolve_advisor(user_id).await
    }

    pub async fn firm(&self, user_id: Uuid, firm_id: Uuid) -> AppResult<Firm> {
        let me = self.directory.resolve_advisor(user_id).await?;
        if !firm_visible(&me, firm_id) {
            return Err(AppError::not_accessible("firm"));
        }
        self.store
            .firm(Actor::User(user_id), firm_id)
            .await?
            .ok_or_else(|| AppError::not_accessible("firm"))
    }

    /// Advisors of the caller's firm, by last name then first name.
    pub async fn list_advisors(&self, user_id: Uuid) -> AppResult<Vec<Advisor>> {
        let me = self.directory.resolve_advisor(user_id).await?;
        Ok(self.store.list_advisors(Actor::User(user_id), me.firm_id()).await?)
    }

    pub async fn get_advisor(&self, user_id: Uuid, advisor_id: Uuid) -> AppResult<Advisor> {
        let me = self.directory.resolve_advisor(user_id).await?;
        match self.store.advisor(Actor::User(user_id), advisor_id).await? {
            Some(a) if advisor_visible(&me, &a) => Ok(a),
            _ => Err(AppError::not_accessible("advisor")),
        }
    }

    /// Change the caller's own names. Role, firm and email stay as they are.
    pub async fn update_profile(&self, user_id: Uuid, advisor_id: Uuid, patch: AdvisorPatch) -> AppResult<Advisor> {
        let me = self.directory.resolve_advisor(user_id).await?;
        if !advisor_mutable(&me, advisor_id) {
            return Err(AppError::forbidden("forbidden", "advisors can only update their own profile"));
        }
        let mut check = Checker::new();
        let mut next = me.advisor().clone();
        if let Some(v) = &patch.first_name {
            next.first_name = check.required("firstName", v);
        }
        if let Some(v) = &patch.last_name {
            next.last_name = check.required("lastName", v);
        }
        check.finish()?;
        next.updated_at = Utc::now();

        let stored = self
            .store
            .update_advisor(Actor::User(user_id), next)
            .await?
            .ok_or_else(|| AppError::not_accessible("advisor"))?;
        info!(target: "tenancy", "advisor {} updated own profile", stored.id);
        Ok(stored)
    }
}
