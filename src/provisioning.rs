//! Administrative advisor provisioning.
//!
//! Creates (or reuses) an identity and attaches it to an existing firm as an advisor. These
//! paths run as the service actor and are refused outright in production.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Environment;
use crate::error::{AppError, AppResult};
use crate::identity::{normalize_email, IdentityProvider};
use crate::model::{Advisor, AdvisorRole, Firm};
use crate::store::{Actor, Store};
use crate::validation::Checker;

pub const TEST_ADVISOR_EMAIL: &str = "test@example.com";
pub const TEST_ADVISOR_PASSWORD: &str = "password123";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
    /// Kept as text so a malformed id is reported as a field error.
    #[serde(default)]
    pub firm_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedAdvisor {
    pub advisor: Advisor,
    pub firm: Firm,
    pub firm_contact_count: u64,
    pub identity_reused: bool,
    /// Firm the advisor belonged to before this call, when it was a different one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_from_firm: Option<Uuid>,
}

#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
    environment: Environment,
}

impl Provisioner {
    pub fn new(store: Arc<dyn Store>, identity: Arc<dyn IdentityProvider>, environment: Environment) -> Self {
        Self { store, identity, environment }
    }

    fn ensure_enabled(&self) -> AppResult<()> {
        if self.environment.allows_provisioning() {
            return Ok(());
        }
        warn!(target: "provisioning", "provisioning request refused in {}", self.environment);
        Err(AppError::forbidden("provisioning_disabled", "advisor creation is not allowed in production"))
    }

    pub async fn provision_advisor(&self, req: ProvisionRequest) -> AppResult<ProvisionedAdvisor> {
        self.ensure_enabled()?;

        let mut check = Checker::new();
        let email = check.required_email("email", &req.email);
        let first_name = check.required("firstName", &req.first_name);
        let last_name = check.required("lastName", &req.last_name);
        if req.password.is_empty() {
            check.fail("password", "required");
        }
        let firm_text = check.required("firmId", &req.firm_id);
        let firm_id = if firm_text.is_empty() {
            None
        } else {
            let parsed = Uuid::parse_str(&firm_text).ok();
            if parsed.is_none() {
                check.fail("firmId", "must be a UUID");
            }
            parsed
        };
        check.finish()?;
        let Some(firm_id) = firm_id else {
            return Err(AppError::invalid_field("firmId", "required"));
        };

        let identity = self.identity.create_or_reuse(&email, &req.password).await?;
        let firm = self
            .store
            .firm(Actor::Service, firm_id)
            .await?
            .ok_or_else(|| AppError::invalid_field("firmId", "unknown firm"))?;

        let moved_from_firm = self
            .store
            .advisor(Actor::Service, identity.principal.user_id)
            .await?
            .map(|prev| prev.firm_id)
            .filter(|prev| *prev != firm.id);

        let now = Utc::now();
        let advisor = Advisor {
            id: identity.principal.user_id,
            firm_id: firm.id,
            email: normalize_email(&email),
            first_name,
            last_name,
            role: AdvisorRole::Advisor,
            created_at: now,
            updated_at: now,
        };
        let advisor = self.store.upsert_advisor(Actor::Service, advisor).await?;
        let firm_contact_count = self.store.count_contacts(Actor::Service, firm.id).await?;
        info!(
            target: "provisioning",
            "advisor {} provisioned in firm {} (identity_reused={}, contacts={})",
            advisor.id, firm.slug, identity.reused, firm_contact_count
        );
        if let Some(prev) = moved_from_firm {
            warn!(target: "provisioning", "advisor {} moved from firm {} to {}", advisor.id, prev, firm.id);
        }
        Ok(ProvisionedAdvisor { advisor, firm, firm_contact_count, identity_reused: identity.reused, moved_from_firm })
    }

    /// Development helper: attach `test@example.com` to the firm holding the most contacts, or
    /// return the test advisor when it already exists.
    pub async fn provision_test_advisor(&self) -> AppResult<ProvisionedAdvisor> {
        self.ensure_enabled()?;

        let known = match self.identity.find_by_email(TEST_ADVISOR_EMAIL).await? {
            Some(principal) => self.store.advisor(Actor::Service, principal.user_id).await?,
            None => None,
        };
        if let Some(existing) = known {
            let firm = self
                .store
                .firm(Actor::Service, existing.firm_id)
                .await?
                .ok_or_else(|| AppError::internal("tenant_mismatch", "internal error"))?;
            let firm_contact_count = self.store.count_contacts(Actor::Service, firm.id).await?;
            info!(target: "provisioning", "test advisor already exists in firm {}", firm.slug);
            return Ok(ProvisionedAdvisor {
                advisor: existing,
                firm,
                firm_contact_count,
                identity_reused: true,
                moved_from_firm: None,
            });
        }

        let mut best: Option<(Firm, u64)> = None;
        for (firm, count) in self.store.firms_with_contact_counts(Actor::Service).await? {
            if best.as_ref().map_or(true, |(_, max)| count > *max) {
                best = Some((firm, count));
            }
        }
        let Some((firm, _)) = best else {
            return Err(AppError::invalid_field("firmId", "no firm exists yet"));
        };
        self.provision_advisor(ProvisionRequest {
            email: TEST_ADVISOR_EMAIL.into(),
            first_name: "Test".into(),
            last_name: "Advisor".into(),
            password: TEST_ADVISOR_PASSWORD.into(),
            firm_id: firm.id.to_string(),
        })
        .await
    }
}
