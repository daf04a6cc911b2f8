use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::principal::{normalize_email, Principal};
use crate::error::{AppError, AppResult, FieldError};
use crate::security::{hash_password, verify_password};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIdentity {
    pub principal: Principal,
    /// The email already had an identity; it was reused and its password left unchanged.
    pub reused: bool,
}

/// Boundary to the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, req: &LoginRequest) -> AppResult<Principal>;
    async fn create_or_reuse(&self, email: &str, password: &str) -> AppResult<CreatedIdentity>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Principal>>;
}

#[derive(Debug, Clone)]
struct LocalUser {
    id: Uuid,
    email: String,
    password_hash: String,
}

/// Argon2-backed identity store kept in memory. Emails are case-insensitive.
#[derive(Default)]
pub struct LocalIdentityProvider {
    users: RwLock<HashMap<String, LocalUser>>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self { Self::default() }
}

fn invalid_credentials() -> AppError {
    AppError::unauthenticated("invalid_credentials", "invalid email or password")
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn authenticate(&self, req: &LoginRequest) -> AppResult<Principal> {
        let email = normalize_email(&req.email);
        let user = self.users.read().get(&email).cloned();
        let Some(user) = user else { return Err(invalid_credentials()) };
        if !verify_password(&user.password_hash, &req.password) {
            debug!(target: "http", "auth.login rejected email={} ip={:?}", email, req.ip);
            return Err(invalid_credentials());
        }
        debug!(target: "http", "auth.login user={} ip={:?}", user.id, req.ip);
        Ok(Principal { user_id: user.id, email: user.email })
    }

    async fn create_or_reuse(&self, email: &str, password: &str) -> AppResult<CreatedIdentity> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::validation(vec![FieldError::new("email", "required")]));
        }
        if password.is_empty() {
            return Err(AppError::validation(vec![FieldError::new("password", "required")]));
        }
        if let Some(existing) = self.users.read().get(&email) {
            return Ok(CreatedIdentity {
                principal: Principal { user_id: existing.id, email: existing.email.clone() },
                reused: true,
            });
        }
        let password_hash = hash_password(password)?;
        let mut users = self.users.write();
        // Another request may have registered the email between the read and write locks.
        if let Some(existing) = users.get(&email) {
            return Ok(CreatedIdentity {
                principal: Principal { user_id: existing.id, email: existing.email.clone() },
                reused: true,
            });
        }
        let user = LocalUser { id: Uuid::new_v4(), email: email.clone(), password_hash };
        users.insert(email.clone(), user.clone());
        info!(target: "provisioning", "identity created user={}", user.id);
        Ok(CreatedIdentity { principal: Principal { user_id: user.id, email }, reused: false })
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Principal>> {
        let email = normalize_email(email);
        Ok(self
            .users
            .read()
            .get(&email)
            .map(|u| Principal { user_id: u.id, email: u.email.clone() }))
    }
}
