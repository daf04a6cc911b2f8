use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::principal::Principal;
use crate::security::random_token;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    /// Must accompany every state-changing request as `x-csrf-token`.
    pub csrf_token: String,
    pub principal: Principal,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

pub struct SessionManager {
    pub ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, Session>>,
    user_index: RwLock<HashMap<Uuid, HashSet<SessionToken>>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: RwLock::new(HashMap::new()), user_index: RwLock::new(HashMap::new()) }
    }

    pub fn issue(&self, principal: Principal) -> Result<Session> {
        let now = Instant::now();
        self.sweep_expired(now);
        let sess = Session {
            session_id: random_token()?,
            token: random_token()?,
            csrf_token: random_token()?,
            principal: principal.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(sess.token.clone(), sess.clone());
        self.user_index.write().entry(principal.user_id).or_default().insert(sess.token.clone());
        debug!(target: "http", "session.issue user={} sid={} ttl_secs={}", principal.user_id, sess.session_id, self.ttl.as_secs());
        Ok(sess)
    }

    /// Drop every session that expired before `now`, including its user index entry.
    fn sweep_expired(&self, now: Instant) -> usize {
        let mut dropped = Vec::new();
        self.sessions.write().retain(|token, s| {
            let live = s.expires_at > now;
            if !live {
                dropped.push((s.principal.user_id, token.clone()));
            }
            live
        });
        if dropped.is_empty() {
            return 0;
        }
        let mut idx = self.user_index.write();
        for (user_id, token) in &dropped {
            if let Some(set) = idx.get_mut(user_id) {
                set.remove(token);
                if set.is_empty() {
                    idx.remove(user_id);
                }
            }
        }
        debug!(target: "http", "session.sweep dropped={}", dropped.len());
        dropped.len()
    }

    /// The live session for `token`; expired sessions are dropped on sight.
    pub fn validate(&self, token: &str) -> Option<Session> {
        let now = Instant::now();
        let expired = {
            let map = self.sessions.read();
            match map.get(token) {
                Some(s) if s.expires_at > now => return Some(s.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.logout(token);
        }
        None
    }

    /// Sign out one session. Returns whether a session was removed.
    pub fn logout(&self, token: &str) -> bool {
        let Some(sess) = self.sessions.write().remove(token) else { return false };
        let mut idx = self.user_index.write();
        if let Some(set) = idx.get_mut(&sess.principal.user_id) {
            set.remove(token);
            if set.is_empty() {
                idx.remove(&sess.principal.user_id);
            }
        }
        true
    }

    /// Sign out every session of a user.
    pub fn revoke_user(&self, user_id: Uuid) -> usize {
        let tokens = self.user_index.write().remove(&user_id).unwrap_or_default();
        let mut sessions = self.sessions.write();
        let count = tokens.iter().filter(|t| sessions.remove(*t).is_some()).count();
        debug!(target: "http", "session.revoke user={} count={}", user_id, count);
        count
    }
}
