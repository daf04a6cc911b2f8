use super::{Principal, Session};
use crate::error::{AppError, AppResult};

/// Per-request view of who is calling, built by the HTTP layer from the session cookie.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub session_token: Option<String>,
    csrf_token: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn anonymous(request_id: Option<String>) -> Self {
        Self { request_id, ..Self::default() }
    }

    pub fn from_session(session: &Session, request_id: Option<String>) -> Self {
        Self {
            principal: Some(session.principal.clone()),
            session_token: Some(session.token.clone()),
            csrf_token: Some(session.csrf_token.clone()),
            request_id,
        }
    }

    /// `getCurrentUser()`: the signed-in principal, or `Unauthenticated`.
    pub fn current_user(&self) -> AppResult<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| AppError::unauthenticated("unauthenticated", "Please sign in to continue"))
    }

    /// State-changing requests must echo the session's CSRF token.
    pub fn verify_csrf(&self, provided: Option<&str>) -> AppResult<()> {
        self.current_user()?;
        match (&self.csrf_token, provided) {
            (Some(expected), Some(got)) if expected == got => Ok(()),
            _ => Err(AppError::forbidden("invalid_csrf", "missing or invalid csrf token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SessionManager;
    use uuid::Uuid;

    #[test]
    fn anonymous_context_is_unauthenticated() {
        let ctx = RequestContext::anonymous(Some("req-1".into()));
        assert_eq!(ctx.current_user().unwrap_err().http_status(), 401);
        assert_eq!(ctx.verify_csrf(Some("x")).unwrap_err().http_status(), 401);
    }

    #[test]
    fn csrf_must_match_session() {
        let sm = SessionManager::default();
        let s = sm.issue(Principal { user_id: Uuid::new_v4(), email: "a@b.test".into() }).unwrap();
        let ctx = RequestContext::from_session(&s, None);
        assert_eq!(ctx.current_user().unwrap().user_id, s.principal.user_id);
        assert!(ctx.verify_csrf(Some(&s.csrf_token)).is_ok());
        assert_eq!(ctx.verify_csrf(None).unwrap_err().code_str(), "invalid_csrf");
        assert_eq!(ctx.verify_csrf(Some(&s.token)).unwrap_err().http_status(), 403);
    }
}
