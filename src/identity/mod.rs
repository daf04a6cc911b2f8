//! Identity and session management.
//! The identity provider is consumed through a trait; the rest of the crate only ever sees a
//! [`Principal`] (user id + email) resolved from a session token.

mod principal;
mod session;
mod provider;
mod request_context;

pub use principal::{Principal, normalize_email};
pub use session::{Session, SessionToken, SessionManager};
pub use provider::{IdentityProvider, LocalIdentityProvider, LoginRequest, CreatedIdentity};
pub use request_context::RequestContext;
