//! Tenant resolution and firm-scoped access decisions.
//!
//! [`TenantDirectory`] turns an authenticated user id into the advisor and firm it belongs to;
//! [`access`] decides, from that pairing alone, which firms, advisors and contacts the user may
//! touch. Both run as the acting user so the store's row policies apply underneath.

pub mod directory;
pub mod access;

pub use directory::TenantDirectory;
pub use access::{AccessPolicy, ContactOp};
