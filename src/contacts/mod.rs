//! Firm-scoped contact operations and the in-memory search filter.

pub mod repository;
pub mod filter;

pub use repository::ContactRepository;
pub use filter::{ContactFilter, StatusFilter};
