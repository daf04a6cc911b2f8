//! advisorhub: multi-tenant contact management for financial advisory firms.
//!
//! Firms are the isolation boundary. An authenticated identity resolves to exactly one advisor,
//! which belongs to exactly one firm; contacts and advisors are only ever visible inside that
//! firm. The rule is enforced twice: by the services in [`tenancy`], [`contacts`] and
//! [`advisors`], and by the row policies the [`store`] applies underneath them.

pub mod config;
pub mod error;
pub mod model;
pub mod security;
pub mod validation;
pub mod identity;
pub mod store;
pub mod tenancy;
pub mod contacts;
pub mod advisors;
pub mod provisioning;
pub mod seed;
pub mod server;
