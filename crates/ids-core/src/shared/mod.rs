//! Shared infrastructure: errors, store plumbing, crypto helpers and the
//! HTTP pieces that are not tied to a single aggregate.

pub mod crypto;
pub mod error;
pub mod health_api;
pub mod indexes;
pub mod middleware;
pub mod store;
pub mod well_known_api;
