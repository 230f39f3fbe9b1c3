//! OAuth 2.0 / OpenID Connect HTTP endpoints.

pub mod api;
pub mod client_auth;

pub use api::{oauth_router, OAuthState};
