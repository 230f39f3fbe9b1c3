//! Protocol Engine
//!
//! Authorization code (with PKCE), client credentials and refresh token
//! grants, plus revocation, userinfo and external login mapping.

pub mod authorize;
pub mod engine;
pub mod external;
pub mod grants;
pub mod pkce;
pub mod revocation;

pub use authorize::{AuthorizationResponse, AuthorizeRequest, ConsentDecision};
pub use engine::{ClientCredentials, EngineConfig, ProtocolEngine, TokenParams, TokenResult};
