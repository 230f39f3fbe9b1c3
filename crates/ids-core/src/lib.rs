//! Identity Server Core
//!
//! OAuth 2.0 / OpenID Connect authorization server: credential store, client
//! and scope registry, grant store, token issuer and validator, the protocol
//! engine and its HTTP endpoints.

pub mod grant;
pub mod idp;
pub mod oauth;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod seed;
pub mod shared;
pub mod token;
pub mod user;

pub use grant::{CleanupConfig, Grant, GrantCleanupTask, GrantKind, GrantStore, InMemoryGrantStore, MongoGrantStore};
pub use idp::{ExternalAuth, ExternalIdentity, ExternalProviders, PendingAuthorizations};
pub use oauth::OAuthState;
pub use protocol::{
    AuthorizationResponse, AuthorizeRequest, ClientCredentials, ConsentDecision, EngineConfig, ProtocolEngine,
    TokenParams, TokenResult,
};
pub use registry::{
    ApiResource, Client, ClientStore, GrantType, IdentityResource, InMemoryRegistry, MongoClientStore,
    MongoResourceStore, RefreshTokenUsage, ResourceStore, Resources,
};
pub use router::{build_router, ApiDoc};
pub use seed::DevDataSeeder;
pub use shared::error::{AuthError, Result};
pub use shared::indexes::initialize_indexes;
pub use shared::store::{StoreError, StoreResult};
pub use shared::well_known_api::WellKnownState;
pub use token::{
    AccessTokenClaims, IssuerConfig, KeyRing, KeyRingConfig, ResourceGuard, ResourceValidator, SigningKey,
    TokenIssuer, TokenRequirement, TokenType, TokenValidator,
};
pub use user::{Argon2Config, CredentialService, InMemoryUserStore, MongoUserStore, PasswordService, Totp, User, UserStore};
