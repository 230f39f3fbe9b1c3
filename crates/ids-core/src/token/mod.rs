//! Token Issuer and Token Validator
//!
//! RS256 JWTs signed by a rotating key ring, and the resource-side checks
//! that verify them.

pub mod claims;
pub mod issuer;
pub mod key_ring;
pub mod validator;

pub use claims::{AccessTokenClaims, IdentityTokenClaims};
pub use issuer::{IssueRequest, IssuerConfig, SignedToken, TokenIssuer, TokenType};
pub use key_ring::{Jwk, Jwks, KeyRing, KeyRingConfig, SigningKey};
pub use validator::{ResourceGuard, ResourceValidator, TokenRequirement, TokenValidator};
