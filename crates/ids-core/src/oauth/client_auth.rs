//! Client credentials from `client_secret_basic` or `client_secret_post`.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::protocol::ClientCredentials;
use crate::shared::error::{AuthError, Result};

fn malformed() -> AuthError {
    AuthError::invalid_client("Malformed Basic credentials")
}

/// Credentials from an `Authorization: Basic` header, if one is present.
/// Both parts are form-encoded before base64 (RFC 6749 §2.3.1).
pub fn basic_credentials(headers: &HeaderMap) -> Result<Option<ClientCredentials>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| malformed())?;
    let Some((scheme, encoded)) = value.split_once(' ') else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Ok(None);
    }

    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (id, secret) = decoded.split_once(':').ok_or_else(malformed)?;

    let form_decode = |s: &str| {
        urlencoding::decode(&s.replace('+', " "))
            .map(|d| d.into_owned())
            .map_err(|_| malformed())
    };
    Ok(Some(ClientCredentials {
        client_id: form_decode(id)?,
        client_secret: Some(form_decode(secret)?),
    }))
}

/// Combine header and body credentials; using both is an error.
pub fn resolve_client_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<ClientCredentials> {
    match basic_credentials(headers)? {
        Some(_) if form_client_secret.is_some() => Err(AuthError::invalid_request(
            "Client credentials must not be sent in both the header and the body",
        )),
        Some(credentials) => {
            if form_client_id.is_some_and(|id| id != credentials.client_id) {
                return Err(AuthError::invalid_client("client_id does not match the Authorization header"));
            }
            Ok(credentials)
        }
        None => Ok(ClientCredentials::new(form_client_id.unwrap_or_default(), form_client_secret)),
    }
}
