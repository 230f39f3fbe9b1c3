//! Proof Key for Code Exchange (RFC 7636).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use crate::shared::crypto::constant_time_eq;

pub const METHOD_S256: &str = "S256";
pub const METHOD_PLAIN: &str = "plain";

/// Challenge derived from a verifier with the S256 method
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// 43 to 128 characters from the unreserved set
pub fn is_valid_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

pub fn is_valid_challenge(challenge: &str) -> bool {
    is_valid_verifier(challenge)
}

pub fn verify(method: &str, challenge: &str, verifier: &str) -> bool {
    if !is_valid_verifier(verifier) {
        return false;
    }
    match method {
        METHOD_S256 => constant_time_eq(&s256_challenge(verifier), challenge),
        METHOD_PLAIN => constant_time_eq(verifier, challenge),
        _ => false,
    }
}
