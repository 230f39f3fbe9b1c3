//! Time-based one-time codes (RFC 6238, HMAC-SHA1).

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::shared::crypto::constant_time_eq;
use crate::shared::error::{AuthError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Codes of this length still fit a `u32` modulus
const MAX_DIGITS: u32 = 9;
const MIN_DIGITS: u32 = 6;

#[derive(Debug, Clone)]
pub struct Totp {
    step_secs: u64,
    digits: u32,
    /// Accepted drift in steps on either side of the current one
    skew_steps: i64,
}

impl Default for Totp {
    fn default() -> Self {
        Self {
            step_secs: 30,
            digits: 6,
            skew_steps: 1,
        }
    }
}

impl Totp {
    pub fn new(step_secs: u64, digits: u32, skew_steps: i64) -> Result<Self> {
        if step_secs == 0 || step_secs > i64::MAX as u64 {
            return Err(AuthError::internal(format!("Invalid TOTP step: {}s", step_secs)));
        }
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
            return Err(AuthError::internal(format!(
                "TOTP digits must be between {} and {}, got {}",
                MIN_DIGITS, MAX_DIGITS, digits
            )));
        }
        if skew_steps < 0 {
            return Err(AuthError::internal(format!("Invalid TOTP skew: {} steps", skew_steps)));
        }
        Ok(Self {
            step_secs,
            digits,
            skew_steps,
        })
    }

    /// Fresh 160-bit secret
    pub fn generate_secret() -> Vec<u8> {
        let mut secret = vec![0u8; 20];
        rand::rng().fill_bytes(&mut secret);
        secret
    }

    pub fn step_at(&self, unix_time: i64) -> i64 {
        unix_time.div_euclid(self.step_secs as i64)
    }

    /// Code for a given step (RFC 4226 dynamic truncation).
    pub fn code_for_step(&self, secret: &[u8], step: i64) -> Option<String> {
        if step < 0 {
            return None;
        }
        let mut mac = HmacSha1::new_from_slice(secret).ok()?;
        mac.update(&(step as u64).to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);
        let code = binary % 10u32.pow(self.digits);
        Some(format!("{:0width$}", code, width = self.digits as usize))
    }

    pub fn code_at(&self, secret: &[u8], unix_time: i64) -> Option<String> {
        self.code_for_step(secret, self.step_at(unix_time))
    }

    /// Step whose code matches within the skew window, if any.
    ///
    /// Replay protection is the caller's job: the returned step must be
    /// recorded atomically before the code is treated as accepted.
    pub fn matching_step(&self, secret: &[u8], code: &str, unix_time: i64) -> Option<i64> {
        if code.len() != self.digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let current = self.step_at(unix_time);
        (current - self.skew_steps..=current + self.skew_steps).find(|step| {
            self.code_for_step(secret, *step)
                .is_some_and(|expected| constant_time_eq(&expected, code))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn test_rfc6238_sha1_vectors() {
        let totp = Totp::new(30, 8, 1).unwrap();
        assert_eq!(totp.code_at(RFC_SECRET, 59).unwrap(), "94287082");
        assert_eq!(totp.code_at(RFC_SECRET, 1111111109).unwrap(), "07081804");
        assert_eq!(totp.code_at(RFC_SECRET, 1234567890).unwrap(), "89005924");
    }

    #[test]
    fn test_skew_window_is_one_step() {
        let totp = Totp::default();
        let now = 1_700_000_000;
        let previous = totp.code_at(RFC_SECRET, now - 30).unwrap();
        let next = totp.code_at(RFC_SECRET, now + 30).unwrap();
        let stale = totp.code_at(RFC_SECRET, now - 60).unwrap();

        assert_eq!(totp.matching_step(RFC_SECRET, &previous, now), Some(totp.step_at(now) - 1));
        assert_eq!(totp.matching_step(RFC_SECRET, &next, now), Some(totp.step_at(now) + 1));
        assert_eq!(totp.matching_step(RFC_SECRET, &stale, now), None);
    }

    #[test]
    fn test_rejects_unusable_parameters() {
        assert!(Totp::new(0, 6, 1).is_err());
        assert!(Totp::new(30, 10, 1).is_err());
        assert!(Totp::new(30, 5, 1).is_err());
        assert!(Totp::new(30, 6, -1).is_err());

        let nine = Totp::new(30, 9, 0).unwrap();
        assert_eq!(nine.code_at(RFC_SECRET, 59).unwrap().len(), 9);
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let totp = Totp::default();
        assert_eq!(totp.matching_step(RFC_SECRET, "12345", 59), None);
        assert_eq!(totp.matching_step(RFC_SECRET, "abcdef", 59), None);
    }
}
