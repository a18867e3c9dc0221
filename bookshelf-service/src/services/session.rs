//! Stateless session tokens.
//!
//! A token is `user:expires_ms:digest`, where the digest is the SHA-256 of the
//! server secret, user and expiry. Nothing is stored server side; a token is
//! valid while its digest matches and its expiry is in the future.

use crate::error::ApiError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sha2::{Digest, Sha256};

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: String,
    pub expires_at: DateTime<Utc>,
}

/// Compares without an early exit on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct SessionSigner {
    secret: String,
    access_key: String,
    ttl: Duration,
}

impl SessionSigner {
    pub fn new(secret: String, access_key: String, ttl: Duration) -> Self {
        Self {
            secret,
            access_key,
            ttl,
        }
    }

    fn digest(&self, user: &str, expires_ms: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(user.as_bytes());
        hasher.update(b":");
        hasher.update(expires_ms.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Exchanges the access key for a token. `user` must not contain ':'.
    pub fn open(
        &self,
        user: &str,
        access_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, Session), ApiError> {
        if !constant_time_eq(access_key.as_bytes(), self.access_key.as_bytes()) {
            return Err(ApiError::Unauthorized("wrong access key".into()));
        }
        Ok(self.issue(user, now))
    }

    /// Expiry saturates at the latest representable instant.
    pub fn issue(&self, user: &str, now: DateTime<Utc>) -> (String, Session) {
        let expires = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expires_ms = expires.timestamp_millis();
        let token = format!("{}:{}:{}", user, expires_ms, self.digest(user, expires_ms));

        let session = Session {
            user: user.to_string(),
            expires_at: Utc
                .timestamp_millis_opt(expires_ms)
                .single()
                .unwrap_or(expires),
        };
        (token, session)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Session, ApiError> {
        let mut parts = token.split(':');
        let (user, expires, digest) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(user), Some(expires), Some(digest), None) if !user.is_empty() => {
                (user, expires, digest)
            }
            _ => return Err(ApiError::Unauthorized("malformed session token".into())),
        };

        let expires_ms: i64 = expires
            .parse()
            .map_err(|_| ApiError::Unauthorized("malformed session token".into()))?;

        if !constant_time_eq(self.digest(user, expires_ms).as_bytes(), digest.as_bytes()) {
            return Err(ApiError::Unauthorized("invalid session token".into()));
        }

        let expires_at = Utc
            .timestamp_millis_opt(expires_ms)
            .single()
            .ok_or_else(|| ApiError::Unauthorized("malformed session token".into()))?;
        if expires_at <= now {
            return Err(ApiError::Unauthorized("session expired".into()));
        }

        Ok(Session {
            user: user.to_string(),
            expires_at,
        })
    }
}
