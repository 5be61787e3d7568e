use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidLifetime {
    #[error("token lifetime must be positive, got expires_in={0}")]
    NonPositive(i64),

    #[error("token lifetime is out of range, got expires_in={0}")]
    OutOfRange(i64),
}

/// Access token obtained from the issuer.
///
/// Immutable once built: the cache replaces the whole payload on every
/// successful fetch and never edits one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    access_token: String,
    expires_in: u64, // seconds
    obtained_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TokenPayload {
    /// Build a payload obtained right now.
    pub fn new(access_token: String, expires_in: i64) -> Result<Self, InvalidLifetime> {
        Self::obtained_at(access_token, expires_in, Utc::now())
    }

    pub fn obtained_at(
        access_token: String,
        expires_in: i64,
        obtained_at: DateTime<Utc>,
    ) -> Result<Self, InvalidLifetime> {
        if expires_in <= 0 {
            return Err(InvalidLifetime::NonPositive(expires_in));
        }
        let expires_at = TimeDelta::try_seconds(expires_in)
            .and_then(|lifetime| obtained_at.checked_add_signed(lifetime))
            .ok_or(InvalidLifetime::OutOfRange(expires_in))?;
        Ok(Self {
            access_token,
            expires_in: expires_in as u64,
            obtained_at,
            expires_at,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    pub fn obtained_at_ts(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Fresh iff `now < expires_at - skew`.
    pub fn is_fresh(&self, skew: std::time::Duration, now: DateTime<Utc>) -> bool {
        let Ok(skew) = TimeDelta::from_std(skew) else {
            return false;
        };
        match self.expires_at().checked_sub_signed(skew) {
            Some(refresh_at) => now < refresh_at,
            None => false,
        }
    }

    /// Past the real expiry, skew ignored.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}
