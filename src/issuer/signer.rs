use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::issuer::keys::RsaKeyPair;

/// Signed token and its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub token: String,
    pub expires_in_seconds: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("token verification failed: {0}")]
    Verification(String),
}

/// Mints bounded-lifetime tokens for authenticated clients.
pub trait TokenSigner: Send + Sync {
    fn issue(&self, client_id: &str, scopes: &BTreeSet<String>) -> Result<Issued, SignError>;
}

/// Claim set of an internal client token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub scp: Vec<String>,
}

/// RS256 signer. The TTL is fixed by configuration.
#[derive(Debug, Clone)]
pub struct RsaTokenSigner {
    keys: RsaKeyPair,
    issuer: String,
    audience: String,
    ttl: Duration,
    key_id: Option<String>,
}

impl RsaTokenSigner {
    pub fn new(keys: RsaKeyPair, issuer: impl Into<String>, audience: impl Into<String>, ttl: Duration) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
            key_id: None,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check signature, issuer, audience and expiry of a token minted here.
    pub fn verify(&self, token: &str) -> Result<InternalClaims, SignError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        decode::<InternalClaims>(token, self.keys.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| SignError::Verification(e.to_string()))
    }
}

impl TokenSigner for RsaTokenSigner {
    fn issue(&self, client_id: &str, scopes: &BTreeSet<String>) -> Result<Issued, SignError> {
        let ttl_seconds = self.ttl.as_secs();
        let now = Utc::now();
        let expires_at = TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| SignError::Signing(format!("token ttl of {}s is out of range", ttl_seconds)))?;

        let claims = InternalClaims {
            iss: self.issuer.clone(),
            sub: client_id.to_owned(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            scp: scopes.iter().cloned().collect(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        let token = encode(&header, &claims, self.keys.encoding_key())
            .map_err(|e| SignError::Signing(e.to_string()))?;

        Ok(Issued {
            token,
            expires_in_seconds: ttl_seconds,
            expires_at,
        })
    }
}
