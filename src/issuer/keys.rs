use std::fmt;

use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid RSA private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid RSA public key: {0}")]
    InvalidPublicKey(String),

    #[error("RSA key generation failed: {0}")]
    Generation(String),
}

/// RSA signing key with its verifying half.
#[derive(Clone)]
pub struct RsaKeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    public_pem: String,
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("public_pem", &self.public_pem)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl RsaKeyPair {
    /// PKCS#8 or PKCS#1 private key, SPKI public key.
    pub fn from_pem(public_pem: &str, private_pem: &str) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
        Ok(Self {
            encoding,
            decoding,
            public_pem: public_pem.to_owned(),
        })
    }

    /// Fresh key pair held only in memory. Tokens signed with it cannot be
    /// verified after a restart.
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        warn!("generating ephemeral {}-bit RSA key pair, not for production use", bits);
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Generation(e.to_string()))?;

        Self::from_pem(&public_pem, &private_pem)
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }
}
