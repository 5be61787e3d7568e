use std::collections::{BTreeSet, HashMap};

use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

type SecretDigest = [u8; 32];

/// Compared against when the client id is unknown. Every lookup compares two
/// 32-byte digests, so the work does not depend on whether the id exists or
/// on the length of its stored secret.
const UNKNOWN_CLIENT_DIGEST: SecretDigest = [0u8; 32];

fn secret_digest(secret: &str) -> SecretDigest {
    Sha256::digest(secret.as_bytes()).into()
}

/// Provisioned client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: String,
    pub secret: String,
    pub scopes: BTreeSet<String>,
}

impl ClientRecord {
    pub fn new<I, S>(id: impl Into<String>, secret: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            secret: secret.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Source of clients, their secrets and the scopes they may request.
pub trait ClientStore: Send + Sync {
    /// `false` for unknown clients, blank input or a wrong secret. Never errors.
    fn authenticate(&self, client_id: &str, client_secret: &str) -> bool;

    /// Empty for unknown clients.
    fn allowed_scopes(&self, client_id: &str) -> BTreeSet<String>;
}

#[derive(Debug, Clone)]
struct StoredClient {
    secret_digest: SecretDigest,
    /// Blank secrets never authenticate.
    usable: bool,
    scopes: BTreeSet<String>,
}

/// Secrets are kept only as SHA-256 digests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClientStore {
    clients: HashMap<String, StoredClient>,
}

impl InMemoryClientStore {
    pub fn new(records: impl IntoIterator<Item = ClientRecord>) -> Self {
        let clients = records
            .into_iter()
            .map(|c| {
                let stored = StoredClient {
                    secret_digest: secret_digest(&c.secret),
                    usable: !c.secret.is_empty(),
                    scopes: c.scopes,
                };
                (c.id, stored)
            })
            .collect();
        Self { clients }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl ClientStore for InMemoryClientStore {
    fn authenticate(&self, client_id: &str, client_secret: &str) -> bool {
        let client_id = client_id.trim();
        if client_id.is_empty() || client_secret.trim().is_empty() {
            return false;
        }

        let candidate = secret_digest(client_secret);
        let (expected, known) = match self.clients.get(client_id) {
            Some(client) => (&client.secret_digest, Choice::from(client.usable as u8)),
            None => (&UNKNOWN_CLIENT_DIGEST, Choice::from(0)),
        };
        let matches = Choice::from(constant_time_eq(expected, &candidate) as u8);
        (known & matches).into()
    }

    fn allowed_scopes(&self, client_id: &str) -> BTreeSet<String> {
        self.clients
            .get(client_id.trim())
            .map(|c| c.scopes.clone())
            .unwrap_or_default()
    }
}

/// Compares `candidate` against every byte of `expected`, reading past the
/// end of a shorter candidate as zeroes. The length mismatch is folded into
/// the same accumulator, so timing does not depend on where the inputs first
/// differ or on whether they differ in length.
pub fn constant_time_eq(expected: &[u8], candidate: &[u8]) -> bool {
    let same_len: Choice = (expected.len() as u64).ct_eq(&(candidate.len() as u64));
    let mut equal = same_len;
    for (i, e) in expected.iter().enumerate() {
        let c = candidate.get(i).copied().unwrap_or(0);
        equal &= e.ct_eq(&c);
    }
    equal.into()
}
