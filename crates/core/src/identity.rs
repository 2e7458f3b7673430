//! Actor allowlist.
//!
//! Identities load from a JSON document with a top-level `actors` map and
//! are held behind a read-mostly lock with an explicit reload. The
//! identities file itself lives under a protected path, so agents cannot
//! grant themselves tiers through the plane they are governed by.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Deserialize;

use crate::hash::sha256_hex;

/// One allowlisted actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub actor_id: String,
    pub role: String,
    pub status: String,
    pub tier: u8,
    pub key_fingerprint: Option<String>,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Errors from loading or querying the allowlist.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("unknown actor: {actor_id}")]
    Unknown { actor_id: String },
    #[error("actor {actor_id} is {status}")]
    Inactive { actor_id: String, status: String },
    #[error("failed to read identity document {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed identity document {path}: {source}")]
    Document {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct IdentityDocument {
    actors: HashMap<String, IdentityEntry>,
}

#[derive(Deserialize)]
struct IdentityEntry {
    role: String,
    status: String,
    #[serde(default)]
    tier: u8,
    #[serde(default)]
    key_fingerprint: Option<String>,
}

/// `sha256:<hex>` fingerprint of a raw bearer token.
pub fn key_fingerprint(token: &str) -> String {
    format!("sha256:{}", sha256_hex(token.as_bytes()))
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// The actor allowlist, reloadable from its backing document.
pub struct IdentityRegistry {
    path: PathBuf,
    actors: RwLock<HashMap<String, Identity>>,
}

impl IdentityRegistry {
    /// Load the allowlist from a JSON document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref().to_path_buf();
        let actors = read_document(&path)?;
        Ok(Self {
            path,
            actors: RwLock::new(actors),
        })
    }

    /// Re-read the backing document. Returns the number of actors loaded.
    ///
    /// On failure the previously loaded set stays in effect.
    pub fn reload(&self) -> Result<usize, IdentityError> {
        let fresh = read_document(&self.path)?;
        let count = fresh.len();
        let mut guard = self.actors.write().unwrap_or_else(|e| e.into_inner());
        *guard = fresh;
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.actors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an actor regardless of status.
    pub fn get(&self, actor_id: &str) -> Option<Identity> {
        self.actors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(actor_id)
            .cloned()
    }

    /// Look up an actor and require `status == "active"`.
    pub fn validate(&self, actor_id: &str) -> Result<Identity, IdentityError> {
        let identity = self.get(actor_id).ok_or_else(|| IdentityError::Unknown {
            actor_id: actor_id.to_string(),
        })?;
        if !identity.is_active() {
            return Err(IdentityError::Inactive {
                actor_id: identity.actor_id,
                status: identity.status,
            });
        }
        Ok(identity)
    }

    /// Resolve a bearer token to an active admin identity.
    ///
    /// The token's fingerprint is matched against every stored fingerprint
    /// in constant time per candidate; only `role == "admin"` with
    /// `status == "active"` authenticates.
    pub fn authenticate_bearer(&self, token: &str) -> Option<Identity> {
        let presented = key_fingerprint(token);
        let guard = self.actors.read().unwrap_or_else(|e| e.into_inner());
        let mut matched: Option<Identity> = None;
        for identity in guard.values() {
            let Some(stored) = &identity.key_fingerprint else {
                continue;
            };
            if constant_time_eq(stored.as_bytes(), presented.as_bytes()) && matched.is_none() {
                matched = Some(identity.clone());
            }
        }
        matched.filter(|id| id.role == "admin" && id.is_active())
    }
}

fn read_document(path: &Path) -> Result<HashMap<String, Identity>, IdentityError> {
    let raw = std::fs::read_to_string(path).map_err(|source| IdentityError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let doc: IdentityDocument =
        serde_json::from_str(&raw).map_err(|source| IdentityError::Document {
            path: path.display().to_string(),
            source,
        })?;
    Ok(doc
        .actors
        .into_iter()
        .map(|(actor_id, entry)| {
            (
                actor_id.clone(),
                Identity {
                    actor_id,
                    role: entry.role,
                    status: entry.status,
                    tier: entry.tier,
                    key_fingerprint: entry.key_fingerprint,
                },
            )
        })
        .collect())
}
