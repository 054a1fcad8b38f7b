//! Secret handles
//!
//! A [`SecretHandle`] carries a sensitive value (admin password, database
//! password) through the plan without ever exposing it. The plaintext is only
//! handed to a [`CloudApi`] implementation, which is the one party that has to
//! send it over the wire.
//!
//! - `Debug`, `Display` and `Serialize` all print [`REDACTED`]
//! - equality compares SHA-256 digests, never the plaintext

use crate::error::SecretError;
use crate::provider::CloudApi;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Marker written in place of secret values
pub const REDACTED: &str = "[REDACTED]";

/// Shortest secret [`SecretSet::redact`] can scrub from free text
pub const MIN_SECRET_LEN: usize = 3;

/// Opaque reference to a sensitive value
#[derive(Clone)]
pub struct SecretHandle {
    value: Arc<str>,
    digest: [u8; 32],
}

impl SecretHandle {
    /// Wrap a raw secret. Empty values are rejected.
    pub fn wrap(raw: impl Into<String>) -> Result<Self, SecretError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SecretError::Empty);
        }
        let digest: [u8; 32] = Sha256::digest(raw.as_bytes()).into();
        Ok(Self {
            value: Arc::from(raw),
            digest,
        })
    }

    /// Hand the plaintext to a collaborator that needs it for an API call.
    pub fn reveal(&self, caller: &dyn CloudApi) -> &str {
        tracing::trace!(collaborator = caller.name(), "secret revealed to collaborator");
        &self.value
    }

    /// Length of the plaintext in bytes
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// SHA-256 digest of the plaintext, used for diffing
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl PartialEq for SecretHandle {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for SecretHandle {}

impl std::fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretHandle").field(&REDACTED).finish()
    }
}

impl std::fmt::Display for SecretHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for SecretHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

/// The secrets in play for one request, used to scrub free-form text
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    handles: Vec<SecretHandle>,
}

impl SecretSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: &SecretHandle) {
        if !self.handles.contains(handle) {
            self.handles.push(handle.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Replace every occurrence of a known secret in `text` with [`REDACTED`].
    ///
    /// Longer secrets are replaced first so that a secret containing another
    /// one is not partially revealed. Values shorter than [`MIN_SECRET_LEN`]
    /// are left alone; requests reject such secrets up front.
    pub fn redact(&self, text: &str) -> String {
        let mut sorted: Vec<&str> = self
            .handles
            .iter()
            .map(|h| h.value.as_ref())
            .filter(|v| v.len() >= MIN_SECRET_LEN)
            .collect();
        sorted.sort_by_key(|value| std::cmp::Reverse(value.len()));

        let mut result = text.to_string();
        for value in sorted {
            result = result.replace(value, REDACTED);
        }
        result
    }
}
