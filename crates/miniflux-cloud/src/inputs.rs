//! Fully resolved inputs passed to collaborators

use crate::secret::SecretHandle;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One input value after deferred references have been substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResolvedValue {
    Plain(String),
    Secret(SecretHandle),
}

/// Kind-specific input mapping handed to a collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedInputs {
    values: BTreeMap<String, ResolvedValue>,
}

impl ResolvedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ResolvedValue) {
        self.values.insert(key.into(), value);
    }

    pub fn with_plain(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, ResolvedValue::Plain(value.into()));
        self
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: SecretHandle) -> Self {
        self.insert(key, ResolvedValue::Secret(value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.values.get(key)
    }

    /// Plain value for `key`; `None` if missing or secret
    pub fn plain(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ResolvedValue::Plain(v)) => Some(v),
            _ => None,
        }
    }

    /// Secret handle for `key`; `None` if missing or plain
    pub fn secret(&self, key: &str) -> Option<&SecretHandle> {
        match self.values.get(key) {
            Some(ResolvedValue::Secret(s)) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResolvedValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Hex SHA-256 over all inputs. Secrets contribute only their digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.values {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            match value {
                ResolvedValue::Plain(v) => {
                    hasher.update([0u8]);
                    hasher.update((v.len() as u64).to_le_bytes());
                    hasher.update(v.as_bytes());
                }
                ResolvedValue::Secret(s) => {
                    hasher.update([1u8]);
                    hasher.update(s.digest());
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}
