//! In-memory storage for presented challenge records.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// TXT values currently presented, keyed by normalized domain name.
///
/// Cloning the store clones the handle, not the data: the HTTP API and the
/// DNS server hold clones of the same store.
#[derive(Clone, Debug, Default)]
pub struct ValidationStore {
    records: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl ValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a TXT value for `fqdn`. Returns false if it was already present.
    pub fn present(&self, fqdn: &str, value: &str) -> bool {
        let name = normalize_name(fqdn);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let values = records.entry(name).or_default();

        if values.iter().any(|v| v == value) {
            return false;
        }
        values.push(value.to_string());
        true
    }

    /// Remove a TXT value for `fqdn`. Returns false if it was not present.
    pub fn cleanup(&self, fqdn: &str, value: &str) -> bool {
        let name = normalize_name(fqdn);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let Some(values) = records.get_mut(&name) else {
            return false;
        };
        let before = values.len();
        values.retain(|v| v != value);
        let removed = values.len() != before;

        if values.is_empty() {
            records.remove(&name);
        }
        removed
    }

    /// TXT values for `name`, in the order they were presented.
    pub fn lookup(&self, name: &str) -> Vec<String> {
        let name = normalize_name(name);
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of names holding at least one value.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase a domain name and give it exactly one trailing dot.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.');
    let mut normalized = trimmed.to_ascii_lowercase();
    normalized.push('.');
    normalized
}
