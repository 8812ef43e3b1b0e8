//! Key/value configuration store.
//!
//! Keys are backslash-separated paths and compare case-insensitively. Opening a
//! key never creates it: writing under a key that does not exist fails, the same
//! as on the host configuration registry.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    Sz(String),
    MultiSz(Vec<String>),
    Dword(u32),
}

pub trait RegistryStore {
    fn fetch(&self, key: &str, name: &str) -> Result<RegistryValue, RegistryError>;

    fn store(&mut self, key: &str, name: &str, value: RegistryValue) -> Result<(), RegistryError>;

    fn fetch_dword(&self, key: &str, name: &str) -> Result<u32, RegistryError> {
        match self.fetch(key, name)? {
            RegistryValue::Dword(value) => Ok(value),
            _ => Err(type_mismatch(key, name)),
        }
    }

    fn fetch_sz(&self, key: &str, name: &str) -> Result<String, RegistryError> {
        match self.fetch(key, name)? {
            RegistryValue::Sz(value) => Ok(value),
            _ => Err(type_mismatch(key, name)),
        }
    }

    fn fetch_multi_sz(&self, key: &str, name: &str) -> Result<Vec<String>, RegistryError> {
        match self.fetch(key, name)? {
            RegistryValue::MultiSz(values) => Ok(values),
            _ => Err(type_mismatch(key, name)),
        }
    }
}

fn type_mismatch(key: &str, name: &str) -> RegistryError {
    RegistryError::TypeMismatch {
        key: key.to_owned(),
        name: name.to_owned(),
    }
}

/// Join key path components into an absolute `\`-separated path.
pub fn key_path(parts: &[&str]) -> String {
    let mut path = String::new();
    for part in parts.iter().map(|p| p.trim_matches('\\')).filter(|p| !p.is_empty()) {
        path.push('\\');
        path.push_str(part);
    }
    path
}

fn normalise(key: &str) -> String {
    key.trim_matches('\\').to_ascii_lowercase()
}

/// An in-memory [`RegistryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    keys: BTreeMap<String, BTreeMap<String, RegistryValue>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_key(&mut self, key: &str) {
        self.keys.entry(normalise(key)).or_default();
    }

    pub fn key_exists(&self, key: &str) -> bool {
        self.keys.contains_key(&normalise(key))
    }

    /// All values under `key`, ordered by lower-cased name.
    pub fn values(&self, key: &str) -> Option<&BTreeMap<String, RegistryValue>> {
        self.keys.get(&normalise(key))
    }
}

impl RegistryStore for MemoryRegistry {
    fn fetch(&self, key: &str, name: &str) -> Result<RegistryValue, RegistryError> {
        let values = self
            .keys
            .get(&normalise(key))
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_owned()))?;
        values
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RegistryError::ValueNotFound {
                key: key.to_owned(),
                name: name.to_owned(),
            })
    }

    fn store(&mut self, key: &str, name: &str, value: RegistryValue) -> Result<(), RegistryError> {
        let values = self
            .keys
            .get_mut(&normalise(key))
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_owned()))?;
        debug!("storing {name} under {key}");
        values.insert(name.to_ascii_lowercase(), value);
        Ok(())
    }
}
