//! String key/value options passed through to encoders and muxers

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Codec options such as `preset` or `crf`.
///
/// Encoders remove the keys they consume while opening, so whatever is left
/// afterwards was not recognised by anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: BTreeMap<String, String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a value that must be present
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::InvalidInput(format!("Key not found: {}", key)))
    }

    /// Remove and parse a value
    pub fn take<T: FromStr>(&mut self, key: &str) -> Result<Option<T>> {
        match self.entries.remove(key) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| {
                Error::Configuration(format!("Invalid value for option {}: {}", key, value))
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
