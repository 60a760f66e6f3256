use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::AdmissionError;

/// The principal an API key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only mapping of API keys to identities, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    principals: HashMap<String, Identity>,
}

impl Authenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, api_key: impl Into<String>, identity: impl Into<String>) -> Self {
        self.principals
            .insert(api_key.into(), Identity::new(identity));
        self
    }

    pub fn from_map(keys: HashMap<String, String>) -> Self {
        Self {
            principals: keys
                .into_iter()
                .map(|(key, name)| (key, Identity::new(name)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    pub fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AdmissionError> {
        let key = match credential {
            Some(key) if !key.is_empty() => key,
            _ => return Err(AdmissionError::Unauthorized("API key required".to_string())),
        };
        self.principals
            .get(key)
            .cloned()
            .ok_or_else(|| AdmissionError::Unauthorized("Invalid API key".to_string()))
    }
}
