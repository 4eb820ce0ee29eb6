//! API credential lookup.
//!
//! - `env`: environment variable credentials (the only source at runtime)
//! - [`StaticCredentials`]: a fixed map, for embedding and tests

pub mod env;

use std::collections::HashMap;

use secrecy::SecretString;

pub use env::EnvCredentials;

/// Where backend API keys come from.
pub trait CredentialSource: Send + Sync {
    /// The credential stored under `name` (e.g. `"GROQ_API_KEY"`), if any.
    fn get(&self, name: &str) -> Option<SecretString>;
}

/// Credentials from a fixed in-memory map.
#[derive(Default)]
pub struct StaticCredentials(HashMap<String, SecretString>);

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), SecretString::from(value.into()));
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn get(&self, name: &str) -> Option<SecretString> {
        self.0.get(name).cloned()
    }
}
