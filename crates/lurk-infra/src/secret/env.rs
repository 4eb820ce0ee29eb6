//! Environment variable credentials.
//!
//! Keys are read once per lookup and wrapped in [`SecretString`] straight
//! away. Empty or non-Unicode values count as absent.

use secrecy::SecretString;

use super::CredentialSource;

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialSource for EnvCredentials {
    fn get(&self, name: &str) -> Option<SecretString> {
        match std::env::var(name) {
            Ok(val) if !val.trim().is_empty() => Some(SecretString::from(val)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn reads_existing_variable() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("LURK_TEST_CREDENTIAL_1", "test-value-123") };

        let value = EnvCredentials::new().get("LURK_TEST_CREDENTIAL_1");
        assert_eq!(value.as_ref().map(|s| s.expose_secret()), Some("test-value-123"));

        // SAFETY: the variable was just set above.
        unsafe { std::env::remove_var("LURK_TEST_CREDENTIAL_1") };
    }

    #[test]
    fn missing_or_blank_is_none() {
        assert!(EnvCredentials::new().get("NONEXISTENT_VAR_XYZ_123").is_none());

        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("LURK_TEST_CREDENTIAL_BLANK", "  ") };
        assert!(EnvCredentials::new().get("LURK_TEST_CREDENTIAL_BLANK").is_none());
        // SAFETY: the variable was just set above.
        unsafe { std::env::remove_var("LURK_TEST_CREDENTIAL_BLANK") };
    }
}
