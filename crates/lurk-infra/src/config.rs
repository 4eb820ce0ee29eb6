//! Configuration loader for lurk.
//!
//! Reads `lurk.toml` from the data directory (`~/.lurk/` in production)
//! and deserializes it into [`LurkConfig`]. Falls back to defaults when the
//! file is missing or malformed, then applies environment overrides.

use std::path::{Path, PathBuf};

use lurk_types::config::LurkConfig;
use lurk_types::error::ConfigError;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "lurk.toml";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `LURK_DATA_DIR` environment variable
/// 2. `~/.lurk`
/// 3. `.lurk` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LURK_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".lurk");
    }

    PathBuf::from(".lurk")
}

/// Load configuration from `{data_dir}/lurk.toml`, then apply `LURK_*`
/// environment overrides.
///
/// A missing or malformed file yields the defaults; only an invalid
/// override value is an error.
pub async fn load_config(data_dir: &Path) -> Result<LurkConfig, ConfigError> {
    let mut config = load_file(data_dir).await;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

async fn load_file(data_dir: &Path) -> LurkConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return LurkConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return LurkConfig::default();
        }
    };

    match toml::from_str::<LurkConfig>(&content) {
        Ok(mut config) => {
            reset_zero_limits(&mut config);
            tracing::info!(
                path = %config_path.display(),
                providers = config.providers.len(),
                "loaded configuration"
            );
            config
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            LurkConfig::default()
        }
    }
}

/// Zero budgets, timeouts and capacities would make every turn fail;
/// replace them with the defaults.
fn reset_zero_limits(config: &mut LurkConfig) {
    let defaults = LurkConfig::default();

    if config.token_limit == 0 {
        tracing::warn!("token_limit must be positive, using {}", defaults.token_limit);
        config.token_limit = defaults.token_limit;
    }
    if config.provider_timeout_secs == 0 {
        tracing::warn!(
            "provider_timeout_secs must be positive, using {}",
            defaults.provider_timeout_secs
        );
        config.provider_timeout_secs = defaults.provider_timeout_secs;
    }
    if config.synthesis_timeout_secs == 0 {
        tracing::warn!(
            "synthesis_timeout_secs must be positive, using {}",
            defaults.synthesis_timeout_secs
        );
        config.synthesis_timeout_secs = defaults.synthesis_timeout_secs;
    }
    if config.max_output_tokens == 0 {
        tracing::warn!("max_output_tokens must be positive, using {}", defaults.max_output_tokens);
        config.max_output_tokens = defaults.max_output_tokens;
    }
    if config.history_capacity == 0 {
        tracing::warn!("history_capacity must be positive, using {}", defaults.history_capacity);
        config.history_capacity = defaults.history_capacity;
    }
}

/// Apply `LURK_TOKEN_LIMIT`, `LURK_PROVIDER_TIMEOUT_SECS` and
/// `LURK_ADMIN_TOKEN` as returned by `lookup`.
pub fn apply_env_overrides(
    config: &mut LurkConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(limit) = parse_var(&lookup, "LURK_TOKEN_LIMIT")? {
        config.token_limit = limit;
    }
    if let Some(secs) = parse_var(&lookup, "LURK_PROVIDER_TIMEOUT_SECS")? {
        config.provider_timeout_secs = secs;
    }
    if let Some(token) = lookup("LURK_ADMIN_TOKEN").filter(|t| !t.trim().is_empty()) {
        config.admin_token = Some(token);
    }
    Ok(())
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_file(tmp.path()).await;
        assert_eq!(config.token_limit, 100_000);
        assert_eq!(config.providers.len(), 10);
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
token_limit = 2500
synthesis_provider = "claude-sonnet"

[[providers]]
id = "claude-sonnet"
display_name = "Claude"
model = "claude-sonnet-4-20250514"
[providers.backend]
kind = "anthropic"
"#,
        )
        .await
        .unwrap();

        let config = load_file(tmp.path()).await;
        assert_eq!(config.token_limit, 2500);
        assert_eq!(config.synthesis_provider, "claude-sonnet");
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].backend.kind(), "anthropic");
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_file(tmp.path()).await;
        assert_eq!(config.token_limit, 100_000);
    }

    #[tokio::test]
    async fn zero_limits_fall_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
token_limit = 0
provider_timeout_secs = 0
synthesis_timeout_secs = 0
history_capacity = 7
"#,
        )
        .await
        .unwrap();

        let config = load_file(tmp.path()).await;
        let defaults = LurkConfig::default();
        assert_eq!(config.token_limit, 100_000);
        assert_eq!(config.provider_timeout_secs, 15);
        assert_eq!(config.synthesis_timeout_secs, defaults.synthesis_timeout_secs);
        assert_eq!(config.history_capacity, 7);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = LurkConfig::default();
        apply_env_overrides(
            &mut config,
            vars(&[
                ("LURK_TOKEN_LIMIT", "10"),
                ("LURK_PROVIDER_TIMEOUT_SECS", "5"),
                ("LURK_ADMIN_TOKEN", "op"),
            ]),
        )
        .unwrap();
        assert_eq!(config.token_limit, 10);
        assert_eq!(config.provider_timeout_secs, 5);
        assert_eq!(config.admin_token.as_deref(), Some("op"));
    }

    #[test]
    fn invalid_override_is_an_error() {
        let mut config = LurkConfig::default();
        let err = apply_env_overrides(&mut config, vars(&[("LURK_TOKEN_LIMIT", "lots")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "LURK_TOKEN_LIMIT")
        );
        assert_eq!(config.token_limit, 100_000);
    }

    #[test]
    fn data_dir_env_var_wins() {
        // SAFETY: only this test touches LURK_DATA_DIR.
        unsafe { std::env::set_var("LURK_DATA_DIR", "/tmp/test-lurk") };
        assert_eq!(resolve_data_dir(), PathBuf::from("/tmp/test-lurk"));
        // SAFETY: the variable was just set above.
        unsafe { std::env::remove_var("LURK_DATA_DIR") };
    }
}
