//! Store settings
//!
//! Settings are resolved from the first source that provides them:
//!
//! 1. `<PREFIX>` environment variable holding the settings as JSON
//! 2. `<PREFIX>_IDENTITY_TABLE`, `<PREFIX>_POLICY_TABLE` and
//!    `<PREFIX>_BATCH_*` environment variables
//! 3. `<prefix>.toml` or `config/<prefix>.toml`, searched from the working
//!    directory upwards

use crate::error::{AuthzError, Result};
use crate::store::BatchOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Where identity and policy records live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub identity_table: String,
    pub policy_table: String,
    #[serde(default)]
    pub batch: BatchOptions,
}

impl StoreSettings {
    pub fn new(identity_table: impl Into<String>, policy_table: impl Into<String>) -> Self {
        StoreSettings {
            identity_table: identity_table.into(),
            policy_table: policy_table.into(),
            batch: BatchOptions::default(),
        }
    }

    /// Resolve from the process environment and working directory
    pub fn resolve(prefix: &str) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::resolve_with(prefix, std::env::vars(), &cwd)
    }

    /// Resolve from explicit variables and a starting directory
    pub fn resolve_with(
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
        start_dir: &Path,
    ) -> Result<Self> {
        let env_prefix = prefix.to_uppercase().replace('-', "_");
        let vars: HashMap<String, String> = vars.into_iter().collect();

        if let Some(json) = vars.get(&env_prefix) {
            debug!(var = %env_prefix, "Store settings from environment JSON");
            return serde_json::from_str(json).map_err(|e| {
                AuthzError::Configuration(format!("{}: {}", env_prefix, e))
            });
        }

        if let Some(settings) = Self::from_prefixed_vars(&env_prefix, &vars)? {
            debug!(prefix = %env_prefix, "Store settings from environment variables");
            return Ok(settings);
        }

        if let Some(path) = find_settings_file(prefix, start_dir) {
            debug!(path = %path.display(), "Store settings from file");
            let text = std::fs::read_to_string(&path)?;
            return toml::from_str(&text).map_err(|e| {
                AuthzError::Configuration(format!("{}: {}", path.display(), e))
            });
        }

        Err(AuthzError::Configuration(format!(
            "no store settings found for {}",
            prefix
        )))
    }

    fn from_prefixed_vars(
        env_prefix: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Option<Self>> {
        let scoped = format!("{}_", env_prefix);
        let get = |field: &str| vars.get(&format!("{}{}", scoped, field));

        if !vars.keys().any(|k| k.starts_with(&scoped)) {
            return Ok(None);
        }

        let required = |field: &str| {
            get(field).cloned().ok_or_else(|| {
                AuthzError::Configuration(format!("{}{} is not set", scoped, field))
            })
        };
        let mut settings = StoreSettings::new(required("IDENTITY_TABLE")?, required("POLICY_TABLE")?);

        let batch = &mut settings.batch;
        parse_into(get("BATCH_CHUNK_SIZE"), "BATCH_CHUNK_SIZE", &mut batch.chunk_size)?;
        parse_into(get("BATCH_CONCURRENCY"), "BATCH_CONCURRENCY", &mut batch.concurrency)?;
        parse_into(get("BATCH_RETRIES"), "BATCH_RETRIES", &mut batch.retries)?;
        parse_into(get("BATCH_RETRY_DELAY_MS"), "BATCH_RETRY_DELAY_MS", &mut batch.retry_delay_ms)?;

        Ok(Some(settings))
    }
}

fn parse_into<T: FromStr>(raw: Option<&String>, field: &str, target: &mut T) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = raw {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| AuthzError::Configuration(format!("{}: {}", field, e)))?;
    }
    Ok(())
}

fn find_settings_file(prefix: &str, start_dir: &Path) -> Option<PathBuf> {
    let file_name = format!("{}.toml", prefix);
    start_dir.ancestors().find_map(|dir| {
        [dir.join(&file_name), dir.join("config").join(&file_name)]
            .into_iter()
            .find(|candidate| candidate.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_json_variable_wins() {
        let dir = TempDir::new().unwrap();
        let settings = StoreSettings::resolve_with(
            "lrn-authz",
            vars(&[
                ("LRN_AUTHZ", r#"{"identity_table":"ids","policy_table":"pols","batch":{"retries":5}}"#),
                ("LRN_AUTHZ_IDENTITY_TABLE", "ignored"),
            ]),
            dir.path(),
        )
        .unwrap();

        assert_eq!(settings.identity_table, "ids");
        assert_eq!(settings.policy_table, "pols");
        assert_eq!(settings.batch.retries, 5);
        assert_eq!(settings.batch.chunk_size, 100);
    }

    #[test]
    fn test_prefixed_variables() {
        let dir = TempDir::new().unwrap();
        let settings = StoreSettings::resolve_with(
            "authz",
            vars(&[
                ("AUTHZ_IDENTITY_TABLE", "ids"),
                ("AUTHZ_POLICY_TABLE", "pols"),
                ("AUTHZ_BATCH_CONCURRENCY", " 8 "),
                ("OTHER_POLICY_TABLE", "nope"),
            ]),
            dir.path(),
        )
        .unwrap();

        assert_eq!(settings.identity_table, "ids");
        assert_eq!(settings.batch.concurrency, 8);
        assert_eq!(settings.batch.retries, 2);
    }

    #[test]
    fn test_prefixed_variables_incomplete_or_invalid() {
        let dir = TempDir::new().unwrap();
        let missing = StoreSettings::resolve_with(
            "authz",
            vars(&[("AUTHZ_IDENTITY_TABLE", "ids")]),
            dir.path(),
        );
        assert!(matches!(missing, Err(AuthzError::Configuration(msg)) if msg.contains("POLICY_TABLE")));

        let invalid = StoreSettings::resolve_with(
            "authz",
            vars(&[
                ("AUTHZ_IDENTITY_TABLE", "ids"),
                ("AUTHZ_POLICY_TABLE", "pols"),
                ("AUTHZ_BATCH_RETRIES", "many"),
            ]),
            dir.path(),
        );
        assert!(matches!(invalid, Err(AuthzError::Configuration(_))));
    }

    #[test]
    fn test_file_found_walking_up() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join("config").join("authz.toml"),
            "identity_table = \"ids\"\npolicy_table = \"pols\"\n\n[batch]\nchunk_size = 25\n",
        )
        .unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let settings = StoreSettings::resolve_with("authz", Vec::new(), &nested).unwrap();
        assert_eq!(settings.policy_table, "pols");
        assert_eq!(settings.batch.chunk_size, 25);
        assert_eq!(settings.batch.concurrency, 3);
    }

    #[test]
    fn test_nearest_file_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("authz.toml"),
            "identity_table = \"outer\"\npolicy_table = \"outer\"\n",
        )
        .unwrap();
        let nested = dir.path().join("svc");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("authz.toml"),
            "identity_table = \"inner\"\npolicy_table = \"inner\"\n",
        )
        .unwrap();

        let settings = StoreSettings::resolve_with("authz", Vec::new(), &nested).unwrap();
        assert_eq!(settings.identity_table, "inner");
    }

    #[test]
    fn test_nothing_found() {
        let dir = TempDir::new().unwrap();
        let err = StoreSettings::resolve_with("lrn-authz-missing", Vec::new(), dir.path()).unwrap_err();
        assert!(matches!(err, AuthzError::Configuration(_)));
    }
}
