//! Static policy configuration
//!
//! An operator-supplied [`PolicyCatalog`] names policies and maps identity
//! labels to policy names. [`BootstrapConfig::from_catalog`] validates the
//! prefixes, qualifies relative actions and resources, and keeps the result
//! as per-label statement templates. An [`Authorizer`](crate::Authorizer)
//! built with a bootstrap config never consults the store for statements.

use crate::error::{AuthzError, Result};
use crate::iam::Statement;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

/// Minimum number of non-empty segments in the resource prefix
const MIN_RESOURCE_SEGMENTS: usize = 3;

/// Number of colon-separated parts the resource prefix is padded to
const RESOURCE_PARTS: usize = 6;

/// Policy catalog as written by an operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyCatalog {
    /// Prefix for actions without a system, e.g. `orders`
    #[serde(default)]
    pub actions: String,

    /// Prefix for relative resources, e.g. `lrn:prod:orders`
    #[serde(default)]
    pub resource: String,

    /// Identity label to policy names
    #[serde(default)]
    pub identities: BTreeMap<String, Vec<String>>,

    /// Policy name to statements
    #[serde(default)]
    pub policies: BTreeMap<String, Vec<Statement>>,
}

impl PolicyCatalog {
    /// Load a catalog from a `.toml` or `.json` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(AuthzError::Configuration(format!(
                "unsupported catalog format {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AuthzError::Configuration(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Validated static configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    action_prefix: String,
    resource_prefix: String,
    statements: HashMap<String, Vec<String>>,
}

impl BootstrapConfig {
    /// Validate and expand a catalog
    ///
    /// # Examples
    /// ```
    /// use lrn_authz::{BootstrapConfig, PolicyCatalog};
    ///
    /// let catalog = PolicyCatalog::from_json_str(r#"{
    ///     "actions": "orders",
    ///     "resource": "lrn:prod:orders",
    ///     "identities": {"role/reader": ["read"]},
    ///     "policies": {"read": [{"Effect": "Allow", "Action": "get", "Resource": "*"}]}
    /// }"#).unwrap();
    /// let config = BootstrapConfig::from_catalog(catalog).unwrap();
    ///
    /// assert_eq!(config.resource_prefix(), "lrn:prod:orders:::");
    /// assert_eq!(config.statements_for("role/reader").len(), 1);
    /// ```
    pub fn from_catalog(catalog: PolicyCatalog) -> Result<Self> {
        let action_prefix = catalog.actions.trim().to_string();
        if action_prefix.is_empty() {
            return Err(AuthzError::Configuration(
                "no action prefix defined".to_string(),
            ));
        }
        let resource_prefix = pad_resource_prefix(&catalog.resource)?;

        let mut statements = HashMap::new();
        for (label, policy_names) in &catalog.identities {
            let mut templates = Vec::new();
            for name in policy_names {
                let policy = catalog.policies.get(name).ok_or_else(|| {
                    AuthzError::Configuration(format!(
                        "identity {} references unknown policy {}",
                        label, name
                    ))
                })?;
                for statement in policy {
                    let qualified = qualify(statement.clone(), &action_prefix, &resource_prefix);
                    templates.push(qualified.to_json()?);
                }
            }
            statements.insert(label.clone(), templates);
        }

        info!(
            action_prefix = %action_prefix,
            resource_prefix = %resource_prefix,
            labels = statements.len(),
            "Bootstrap configuration loaded"
        );

        Ok(BootstrapConfig {
            action_prefix,
            resource_prefix,
            statements,
        })
    }

    pub fn action_prefix(&self) -> &str {
        &self.action_prefix
    }

    pub fn resource_prefix(&self) -> &str {
        &self.resource_prefix
    }

    /// Statement templates configured for one label
    pub fn statements_for(&self, label: &str) -> &[String] {
        self.statements.get(label).map_or(&[], Vec::as_slice)
    }

    /// Statement templates for several labels, concatenated in order
    pub fn templates_for(&self, labels: &[String]) -> Vec<String> {
        labels
            .iter()
            .flat_map(|label| self.statements_for(label).iter().cloned())
            .collect()
    }
}

fn pad_resource_prefix(resource: &str) -> Result<String> {
    let mut parts: Vec<&str> = resource.split(':').filter(|p| !p.is_empty()).collect();
    if parts.len() < MIN_RESOURCE_SEGMENTS {
        return Err(AuthzError::Configuration(format!(
            "resource prefix {:?} needs at least {} segments",
            resource, MIN_RESOURCE_SEGMENTS
        )));
    }
    while parts.len() < RESOURCE_PARTS {
        parts.push("");
    }
    Ok(parts.join(":"))
}

fn qualify(mut statement: Statement, action_prefix: &str, resource_prefix: &str) -> Statement {
    let qualify_action = |p: &str| {
        if p.contains(':') {
            p.to_string()
        } else {
            format!("{}:{}", action_prefix, p)
        }
    };
    let qualify_resource = |p: &str| {
        if p.starts_with("lrn") {
            p.to_string()
        } else {
            format!("{}{}", resource_prefix, p)
        }
    };

    for list in [&mut statement.action, &mut statement.not_action]
        .into_iter()
        .flatten()
    {
        list.map_each(qualify_action);
    }
    for list in [&mut statement.resource, &mut statement.not_resource]
        .into_iter()
        .flatten()
    {
        list.map_each(qualify_resource);
    }
    statement
}
