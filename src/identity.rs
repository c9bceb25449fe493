//! Caller identities and the records they are loaded from

use crate::error::{AuthzError, Result};
use crate::request::CallerContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label whose statements apply to every caller
pub const WILDCARD_LABEL: &str = "*";

/// Identity id assigned to platform-authenticated callers
pub const CALLER_KEY_ID: &str = "caller_key";

/// Role assigned to platform-authenticated callers
pub const CALLER_KEY_ROLE: &str = "role/caller_key";

/// Resolved caller identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub identity_id: Option<String>,

    /// Role labels whose statements apply to this caller
    #[serde(default)]
    pub identities: Vec<String>,

    /// Attributes available to statement templates
    #[serde(default)]
    pub context: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_id: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Identity::default()
    }

    /// Identity known only by id, with no roles
    pub fn with_id(id: impl Into<String>) -> Self {
        Identity {
            identity_id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Platform-authenticated caller; `key` is recorded in the context
    pub fn caller_key(key: &str, mut context: Map<String, Value>) -> Self {
        context.insert("key".to_string(), Value::String(key.to_string()));
        Identity {
            identity_id: Some(CALLER_KEY_ID.to_string()),
            identities: vec![CALLER_KEY_ROLE.to_string()],
            context,
            federated_id: None,
        }
    }

    /// Labels to collect statements for, in order, ending with the wildcard
    pub fn labels(&self) -> Vec<String> {
        let mut labels = self.identities.clone();
        labels.push(WILDCARD_LABEL.to_string());
        labels
    }
}

/// Identity as persisted in the identity table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: String,

    #[serde(default)]
    pub identities: Vec<String>,

    /// Object, or its JSON text in older records
    #[serde(default)]
    pub context: Value,
}

impl IdentityRecord {
    pub fn new(identity_id: impl Into<String>, identities: Vec<String>, context: Value) -> Self {
        IdentityRecord {
            identity_id: identity_id.into(),
            identities,
            context,
        }
    }

    /// Convert into an identity, decoding legacy string contexts
    pub fn into_identity(self) -> Result<Identity> {
        let context = match self.context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(AuthzError::StoreMalformed(format!(
                        "context of {} is not an object: {}",
                        self.identity_id, other
                    )))
                }
                Err(e) => {
                    return Err(AuthzError::StoreMalformed(format!(
                        "context of {}: {}",
                        self.identity_id, e
                    )))
                }
            },
            other => {
                return Err(AuthzError::StoreMalformed(format!(
                    "context of {} is not an object: {}",
                    self.identity_id, other
                )))
            }
        };

        Ok(Identity {
            identity_id: Some(self.identity_id),
            identities: self.identities,
            context,
            federated_id: None,
        })
    }
}

/// Context supplied by a trusted caller on behalf of someone else
///
/// Read from `_context` in the request body, then overlaid by query
/// parameters named `ctx_<name>` or `ctx-<name>`.
pub fn passed_context(caller: &CallerContext) -> Map<String, Value> {
    let body = match &caller.body {
        Some(Value::String(text)) => serde_json::from_str::<Value>(text).ok(),
        Some(value) => Some(value.clone()),
        None => None,
    };

    let mut context = match body {
        Some(Value::Object(mut map)) => match map.remove("_context") {
            Some(Value::Object(passed)) => passed,
            _ => Map::new(),
        },
        _ => Map::new(),
    };

    for (name, value) in &caller.query {
        let field = name
            .strip_prefix("ctx_")
            .or_else(|| name.strip_prefix("ctx-"));
        if let Some(field) = field.filter(|f| !f.is_empty()) {
            context.insert(field.to_string(), value.clone());
        }
    }

    context
}
