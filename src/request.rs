//! Canonical request construction
//!
//! A [`ResourceDescriptor`] names the LRN template, the verb, and the
//! placeholder values for the LRN's system. [`RequestBuilder`] combines it with
//! the caller's invocation context into the [`Request`] the engine evaluates.

use crate::error::{AuthzError, Result};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use uuid::Uuid;

static LRN_SYSTEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"lrn:([^:]*):([^:]*)").expect("lrn regex is valid"));

/// Prepend `prefix` to a relative LRN (one not starting with `lrn`)
pub fn qualify_lrn(lrn: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !lrn.starts_with("lrn") => format!("{}{}", prefix, lrn),
        _ => lrn.to_string(),
    }
}

/// System segment of `lrn:<realm>:<system>...`, searched anywhere in the text
pub fn system_of(lrn: &str) -> Option<&str> {
    LRN_SYSTEM
        .captures(lrn)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

/// Identity attributes supplied by the hosting platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformIdentity {
    /// Caller key of a platform-authenticated (non-federated) caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_auth_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_pool_id: Option<String>,

    /// Any other attributes, e.g. `sourceIp` or `userAgent`
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Invocation context of one call, as handed over by the hosting platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    #[serde(default)]
    pub request_id: Option<String>,

    #[serde(default)]
    pub identity: Option<PlatformIdentity>,

    /// Request body, either JSON or its text form
    #[serde(default)]
    pub body: Option<Value>,

    /// Query string parameters
    #[serde(default)]
    pub query: Map<String, Value>,
}

impl CallerContext {
    pub fn new(request_id: impl Into<String>, identity: PlatformIdentity) -> Self {
        CallerContext {
            request_id: Some(request_id.into()),
            identity: Some(identity),
            ..Default::default()
        }
    }

    /// Context without any platform identity
    pub fn anonymous() -> Self {
        CallerContext::default()
    }
}

/// Context fields a caller asks to be merged from policy records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextFields {
    One(String),
    Many(Vec<String>),
}

/// What is being accessed and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// LRN template, e.g. `lrn:prod:orders:::{order}`
    pub lrn: String,

    /// Verb, combined with the system as `<system>:<verb>`
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextFields>,

    /// Placeholder values keyed by system name
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ResourceDescriptor {
    pub fn new(lrn: impl Into<String>, action: impl Into<String>) -> Self {
        ResourceDescriptor {
            lrn: lrn.into(),
            action: action.into(),
            context: None,
            params: Map::new(),
        }
    }

    /// Set a placeholder value for `system`
    pub fn with_param(
        mut self,
        system: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let entry = self
            .params
            .entry(system.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Request that a policy record field be merged into the caller context
    pub fn with_context(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.context = Some(match self.context.take() {
            None => ContextFields::One(field),
            Some(ContextFields::One(first)) => ContextFields::Many(vec![first, field]),
            Some(ContextFields::Many(mut fields)) => {
                fields.push(field);
                ContextFields::Many(fields)
            }
        });
        self
    }

    pub fn context_fields(&self) -> Vec<String> {
        match &self.context {
            None => Vec::new(),
            Some(ContextFields::One(field)) => vec![field.clone()],
            Some(ContextFields::Many(fields)) => fields.clone(),
        }
    }
}

/// Federated identity attributes carried by the request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedIdentity {
    pub id: Option<String>,
    pub provider: Option<String>,
    #[serde(rename = "type")]
    pub auth_type: Option<String>,
    pub pool_id: Option<String>,
}

/// Canonical request evaluated by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: String,
    /// Epoch milliseconds
    pub time: i64,
    /// `<system>:<verb>`
    pub action: String,
    pub lrn: String,
    pub platform: Map<String, Value>,
    pub federated: FederatedIdentity,
    /// System name parsed from the LRN
    #[serde(skip)]
    pub system: String,
    /// Original, unsanitized placeholder values for `system`
    #[serde(skip)]
    pub params: Option<Value>,
}

impl Request {
    /// JSON form, with the system parameters attached under the system name
    pub fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let (Value::Object(map), Some(params)) = (&mut value, &self.params) {
            map.entry(self.system.clone()).or_insert_with(|| params.clone());
        }
        Ok(value)
    }
}

/// Builds requests, optionally qualifying relative LRNs with a prefix
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    resource_prefix: Option<String>,
}

impl RequestBuilder {
    pub fn new(resource_prefix: Option<String>) -> Self {
        RequestBuilder { resource_prefix }
    }

    /// Build the canonical request for one call
    ///
    /// # Examples
    /// ```
    /// use lrn_authz::{CallerContext, RequestBuilder, ResourceDescriptor};
    ///
    /// let resource = ResourceDescriptor::new("lrn:prod:orders:::{order}", "get")
    ///     .with_param("orders", "order", "o:17");
    /// let request = RequestBuilder::default()
    ///     .build(&CallerContext::anonymous(), &resource)
    ///     .unwrap();
    ///
    /// assert_eq!(request.action, "orders:get");
    /// assert_eq!(request.lrn, "lrn:prod:orders:::o17");
    /// ```
    pub fn build(&self, caller: &CallerContext, resource: &ResourceDescriptor) -> Result<Request> {
        let mut lrn = qualify_lrn(&resource.lrn, self.resource_prefix.as_deref());
        let system = system_of(&lrn)
            .map(str::to_string)
            .ok_or_else(|| AuthzError::InvalidResourceName(lrn.clone()))?;

        let params = resource.params.get(&system).cloned();
        if let Some(Value::Object(values)) = &params {
            for (key, value) in values {
                if let Value::String(text) = value {
                    let sanitized = text.replace(':', "");
                    lrn = lrn.replace(&format!("{{{}}}", key), &sanitized);
                }
            }
        }

        let platform_identity = caller.identity.clone().unwrap_or_default();
        let federated = FederatedIdentity {
            id: platform_identity.federated_id.clone(),
            provider: platform_identity.federated_provider.clone(),
            auth_type: platform_identity.federated_auth_type.clone(),
            pool_id: platform_identity.federated_pool_id.clone(),
        };

        let mut platform = match serde_json::to_value(&platform_identity)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = caller
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        platform.insert("requestId".to_string(), Value::String(id.clone()));

        Ok(Request {
            id,
            time: Utc::now().timestamp_millis(),
            action: format!("{}:{}", system, resource.action),
            lrn,
            platform,
            federated,
            system,
            params,
        })
    }
}
