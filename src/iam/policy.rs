//! Statement document structure
//!
//! Statements define which actions are allowed or denied on which LRNs.
//! The format is inspired by AWS IAM statements: `Action`/`NotAction`,
//! `Resource`/`NotResource` and an optional `Condition` block keyed by
//! operator name, then by request field.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Effect of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

impl FromStr for Effect {
    type Err = String;

    /// Parses case-insensitively, ignoring surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            _ => Err(format!("unknown effect '{}'", s)),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => f.write_str("Allow"),
            Effect::Deny => f.write_str("Deny"),
        }
    }
}

impl Serialize for Effect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Effect {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One pattern or a list of patterns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    One(String),
    Many(Vec<String>),
}

impl PatternList {
    pub fn as_slice(&self) -> &[String] {
        match self {
            PatternList::One(p) => std::slice::from_ref(p),
            PatternList::Many(ps) => ps,
        }
    }

    /// Rewrite every pattern in place
    pub fn map_each(&mut self, f: impl Fn(&str) -> String) {
        match self {
            PatternList::One(p) => *p = f(p),
            PatternList::Many(ps) => ps.iter_mut().for_each(|p| *p = f(p)),
        }
    }
}

impl From<&str> for PatternList {
    fn from(p: &str) -> Self {
        PatternList::One(p.to_string())
    }
}

impl From<Vec<&str>> for PatternList {
    fn from(ps: Vec<&str>) -> Self {
        PatternList::Many(ps.into_iter().map(str::to_string).collect())
    }
}

/// Condition block: operator name → request field → expected value(s)
pub type ConditionBlock = BTreeMap<String, BTreeMap<String, Value>>;

/// A single statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Statement ID (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Effect of this statement
    pub effect: Effect,

    /// Actions this statement applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PatternList>,

    /// Actions this statement applies to by exclusion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_action: Option<PatternList>,

    /// LRNs this statement applies to (supports wildcards)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<PatternList>,

    /// LRNs this statement applies to by exclusion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_resource: Option<PatternList>,

    /// Optional conditions for when this statement applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionBlock>,
}

impl Statement {
    /// Create a new statement over actions and resources
    pub fn new(
        effect: Effect,
        action: impl Into<PatternList>,
        resource: impl Into<PatternList>,
    ) -> Self {
        Statement {
            sid: None,
            effect,
            action: Some(action.into()),
            not_action: None,
            resource: Some(resource.into()),
            not_resource: None,
            condition: None,
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Add a condition entry, e.g. `("IpAddress", "caller:source-ip", json!(["10.0.0.0/8"]))`
    pub fn with_condition(
        mut self,
        operator: impl Into<String>,
        field: impl Into<String>,
        expected: Value,
    ) -> Self {
        self.condition
            .get_or_insert_with(BTreeMap::new)
            .entry(operator.into())
            .or_default()
            .insert(field.into(), expected);
        self
    }

    /// Parse a statement from JSON text
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to compact JSON, the template form statements are stored in
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why a decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    DeniedByPolicy,
    MatchedPolicy,
    NoMatchingStatement,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::DeniedByPolicy => "denied by policy",
            DecisionReason::MatchedPolicy => "matched policy",
            DecisionReason::NoMatchingStatement => "did not match any statements",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a request against a statement list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl Decision {
    pub fn denied_by_policy() -> Self {
        Decision {
            allowed: false,
            reason: DecisionReason::DeniedByPolicy,
        }
    }

    pub fn matched_policy() -> Self {
        Decision {
            allowed: true,
            reason: DecisionReason::MatchedPolicy,
        }
    }

    pub fn no_match() -> Self {
        Decision {
            allowed: false,
            reason: DecisionReason::NoMatchingStatement,
        }
    }
}
