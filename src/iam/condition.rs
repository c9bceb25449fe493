//! Condition operators for statements
//!
//! Conditions narrow when a statement applies, based on the flattened request:
//! - String operations (Like, NotLike, Equals, NotEquals)
//! - Null checks
//! - Network range membership (IpAddress)
//! - `ForAllValues:` / `ForAnyValues:` (alias `ForAnyValue:`) quantified over
//!   array-valued fields, generated for every base operator
//!
//! Expected values may be a single value or a list; string operators match
//! when any listed pattern matches.

use super::flatten::{stringify, FlatMap};
use super::pattern::PatternSet;
use crate::error::{AuthzError, Result};
use ipnet::IpNet;
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::LazyLock;

/// Base condition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseOperator {
    /// Field matches any glob
    StringLike,
    /// Field matches no glob
    StringNotLike,
    /// Field equals any expected value
    StringEquals,
    /// Field equals no expected value
    StringNotEquals,
    /// Field is (or is not) absent, null or blank
    Null,
    /// Address lies inside any expected network
    IpAddress,
}

impl BaseOperator {
    pub const ALL: [BaseOperator; 6] = [
        BaseOperator::StringLike,
        BaseOperator::StringNotLike,
        BaseOperator::StringEquals,
        BaseOperator::StringNotEquals,
        BaseOperator::Null,
        BaseOperator::IpAddress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BaseOperator::StringLike => "StringLike",
            BaseOperator::StringNotLike => "StringNotLike",
            BaseOperator::StringEquals => "StringEquals",
            BaseOperator::StringNotEquals => "StringNotEquals",
            BaseOperator::Null => "Null",
            BaseOperator::IpAddress => "IpAddress",
        }
    }

    /// Evaluate against a field value; `None` means the field is absent
    pub fn evaluate(&self, actual: Option<&Value>, expected: &Value) -> Result<bool> {
        match self {
            BaseOperator::StringLike => {
                let Some(text) = present_text(actual) else {
                    return Ok(false);
                };
                Ok(PatternSet::globs(&expected_texts(expected))?.any_match(&text))
            }
            BaseOperator::StringNotLike => {
                let Some(text) = present_text(actual) else {
                    return Ok(false);
                };
                Ok(!PatternSet::globs(&expected_texts(expected))?.any_match(&text))
            }
            BaseOperator::StringEquals => {
                let Some(text) = present_text(actual) else {
                    return Ok(false);
                };
                Ok(PatternSet::exact(&expected_texts(expected)).any_match(&text))
            }
            BaseOperator::StringNotEquals => {
                let Some(text) = present_text(actual) else {
                    return Ok(false);
                };
                Ok(!PatternSet::exact(&expected_texts(expected)).any_match(&text))
            }
            BaseOperator::Null => {
                let expect_null = null_expectation(expected)?;
                match actual {
                    None => Ok(expect_null),
                    Some(value) => Ok(is_null_like(value) == expect_null),
                }
            }
            BaseOperator::IpAddress => {
                let Some(text) = present_text(actual) else {
                    return Ok(false);
                };
                Ok(ip_in_ranges(&text, &expected_texts(expected)))
            }
        }
    }
}

/// Quantifier applied over array-valued fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    ForAllValues,
    ForAnyValues,
}

/// A registered operator: a base operator, optionally quantified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionOperator {
    pub base: BaseOperator,
    pub quantifier: Option<Quantifier>,
}

impl ConditionOperator {
    /// Evaluate `field` of the flattened request against `expected`
    pub fn evaluate(&self, request: &FlatMap, field: &str, expected: &Value) -> Result<bool> {
        let actual = request.get(field);
        let Some(quantifier) = self.quantifier else {
            return self.base.evaluate(actual, expected);
        };

        let items = match actual {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return Ok(false),
        };

        match quantifier {
            Quantifier::ForAllValues => {
                for item in items {
                    if !self.base.evaluate(Some(item), expected)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Quantifier::ForAnyValues => {
                for item in items {
                    if self.base.evaluate(Some(item), expected)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Name → operator lookup, built once with the quantified variants generated
/// from the base set
#[derive(Debug)]
pub struct OperatorRegistry {
    operators: HashMap<String, ConditionOperator>,
}

static REGISTRY: LazyLock<OperatorRegistry> = LazyLock::new(OperatorRegistry::new);

impl OperatorRegistry {
    fn new() -> Self {
        let mut operators = HashMap::new();
        for base in BaseOperator::ALL {
            let name = base.name();
            operators.insert(
                name.to_string(),
                ConditionOperator {
                    base,
                    quantifier: None,
                },
            );

            let all = ConditionOperator {
                base,
                quantifier: Some(Quantifier::ForAllValues),
            };
            let any = ConditionOperator {
                base,
                quantifier: Some(Quantifier::ForAnyValues),
            };
            operators.insert(format!("ForAllValues:{}", name), all);
            operators.insert(format!("ForAnyValues:{}", name), any);
            operators.insert(format!("ForAnyValue:{}", name), any);
        }
        OperatorRegistry { operators }
    }

    /// Shared registry
    pub fn global() -> &'static OperatorRegistry {
        &REGISTRY
    }

    /// Look up an operator by its statement name
    pub fn get(&self, name: &str) -> Result<&ConditionOperator> {
        self.operators
            .get(name)
            .ok_or_else(|| AuthzError::UnknownOperator(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Human-readable description of a failed condition, for logs and audit
pub fn describe_failure(operator: &str, request: &FlatMap, field: &str, expected: &Value) -> String {
    let actual = request
        .get(field)
        .map(stringify)
        .unwrap_or_else(|| "undefined".to_string());
    let mut message = format!("Failed assertion for {}({})", field, actual);

    match (operator, expected) {
        ("Null", Value::Bool(true)) => message.push_str(" to be Null"),
        ("Null", Value::Bool(false)) => message.push_str(" to be NotNull"),
        _ => {
            message.push_str(" to match ");
            message.push_str(&stringify(expected));
        }
    }
    message
}

/// Text of a present, non-null field
fn present_text(actual: Option<&Value>) -> Option<String> {
    match actual {
        None | Some(Value::Null) => None,
        Some(value) => Some(stringify(value)),
    }
}

fn expected_texts(expected: &Value) -> Vec<String> {
    match expected {
        Value::Array(items) => items.iter().map(stringify).collect(),
        other => vec![stringify(other)],
    }
}

fn null_expectation(expected: &Value) -> Result<bool> {
    match expected {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(AuthzError::UnknownConditionExpectation {
            operator: "Null".to_string(),
            expected: other.to_string(),
        }),
    }
}

fn is_null_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s == "null" || s.trim().is_empty(),
        other => stringify(other).trim().is_empty(),
    }
}

fn ip_in_ranges(actual: &str, ranges: &[String]) -> bool {
    let actual = actual.trim();
    let target: Option<IpNet> = actual
        .parse::<IpNet>()
        .ok()
        .or_else(|| actual.parse::<IpAddr>().ok().map(IpNet::from));
    let Some(target) = target else {
        tracing::debug!(address = %actual, "IpAddress condition on a non-address value");
        return false;
    };

    ranges.iter().any(|range| {
        let range = range.trim();
        let net = range
            .parse::<IpNet>()
            .ok()
            .or_else(|| range.parse::<IpAddr>().ok().map(IpNet::from));
        match net {
            Some(net) => net.contains(&target),
            None => {
                tracing::warn!(cidr = %range, "Invalid network range in IpAddress condition, skipping");
                false
            }
        }
    })
}
