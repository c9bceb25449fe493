//! Statement evaluation engine with deny precedence
//!
//! Evaluates statements to determine if a request is allowed.
//! Key features:
//! - Explicit deny takes precedence over allow, wherever it appears
//! - First matching allow wins; list order is the only ordering
//! - Implicit deny when nothing matches
//! - Conditions are a conjunction over every operator and field

use super::condition::{describe_failure, OperatorRegistry};
use super::flatten::{flatten, FlatMap};
use super::pattern::PatternSet;
use super::policy::{Decision, Effect, PatternList, Statement};
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, info};

/// Flattened request field holding `<system>:<verb>`
pub const ACTION_FIELD: &str = "action";
/// Flattened request field holding the resolved LRN
pub const LRN_FIELD: &str = "lrn";

/// Statement evaluation engine
///
/// Holds no per-request state, so one engine can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEngine {
    registry: &'static OperatorRegistry,
}

impl PolicyEngine {
    /// Create an engine over the shared operator registry
    pub fn new() -> Self {
        PolicyEngine {
            registry: OperatorRegistry::global(),
        }
    }

    /// Evaluate a request against statements
    ///
    /// # Arguments
    ///
    /// * `request` - The request object; flattened with `:` before matching
    /// * `statements` - Statements in evaluation order
    ///
    /// # Errors
    ///
    /// Unknown condition operators and invalid expectations are errors, not
    /// denials.
    ///
    /// # Examples
    ///
    /// ```
    /// use lrn_authz::iam::{Decision, Effect, PolicyEngine, Statement};
    /// use serde_json::json;
    ///
    /// let engine = PolicyEngine::new();
    /// let statements = vec![Statement::new(Effect::Allow, "Get:*", "*")];
    ///
    /// let request = json!({"action": "Get:234", "lrn": "some:lrn:thing:::234"});
    /// assert_eq!(engine.evaluate(&request, &statements).unwrap(), Decision::matched_policy());
    /// ```
    pub fn evaluate(&self, request: &Value, statements: &[Statement]) -> Result<Decision> {
        let flat = flatten(request, ":")?;

        for statement in statements.iter().filter(|s| s.effect == Effect::Deny) {
            if self.statement_matches(statement, &flat)? {
                info!(
                    sid = ?statement.sid,
                    action = ?flat.get(ACTION_FIELD),
                    lrn = ?flat.get(LRN_FIELD),
                    "Denying request by statement"
                );
                return Ok(Decision::denied_by_policy());
            }
        }

        for statement in statements.iter().filter(|s| s.effect == Effect::Allow) {
            if self.statement_matches(statement, &flat)? {
                debug!(sid = ?statement.sid, "Granted by statement");
                return Ok(Decision::matched_policy());
            }
        }

        info!(
            action = ?flat.get(ACTION_FIELD),
            lrn = ?flat.get(LRN_FIELD),
            "Denied due to lack of matching statements"
        );
        Ok(Decision::no_match())
    }

    /// Check action, resource and conditions of one statement
    fn statement_matches(&self, statement: &Statement, flat: &FlatMap) -> Result<bool> {
        let action_matches = either_matches(
            flat,
            ACTION_FIELD,
            statement.action.as_ref(),
            statement.not_action.as_ref(),
        )?;
        if !action_matches {
            return Ok(false);
        }

        let resource_matches = either_matches(
            flat,
            LRN_FIELD,
            statement.resource.as_ref(),
            statement.not_resource.as_ref(),
        )?;
        if !resource_matches {
            return Ok(false);
        }

        self.conditions_hold(statement, flat)
    }

    fn conditions_hold(&self, statement: &Statement, flat: &FlatMap) -> Result<bool> {
        let Some(block) = &statement.condition else {
            return Ok(true);
        };

        for (operator_name, fields) in block {
            let operator = self.registry.get(operator_name)?;
            for (field, expected) in fields {
                let field = field.to_lowercase();
                if !operator.evaluate(flat, &field, expected)? {
                    debug!(
                        sid = ?statement.sid,
                        effect = %statement.effect,
                        "{}",
                        describe_failure(operator_name, flat, &field, expected)
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Positive patterns match by StringLike, negated ones by StringNotLike;
/// either one suffices. A missing or null field matches neither.
fn either_matches(
    flat: &FlatMap,
    field: &str,
    positive: Option<&PatternList>,
    negative: Option<&PatternList>,
) -> Result<bool> {
    let text = match flat.get(field) {
        None | Some(Value::Null) => return Ok(false),
        Some(value) => super::flatten::stringify(value),
    };

    if let Some(patterns) = positive {
        if PatternSet::globs(patterns.as_slice())?.any_match(&text) {
            return Ok(true);
        }
    }
    if let Some(patterns) = negative {
        if !PatternSet::globs(patterns.as_slice())?.any_match(&text) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use serde_json::json;

    fn get_request() -> Value {
        json!({"action": "Get:234", "lrn": "some:lrn:thing:::234"})
    }

    fn stmt(json: Value) -> Statement {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_empty_statements() {
        let engine = PolicyEngine::new();
        assert_eq!(engine.evaluate(&json!({}), &[]).unwrap(), Decision::no_match());
    }

    #[test]
    fn test_empty_request_matches_nothing() {
        let engine = PolicyEngine::new();
        let statements = vec![
            Statement::new(Effect::Allow, "Get:*", "*"),
            Statement::new(Effect::Deny, "Get:*", "*"),
        ];

        assert_eq!(
            engine.evaluate(&json!({}), &statements).unwrap(),
            Decision::no_match()
        );
        // Action alone is not enough without an lrn
        assert_eq!(
            engine.evaluate(&json!({"action": "Get:123"}), &statements).unwrap(),
            Decision::no_match()
        );
    }

    #[test]
    fn test_simple_allow() {
        let engine = PolicyEngine::new();
        let statements = vec![Statement::new(Effect::Allow, "Get:*", "*")];
        assert_eq!(
            engine.evaluate(&get_request(), &statements).unwrap(),
            Decision::matched_policy()
        );
    }

    #[test]
    fn test_simple_deny() {
        let engine = PolicyEngine::new();
        let statements = vec![Statement::new(Effect::Deny, "Get:*", "*")];
        assert_eq!(
            engine.evaluate(&get_request(), &statements).unwrap(),
            Decision::denied_by_policy()
        );
    }

    #[test]
    fn test_deny_precedence_regardless_of_order() {
        let engine = PolicyEngine::new();
        let allow = Statement::new(Effect::Allow, "Get:*", "*");
        let deny = Statement::new(Effect::Deny, "Get:*", "some:lrn:*");

        for statements in [vec![allow.clone(), deny.clone()], vec![deny, allow]] {
            assert_eq!(
                engine.evaluate(&get_request(), &statements).unwrap(),
                Decision::denied_by_policy()
            );
        }
    }

    #[test]
    fn test_allow_condition() {
        let engine = PolicyEngine::new();
        let statements = vec![Statement::new(Effect::Allow, "Get:*", "*").with_condition(
            "IpAddress",
            "my:source-ip",
            json!(["192.168.0.0"]),
        )];

        let mut request = get_request();
        request["my:source-ip"] = json!("192.168.0.0");
        assert_eq!(
            engine.evaluate(&request, &statements).unwrap(),
            Decision::matched_policy()
        );

        request["my:source-ip"] = json!("192.168.0.1");
        assert_eq!(
            engine.evaluate(&request, &statements).unwrap(),
            Decision::no_match()
        );
    }

    #[test]
    fn test_deny_condition() {
        let engine = PolicyEngine::new();
        let statements = vec![Statement::new(Effect::Deny, "Get:*", "*").with_condition(
            "IpAddress",
            "my:source-ip",
            json!(["192.168.0.0"]),
        )];

        let mut request = get_request();
        request["my:source-ip"] = json!("192.168.0.0");
        assert_eq!(
            engine.evaluate(&request, &statements).unwrap(),
            Decision::denied_by_policy()
        );

        request["my:source-ip"] = json!("192.168.0.1");
        assert_eq!(
            engine.evaluate(&request, &statements).unwrap(),
            Decision::no_match()
        );
    }

    #[test]
    fn test_failed_deny_condition_falls_through_to_allow() {
        let engine = PolicyEngine::new();
        let statements = vec![
            Statement::new(Effect::Deny, "Get:*", "*").with_condition(
                "StringEquals",
                "federated:provider",
                json!("blocked-idp"),
            ),
            Statement::new(Effect::Allow, "Get:*", "*"),
        ];

        let mut request = get_request();
        request["federated"] = json!({"provider": "trusted-idp"});
        assert_eq!(
            engine.evaluate(&request, &statements).unwrap(),
            Decision::matched_policy()
        );
    }

    #[test]
    fn test_not_action_not_resource() {
        let engine = PolicyEngine::new();
        let allow = stmt(json!({"Effect": "Allow", "NotAction": "Leave", "NotResource": "asdfasdf:asdfsadf"}));
        assert_eq!(
            engine.evaluate(&get_request(), &[allow]).unwrap(),
            Decision::matched_policy()
        );

        let deny = stmt(json!({"Effect": "Deny", "NotAction": "Leave", "NotResource": "asdfasdf:asdfsadf"}));
        assert_eq!(
            engine.evaluate(&get_request(), &[deny]).unwrap(),
            Decision::denied_by_policy()
        );

        let excluded = stmt(json!({"Effect": "Allow", "NotAction": "Get:*", "Resource": "*"}));
        assert_eq!(
            engine.evaluate(&get_request(), &[excluded]).unwrap(),
            Decision::no_match()
        );
    }

    #[test]
    fn test_action_or_not_action() {
        let engine = PolicyEngine::new();
        // Action misses but NotAction excludes nothing relevant: still a match
        let either = stmt(json!({
            "Effect": "Allow", "Action": "Put:*", "NotAction": "Delete:*", "Resource": "*"
        }));
        assert_eq!(
            engine.evaluate(&get_request(), &[either]).unwrap(),
            Decision::matched_policy()
        );
    }

    #[test]
    fn test_statement_without_action_never_matches() {
        let engine = PolicyEngine::new();
        let no_action = stmt(json!({"Effect": "Allow", "Resource": "*"}));
        assert_eq!(
            engine.evaluate(&get_request(), &[no_action]).unwrap(),
            Decision::no_match()
        );
    }

    #[test]
    fn test_condition_field_names_are_lowercased() {
        let engine = PolicyEngine::new();
        let statements = vec![Statement::new(Effect::Allow, "Get:*", "*").with_condition(
            "StringEquals",
            "Federated:PoolId",
            json!("pool-1"),
        )];

        let mut request = get_request();
        request["Federated"] = json!({"PoolId": "pool-1"});
        assert_eq!(
            engine.evaluate(&request, &statements).unwrap(),
            Decision::matched_policy()
        );
    }

    #[test]
    fn test_conditions_are_a_conjunction() {
        let engine = PolicyEngine::new();
        let statements = vec![Statement::new(Effect::Allow, "Get:*", "*")
            .with_condition("StringEquals", "tenant", json!("t1"))
            .with_condition("StringLike", "tags", json!("*gold*"))
            .with_condition("Null", "revoked", json!(true))];

        let mut request = get_request();
        request["tenant"] = json!("t1");
        request["tags"] = json!("gold,silver");
        assert!(engine.evaluate(&request, &statements).unwrap().allowed);

        request["revoked"] = json!("yes");
        assert!(!engine.evaluate(&request, &statements).unwrap().allowed);
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let engine = PolicyEngine::new();
        let statements = vec![Statement::new(Effect::Allow, "Get:*", "*").with_condition(
            "NumericLessThan",
            "age",
            json!(18),
        )];

        assert!(matches!(
            engine.evaluate(&get_request(), &statements),
            Err(AuthzError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_first_matching_allow_wins() {
        let engine = PolicyEngine::new();
        let statements = vec![
            Statement::new(Effect::Allow, "Put:*", "*").with_sid("miss"),
            Statement::new(Effect::Allow, "Get:*", "*").with_sid("first"),
            // Never reached: its unknown operator would otherwise error
            Statement::new(Effect::Allow, "Get:*", "*").with_condition("Bogus", "x", json!(1)),
        ];

        assert_eq!(
            engine.evaluate(&get_request(), &statements).unwrap(),
            Decision::matched_policy()
        );
    }
}
