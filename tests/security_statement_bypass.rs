//! Security tests - attempts to widen access through requests, parameters
//! and caller context

use lrn_authz::iam::{Decision, Effect, PolicyEngine, Statement, TemplateResolver};
use lrn_authz::{
    Authorizer, AuthzError, CallerContext, MemoryStore, PlatformIdentity, PolicyRecord,
    RequestBuilder, ResourceDescriptor,
};
use serde_json::{json, Value};

fn evaluate(statements: &[Statement], action: &str, lrn: &str) -> Decision {
    PolicyEngine::new()
        .evaluate(&json!({"action": action, "lrn": lrn}), statements)
        .unwrap()
}

#[test]
fn test_patterns_are_anchored() {
    let statements = vec![Statement::new(
        Effect::Allow,
        "orders:get",
        "lrn:prod:orders:::order/1",
    )];

    assert!(evaluate(&statements, "orders:get", "lrn:prod:orders:::order/1").allowed);
    assert!(!evaluate(&statements, "orders:getAll", "lrn:prod:orders:::order/1").allowed);
    assert!(!evaluate(&statements, "xorders:get", "lrn:prod:orders:::order/1").allowed);
    assert!(!evaluate(&statements, "orders:get", "lrn:prod:orders:::order/10").allowed);
    assert!(!evaluate(&statements, "orders:get", "xlrn:prod:orders:::order/1").allowed);
}

#[test]
fn test_dots_are_literal() {
    let statements = vec![Statement::new(
        Effect::Allow,
        "files:read",
        "lrn:prod:files:::v1.0/report.txt",
    )];

    assert!(evaluate(&statements, "files:read", "lrn:prod:files:::v1.0/report.txt").allowed);
    assert!(!evaluate(&statements, "files:read", "lrn:prod:files:::v1x0/report.txt").allowed);
    assert!(!evaluate(&statements, "files:read", "lrn:prod:files:::v1.0/reportatxt").allowed);
}

#[test]
fn test_regex_syntax_in_patterns_is_inert() {
    // Alternation and groups are stripped, leaving a literal
    let statements = vec![Statement::new(
        Effect::Allow,
        "files:read",
        "lrn:prod:files:::(public|private)",
    )];

    assert!(!evaluate(&statements, "files:read", "lrn:prod:files:::public").allowed);
    assert!(!evaluate(&statements, "files:read", "lrn:prod:files:::private").allowed);
    assert!(evaluate(&statements, "files:read", "lrn:prod:files:::publicprivate").allowed);
}

#[test]
fn test_single_character_wildcard() {
    let statements = vec![Statement::new(Effect::Allow, "files:read", "lrn:prod:files:::v?")];

    assert!(evaluate(&statements, "files:read", "lrn:prod:files:::v2").allowed);
    assert!(!evaluate(&statements, "files:read", "lrn:prod:files:::v").allowed);
    assert!(!evaluate(&statements, "files:read", "lrn:prod:files:::v10").allowed);
}

#[test]
fn test_explicit_deny_beats_broad_allow() {
    let statements = vec![
        Statement::new(Effect::Allow, "*", "*"),
        Statement::new(Effect::Deny, "admin:*", "*"),
        Statement {
            not_resource: Some("lrn:prod:public:*".into()),
            ..Statement::new(Effect::Deny, "public:write", "lrn:never")
        },
    ];

    assert!(evaluate(&statements, "orders:get", "lrn:prod:orders:::1").allowed);
    assert_eq!(
        evaluate(&statements, "admin:reset", "lrn:prod:admin:::all"),
        Decision::denied_by_policy()
    );
    assert_eq!(
        evaluate(&statements, "public:write", "lrn:prod:secret:::x"),
        Decision::denied_by_policy()
    );
    assert!(evaluate(&statements, "public:write", "lrn:prod:public:::x").allowed);
}

#[test]
fn test_parameters_cannot_add_lrn_segments() {
    let resource = ResourceDescriptor::new("lrn:prod:orders:{account}::order/{order}", "get")
        .with_param("orders", "account", "acct-1:::order/*")
        .with_param("orders", "order", "1");
    let request = RequestBuilder::default()
        .build(&CallerContext::anonymous(), &resource)
        .unwrap();
    assert_eq!(request.lrn, "lrn:prod:orders:acct-1order/*::order/1");

    let statements = vec![Statement::new(
        Effect::Allow,
        "orders:get",
        "lrn:prod:orders:acct-1::order/*",
    )];
    assert!(!PolicyEngine::new()
        .evaluate(&request.to_value().unwrap(), &statements)
        .unwrap()
        .allowed);
}

#[test]
fn test_request_fields_cannot_spoof_action() {
    // A system named like a top-level field keeps the canonical action
    let resource = ResourceDescriptor::new("lrn:prod:action:::x", "read")
        .with_param("action", "spoof", "admin:*");
    let request = RequestBuilder::default()
        .build(&CallerContext::anonymous(), &resource)
        .unwrap();

    let value = request.to_value().unwrap();
    assert_eq!(value["action"], json!("action:read"));
}

#[test]
fn test_context_values_cannot_rewrite_statements() {
    let context = json!({
        "account": {"id": "a1\",\"Effect\":\"Allow\",\"Resource\":\"*"}
    });
    let statements = TemplateResolver::new(&context)
        .unwrap()
        .resolve(&[r#"{"Effect":"Deny","Action":"*","Resource":"lrn:prod:acct:${account.id}"}"#])
        .unwrap();

    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].effect, Effect::Deny);
    assert_eq!(statements[0].resource.as_ref().unwrap().as_slice().len(), 1);
}

#[tokio::test]
async fn test_passed_context_cannot_escape_templates() {
    let store = MemoryStore::new();
    store.put_policy(PolicyRecord::new("role/caller_key").with_policy(
        "own-account",
        [json!({
            "Effect": "Allow",
            "Action": "billing:read",
            "Resource": "lrn:prod:billing:${account}:*"
        })
        .to_string()],
    ));
    let authorizer = Authorizer::new(store);

    let mut caller = CallerContext::new(
        "req-9",
        PlatformIdentity {
            caller: Some("service-key".into()),
            ..Default::default()
        },
    );
    caller.query = json!({"ctx_account": "a1\"],\"Resource\":[\"*"})
        .as_object()
        .unwrap()
        .clone();

    let own = ResourceDescriptor::new("lrn:prod:billing:a1:invoices", "read");
    let err = authorizer.authorize(&caller, &own, None).await.unwrap_err();
    assert!(err.is_access_denied());

    caller.query = json!({"ctx_account": "a1"}).as_object().unwrap().clone();
    assert!(authorizer.authorize(&caller, &own, None).await.is_ok());

    let other = ResourceDescriptor::new("lrn:prod:billing:a2:invoices", "read");
    assert!(authorizer
        .authorize(&caller, &other, None)
        .await
        .unwrap_err()
        .is_access_denied());
}

#[test]
fn test_deeply_nested_request_is_rejected() {
    let mut nested = Value::String("x".into());
    for _ in 0..64 {
        nested = json!({ "n": nested });
    }
    let request = json!({"action": "a:b", "lrn": "lrn:a:b", "deep": nested});
    let statements = vec![Statement::new(Effect::Allow, "*", "*")];

    assert!(matches!(
        PolicyEngine::new().evaluate(&request, &statements),
        Err(AuthzError::FlattenDepthExceeded(_))
    ));
}

#[test]
fn test_condition_on_missing_identity_attribute() {
    // An absent attribute never satisfies a positive string condition
    let statements = vec![Statement::new(Effect::Allow, "*", "*").with_condition(
        "StringEquals",
        "platform:role",
        json!("admin"),
    )];
    let request = json!({"action": "a:b", "lrn": "lrn:a:b", "platform": {}});
    assert_eq!(
        PolicyEngine::new().evaluate(&request, &statements).unwrap(),
        Decision::no_match()
    );

    let null_role = json!({"action": "a:b", "lrn": "lrn:a:b", "platform": {"role": null}});
    assert!(!PolicyEngine::new().evaluate(&null_role, &statements).unwrap().allowed);
}
