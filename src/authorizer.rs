//! Authorization orchestration
//!
//! [`Authorizer::authorize`] resolves the caller, builds the canonical
//! request, collects statement templates for the caller's labels, resolves
//! them against the caller's context and evaluates them.

use crate::bootstrap::BootstrapConfig;
use crate::error::{AuthzError, Result};
use crate::iam::{PolicyEngine, TemplateResolver};
use crate::identity::{passed_context, Identity, WILDCARD_LABEL};
use crate::request::{CallerContext, RequestBuilder, ResourceDescriptor};
use crate::store::{PolicyRecord, PolicyStore};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

/// Decides whether a caller may act on a resource
#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn PolicyStore>,
    bootstrap: Option<Arc<BootstrapConfig>>,
    engine: PolicyEngine,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("bootstrap", &self.bootstrap)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Authorizer reading identities and statements from `store`
    pub fn new(store: impl PolicyStore + 'static) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<dyn PolicyStore>) -> Self {
        Authorizer {
            store,
            bootstrap: None,
            engine: PolicyEngine::new(),
        }
    }

    /// Use static statements instead of the store's policy records
    pub fn with_bootstrap(mut self, config: impl Into<Arc<BootstrapConfig>>) -> Self {
        self.bootstrap = Some(config.into());
        self
    }

    pub fn bootstrap(&self) -> Option<&BootstrapConfig> {
        self.bootstrap.as_deref()
    }

    /// Resolve the identity behind a call
    pub async fn get_identity(&self, caller: &CallerContext) -> Result<Identity> {
        let Some(platform) = &caller.identity else {
            debug!("No platform identity, using anonymous");
            return Ok(Identity::anonymous());
        };

        let mut federated_id = platform.federated_id.clone();
        if federated_id.is_none() {
            if let Some(key) = &platform.caller {
                let passed = passed_context(caller);
                match passed.get("federated_id").and_then(Value::as_str) {
                    Some(id) => {
                        debug!(federated_id = %id, "Caller acting on behalf of a federated identity");
                        federated_id = Some(id.to_string());
                    }
                    None => return Ok(Identity::caller_key(key, passed)),
                }
            }
        }

        let id = federated_id.unwrap_or_else(|| WILDCARD_LABEL.to_string());
        let mut identity = match self.store.get_identity(&id).await? {
            Some(record) if record.identity_id == id => record.into_identity()?,
            _ => {
                debug!(identity = %id, "No identity record");
                Identity::with_id(id.clone())
            }
        };
        if platform.federated_id.is_none() && id != WILDCARD_LABEL {
            identity.federated_id = Some(id);
        }
        Ok(identity)
    }

    /// Authorize one call, returning the identity on success
    ///
    /// A denial is [`AuthzError::AccessDenied`]; any other error is a
    /// configuration or store failure.
    pub async fn authorize(
        &self,
        caller: &CallerContext,
        resource: &ResourceDescriptor,
        identity: Option<Identity>,
    ) -> Result<Identity> {
        let mut identity = match identity {
            Some(identity) => identity,
            None => self.get_identity(caller).await?,
        };

        let builder = RequestBuilder::new(
            self.bootstrap
                .as_ref()
                .map(|config| config.resource_prefix().to_string()),
        );
        let request = builder.build(&effective_caller(caller, &identity), resource)?;
        if let Some(id) = &request.federated.id {
            identity.federated_id = Some(id.clone());
        }

        let templates = self.collect_templates(&mut identity, resource).await?;
        let context = Value::Object(identity.context.clone());
        let statements = TemplateResolver::new(&context)?.resolve(&templates)?;

        let decision = self.engine.evaluate(&request.to_value()?, &statements)?;
        info!(
            identity = identity.identity_id.as_deref().unwrap_or("anonymous"),
            action = %request.action,
            lrn = %request.lrn,
            allowed = decision.allowed,
            reason = %decision.reason,
            "Authorization decision"
        );

        if !decision.allowed {
            return Err(AuthzError::access_denied(decision.reason.as_str()));
        }
        Ok(identity)
    }

    async fn collect_templates(
        &self,
        identity: &mut Identity,
        resource: &ResourceDescriptor,
    ) -> Result<Vec<String>> {
        let labels = identity.labels();

        if let Some(config) = &self.bootstrap {
            return Ok(config.templates_for(&labels));
        }

        let mut records = self.store.get_policies(&labels).await?;
        records.sort_by_key(|record| {
            labels
                .iter()
                .position(|label| *label == record.identity)
                .unwrap_or(labels.len())
        });

        let fields = resource.context_fields();
        let mut templates = Vec::new();
        for record in &records {
            templates.extend(record.templates().cloned());
            merge_context(&mut identity.context, record, &fields);
        }
        debug!(
            labels = labels.len(),
            records = records.len(),
            templates = templates.len(),
            "Collected statements from store"
        );
        Ok(templates)
    }
}

/// Caller context the request is built from
///
/// A caller acting on behalf of a federated identity is evaluated as that
/// identity, so `federated:id` carries the delegated id.
fn effective_caller<'a>(caller: &'a CallerContext, identity: &Identity) -> Cow<'a, CallerContext> {
    match (&caller.identity, &identity.federated_id) {
        (Some(platform), Some(id)) if platform.federated_id.is_none() => {
            let mut delegated = caller.clone();
            if let Some(platform) = delegated.identity.as_mut() {
                platform.federated_id = Some(id.clone());
            }
            Cow::Owned(delegated)
        }
        _ => Cow::Borrowed(caller),
    }
}

/// Merge the requested fields of a policy record into the caller context
fn merge_context(context: &mut Map<String, Value>, record: &PolicyRecord, fields: &[String]) {
    for field in fields {
        let target = context
            .entry(field.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(incoming) = record.fields.get(field).filter(|value| !value.is_null()) else {
            continue;
        };
        match incoming {
            Value::Object(incoming) if target.is_object() => {
                if let Some(existing) = target.as_object_mut() {
                    for (key, value) in incoming {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
            _ => *target = incoming.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_context_is_shallow() {
        let mut context = json!({"account": {"id": "a1", "tier": "gold"}})
            .as_object()
            .unwrap()
            .clone();
        let record = PolicyRecord::new("*")
            .with_field("account", json!({"tier": "silver", "region": "eu"}))
            .with_field("limits", json!({"max": 3}));

        merge_context(
            &mut context,
            &record,
            &["account".to_string(), "limits".to_string(), "absent".to_string()],
        );

        assert_eq!(
            Value::Object(context),
            json!({
                "account": {"id": "a1", "tier": "silver", "region": "eu"},
                "limits": {"max": 3},
                "absent": {}
            })
        );
    }

    #[test]
    fn test_effective_caller_carries_delegated_id() {
        let mut caller = CallerContext::new(
            "req-1",
            crate::request::PlatformIdentity {
                caller: Some("k".into()),
                ..Default::default()
            },
        );
        let mut identity = Identity::with_id("fed-1");
        identity.federated_id = Some("fed-1".into());

        let effective = effective_caller(&caller, &identity);
        assert_eq!(
            effective.identity.as_ref().unwrap().federated_id.as_deref(),
            Some("fed-1")
        );
        assert_eq!(effective.identity.as_ref().unwrap().caller.as_deref(), Some("k"));

        // A platform federated id is never overridden
        caller.identity.as_mut().unwrap().federated_id = Some("fed-platform".into());
        assert!(matches!(effective_caller(&caller, &identity), Cow::Borrowed(_)));

        assert!(matches!(
            effective_caller(&CallerContext::anonymous(), &identity),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_merge_context_scalar_replaces() {
        let mut context = Map::new();
        let record = PolicyRecord::new("*").with_field("plan", json!("pro"));
        merge_context(&mut context, &record, &["plan".to_string()]);
        assert_eq!(context["plan"], json!("pro"));
    }
}
