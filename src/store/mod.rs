//! Identity and policy record storage
//!
//! [`PolicyStore`] is the seam to whatever holds identity and policy records.
//! [`MemoryStore`] keeps both tables in memory and can be seeded from a JSON
//! snapshot laid out by table name.

mod batch;

pub use batch::{batch_get, BatchOptions};

use crate::config::StoreSettings;
use crate::error::{AuthzError, Result};
use crate::identity::IdentityRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Statements and context attached to one identity label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Identity label, e.g. `role/reader` or `*`
    pub identity: String,

    /// Policy name to statement templates (JSON text)
    #[serde(default)]
    pub policies: BTreeMap<String, Vec<String>>,

    /// Context fields callers may request to merge
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PolicyRecord {
    pub fn new(identity: impl Into<String>) -> Self {
        PolicyRecord {
            identity: identity.into(),
            policies: BTreeMap::new(),
            fields: Map::new(),
        }
    }

    pub fn with_policy<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        statements: impl IntoIterator<Item = S>,
    ) -> Self {
        self.policies
            .insert(name.into(), statements.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Every statement template of every policy, in policy name order
    pub fn templates(&self) -> impl Iterator<Item = &String> {
        self.policies.values().flatten()
    }
}

/// Source of identity and policy records
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Look up an identity record by id
    async fn get_identity(&self, id: &str) -> Result<Option<IdentityRecord>>;

    /// Fetch the policy records for a set of labels; unknown labels are omitted
    async fn get_policies(&self, labels: &[String]) -> Result<Vec<PolicyRecord>>;
}

/// In-memory [`PolicyStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: RwLock<HashMap<String, IdentityRecord>>,
    policies: RwLock<HashMap<String, PolicyRecord>>,
    batch: BatchOptions,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_options(batch: BatchOptions) -> Self {
        MemoryStore {
            batch,
            ..Default::default()
        }
    }

    pub fn put_identity(&self, record: IdentityRecord) {
        self.identities
            .write()
            .insert(record.identity_id.clone(), record);
    }

    pub fn put_policy(&self, record: PolicyRecord) {
        self.policies.write().insert(record.identity.clone(), record);
    }

    /// Build a store from a snapshot `{ <identity_table>: [...], <policy_table>: [...] }`
    pub fn from_snapshot(snapshot: &Value, settings: &StoreSettings) -> Result<Self> {
        let store = MemoryStore::with_batch_options(settings.batch);

        for item in table(snapshot, &settings.identity_table)? {
            let record: IdentityRecord = serde_json::from_value(item.clone())
                .map_err(|e| AuthzError::StoreMalformed(format!("identity record: {}", e)))?;
            store.put_identity(record);
        }
        for item in table(snapshot, &settings.policy_table)? {
            let record: PolicyRecord = serde_json::from_value(item.clone())
                .map_err(|e| AuthzError::StoreMalformed(format!("policy record: {}", e)))?;
            store.put_policy(record);
        }

        debug!(
            identities = store.identities.read().len(),
            policies = store.policies.read().len(),
            "Loaded store snapshot"
        );
        Ok(store)
    }

    /// Load a snapshot from a JSON file
    pub fn from_snapshot_file(path: impl AsRef<Path>, settings: &StoreSettings) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: Value = serde_json::from_str(&text)?;
        Self::from_snapshot(&snapshot, settings)
    }
}

fn table<'a>(snapshot: &'a Value, name: &str) -> Result<&'a [Value]> {
    match snapshot.get(name) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(AuthzError::StoreMalformed(format!(
            "table {} is not a list",
            name
        ))),
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn get_identity(&self, id: &str) -> Result<Option<IdentityRecord>> {
        Ok(self.identities.read().get(id).cloned())
    }

    async fn get_policies(&self, labels: &[String]) -> Result<Vec<PolicyRecord>> {
        batch_get(labels, &self.batch, |chunk| {
            let records: Vec<PolicyRecord> = {
                let policies = self.policies.read();
                chunk
                    .iter()
                    .filter_map(|label| policies.get(label).cloned())
                    .collect()
            };
            async move { Ok(records) }
        })
        .await
    }
}
