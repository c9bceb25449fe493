//! # lrn-authz - Statement-Based Authorization for LRN Resources
//!
//! `lrn-authz` decides whether a caller may perform an action on a resource
//! named by an LRN (`lrn:<partition>:<system>:...`). Decisions come from
//! IAM-style statements with:
//!
//! - **Allow/Deny effects** with explicit deny precedence and implicit deny
//! - **Glob patterns** over actions and LRNs, plus `NotAction`/`NotResource`
//! - **Conditions** (`StringLike`, `StringEquals`, `Null`, `IpAddress`, and
//!   their `ForAllValues:`/`ForAnyValues:` forms)
//! - **Templates**: `${account.id}` placeholders filled from the caller's context
//!
//! Statements come either from a static bootstrap catalog or, per call, from a
//! [`PolicyStore`].
//!
//! ## Quick Start
//!
//! ```rust
//! use lrn_authz::{
//!     Authorizer, BootstrapConfig, CallerContext, MemoryStore, PolicyCatalog,
//!     ResourceDescriptor, Result,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let catalog = PolicyCatalog::from_json_str(r#"{
//!     "actions": "orders",
//!     "resource": "lrn:prod:orders",
//!     "identities": {"*": ["public"]},
//!     "policies": {"public": [{"Effect": "Allow", "Action": "get", "Resource": "catalog/*"}]}
//! }"#)?;
//!
//! let authorizer = Authorizer::new(MemoryStore::new())
//!     .with_bootstrap(BootstrapConfig::from_catalog(catalog)?);
//!
//! let resource = ResourceDescriptor::new("catalog/{item}", "get")
//!     .with_param("orders", "item", "42");
//! let identity = authorizer
//!     .authorize(&CallerContext::anonymous(), &resource, None)
//!     .await?;
//! assert!(identity.identity_id.is_none());
//!
//! let denied = authorizer
//!     .authorize(&CallerContext::anonymous(), &ResourceDescriptor::new("catalog/1", "delete"), None)
//!     .await;
//! assert!(denied.unwrap_err().is_access_denied());
//! # Ok(())
//! # }
//! ```
//!
//! ## Store-backed statements
//!
//! ```rust
//! use lrn_authz::{Authorizer, CallerContext, MemoryStore, PolicyRecord, ResourceDescriptor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> lrn_authz::Result<()> {
//! let store = MemoryStore::new();
//! store.put_policy(PolicyRecord::new("*").with_policy(
//!     "read-own-account",
//!     [r#"{"Effect":"Allow","Action":"billing:read","Resource":"lrn:prod:billing:${account.id}:*"}"#],
//! ).with_field("account", serde_json::json!({"id": "a-7"})));
//!
//! let authorizer = Authorizer::new(store);
//! let resource = ResourceDescriptor::new("lrn:prod:billing:a-7:invoices", "read")
//!     .with_context("account");
//! authorizer.authorize(&CallerContext::anonymous(), &resource, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod authorizer;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod iam;
pub mod identity;
pub mod request;
pub mod store;

pub use crate::authorizer::Authorizer;
pub use crate::bootstrap::{BootstrapConfig, PolicyCatalog};
pub use crate::config::StoreSettings;
pub use crate::error::{AuthzError, Result};
pub use crate::iam::{Decision, DecisionReason, Effect, PolicyEngine, Statement, TemplateResolver};
pub use crate::identity::{Identity, IdentityRecord};
pub use crate::request::{
    CallerContext, PlatformIdentity, Request, RequestBuilder, ResourceDescriptor,
};
pub use crate::store::{BatchOptions, MemoryStore, PolicyRecord, PolicyStore};
