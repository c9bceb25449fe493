//! Statement evaluation for LRN resources
//!
//! Provides fine-grained access control with:
//! - JSON statements with Allow/Deny effects and explicit deny precedence
//! - Glob patterns over actions and LRNs, with negated forms
//! - Condition operators (String, Null, IpAddress) and their quantified forms
//! - `${name}` context templates resolved per caller before evaluation

mod cache;
mod condition;
mod engine;
mod flatten;
mod pattern;
mod policy;
mod template;

pub use cache::{GlobCache, GLOB_CACHE_CAPACITY};
pub use condition::{
    describe_failure, BaseOperator, ConditionOperator, OperatorRegistry, Quantifier,
};
pub use engine::{PolicyEngine, ACTION_FIELD, LRN_FIELD};
pub use flatten::{flatten, flatten_into, stringify, FlatMap, MAX_FLATTEN_DEPTH};
pub use pattern::{Pattern, PatternSet};
pub use policy::{ConditionBlock, Decision, DecisionReason, Effect, PatternList, Statement};
pub use template::TemplateResolver;
