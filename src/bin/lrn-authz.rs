//! lrn-authz CLI
//!
//! Evaluates one call against a policy catalog or a store snapshot and
//! prints the decision

use anyhow::{bail, Context};
use clap::Parser;
use lrn_authz::request;
use lrn_authz::{
    Authorizer, BootstrapConfig, CallerContext, Identity, MemoryStore, PlatformIdentity,
    PolicyCatalog, ResourceDescriptor, StoreSettings,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lrn-authz")]
#[command(about = "Evaluate an authorization request against LRN policy statements")]
struct Args {
    /// Policy catalog (.toml or .json); statements are taken from it when set
    #[arg(short = 'c', long)]
    catalog: Option<PathBuf>,

    /// Store snapshot (.json) keyed by the configured table names
    #[arg(short = 's', long)]
    store: Option<PathBuf>,

    /// Settings prefix used to resolve store table names
    #[arg(long, default_value = "lrn-authz")]
    settings_prefix: String,

    /// Resource descriptor (.json); overrides --lrn and --action
    #[arg(short = 'r', long)]
    resource: Option<PathBuf>,

    /// LRN, absolute or relative to the catalog's resource prefix
    #[arg(short = 'l', long)]
    lrn: Option<String>,

    /// Verb, e.g. `get`
    #[arg(short = 'a', long)]
    action: Option<String>,

    /// LRN placeholder value as `key=value` (repeatable)
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// Policy record field to merge into the caller context (repeatable)
    #[arg(long = "context")]
    context_fields: Vec<String>,

    /// Federated identity id of the caller
    #[arg(long)]
    federated_id: Option<String>,

    /// Caller key of a platform-authenticated caller
    #[arg(long)]
    caller_key: Option<String>,

    /// Evaluate for this identity instead of resolving one (.json)
    #[arg(long)]
    identity: Option<PathBuf>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn resource_from_args(args: &Args, system: impl Fn(&str) -> Option<String>) -> anyhow::Result<ResourceDescriptor> {
    if let Some(path) = &args.resource {
        return read_json(path);
    }

    let (Some(lrn), Some(action)) = (&args.lrn, &args.action) else {
        bail!("either --resource or both --lrn and --action are required");
    };
    let mut resource = ResourceDescriptor::new(lrn.clone(), action.clone());

    if !args.params.is_empty() {
        let Some(system) = system(lrn) else {
            bail!("cannot attach parameters: no system in {}", lrn);
        };
        for param in &args.params {
            let Some((key, value)) = param.split_once('=') else {
                bail!("invalid parameter '{}', expected key=value", param);
            };
            resource = resource.with_param(&system, key, value);
        }
    }
    for field in &args.context_fields {
        resource = resource.with_context(field.clone());
    }
    Ok(resource)
}

/// System segment of an LRN, qualifying relative ones with `prefix`
fn system_of(lrn: &str, prefix: Option<&str>) -> Option<String> {
    request::system_of(&request::qualify_lrn(lrn, prefix)).map(str::to_string)
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let store = match &args.store {
        Some(path) => {
            let settings = StoreSettings::resolve(&args.settings_prefix)
                .context("resolving store settings")?;
            info!(
                "Store snapshot {:?} (tables {}, {})",
                path, settings.identity_table, settings.policy_table
            );
            MemoryStore::from_snapshot_file(path, &settings)?
        }
        None => MemoryStore::new(),
    };

    let mut authorizer = Authorizer::new(store);
    if let Some(path) = &args.catalog {
        info!("Policy catalog {:?}", path);
        let catalog = PolicyCatalog::from_path(path)?;
        authorizer = authorizer.with_bootstrap(BootstrapConfig::from_catalog(catalog)?);
    }

    let prefix = authorizer.bootstrap().map(|config| config.resource_prefix().to_string());
    let resource = resource_from_args(&args, |lrn| system_of(lrn, prefix.as_deref()))?;

    let caller = if args.federated_id.is_some() || args.caller_key.is_some() {
        CallerContext {
            identity: Some(PlatformIdentity {
                caller: args.caller_key.clone(),
                federated_id: args.federated_id.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    } else {
        CallerContext::anonymous()
    };

    let identity: Option<Identity> = match &args.identity {
        Some(path) => Some(read_json(path)?),
        None => None,
    };

    let outcome = match authorizer.authorize(&caller, &resource, identity).await {
        Ok(identity) => json!({"allowed": true, "identity": identity}),
        Err(e) if e.is_access_denied() => json!({"allowed": false, "error": e.to_string()}),
        Err(e) => return Err(e.into()),
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome["allowed"] == Value::Bool(true))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
