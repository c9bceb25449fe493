//! Context substitution into statement templates
//!
//! Statements are stored as JSON text that may reference caller context
//! through `${name}` placeholders, e.g.
//! `{"Effect":"Allow","Action":"orders:*","Resource":"lrn:shop:orders:::${account.id}"}`.
//! Names are looked up in the caller context flattened with `.`. An array
//! value is comma-joined; when the placeholder sits in double quotes each
//! element is quoted, so `["${account.regions}"]` becomes `["us","eu"]`.
//!
//! Resolution is all or nothing: an unknown name fails the whole set.

use super::flatten::{flatten_into, stringify, FlatMap};
use super::policy::Statement;
use crate::error::{AuthzError, Result};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""?\$\{([^}]*)\}"?"#).expect("placeholder regex is valid")
});

/// Variables computed at resolution time rather than read from context
const DERIVED_YEAR_MONTH: &str = "date.year_month";

/// Resolves statement templates against one caller's context
pub struct TemplateResolver {
    variables: FlatMap,
}

impl TemplateResolver {
    /// Flatten the caller context; context keys override derived variables
    pub fn new(context: &Value) -> Result<Self> {
        let mut variables = FlatMap::new();
        variables.insert(
            DERIVED_YEAR_MONTH.to_string(),
            Value::String(Utc::now().format("%Y %B").to_string()),
        );
        flatten_into(context, ".", &mut variables)?;
        Ok(TemplateResolver { variables })
    }

    /// Substitute every placeholder and parse the results into statements
    pub fn resolve<S: AsRef<str>>(&self, templates: &[S]) -> Result<Vec<Statement>> {
        templates
            .iter()
            .map(|template| {
                let text = self.substitute(template.as_ref())?;
                Statement::from_json(&text)
                    .map_err(|e| AuthzError::MalformedStatement(format!("{}: {}", e, text)))
            })
            .collect()
    }

    /// Substitute every placeholder in one template, leaving the text unparsed
    pub fn substitute(&self, template: &str) -> Result<String> {
        if !template.contains("${") {
            return Ok(template.to_string());
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = caps.get(1).map_or("", |m| m.as_str());
            let matched = whole.as_str();
            let quoted = matched.starts_with('"');

            // A closing quote only belongs to the placeholder when it opened with one
            let end = if !quoted && matched.ends_with('"') {
                whole.end() - 1
            } else {
                whole.end()
            };

            out.push_str(&template[last..whole.start()]);
            out.push_str(&self.render(name, quoted)?);
            last = end;
        }

        out.push_str(&template[last..]);
        Ok(out)
    }

    fn render(&self, name: &str, quoted: bool) -> Result<String> {
        let value = self
            .variables
            .get(name)
            .ok_or_else(|| AuthzError::UnknownVariable(name.to_string()))?;

        let rendered = match value {
            Value::Array(items) if quoted => items
                .iter()
                .map(|item| format!("\"{}\"", escape(&stringify(item))))
                .collect::<Vec<_>>()
                .join(","),
            Value::Array(items) => items
                .iter()
                .map(|item| escape(&stringify(item)))
                .collect::<Vec<_>>()
                .join(","),
            scalar if quoted => format!("\"{}\"", escape(&stringify(scalar))),
            scalar => escape(&stringify(scalar)),
        };
        Ok(rendered)
    }
}

/// Escape text for embedding inside a JSON string literal
fn escape(text: &str) -> String {
    let encoded = Value::String(text.to_string()).to_string();
    encoded[1..encoded.len() - 1].to_string()
}
