//! search command - print matching entries as LDIF or JSON

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

use arbor_core::types::{AttributeValue, Attributes, Scope};
use arbor_model::ldif::entry_to_ldif;

use super::CommandContext;

pub struct SearchOptions {
    pub base: Option<String>,
    pub scope: String,
    pub filter: Option<String>,
    pub attributes: Vec<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct EntryResult {
    dn: String,
    attributes: BTreeMap<String, Vec<String>>,
}

impl EntryResult {
    fn new(dn: String, attributes: &Attributes) -> Self {
        let attributes = attributes
            .iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .map(|value| match value {
                        AttributeValue::Binary(bytes) => STANDARD.encode(bytes),
                        AttributeValue::Text(text) => text.clone(),
                    })
                    .collect();
                (name.to_string(), values)
            })
            .collect();
        Self { dn, attributes }
    }
}

/// Run the search and render the result in the context's output format.
pub async fn render(ctx: &mut CommandContext, opts: SearchOptions) -> Result<String> {
    let scope: Scope = opts.scope.parse()?;
    let base = opts.base.unwrap_or_else(|| ctx.adapter.base().to_string());
    let filter = match opts.filter.as_deref() {
        Some(expression) => super::filter::compile(expression)?,
        None => None,
    };
    let attributes: Vec<&str> = opts.attributes.iter().map(String::as_str).collect();

    tracing::debug!("Searching {} ({}) for {:?}", base, scope, filter);
    let entries = ctx
        .adapter
        .search_entries(&base, scope, filter.as_deref(), &attributes, opts.limit)
        .await
        .with_context(|| format!("Search under '{}' failed", base))?;

    if ctx.is_json() {
        let results: Vec<EntryResult> = entries
            .into_iter()
            .map(|(dn, attributes)| EntryResult::new(dn, &attributes))
            .collect();
        return Ok(serde_json::to_string_pretty(&results)?);
    }

    Ok(entries
        .iter()
        .map(|(dn, attributes)| entry_to_ldif(dn, attributes))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub async fn execute(ctx: &mut CommandContext, opts: SearchOptions) -> Result<()> {
    let output = render(ctx, opts).await?;
    if output.is_empty() {
        eprintln!("No entries found");
    } else {
        print!("{}", output);
        if ctx.is_json() {
            println!();
        }
    }
    Ok(())
}
