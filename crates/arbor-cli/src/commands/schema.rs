//! schema command - show object classes and attribute types

use anyhow::{bail, Result};
use serde::Serialize;

use arbor_schema::{AttributeType, ClassKind, ObjectClass, SchemaRegistry};

use super::CommandContext;

#[derive(Serialize)]
struct ClassInfo<'a> {
    oid: &'a str,
    names: &'a [String],
    description: Option<&'a str>,
    kind: &'static str,
    superiors: &'a [String],
    ancestors: &'a [String],
    must: Vec<String>,
    may: Vec<String>,
}

#[derive(Serialize)]
struct AttributeInfo<'a> {
    oid: &'a str,
    names: &'a [String],
    description: Option<&'a str>,
    superior: Option<&'a str>,
    syntax: Option<&'a str>,
    single_value: bool,
    read_only: bool,
    binary: bool,
    binary_required: bool,
}

fn kind_name(kind: ClassKind) -> &'static str {
    match kind {
        ClassKind::Abstract => "ABSTRACT",
        ClassKind::Structural => "STRUCTURAL",
        ClassKind::Auxiliary => "AUXILIARY",
    }
}

fn class_info<'a>(schema: &'a SchemaRegistry, class: &'a ObjectClass) -> ClassInfo<'a> {
    let required: Vec<String> = schema
        .required_attributes(&[class.name.as_str()])
        .into_iter()
        .map(|r| r.attribute)
        .collect();
    let may = schema
        .allowed_attributes(&[class.name.as_str()])
        .into_iter()
        .filter(|a| !required.iter().any(|r| r.eq_ignore_ascii_case(a)))
        .collect();

    ClassInfo {
        oid: &class.oid,
        names: &class.names,
        description: class.description.as_deref(),
        kind: kind_name(class.kind),
        superiors: &class.superiors,
        ancestors: schema.ancestors(&class.name),
        must: required,
        may,
    }
}

fn attribute_info(attribute: &AttributeType) -> AttributeInfo<'_> {
    AttributeInfo {
        oid: &attribute.oid,
        names: &attribute.names,
        description: attribute.description.as_deref(),
        superior: attribute.superior.as_deref(),
        syntax: attribute.syntax.as_deref(),
        single_value: attribute.single_value,
        read_only: attribute.read_only,
        binary: attribute.binary,
        binary_required: attribute.binary_required,
    }
}

fn render_class(info: &ClassInfo<'_>) -> String {
    let mut out = vec![
        format!("Object class: {}", info.names.join(", ")),
        format!("  OID:        {}", info.oid),
        format!("  Kind:       {}", info.kind),
    ];
    if let Some(description) = info.description {
        out.push(format!("  Desc:       {}", description));
    }
    if !info.ancestors.is_empty() {
        out.push(format!("  Ancestors:  {}", info.ancestors.join(", ")));
    }
    out.push(format!("  MUST:       {}", info.must.join(", ")));
    out.push(format!("  MAY:        {}", info.may.join(", ")));
    out.join("\n")
}

fn render_attribute(info: &AttributeInfo<'_>) -> String {
    let mut out = vec![
        format!("Attribute type: {}", info.names.join(", ")),
        format!("  OID:        {}", info.oid),
    ];
    if let Some(description) = info.description {
        out.push(format!("  Desc:       {}", description));
    }
    if let Some(superior) = info.superior {
        out.push(format!("  Superior:   {}", superior));
    }
    out.push(format!("  Syntax:     {}", info.syntax.unwrap_or("-")));

    let mut flags = Vec::new();
    if info.single_value {
        flags.push("single-value");
    }
    if info.read_only {
        flags.push("read-only");
    }
    if info.binary {
        flags.push("binary");
    }
    if info.binary_required {
        flags.push("binary transfer");
    }
    if !flags.is_empty() {
        out.push(format!("  Flags:      {}", flags.join(", ")));
    }
    out.join("\n")
}

pub async fn render_class_named(ctx: &mut CommandContext, name: &str) -> Result<String> {
    let schema = ctx.adapter.schema().await?;
    let Some(class) = schema.object_class(name) else {
        bail!("Object class '{}' is not defined on {}", name, ctx.adapter.identifier());
    };

    let info = class_info(&schema, class);
    if ctx.is_json() {
        Ok(serde_json::to_string_pretty(&info)?)
    } else {
        Ok(render_class(&info))
    }
}

pub async fn render_attribute_named(ctx: &mut CommandContext, name: &str) -> Result<String> {
    let schema = ctx.adapter.schema().await?;
    let Some(attribute) = schema.attribute(name) else {
        bail!("Attribute type '{}' is not defined on {}", name, ctx.adapter.identifier());
    };

    let info = attribute_info(attribute);
    if ctx.is_json() {
        Ok(serde_json::to_string_pretty(&info)?)
    } else {
        Ok(render_attribute(&info))
    }
}

pub async fn show_class(ctx: &mut CommandContext, name: &str) -> Result<()> {
    let output = render_class_named(ctx, name).await?;
    ctx.info(&output);
    Ok(())
}

pub async fn show_attribute(ctx: &mut CommandContext, name: &str) -> Result<()> {
    let output = render_attribute_named(ctx, name).await?;
    ctx.info(&output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::context;
    use crate::OutputFormat;

    #[tokio::test]
    async fn test_show_class() {
        let (_directory, mut ctx) = context(OutputFormat::Text);
        let output = render_class_named(&mut ctx, "posixAccount").await.unwrap();
        assert!(output.contains("Kind:       AUXILIARY"));
        assert!(output.contains("homeDirectory"));
    }

    #[tokio::test]
    async fn test_show_attribute_json() {
        let (_directory, mut ctx) = context(OutputFormat::Json);
        let output = render_attribute_named(&mut ctx, "commonName").await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["names"][0], "cn");
        assert_eq!(parsed["binary"], false);
    }

    #[tokio::test]
    async fn test_unknown_names() {
        let (_directory, mut ctx) = context(OutputFormat::Text);
        assert!(render_class_named(&mut ctx, "noSuchClass").await.is_err());
        assert!(render_attribute_named(&mut ctx, "noSuchAttribute").await.is_err());
    }
}
