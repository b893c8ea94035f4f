//! filter command - compile a filter expression

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::OutputFormat;

#[derive(Serialize)]
struct FilterResult {
    filter: Option<String>,
}

/// Read an expression from the command line. JSON is tried first; anything
/// that does not parse is a literal filter string.
pub fn parse_expression(expression: &str) -> Value {
    serde_json::from_str(expression).unwrap_or_else(|_| Value::String(expression.to_string()))
}

pub fn compile(expression: &str) -> Result<Option<String>> {
    Ok(arbor_core::filter::compile(&parse_expression(expression))?)
}

pub fn execute(expression: &str, output: OutputFormat) -> Result<()> {
    let filter = compile(expression)?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&FilterResult { filter })?);
        }
        OutputFormat::Text => match filter {
            Some(filter) => println!("{}", filter),
            None => eprintln!("(no filter)"),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_expression() {
        let compiled = compile(r#"["or", {"uid": "bob"}, {"uid": "alice"}]"#).unwrap();
        assert_eq!(compiled.as_deref(), Some("(|(uid=bob)(uid=alice))"));
    }

    #[test]
    fn test_literal_expression() {
        assert_eq!(compile("uid=bob").unwrap().as_deref(), Some("(uid=bob)"));
        assert_eq!(compile("(cn=*)").unwrap().as_deref(), Some("(cn=*)"));
    }

    #[test]
    fn test_blank_expression() {
        assert_eq!(compile("   ").unwrap(), None);
        assert_eq!(compile("null").unwrap(), None);
    }
}
