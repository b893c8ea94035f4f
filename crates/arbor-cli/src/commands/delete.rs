//! delete command - remove an entry or a whole subtree

use anyhow::{Context, Result};

use arbor_core::types::{Control, TREE_DELETE_OID};
use arbor_core::Dn;

use super::CommandContext;

pub async fn execute(ctx: &mut CommandContext, dn: &str, recursive: bool) -> Result<()> {
    let parsed = Dn::parse(dn)?;
    if parsed.is_empty() {
        anyhow::bail!("Refusing to delete the root DSE");
    }

    let controls = if recursive {
        vec![Control::new(TREE_DELETE_OID)]
    } else {
        Vec::new()
    };

    ctx.adapter
        .delete(dn, &controls)
        .await
        .with_context(|| format!("Failed to delete {}", dn))?;

    if ctx.is_json() {
        ctx.info(&serde_json::json!({ "deleted": dn }).to_string());
    } else {
        ctx.info(&format!("delete: {}", dn));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context, BASE};
    use crate::OutputFormat;

    #[tokio::test]
    async fn test_delete_leaf() {
        let (directory, mut ctx) = context(OutputFormat::Text);
        let dn = format!("cn=bob,ou=People,{}", BASE);
        execute(&mut ctx, &dn, false).await.unwrap();
        assert!(!directory.contains(&dn));
    }

    #[tokio::test]
    async fn test_delete_subtree_needs_recursive() {
        let (directory, mut ctx) = context(OutputFormat::Text);
        let dn = format!("ou=People,{}", BASE);

        assert!(execute(&mut ctx, &dn, false).await.is_err());
        assert!(directory.contains(&dn));

        execute(&mut ctx, &dn, true).await.unwrap();
        assert!(!directory.contains(&dn));
        assert!(!directory.contains(&format!("cn=alice,{}", dn)));
    }

    #[tokio::test]
    async fn test_root_is_refused() {
        let (directory, mut ctx) = context(OutputFormat::Text);
        assert!(execute(&mut ctx, "", true).await.is_err());
        assert_eq!(directory.count("delete"), 0);
    }
}
