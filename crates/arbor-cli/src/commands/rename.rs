//! rename command - change an entry's RDN or move it

use anyhow::{Context, Result};

use arbor_core::dn::Rdn;
use arbor_core::Dn;

use super::CommandContext;

pub async fn execute(
    ctx: &mut CommandContext,
    dn: &str,
    new_rdn: &str,
    delete_old_rdn: bool,
    new_superior: Option<&str>,
) -> Result<()> {
    let current = Dn::parse(dn)?;
    let rdn: Rdn = new_rdn
        .parse()
        .with_context(|| format!("Invalid RDN '{}'", new_rdn))?;
    let parent = match new_superior {
        Some(superior) => Dn::parse(superior)?,
        None => current.parent().unwrap_or_default(),
    };

    ctx.adapter
        .modify_rdn(dn, new_rdn, delete_old_rdn, new_superior, &[])
        .await
        .with_context(|| format!("Failed to rename {}", dn))?;

    let renamed = parent.child(rdn).to_string();
    if ctx.is_json() {
        ctx.info(&serde_json::json!({ "from": dn, "to": renamed }).to_string());
    } else {
        ctx.info(&format!("rename: {} -> {}", dn, renamed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context, BASE};
    use crate::OutputFormat;

    #[tokio::test]
    async fn test_rename_keeps_old_value() {
        let (directory, mut ctx) = context(OutputFormat::Text);
        let dn = format!("cn=bob,ou=People,{}", BASE);
        execute(&mut ctx, &dn, "cn=robert", false, None).await.unwrap();

        let renamed = directory.entry(&format!("cn=robert,ou=People,{}", BASE)).unwrap();
        assert_eq!(renamed.texts("cn"), vec!["bob", "robert"]);
        assert!(!directory.contains(&dn));
    }

    #[tokio::test]
    async fn test_move_under_new_superior() {
        let (directory, mut ctx) = context(OutputFormat::Text);
        let dn = format!("cn=bob,ou=People,{}", BASE);
        execute(&mut ctx, &dn, "cn=bob", true, Some(BASE)).await.unwrap();
        assert!(directory.contains(&format!("cn=bob,{}", BASE)));
    }

    #[tokio::test]
    async fn test_invalid_rdn() {
        let (directory, mut ctx) = context(OutputFormat::Text);
        let dn = format!("cn=bob,ou=People,{}", BASE);
        assert!(execute(&mut ctx, &dn, "robert", true, None).await.is_err());
        assert_eq!(directory.count("modify_rdn"), 0);
    }
}
