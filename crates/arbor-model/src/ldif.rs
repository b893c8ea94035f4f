//! LDIF export (RFC 2849)

use base64::{engine::general_purpose::STANDARD, Engine as _};

use arbor_core::types::{AttributeValue, Attributes};
use arbor_core::OBJECT_CLASS;

use crate::entry::MappedEntry;

const LINE_WIDTH: usize = 76;

/// Whether a value can be written as-is (RFC 2849 SAFE-STRING).
fn is_safe(value: &[u8]) -> bool {
    match value.first() {
        None => return true,
        Some(b' ' | b':' | b'<') => return false,
        Some(_) => {}
    }
    if value.last() == Some(&b' ') {
        return false;
    }
    value.iter().all(|&b| b != 0 && b != b'\n' && b != b'\r' && b < 0x80)
}

/// Fold a line at the LDIF width, continuation lines starting with a space.
fn fold(line: &str, out: &mut String) {
    let mut width = 0;
    for c in line.chars() {
        if width >= LINE_WIDTH {
            out.push_str("\n ");
            width = 1;
        }
        out.push(c);
        width += 1;
    }
    out.push('\n');
}

fn push_value(out: &mut String, name: &str, value: &[u8], force_base64: bool) {
    if force_base64 || !is_safe(value) {
        fold(&format!("{}:: {}", name, STANDARD.encode(value)), out);
    } else {
        fold(&format!("{}: {}", name, String::from_utf8_lossy(value)), out);
    }
}

/// Render one entry. `objectClass` comes first, other attributes keep their
/// order.
pub fn entry_to_ldif(dn: &str, attributes: &Attributes) -> String {
    let mut out = String::new();
    push_value(&mut out, "dn", dn.as_bytes(), false);

    let classes = attributes.get(OBJECT_CLASS).unwrap_or(&[]);
    let rest = attributes
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(OBJECT_CLASS));
    let ordered = std::iter::once((OBJECT_CLASS, classes)).chain(rest);

    for (name, values) in ordered {
        for value in values {
            let binary = matches!(value, AttributeValue::Binary(_));
            push_value(&mut out, name, value.as_bytes(), binary);
        }
    }
    out
}

impl MappedEntry {
    pub fn to_ldif(&self) -> String {
        entry_to_ldif(self.dn(), self.attributes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_entry() {
        let mut attributes = Attributes::new();
        attributes.set("cn", ["Bob"]);
        attributes.set("objectClass", ["top", "person"]);
        attributes.set("sn", ["Dobbs"]);

        assert_eq!(
            entry_to_ldif("cn=Bob,dc=example,dc=com", &attributes),
            "dn: cn=Bob,dc=example,dc=com\nobjectClass: top\nobjectClass: person\ncn: Bob\nsn: Dobbs\n"
        );
    }

    #[test]
    fn test_unsafe_values_are_base64() {
        let mut attributes = Attributes::new();
        attributes.set("description", [" leading space"]);
        attributes.set("cn", ["Ünïcode"]);
        attributes.set("jpegPhoto", [vec![0xffu8, 0xd8, 0xff]]);

        let ldif = entry_to_ldif("cn=x", &attributes);
        assert!(ldif.contains("description:: IGxlYWRpbmcgc3BhY2U=\n"));
        assert!(ldif.contains(&format!("cn:: {}\n", STANDARD.encode("Ünïcode"))));
        assert!(ldif.contains("jpegPhoto:: /9j/\n"));
    }

    #[test]
    fn test_long_lines_fold() {
        let mut attributes = Attributes::new();
        attributes.set("description", ["x".repeat(100)]);
        let ldif = entry_to_ldif("cn=x", &attributes);
        let lines: Vec<&str> = ldif.lines().collect();
        assert_eq!(lines[1].len(), LINE_WIDTH);
        assert!(lines[2].starts_with(' '));
        assert_eq!(lines[1].len() + lines[2].len() - 1, "description: ".len() + 100);
    }
}
