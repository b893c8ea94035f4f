//! Shared fixtures for model tests

use std::sync::Arc;

use arbor_adapter::{ConnectionAdapter, MemoryDirectory};
use arbor_core::types::Attributes;
use arbor_core::ConnectionConfig;

use crate::association::BelongsTo;
use crate::mapping::Mapping;

pub const BASE: &str = "dc=example,dc=com";

fn entry(pairs: &[(&str, &[&str])]) -> Attributes {
    pairs.iter().map(|(k, v)| (*k, v.iter().copied())).collect()
}

/// Directory with People and Groups, users bob and alice and group staff
pub fn directory() -> (MemoryDirectory, ConnectionAdapter) {
    let directory = MemoryDirectory::with_base(BASE);
    directory.insert(
        "ou=People,dc=example,dc=com",
        entry(&[("objectClass", &["top", "organizationalUnit"]), ("ou", &["People"])]),
    );
    directory.insert(
        "ou=Groups,dc=example,dc=com",
        entry(&[("objectClass", &["top", "organizationalUnit"]), ("ou", &["Groups"])]),
    );
    directory.insert(
        "cn=staff,ou=Groups,dc=example,dc=com",
        entry(&[
            ("objectClass", &["top", "posixGroup"]),
            ("cn", &["staff"]),
            ("gidNumber", &["100"]),
        ]),
    );
    for (uid, name, number) in [("bob", "Bob Dobbs", "1000"), ("alice", "Alice Liddell", "1001")] {
        let home = format!("/home/{}", uid);
        let surname = name.split(' ').last().unwrap_or(name);
        directory.insert(
            &format!("uid={},ou=People,{}", uid, BASE),
            entry(&[
                ("objectClass", &["top", "person", "posixAccount"]),
                ("uid", &[uid]),
                ("cn", &[name]),
                ("sn", &[surname]),
                ("uidNumber", &[number]),
                ("gidNumber", &["100"]),
                ("homeDirectory", &[home.as_str()]),
                ("loginShell", &["/bin/bash"]),
                ("description", &["Fixture user"]),
            ]),
        );
    }

    let config = ConnectionConfig {
        base: BASE.into(),
        ..Default::default()
    };
    let adapter = ConnectionAdapter::new(config, Arc::new(directory.clone())).unwrap();
    (directory, adapter)
}

pub fn groups() -> Arc<Mapping> {
    Arc::new(
        Mapping::new("cn")
            .prefix("ou=Groups")
            .classes(["top", "posixGroup"]),
    )
}

pub fn users(groups: &Arc<Mapping>) -> Arc<Mapping> {
    let people = Arc::new(
        Mapping::new("uid")
            .prefix("ou=People")
            .classes(["top", "person", "posixAccount"]),
    );
    Arc::new(
        Mapping::new("uid")
            .prefix("ou=People")
            .classes(["top", "person", "posixAccount"])
            .recommended_classes(["shadowAccount"])
            .belongs_to(
                BelongsTo::new("primary_group", groups.clone())
                    .foreign_key("gidNumber")
                    .primary_key("gidNumber"),
            )
            .belongs_to(BelongsTo::new("manager", people).foreign_key("seeAlso")),
    )
}
