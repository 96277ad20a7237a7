//! Single-record export codec (`.rdp`-style `key:type:value` text).
//!
//! Hands exactly one connection to an external consumer. Pointed at a
//! container, it picks the first RDP leaf found depth-first, falling back
//! to the first non-root leaf of any protocol; with no leaf at all it
//! returns an empty result rather than erroring.

use crate::migrate::SchemaVersion;
use crate::tree::{InheritedProperty, Protocol, RecordNode, RecordTree};

use super::filter::{SaveFilter, SensitiveField};
use super::FormatError;

#[derive(Debug, Default, Clone, Copy)]
pub struct RdpExportCodec {
    _private: (),
}

impl RdpExportCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> SchemaVersion {
        SchemaVersion::new(1, 0)
    }

    /// Export the target node, resolving containers to a single leaf.
    pub fn export(
        &self,
        tree: &RecordTree,
        node_id: &str,
        filter: &SaveFilter,
    ) -> Result<String, FormatError> {
        let node = tree
            .node(node_id)
            .ok_or_else(|| FormatError::Malformed(format!("unknown node: {node_id}")))?;

        let target = if node.is_container() {
            match self
                .find_leaf(tree, node_id, Some(Protocol::Rdp))
                .or_else(|| self.find_leaf(tree, node_id, None))
            {
                Some(leaf) => leaf,
                None => return Ok(String::new()),
            }
        } else {
            node
        };

        Ok(self.serialize_connection(tree, target, filter))
    }

    /// Depth-first search for the first leaf, optionally restricted to one
    /// protocol (by effective value).
    fn find_leaf<'a>(
        &self,
        tree: &'a RecordTree,
        container_id: &str,
        protocol: Option<Protocol>,
    ) -> Option<&'a RecordNode> {
        tree.descendants(container_id).into_iter().find(|node| {
            node.is_leaf()
                && protocol.map_or(true, |wanted| {
                    tree.effective(&node.id, InheritedProperty::Protocol)
                        .and_then(|v| v.as_protocol())
                        == Some(wanted)
                })
        })
    }

    fn serialize_connection(
        &self,
        tree: &RecordTree,
        node: &RecordNode,
        filter: &SaveFilter,
    ) -> String {
        let mut out = String::new();

        out.push_str(&format!("full address:s:{}\r\n", node.properties.hostname));
        let port = tree
            .effective(&node.id, InheritedProperty::Port)
            .and_then(|v| v.as_port())
            .unwrap_or(node.properties.port);
        out.push_str(&format!("server port:i:{port}\r\n"));

        if filter.should_include(SensitiveField::Username) {
            if let Some(username) = tree.effective_username(&node.id) {
                if !username.is_empty() {
                    out.push_str(&format!("username:s:{username}\r\n"));
                }
            }
        }
        if filter.should_include(SensitiveField::Domain) {
            if let Some(domain) = tree.effective_domain(&node.id) {
                if !domain.is_empty() {
                    out.push_str(&format!("domain:s:{domain}\r\n"));
                }
            }
        }

        out.push_str("screen mode id:i:2\r\n");
        out.push_str("authentication level:i:2\r\n");
        out.push_str("enablecredsspsupport:i:1\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ConnectionProperties;

    fn build_tree() -> (RecordTree, String) {
        let mut tree = RecordTree::new();
        let root = tree.add_root("Connections");
        (tree, root)
    }

    #[test]
    fn test_export_prefers_rdp_leaf() {
        let (mut tree, root) = build_tree();
        let folder = tree.add_container(&root, "mixed").unwrap();
        let ssh = tree
            .add_connection(
                &folder,
                "ssh-box",
                ConnectionProperties::new("ssh.example").with_protocol(Protocol::Ssh),
            )
            .unwrap();
        tree.stop_inheriting(&ssh, InheritedProperty::Protocol).unwrap();
        let rdp = tree
            .add_connection(
                &folder,
                "rdp-box",
                ConnectionProperties::new("rdp.example").with_protocol(Protocol::Rdp),
            )
            .unwrap();
        tree.stop_inheriting(&rdp, InheritedProperty::Protocol).unwrap();

        let out = RdpExportCodec::new()
            .export(&tree, &folder, &SaveFilter::default())
            .unwrap();
        assert!(out.contains("full address:s:rdp.example"));
    }

    #[test]
    fn test_export_falls_back_to_first_leaf() {
        let (mut tree, root) = build_tree();
        let folder = tree.add_container(&root, "ssh-only").unwrap();
        let ssh = tree
            .add_connection(
                &folder,
                "ssh-box",
                ConnectionProperties::new("ssh.example")
                    .with_protocol(Protocol::Ssh)
                    .with_port(2200),
            )
            .unwrap();
        tree.stop_inheriting(&ssh, InheritedProperty::Protocol).unwrap();
        tree.stop_inheriting(&ssh, InheritedProperty::Port).unwrap();

        let out = RdpExportCodec::new()
            .export(&tree, &folder, &SaveFilter::default())
            .unwrap();
        assert!(out.contains("full address:s:ssh.example"));
        assert!(out.contains("server port:i:2200"));
    }

    #[test]
    fn test_export_empty_container_yields_empty_result() {
        let (mut tree, root) = build_tree();
        let folder = tree.add_container(&root, "empty").unwrap();
        let out = RdpExportCodec::new()
            .export(&tree, &folder, &SaveFilter::default())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_export_honors_save_filter() {
        let (mut tree, root) = build_tree();
        let conn = tree
            .add_connection(
                &root,
                "c",
                ConnectionProperties::new("h")
                    .with_username("alice")
                    .with_domain("CORP"),
            )
            .unwrap();
        for prop in [InheritedProperty::Username, InheritedProperty::Domain] {
            tree.stop_inheriting(&conn, prop).unwrap();
        }

        let codec = RdpExportCodec::new();
        let full = codec.export(&tree, &conn, &SaveFilter::default()).unwrap();
        assert!(full.contains("username:s:alice"));
        assert!(full.contains("domain:s:CORP"));

        let none = codec.export(&tree, &conn, &SaveFilter::exclude_all()).unwrap();
        assert!(!none.contains("username"));
        assert!(!none.contains("domain"));
    }
}
