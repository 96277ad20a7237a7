//! Delimited-table codec.
//!
//! One header row plus one row per node; hierarchy is flattened into a
//! `Parent` column holding the parent's id. Written with semicolons; the
//! reader sniffs semicolon vs comma from the header and accepts RFC-4180
//! double-quoted fields. The format is versioned by its header: legacy
//! column names are mapped forward and missing optional columns default.

use std::collections::HashMap;

use crate::migrate::{SchemaVersion, CURRENT_SCHEMA_VERSION};
use crate::tree::{
    ConnectionProperties, InheritanceFlags, InheritedProperty, NodeKind, Protocol, RecordNode,
    RecordTree,
};

use super::filter::{SaveFilter, SensitiveField};
use super::{FormatError, TreeCodec};

const WRITE_DELIMITER: char = ';';

#[derive(Debug, Default, Clone, Copy)]
pub struct TableCodec;

impl TableCodec {
    pub fn new() -> Self {
        Self
    }

    fn header(&self, filter: &SaveFilter) -> Vec<&'static str> {
        let mut columns = vec![
            "Name",
            "Id",
            "Parent",
            "NodeType",
            "Description",
            "Icon",
            "Panel",
            "Hostname",
            "Protocol",
            "Port",
        ];
        if filter.should_include(SensitiveField::Username) {
            columns.push("Username");
        }
        if filter.should_include(SensitiveField::Password) {
            columns.push("Password");
        }
        if filter.should_include(SensitiveField::Domain) {
            columns.push("Domain");
        }
        columns.push("CredentialRef");
        for prop in InheritedProperty::ALL {
            columns.push(match prop {
                InheritedProperty::Description => "InheritDescription",
                InheritedProperty::Icon => "InheritIcon",
                InheritedProperty::Panel => "InheritPanel",
                InheritedProperty::Protocol => "InheritProtocol",
                InheritedProperty::Port => "InheritPort",
                InheritedProperty::Username => "InheritUsername",
                InheritedProperty::Password => "InheritPassword",
                InheritedProperty::Domain => "InheritDomain",
            });
        }
        columns
    }

    fn row(&self, node: &RecordNode, filter: &SaveFilter) -> Vec<String> {
        let props = &node.properties;
        let mut fields = vec![
            node.name.clone(),
            node.id.clone(),
            node.parent_id.clone().unwrap_or_default(),
            node.kind.as_str().to_string(),
            props.description.clone(),
            props.icon.clone(),
            props.panel.clone(),
            props.hostname.clone(),
            props.protocol.as_str().to_string(),
            props.port.to_string(),
        ];
        if filter.should_include(SensitiveField::Username) {
            fields.push(props.username.clone());
        }
        if filter.should_include(SensitiveField::Password) {
            fields.push(props.password.clone());
        }
        if filter.should_include(SensitiveField::Domain) {
            fields.push(props.domain.clone());
        }
        fields.push(props.credential_ref.clone().unwrap_or_default());
        for (_, flag) in node.flags.iter() {
            fields.push(flag.to_string());
        }
        fields
    }
}

/// Quote a field when it contains the delimiter, a quote or line break.
/// Line breaks are flattened to spaces: the reader is line-oriented.
fn escape(field: &str, delimiter: char) -> String {
    let field = field.replace(['\r', '\n'], " ");
    if field.contains(delimiter) || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

/// Split one line into fields, honoring double-quoted sections with
/// doubled-quote escapes.
fn parse_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "true" | "True" | "TRUE" | "1")
}

struct ParsedRow {
    id: String,
    parent: String,
    kind: NodeKind,
    name: String,
    properties: ConnectionProperties,
    flags: InheritanceFlags,
}

impl TreeCodec for TableCodec {
    fn version(&self) -> SchemaVersion {
        CURRENT_SCHEMA_VERSION
    }

    fn serialize(&self, tree: &RecordTree, filter: &SaveFilter) -> Result<String, FormatError> {
        let mut lines = Vec::with_capacity(tree.len() + 1);
        lines.push(
            self.header(filter)
                .iter()
                .map(|c| escape(c, WRITE_DELIMITER))
                .collect::<Vec<_>>()
                .join(&WRITE_DELIMITER.to_string()),
        );

        for root in tree.roots() {
            lines.push(join_row(self.row(root, filter)));
            for node in tree.descendants(&root.id) {
                lines.push(join_row(self.row(node, filter)));
            }
        }
        Ok(lines.join("\r\n"))
    }

    fn deserialize(&self, input: &str) -> Result<RecordTree, FormatError> {
        let lines: Vec<&str> = input
            .split(['\r', '\n'])
            .filter(|l| !l.is_empty())
            .collect();
        let Some(header_line) = lines.first() else {
            return Ok(RecordTree::new());
        };

        // Sniff the delimiter from the header row.
        let semicolons = header_line.matches(';').count();
        let commas = header_line.matches(',').count();
        let delimiter = if commas > semicolons { ',' } else { ';' };

        let mut columns: HashMap<String, usize> = HashMap::new();
        for (idx, name) in parse_line(header_line, delimiter).iter().enumerate() {
            // Legacy tables called the hostname column "Host".
            let name = if name == "Host" { "Hostname" } else { name.as_str() };
            columns.insert(name.to_string(), idx);
        }

        let mut rows = Vec::new();
        for line in &lines[1..] {
            let fields = parse_line(line, delimiter);
            let get = |name: &str| -> Option<&str> {
                columns.get(name).and_then(|i| fields.get(*i)).map(String::as_str)
            };

            let id = get("Id")
                .filter(|s| !s.is_empty())
                .ok_or(FormatError::MissingField("Id"))?
                .to_string();
            let name = get("Name").ok_or(FormatError::MissingField("Name"))?.to_string();
            let parent = get("Parent").unwrap_or_default().to_string();
            let kind = get("NodeType")
                .and_then(NodeKind::parse)
                .unwrap_or(if parent.is_empty() {
                    NodeKind::Root
                } else {
                    NodeKind::Connection
                });

            let protocol = get("Protocol").and_then(Protocol::parse).unwrap_or_default();
            let properties = ConnectionProperties {
                description: get("Description").unwrap_or_default().to_string(),
                icon: get("Icon").unwrap_or_default().to_string(),
                panel: get("Panel").filter(|s| !s.is_empty()).unwrap_or("General").to_string(),
                hostname: get("Hostname").unwrap_or_default().to_string(),
                protocol,
                port: get("Port")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or_else(|| protocol.default_port()),
                username: get("Username").unwrap_or_default().to_string(),
                password: get("Password").unwrap_or_default().to_string(),
                domain: get("Domain").unwrap_or_default().to_string(),
                credential_ref: get("CredentialRef")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            };

            let mut flags = InheritanceFlags::default();
            for prop in InheritedProperty::ALL {
                let column = format!("Inherit{}", prop.name());
                if let Some(value) = get(&column) {
                    flags.set(prop, parse_bool(value));
                }
            }

            rows.push(ParsedRow {
                id,
                parent,
                kind,
                name,
                properties,
                flags,
            });
        }

        // Attach rows as their parents appear; the writer emits parents
        // first but imports may not.
        let mut tree = RecordTree::new();
        let mut remaining = rows;
        while !remaining.is_empty() {
            let mut next = Vec::new();
            let mut progressed = false;
            for row in remaining {
                let parent_known = row.parent.is_empty() || tree.node(&row.parent).is_some();
                if parent_known {
                    let parent = if row.parent.is_empty() {
                        None
                    } else {
                        Some(row.parent.as_str())
                    };
                    tree.insert_node(parent, row.id, row.kind, row.name, row.properties, row.flags)?;
                    progressed = true;
                } else {
                    next.push(row);
                }
            }
            if !progressed {
                // Orphaned parent references: promote to roots rather than
                // dropping the rows.
                for row in next {
                    tracing::warn!(id = %row.id, parent = %row.parent, "Unknown parent id; attaching as root");
                    tree.insert_node(None, row.id, row.kind, row.name, row.properties, row.flags)?;
                }
                break;
            }
            remaining = next;
        }

        Ok(tree)
    }
}

fn join_row(fields: Vec<String>) -> String {
    fields
        .iter()
        .map(|f| escape(f, WRITE_DELIMITER))
        .collect::<Vec<_>>()
        .join(&WRITE_DELIMITER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_level_roundtrip() {
        let mut tree = RecordTree::new();
        let root = tree.add_root("root");
        let folder = tree.add_container(&root, "F").unwrap();
        tree.add_connection(
            &folder,
            "C",
            ConnectionProperties::new("h").with_port(3389),
        )
        .unwrap();

        let codec = TableCodec::new();
        let text = codec.serialize(&tree, &SaveFilter::default()).unwrap();
        let loaded = codec.deserialize(&text).unwrap();

        let root = &loaded.roots()[0];
        let f = loaded.children(&root.id)[0];
        assert_eq!(f.name, "F");
        let c = loaded.children(&f.id)[0];
        assert_eq!(c.properties.hostname, "h");
        assert_eq!(c.properties.port, 3389);
    }

    #[test]
    fn test_quoted_fields_roundtrip() {
        let mut tree = RecordTree::new();
        let root = tree.add_root("root");
        tree.add_connection(
            &root,
            "semi;colon \"quoted\"",
            ConnectionProperties::new("host").with_description("a;b,c"),
        )
        .unwrap();

        let codec = TableCodec::new();
        let text = codec.serialize(&tree, &SaveFilter::default()).unwrap();
        let loaded = codec.deserialize(&text).unwrap();
        let conn = loaded.children(&loaded.root_ids()[0].clone())[0];
        assert_eq!(conn.name, "semi;colon \"quoted\"");
        assert_eq!(conn.properties.description, "a;b,c");
    }

    #[test]
    fn test_comma_delimiter_sniffed() {
        let text = "Name,Id,Parent,NodeType,Hostname,Protocol,Port\r\n\
                    root,r1,,Root,,,\r\n\
                    web,c1,r1,Connection,web.example,SSH,2022";
        let tree = TableCodec::new().deserialize(text).unwrap();
        let conn = tree.node("c1").unwrap();
        assert_eq!(conn.properties.hostname, "web.example");
        assert_eq!(conn.properties.protocol, Protocol::Ssh);
        assert_eq!(conn.properties.port, 2022);
    }

    #[test]
    fn test_legacy_host_column_accepted() {
        let text = "Name;Id;Parent;NodeType;Host\r\n\
                    root;r1;;Root;\r\n\
                    old;c1;r1;Connection;legacy.example";
        let tree = TableCodec::new().deserialize(text).unwrap();
        assert_eq!(tree.node("c1").unwrap().properties.hostname, "legacy.example");
    }

    #[test]
    fn test_filtered_columns_absent() {
        let mut tree = RecordTree::new();
        let root = tree.add_root("root");
        tree.add_connection(
            &root,
            "c",
            ConnectionProperties::new("h")
                .with_username("alice")
                .with_password("secret"),
        )
        .unwrap();

        let filter = SaveFilter::new(false, false, true);
        let text = TableCodec::new().serialize(&tree, &filter).unwrap();
        let header: Vec<&str> = text.lines().next().unwrap().split(';').collect();
        // The value columns vanish; the same-named Inherit* flag columns stay.
        assert!(!header.contains(&"Username"));
        assert!(!header.contains(&"Password"));
        assert!(header.contains(&"Domain"));
        assert!(header.contains(&"InheritUsername"));
        assert!(!text.contains("alice"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let text = "Name;Id;Parent;NodeType;Hostname\r\n\
                    stray;c1;nope;Connection;h1";
        let tree = TableCodec::new().deserialize(text).unwrap();
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.node("c1").unwrap().parent_id, None);
    }

    #[test]
    fn test_missing_id_fails() {
        let text = "Name;Parent;NodeType\r\nx;;Root";
        assert!(matches!(
            TableCodec::new().deserialize(text),
            Err(FormatError::MissingField("Id"))
        ));
    }

    #[test]
    fn test_flags_roundtrip() {
        let mut tree = RecordTree::new();
        let root = tree.add_root("root");
        let id = tree
            .add_connection(&root, "c", ConnectionProperties::new("h"))
            .unwrap();
        tree.stop_inheriting(&id, InheritedProperty::Port).unwrap();

        let codec = TableCodec::new();
        let text = codec.serialize(&tree, &SaveFilter::default()).unwrap();
        let loaded = codec.deserialize(&text).unwrap();
        let conn = loaded.node(&id).unwrap();
        assert!(!conn.flags.inherits(InheritedProperty::Port));
        assert!(conn.flags.inherits(InheritedProperty::Username));
    }
}
