//! Plain structured-document codec (JSON).

use serde_json::{json, Map, Value};

use crate::migrate::{self, SchemaVersion, CURRENT_SCHEMA_VERSION};
use crate::tree::{
    ConnectionProperties, InheritanceFlags, InheritedProperty, NodeKind, Protocol, RecordNode,
    RecordTree,
};

use super::filter::{SaveFilter, SensitiveField};
use super::{FormatError, TreeCodec};

/// Serializes the record tree to an indented JSON document and back.
///
/// Stored values (not effective ones) are written together with the
/// per-node inheritance flags, so the inheritance structure survives the
/// round trip.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentCodec;

impl DocumentCodec {
    pub fn new() -> Self {
        Self
    }

    fn serialize_node(&self, tree: &RecordTree, node: &RecordNode, filter: &SaveFilter) -> Value {
        let props = &node.properties;
        let mut obj = Map::new();
        obj.insert("Name".into(), json!(node.name));
        obj.insert("Id".into(), json!(node.id));
        obj.insert("Type".into(), json!(node.kind.as_str()));
        obj.insert("Description".into(), json!(props.description));
        obj.insert("Icon".into(), json!(props.icon));
        obj.insert("Panel".into(), json!(props.panel));
        obj.insert("Hostname".into(), json!(props.hostname));
        obj.insert("Protocol".into(), json!(props.protocol.as_str()));
        obj.insert("Port".into(), json!(props.port));

        if filter.should_include(SensitiveField::Username) {
            obj.insert("Username".into(), json!(props.username));
        }
        if filter.should_include(SensitiveField::Password) {
            obj.insert("Password".into(), json!(props.password));
        }
        if filter.should_include(SensitiveField::Domain) {
            obj.insert("Domain".into(), json!(props.domain));
        }
        if let Some(credential_ref) = &props.credential_ref {
            obj.insert("CredentialRef".into(), json!(credential_ref));
        }

        let mut flags = Map::new();
        for (prop, value) in node.flags.iter() {
            flags.insert(prop.name().to_string(), json!(value));
        }
        obj.insert("Inheritance".into(), Value::Object(flags));

        if node.is_container() {
            let children: Vec<Value> = tree
                .children(&node.id)
                .into_iter()
                .map(|child| self.serialize_node(tree, child, filter))
                .collect();
            obj.insert("Children".into(), Value::Array(children));
        }

        Value::Object(obj)
    }

    fn parse_node(
        &self,
        tree: &mut RecordTree,
        parent_id: Option<&str>,
        value: &Value,
    ) -> Result<(), FormatError> {
        let obj = value
            .as_object()
            .ok_or_else(|| FormatError::Malformed("node is not an object".to_string()))?;

        let id = obj
            .get("Id")
            .and_then(Value::as_str)
            .ok_or(FormatError::MissingField("Id"))?
            .to_string();
        let name = obj
            .get("Name")
            .and_then(Value::as_str)
            .ok_or(FormatError::MissingField("Name"))?
            .to_string();

        let children = obj.get("Children").and_then(Value::as_array);
        let kind = obj
            .get("Type")
            .and_then(Value::as_str)
            .and_then(NodeKind::parse)
            .unwrap_or(match (parent_id, children) {
                (None, _) => NodeKind::Root,
                (_, Some(_)) => NodeKind::Container,
                (_, None) => NodeKind::Connection,
            });

        let protocol = obj
            .get("Protocol")
            .and_then(Value::as_str)
            .and_then(Protocol::parse)
            .unwrap_or_default();
        let text = |key: &str| -> String {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let properties = ConnectionProperties {
            description: text("Description"),
            icon: text("Icon"),
            panel: obj
                .get("Panel")
                .and_then(Value::as_str)
                .unwrap_or("General")
                .to_string(),
            hostname: text("Hostname"),
            protocol,
            port: obj
                .get("Port")
                .and_then(Value::as_u64)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or_else(|| protocol.default_port()),
            username: text("Username"),
            password: text("Password"),
            domain: text("Domain"),
            credential_ref: obj
                .get("CredentialRef")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        let mut flags = InheritanceFlags::default();
        if let Some(block) = obj.get("Inheritance").and_then(Value::as_object) {
            for (key, value) in block {
                if let (Some(prop), Some(flag)) =
                    (InheritedProperty::from_name(key), value.as_bool())
                {
                    flags.set(prop, flag);
                }
            }
        }

        tree.insert_node(parent_id, id.clone(), kind, name, properties, flags)?;

        if let Some(children) = children {
            for child in children {
                self.parse_node(tree, Some(&id), child)?;
            }
        }
        Ok(())
    }
}

impl TreeCodec for DocumentCodec {
    fn version(&self) -> SchemaVersion {
        CURRENT_SCHEMA_VERSION
    }

    fn serialize(&self, tree: &RecordTree, filter: &SaveFilter) -> Result<String, FormatError> {
        let roots: Vec<Value> = tree
            .roots()
            .into_iter()
            .map(|root| self.serialize_node(tree, root, filter))
            .collect();
        let doc = json!({
            "SchemaVersion": self.version().to_string(),
            "Export": false,
            "Roots": roots,
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    fn deserialize(&self, input: &str) -> Result<RecordTree, FormatError> {
        let mut doc: Value = serde_json::from_str(input)?;

        // The declared version is per-call state, threaded through locals.
        let declared: SchemaVersion = doc
            .get("SchemaVersion")
            .and_then(Value::as_str)
            .ok_or(FormatError::MissingField("SchemaVersion"))?
            .parse()?;
        if declared > CURRENT_SCHEMA_VERSION {
            return Err(FormatError::UnsupportedVersion(declared));
        }
        if declared < CURRENT_SCHEMA_VERSION {
            migrate::document::upgrade_to_current(&mut doc, declared)?;
        }

        let roots = doc
            .get("Roots")
            .and_then(Value::as_array)
            .ok_or(FormatError::MissingField("Roots"))?;

        let mut tree = RecordTree::new();
        for root in roots {
            self.parse_node(&mut tree, None, root)?;
        }
        Ok(tree)
    }
}
