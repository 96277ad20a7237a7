//! Upgrade steps for the structured-document formats.
//!
//! Each step is a pure transformation of the parsed JSON value. The runner
//! threads the in-progress version through a local: concurrent
//! deserializations of differently-versioned inputs share nothing.

use serde_json::Value;

use super::{SchemaVersion, UpgradeError, CURRENT_SCHEMA_VERSION};

trait DocumentUpgradeStep: Sync {
    fn target(&self) -> SchemaVersion;
    fn can_upgrade(&self, from: SchemaVersion) -> bool;
    fn upgrade(&self, doc: &mut Value) -> Result<(), UpgradeError>;
}

/// Apply every node object in the document, recursing through `Children`.
fn for_each_node(doc: &mut Value, apply: &dyn Fn(&mut serde_json::Map<String, Value>)) {
    let Some(roots) = doc.get_mut("Roots").and_then(Value::as_array_mut) else {
        return;
    };
    fn walk(node: &mut Value, apply: &dyn Fn(&mut serde_json::Map<String, Value>)) {
        if let Some(obj) = node.as_object_mut() {
            apply(obj);
            if let Some(children) = obj.get_mut("Children").and_then(Value::as_array_mut) {
                for child in children {
                    walk(child, apply);
                }
            }
        }
    }
    for root in roots {
        walk(root, apply);
    }
}

/// 1.0 -> 1.1: the node attribute `Host` became `Hostname`, and the `Panel`
/// attribute was introduced (defaulted).
struct RenameHostAttribute;

impl DocumentUpgradeStep for RenameHostAttribute {
    fn target(&self) -> SchemaVersion {
        SchemaVersion::new(1, 1)
    }

    fn can_upgrade(&self, from: SchemaVersion) -> bool {
        from < self.target()
    }

    fn upgrade(&self, doc: &mut Value) -> Result<(), UpgradeError> {
        for_each_node(doc, &|obj| {
            if let Some(host) = obj.remove("Host") {
                obj.entry("Hostname").or_insert(host);
            }
            obj.entry("Panel").or_insert_with(|| Value::from("General"));
        });
        Ok(())
    }
}

/// 1.1 -> 1.2: per-property inheritance flags and credential references were
/// introduced. Documents written before 1.2 had purely local values, so the
/// upgrade materializes an explicit all-false `Inheritance` block to keep
/// their behavior unchanged (a 1.2 document that simply omits the block
/// gets the all-inherit defaults instead).
struct IntroduceInheritance;

impl DocumentUpgradeStep for IntroduceInheritance {
    fn target(&self) -> SchemaVersion {
        SchemaVersion::new(1, 2)
    }

    fn can_upgrade(&self, from: SchemaVersion) -> bool {
        from >= SchemaVersion::new(1, 1) && from < self.target()
    }

    fn upgrade(&self, doc: &mut Value) -> Result<(), UpgradeError> {
        use crate::tree::InheritedProperty;
        for_each_node(doc, &|obj| {
            obj.entry("Inheritance").or_insert_with(|| {
                let mut flags = serde_json::Map::new();
                for prop in InheritedProperty::ALL {
                    flags.insert(prop.name().to_string(), Value::from(false));
                }
                Value::Object(flags)
            });
            obj.entry("CredentialRef").or_insert(Value::Null);
        });
        Ok(())
    }
}

fn steps() -> [&'static dyn DocumentUpgradeStep; 2] {
    [&RenameHostAttribute, &IntroduceInheritance]
}

/// Bring a parsed document from `from` up to the current schema version.
///
/// Returns the version actually reached. Fails without touching `doc` when
/// the input claims a future version.
pub fn upgrade_to_current(
    doc: &mut Value,
    from: SchemaVersion,
) -> Result<SchemaVersion, UpgradeError> {
    if from > CURRENT_SCHEMA_VERSION {
        return Err(UpgradeError::UnsupportedVersion(from));
    }

    let mut version = from;
    for step in steps() {
        if step.can_upgrade(version) {
            tracing::info!(%version, target = %step.target(), "Upgrading document schema");
            step.upgrade(doc)?;
            version = step.target();
        }
    }
    Ok(version)
}
