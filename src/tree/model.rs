//! The record tree: an arena of nodes with ordered children and non-owning
//! parent back-references.
//!
//! Ownership flows strictly container -> children via the arena map; parent
//! ids are lookup keys only and never drive lifetime decisions. The tree is
//! plain data with no interior locking: callers serialize mutations onto a
//! single logical owner.

use std::collections::HashMap;

use uuid::Uuid;

use super::inheritance::{InheritanceFlags, InheritedProperty, PropertyValue};
use super::node::{ConnectionProperties, NodeKind};

/// One node in the arena.
#[derive(Debug, Clone)]
pub struct RecordNode {
    /// Stable unique identifier, immutable once assigned.
    pub id: String,
    /// Non-owning back-reference; `None` for roots.
    pub parent_id: Option<String>,
    /// Ordered child ids. Empty for leaves.
    pub children_ids: Vec<String>,
    pub kind: NodeKind,
    pub name: String,
    pub properties: ConnectionProperties,
    pub flags: InheritanceFlags,
}

impl RecordNode {
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Connection
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container | NodeKind::Root)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TreeError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node is not a container: {0}")]
    NotAContainer(String),

    #[error("Duplicate node id: {0}")]
    DuplicateId(String),

    #[error("Moving {node} under {target} would create a cycle")]
    CycleDetected { node: String, target: String },

    #[error("Leaf nodes cannot have children: {0}")]
    LeafParent(String),
}

/// The in-memory model. Supports multiple parallel roots.
#[derive(Debug, Clone, Default)]
pub struct RecordTree {
    nodes: HashMap<String, RecordNode>,
    root_ids: Vec<String>,
}

impl RecordTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&RecordNode> {
        self.nodes.get(id)
    }

    pub fn root_ids(&self) -> &[String] {
        &self.root_ids
    }

    pub fn roots(&self) -> Vec<&RecordNode> {
        self.root_ids
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn children(&self, id: &str) -> Vec<&RecordNode> {
        self.nodes
            .get(id)
            .map(|n| {
                n.children_ids
                    .iter()
                    .filter_map(|c| self.nodes.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Add a new root node marking the top of an independent tree.
    pub fn add_root(&mut self, name: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        let node = RecordNode {
            id: id.clone(),
            parent_id: None,
            children_ids: Vec::new(),
            kind: NodeKind::Root,
            name: name.into(),
            properties: ConnectionProperties::default(),
            flags: InheritanceFlags::default(),
        };
        self.nodes.insert(id.clone(), node);
        self.root_ids.push(id.clone());
        id
    }

    pub fn add_container(
        &mut self,
        parent_id: &str,
        name: impl Into<String>,
    ) -> Result<String, TreeError> {
        let id = Uuid::new_v4().to_string();
        self.insert_node(
            Some(parent_id),
            id.clone(),
            NodeKind::Container,
            name,
            ConnectionProperties::default(),
            InheritanceFlags::default(),
        )?;
        Ok(id)
    }

    pub fn add_connection(
        &mut self,
        parent_id: &str,
        name: impl Into<String>,
        properties: ConnectionProperties,
    ) -> Result<String, TreeError> {
        let id = Uuid::new_v4().to_string();
        self.insert_node(
            Some(parent_id),
            id.clone(),
            NodeKind::Connection,
            name,
            properties,
            InheritanceFlags::default(),
        )?;
        Ok(id)
    }

    /// Insert a fully specified node, preserving a caller-provided id.
    ///
    /// This is the deserializer entry point; the ergonomic `add_*` methods
    /// delegate here. `parent_id: None` attaches the node as a root.
    pub fn insert_node(
        &mut self,
        parent_id: Option<&str>,
        id: String,
        kind: NodeKind,
        name: impl Into<String>,
        properties: ConnectionProperties,
        flags: InheritanceFlags,
    ) -> Result<(), TreeError> {
        if self.nodes.contains_key(&id) {
            return Err(TreeError::DuplicateId(id));
        }
        if let Some(parent_id) = parent_id {
            let parent = self
                .nodes
                .get(parent_id)
                .ok_or_else(|| TreeError::NodeNotFound(parent_id.to_string()))?;
            if !parent.is_container() {
                return Err(TreeError::LeafParent(parent_id.to_string()));
            }
        }

        let node = RecordNode {
            id: id.clone(),
            parent_id: parent_id.map(str::to_string),
            children_ids: Vec::new(),
            kind,
            name: name.into(),
            properties,
            flags,
        };
        self.nodes.insert(id.clone(), node);

        match parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(parent_id) {
                    parent.children_ids.push(id);
                }
            }
            None => self.root_ids.push(id),
        }
        Ok(())
    }

    /// Remove a node and its whole subtree. Returns the removed ids.
    pub fn remove(&mut self, id: &str) -> Result<Vec<String>, TreeError> {
        if !self.nodes.contains_key(id) {
            return Err(TreeError::NodeNotFound(id.to_string()));
        }
        let mut removed = Vec::new();
        self.remove_recursive(id, &mut removed);
        removed.reverse();
        Ok(removed)
    }

    fn remove_recursive(&mut self, id: &str, removed: &mut Vec<String>) {
        let (children, parent_id) = match self.nodes.get(id) {
            Some(node) => (node.children_ids.clone(), node.parent_id.clone()),
            None => return,
        };
        for child in children {
            self.remove_recursive(&child, removed);
        }
        match parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.children_ids.retain(|c| c != id);
                }
            }
            None => self.root_ids.retain(|r| r != id),
        }
        self.nodes.remove(id);
        removed.push(id.to_string());
    }

    /// Reparent a node, rejecting moves that would create a cycle.
    pub fn move_node(&mut self, id: &str, new_parent_id: &str) -> Result<(), TreeError> {
        if !self.nodes.contains_key(id) {
            return Err(TreeError::NodeNotFound(id.to_string()));
        }
        let target = self
            .nodes
            .get(new_parent_id)
            .ok_or_else(|| TreeError::NodeNotFound(new_parent_id.to_string()))?;
        if !target.is_container() {
            return Err(TreeError::NotAContainer(new_parent_id.to_string()));
        }
        // The target must not be the node itself or one of its descendants.
        if id == new_parent_id || self.is_descendant_of(new_parent_id, id) {
            return Err(TreeError::CycleDetected {
                node: id.to_string(),
                target: new_parent_id.to_string(),
            });
        }

        let old_parent = self.nodes.get(id).and_then(|n| n.parent_id.clone());
        match old_parent {
            Some(old_parent) => {
                if let Some(parent) = self.nodes.get_mut(&old_parent) {
                    parent.children_ids.retain(|c| c != id);
                }
            }
            None => self.root_ids.retain(|r| r != id),
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent_id = Some(new_parent_id.to_string());
        }
        if let Some(parent) = self.nodes.get_mut(new_parent_id) {
            parent.children_ids.push(id.to_string());
        }
        Ok(())
    }

    /// True if `candidate` lies somewhere below `ancestor`.
    pub fn is_descendant_of(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = self.nodes.get(candidate).and_then(|n| n.parent_id.as_deref());
        while let Some(parent_id) = current {
            if parent_id == ancestor {
                return true;
            }
            current = self.nodes.get(parent_id).and_then(|n| n.parent_id.as_deref());
        }
        false
    }

    /// Depth-first pre-order subtree listing, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<&RecordNode> {
        let mut result = Vec::new();
        self.collect_descendants(id, &mut result);
        result
    }

    fn collect_descendants<'a>(&'a self, id: &str, result: &mut Vec<&'a RecordNode>) {
        if let Some(node) = self.nodes.get(id) {
            for child_id in &node.children_ids {
                if let Some(child) = self.nodes.get(child_id) {
                    result.push(child);
                    self.collect_descendants(child_id, result);
                }
            }
        }
    }

    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        node.name = name.into();
        Ok(())
    }

    /// Mutable access to a node's property set. Structure (ids, parents,
    /// children) stays under tree control.
    pub fn properties_mut(&mut self, id: &str) -> Option<&mut ConnectionProperties> {
        self.nodes.get_mut(id).map(|n| &mut n.properties)
    }

    // ------------------------------------------------------------------
    // Inheritance resolution
    // ------------------------------------------------------------------

    /// Effective value of `prop` for the node: if the node's flag is set and
    /// it has a parent, the parent's effective value wins, recursively.
    /// Roots (and detached nodes) always resolve to their stored value.
    /// Terminates because the tree is acyclic.
    pub fn effective(&self, id: &str, prop: InheritedProperty) -> Option<PropertyValue> {
        let node = self.nodes.get(id)?;
        if node.flags.inherits(prop) {
            if let Some(parent_id) = &node.parent_id {
                return self.effective(parent_id, prop);
            }
        }
        Some(Self::stored_value(&node.properties, prop))
    }

    pub fn effective_username(&self, id: &str) -> Option<String> {
        self.effective(id, InheritedProperty::Username)
            .and_then(|v| v.as_text().map(str::to_string))
    }

    pub fn effective_domain(&self, id: &str) -> Option<String> {
        self.effective(id, InheritedProperty::Domain)
            .and_then(|v| v.as_text().map(str::to_string))
    }

    fn stored_value(props: &ConnectionProperties, prop: InheritedProperty) -> PropertyValue {
        match prop {
            InheritedProperty::Description => PropertyValue::Text(props.description.clone()),
            InheritedProperty::Icon => PropertyValue::Text(props.icon.clone()),
            InheritedProperty::Panel => PropertyValue::Text(props.panel.clone()),
            InheritedProperty::Protocol => PropertyValue::Protocol(props.protocol),
            InheritedProperty::Port => PropertyValue::Port(props.port),
            InheritedProperty::Username => PropertyValue::Text(props.username.clone()),
            InheritedProperty::Password => PropertyValue::Text(props.password.clone()),
            InheritedProperty::Domain => PropertyValue::Text(props.domain.clone()),
        }
    }

    /// Write a stored value. The corresponding inheritance flag is left
    /// untouched: while it remains set, the ancestor's value still wins in
    /// `effective`. Callers that want the node to stop inheriting must call
    /// `stop_inheriting` explicitly.
    pub fn set_value(
        &mut self,
        id: &str,
        prop: InheritedProperty,
        value: PropertyValue,
    ) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        let props = &mut node.properties;
        match (prop, value) {
            (InheritedProperty::Description, PropertyValue::Text(s)) => props.description = s,
            (InheritedProperty::Icon, PropertyValue::Text(s)) => props.icon = s,
            (InheritedProperty::Panel, PropertyValue::Text(s)) => props.panel = s,
            (InheritedProperty::Protocol, PropertyValue::Protocol(p)) => props.protocol = p,
            (InheritedProperty::Port, PropertyValue::Port(p)) => props.port = p,
            (InheritedProperty::Username, PropertyValue::Text(s)) => props.username = s,
            (InheritedProperty::Password, PropertyValue::Text(s)) => props.password = s,
            (InheritedProperty::Domain, PropertyValue::Text(s)) => props.domain = s,
            (prop, value) => {
                tracing::warn!(?prop, ?value, "Ignoring type-mismatched property write");
            }
        }
        Ok(())
    }

    /// Clear the inheritance flag so the node's own stored value becomes
    /// effective.
    pub fn stop_inheriting(&mut self, id: &str, prop: InheritedProperty) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        node.flags.set(prop, false);
        Ok(())
    }

    pub fn set_inherit(
        &mut self,
        id: &str,
        prop: InheritedProperty,
        inherit: bool,
    ) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        node.flags.set(prop, inherit);
        Ok(())
    }

    /// Bulk flag toggle for every inheritable property.
    pub fn set_inherit_all(&mut self, id: &str, inherit: bool) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        node.flags = InheritanceFlags::all(inherit);
        Ok(())
    }
}
