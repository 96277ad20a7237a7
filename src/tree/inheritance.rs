//! Per-property inheritance flags.
//!
//! The inheritable property set is a closed enum rather than a name-keyed
//! map, so a missing flag is unrepresentable and matches are checked for
//! exhaustiveness at compile time. Identifiers, the display name and the
//! hostname are not in the set: they are never inherited.

use crate::tree::node::Protocol;

/// The properties whose effective value may be delegated to an ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InheritedProperty {
    Description,
    Icon,
    Panel,
    Protocol,
    Port,
    Username,
    Password,
    Domain,
}

impl InheritedProperty {
    pub const ALL: [InheritedProperty; 8] = [
        InheritedProperty::Description,
        InheritedProperty::Icon,
        InheritedProperty::Panel,
        InheritedProperty::Protocol,
        InheritedProperty::Port,
        InheritedProperty::Username,
        InheritedProperty::Password,
        InheritedProperty::Domain,
    ];

    pub(crate) fn index(&self) -> usize {
        match self {
            InheritedProperty::Description => 0,
            InheritedProperty::Icon => 1,
            InheritedProperty::Panel => 2,
            InheritedProperty::Protocol => 3,
            InheritedProperty::Port => 4,
            InheritedProperty::Username => 5,
            InheritedProperty::Password => 6,
            InheritedProperty::Domain => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InheritedProperty::Description => "Description",
            InheritedProperty::Icon => "Icon",
            InheritedProperty::Panel => "Panel",
            InheritedProperty::Protocol => "Protocol",
            InheritedProperty::Port => "Port",
            InheritedProperty::Username => "Username",
            InheritedProperty::Password => "Password",
            InheritedProperty::Domain => "Domain",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }
}

/// One boolean per inheritable property, always present on every node.
///
/// Flags default to `true`: a freshly created child delegates everything to
/// its parent. The flags themselves are never inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritanceFlags([bool; InheritedProperty::ALL.len()]);

impl Default for InheritanceFlags {
    fn default() -> Self {
        Self::all(true)
    }
}

impl InheritanceFlags {
    pub fn all(value: bool) -> Self {
        Self([value; InheritedProperty::ALL.len()])
    }

    pub fn inherits(&self, property: InheritedProperty) -> bool {
        self.0[property.index()]
    }

    pub fn set(&mut self, property: InheritedProperty, value: bool) {
        self.0[property.index()] = value;
    }

    /// Iterate `(property, flag)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (InheritedProperty, bool)> + '_ {
        InheritedProperty::ALL
            .iter()
            .map(move |p| (*p, self.0[p.index()]))
    }
}

/// A resolved (or locally stored) property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Port(u16),
    Protocol(Protocol),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<u16> {
        match self {
            PropertyValue::Port(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_protocol(&self) -> Option<Protocol> {
        match self {
            PropertyValue::Protocol(p) => Some(*p),
            _ => None,
        }
    }
}
