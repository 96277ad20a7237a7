//! Record Tree Module
//!
//! In-memory model of connection records and containers: an ordered,
//! mutable, multi-rooted tree with per-property inheritance resolution.

pub mod inheritance;
pub mod model;
pub mod node;

pub use inheritance::{InheritanceFlags, InheritedProperty, PropertyValue};
pub use model::{RecordNode, RecordTree, TreeError};
pub use node::{ConnectionProperties, NodeKind, Protocol};
