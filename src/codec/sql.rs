//! Relational store codec (SQLite).
//!
//! The tree persists as one row per node with a `parent_id`/`position`
//! linkage, plus a metadata row carrying the document name, the sealed
//! protection sentinel, the export flag and the schema version, and an
//! `updates` table consumed by change detection.
//!
//! Values always reach SQL through bound parameters. The only text ever
//! interpolated into a statement is a table-name prefix, and that is
//! rejected at construction unless it is a plain `[A-Za-z0-9_]*`
//! identifier fragment.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::{CipherBlob, CryptoProvider, Protection, LEGACY_PASSPHRASE};
use crate::migrate::sql::TableNames;
use crate::migrate::{self, SchemaVersion, CURRENT_SCHEMA_VERSION};
use crate::store::StoreError;
use crate::tree::{
    ConnectionProperties, InheritanceFlags, InheritedProperty, NodeKind, Protocol, RecordTree,
};

use super::filter::{SaveFilter, SensitiveField};
use super::FormatError;

/// Reject anything that is not a bare identifier fragment. Keeps query text
/// immune to injection through configurable names; a value like `"; DROP`
/// never reaches a statement.
pub fn sanitize_identifier(identifier: &str) -> Result<(), StoreError> {
    if identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(identifier.to_string()))
    }
}

/// Per-store metadata, one row per connector.
#[derive(Debug, Clone)]
pub struct StoreMetadata {
    pub name: String,
    /// Base64 sealed sentinel; empty until the first save.
    pub protected: String,
    pub export: bool,
    pub conf_version: SchemaVersion,
}

pub struct SqlStore {
    conn: Mutex<Connection>,
    tables: TableNames,
}

impl SqlStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_table_prefix(path, "")
    }

    /// Open with a table-name prefix (for sharing one database between
    /// several connectors). The prefix is validated, not trusted.
    pub fn open_with_table_prefix<P: AsRef<Path>>(
        path: P,
        prefix: &str,
    ) -> Result<Self, StoreError> {
        sanitize_identifier(prefix)?;
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn, prefix)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, "")
    }

    fn init(conn: Connection, prefix: &str) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
            tables: TableNames::with_prefix(prefix),
        };
        store.create_tables()?;
        Ok(store)
    }

    #[cfg(test)]
    fn from_raw(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            tables: TableNames::with_prefix(""),
        }
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        let TableNames {
            metadata,
            records,
            updates,
        } = &self.tables;
        let conn = self.conn.lock();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {metadata} (
                 name TEXT NOT NULL,
                 protected TEXT NOT NULL DEFAULT '',
                 export INTEGER NOT NULL DEFAULT 0,
                 conf_version TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS {records} (
                 id TEXT PRIMARY KEY,
                 parent_id TEXT,
                 position INTEGER NOT NULL,
                 node_type TEXT NOT NULL,
                 name TEXT NOT NULL,
                 description TEXT,
                 icon TEXT,
                 panel TEXT,
                 hostname TEXT,
                 protocol TEXT,
                 port INTEGER,
                 username TEXT,
                 password TEXT,
                 domain TEXT,
                 credential_ref TEXT,
                 inherit_description INTEGER NOT NULL DEFAULT 1,
                 inherit_icon INTEGER NOT NULL DEFAULT 1,
                 inherit_panel INTEGER NOT NULL DEFAULT 1,
                 inherit_protocol INTEGER NOT NULL DEFAULT 1,
                 inherit_port INTEGER NOT NULL DEFAULT 1,
                 inherit_username INTEGER NOT NULL DEFAULT 1,
                 inherit_password INTEGER NOT NULL DEFAULT 1,
                 inherit_domain INTEGER NOT NULL DEFAULT 1
             );
             CREATE INDEX IF NOT EXISTS idx_{records}_parent
                 ON {records}(parent_id, position);
             CREATE TABLE IF NOT EXISTS {updates} (last_update TEXT);"
        ))?;
        conn.execute(
            &format!(
                "INSERT INTO {metadata} (name, conf_version)
                 SELECT 'Connections', ?1
                 WHERE NOT EXISTS (SELECT 1 FROM {metadata})"
            ),
            params![CURRENT_SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn metadata(&self) -> Result<StoreMetadata, FormatError> {
        let conn = self.conn.lock();
        let (name, protected, export, version): (String, String, i64, String) = conn.query_row(
            &format!(
                "SELECT name, protected, export, conf_version FROM {metadata}",
                metadata = self.tables.metadata
            ),
            [],
            |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
        )?;
        Ok(StoreMetadata {
            name,
            protected,
            export: export != 0,
            conf_version: version.parse()?,
        })
    }

    /// The sealed sentinel from the metadata row, as known ciphertext for a
    /// `PasswordAuthenticator`. `None` until the first save.
    pub fn protected_blob(&self) -> Result<Option<CipherBlob>, FormatError> {
        let metadata = self.metadata()?;
        if metadata.protected.is_empty() {
            return Ok(None);
        }
        Ok(Some(CipherBlob::from_base64(&metadata.protected)?))
    }

    /// Replace the stored tree inside a single transaction. The save filter
    /// nulls excluded fields; they leave no value behind, not even an empty
    /// string.
    pub fn save_tree(
        &self,
        tree: &RecordTree,
        filter: &SaveFilter,
        provider: &CryptoProvider,
        user_password: Option<&str>,
    ) -> Result<(), FormatError> {
        let (protection, key) = match user_password {
            Some(password) => (Protection::UserPassword, password),
            None => (Protection::LegacyDefault, LEGACY_PASSPHRASE),
        };
        let protected = provider.seal_sentinel(protection, key)?.to_base64();

        let TableNames {
            metadata,
            records,
            updates,
        } = self.tables.clone();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(&format!("DELETE FROM {records}"), [])?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {records} (
                     id, parent_id, position, node_type, name,
                     description, icon, panel, hostname, protocol, port,
                     username, password, domain, credential_ref,
                     inherit_description, inherit_icon, inherit_panel,
                     inherit_protocol, inherit_port, inherit_username,
                     inherit_password, inherit_domain
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                           ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
            ))?;

            let mut position = 0i64;
            for root in tree.roots() {
                let mut nodes = vec![root];
                nodes.extend(tree.descendants(&root.id));
                for node in nodes {
                    let props = &node.properties;
                    let flags = &node.flags;
                    let username = filter
                        .should_include(SensitiveField::Username)
                        .then(|| props.username.as_str());
                    let password = filter
                        .should_include(SensitiveField::Password)
                        .then(|| props.password.as_str());
                    let domain = filter
                        .should_include(SensitiveField::Domain)
                        .then(|| props.domain.as_str());

                    insert.execute(params![
                        node.id,
                        node.parent_id,
                        position,
                        node.kind.as_str(),
                        node.name,
                        props.description,
                        props.icon,
                        props.panel,
                        props.hostname,
                        props.protocol.as_str(),
                        props.port,
                        username,
                        password,
                        domain,
                        props.credential_ref,
                        flags.inherits(InheritedProperty::Description),
                        flags.inherits(InheritedProperty::Icon),
                        flags.inherits(InheritedProperty::Panel),
                        flags.inherits(InheritedProperty::Protocol),
                        flags.inherits(InheritedProperty::Port),
                        flags.inherits(InheritedProperty::Username),
                        flags.inherits(InheritedProperty::Password),
                        flags.inherits(InheritedProperty::Domain),
                    ])?;
                    position += 1;
                }
            }
        }

        tx.execute(
            &format!("UPDATE {metadata} SET protected = ?1, conf_version = ?2"),
            params![protected, CURRENT_SCHEMA_VERSION.to_string()],
        )?;
        tx.execute(&format!("DELETE FROM {updates}"), [])?;
        tx.execute(
            &format!("INSERT INTO {updates} (last_update) VALUES (?1)"),
            params![Utc::now().to_rfc3339()],
        )?;

        tx.commit()?;
        tracing::debug!(nodes = tree.len(), "Saved record tree to relational store");
        Ok(())
    }

    /// Load the stored tree, first bringing an older schema up to date
    /// through the transactional upgrader chain. A store written by a newer
    /// build is rejected, not guessed at.
    pub fn load_tree(&self) -> Result<RecordTree, FormatError> {
        // Version tracking is local to this call.
        let version = self.metadata()?.conf_version;
        if version > CURRENT_SCHEMA_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        if version < CURRENT_SCHEMA_VERSION {
            let mut conn = self.conn.lock();
            migrate::sql::upgrade(&mut conn, &self.tables, version)?;
        }

        struct Row {
            id: String,
            parent_id: Option<String>,
            kind: NodeKind,
            name: String,
            properties: ConnectionProperties,
            flags: InheritanceFlags,
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, parent_id, node_type, name,
                    description, icon, panel, hostname, protocol, port,
                    username, password, domain, credential_ref,
                    inherit_description, inherit_icon, inherit_panel,
                    inherit_protocol, inherit_port, inherit_username,
                    inherit_password, inherit_domain
             FROM {records} ORDER BY position ASC",
            records = self.tables.records
        ))?;

        let rows: Vec<Row> = stmt
            .query_map([], |row| {
                let protocol = row
                    .get::<_, Option<String>>(8)?
                    .as_deref()
                    .and_then(Protocol::parse)
                    .unwrap_or_default();
                let mut flags = InheritanceFlags::default();
                for (offset, prop) in InheritedProperty::ALL.iter().enumerate() {
                    flags.set(*prop, row.get::<_, i64>(14 + offset)? != 0);
                }
                Ok(Row {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    kind: row
                        .get::<_, String>(2)
                        .map(|k| NodeKind::parse(&k).unwrap_or(NodeKind::Connection))?,
                    name: row.get(3)?,
                    properties: ConnectionProperties {
                        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        icon: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        panel: row
                            .get::<_, Option<String>>(6)?
                            .filter(|p| !p.is_empty())
                            .unwrap_or_else(|| "General".to_string()),
                        hostname: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                        protocol,
                        port: row
                            .get::<_, Option<i64>>(9)?
                            .and_then(|p| u16::try_from(p).ok())
                            .unwrap_or_else(|| protocol.default_port()),
                        username: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                        password: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                        domain: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                        credential_ref: row
                            .get::<_, Option<String>>(13)?
                            .filter(|c| !c.is_empty()),
                    },
                    flags,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let mut tree = RecordTree::new();
        let mut remaining = rows;
        while !remaining.is_empty() {
            let mut next = Vec::new();
            let mut progressed = false;
            for row in remaining {
                let attachable = match &row.parent_id {
                    None => true,
                    Some(parent) => tree.node(parent).is_some(),
                };
                if attachable {
                    tree.insert_node(
                        row.parent_id.as_deref(),
                        row.id,
                        row.kind,
                        row.name,
                        row.properties,
                        row.flags,
                    )?;
                    progressed = true;
                } else {
                    next.push(row);
                }
            }
            if !progressed {
                for row in next {
                    tracing::warn!(id = %row.id, "Row references unknown parent; attaching as root");
                    tree.insert_node(None, row.id, row.kind, row.name, row.properties, row.flags)?;
                }
                break;
            }
            remaining = next;
        }
        Ok(tree)
    }

    /// Timestamp of the last store mutation, for the change-detection
    /// contract. `None` when the store has never been written.
    pub fn last_update(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock();
        let stamp: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT last_update FROM {updates} LIMIT 1",
                    updates = self.tables.updates
                ),
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(stamp
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}
