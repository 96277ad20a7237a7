//! Transactional upgrade steps for the relational store.
//!
//! Steps run against either a caller-supplied transaction (never committed
//! here) or a step-owned one (committed on success, rolled back on any
//! failure, leaving the store at its prior version). Each step guards with
//! `can_upgrade`, so re-running the chain against a current store is a
//! no-op.

use rusqlite::{params, Connection, Transaction};

use super::{SchemaVersion, UpgradeError, CURRENT_SCHEMA_VERSION};

/// Resolved table names. Constructed only by the store, which validates any
/// caller-supplied prefix before interpolation into SQL text; values are
/// always bound via parameters.
#[derive(Debug, Clone)]
pub struct TableNames {
    pub metadata: String,
    pub records: String,
    pub updates: String,
}

impl TableNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            metadata: format!("{prefix}metadata"),
            records: format!("{prefix}records"),
            updates: format!("{prefix}updates"),
        }
    }
}

trait SqlUpgradeStep {
    fn target(&self) -> SchemaVersion;
    fn can_upgrade(&self, from: SchemaVersion) -> bool;
    fn apply(&self, tx: &Transaction<'_>, tables: &TableNames) -> Result<(), UpgradeError>;
}

/// 1.0 -> 1.1: records gained an external credential reference.
struct AddCredentialRef;

impl SqlUpgradeStep for AddCredentialRef {
    fn target(&self) -> SchemaVersion {
        SchemaVersion::new(1, 1)
    }

    fn can_upgrade(&self, from: SchemaVersion) -> bool {
        from < self.target()
    }

    fn apply(&self, tx: &Transaction<'_>, tables: &TableNames) -> Result<(), UpgradeError> {
        tx.execute_batch(&format!(
            "ALTER TABLE {records} ADD COLUMN credential_ref TEXT",
            records = tables.records
        ))?;
        Ok(())
    }
}

/// 1.1 -> 1.2: per-property inheritance columns and the updates table used
/// by change detection. Rows written before flags existed stay fully local
/// (all columns 0), mirroring the document upgrade.
struct AddInheritanceColumns;

impl SqlUpgradeStep for AddInheritanceColumns {
    fn target(&self) -> SchemaVersion {
        SchemaVersion::new(1, 2)
    }

    fn can_upgrade(&self, from: SchemaVersion) -> bool {
        from >= SchemaVersion::new(1, 1) && from < self.target()
    }

    fn apply(&self, tx: &Transaction<'_>, tables: &TableNames) -> Result<(), UpgradeError> {
        let records = &tables.records;
        tx.execute_batch(&format!(
            "ALTER TABLE {records} ADD COLUMN inherit_description INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE {records} ADD COLUMN inherit_icon INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE {records} ADD COLUMN inherit_panel INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE {records} ADD COLUMN inherit_protocol INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE {records} ADD COLUMN inherit_port INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE {records} ADD COLUMN inherit_username INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE {records} ADD COLUMN inherit_password INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE {records} ADD COLUMN inherit_domain INTEGER NOT NULL DEFAULT 0;"
        ))?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {updates} (last_update TEXT)",
            updates = tables.updates
        ))?;
        Ok(())
    }
}

fn steps() -> [&'static dyn SqlUpgradeStep; 2] {
    [&AddCredentialRef, &AddInheritanceColumns]
}

/// Run every applicable step inside a caller-supplied transaction. The
/// transaction is *not* committed here; the caller decides. The version
/// marker row is advanced alongside the DDL so a rollback reverts both.
pub fn upgrade_within(
    tx: &Transaction<'_>,
    tables: &TableNames,
    from: SchemaVersion,
) -> Result<SchemaVersion, UpgradeError> {
    if from > CURRENT_SCHEMA_VERSION {
        return Err(UpgradeError::UnsupportedVersion(from));
    }

    // Per-call version tracking: a local, never a shared field.
    let mut version = from;
    for step in steps() {
        if step.can_upgrade(version) {
            tracing::info!(%version, target = %step.target(), "Upgrading relational schema");
            step.apply(tx, tables)?;
            version = step.target();
            tx.execute(
                &format!(
                    "UPDATE {metadata} SET conf_version = ?1",
                    metadata = tables.metadata
                ),
                params![version.to_string()],
            )?;
        }
    }
    Ok(version)
}

/// Run the chain in a transaction owned by this call: committed on success,
/// rolled back (and the error surfaced) on any failure.
pub fn upgrade(
    conn: &mut Connection,
    tables: &TableNames,
    from: SchemaVersion,
) -> Result<SchemaVersion, UpgradeError> {
    let tx = conn.transaction()?;
    let version = upgrade_within(&tx, tables, from)?;
    tx.commit()?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A store as version 1.0 wrote it.
    fn v10_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE metadata (
                 name TEXT NOT NULL,
                 protected TEXT NOT NULL DEFAULT '',
                 export INTEGER NOT NULL DEFAULT 0,
                 conf_version TEXT NOT NULL
             );
             CREATE TABLE records (
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
                 domain TEXT
             );
             INSERT INTO metadata (name, conf_version) VALUES ('Connections', '1.0');",
        )
        .unwrap();
        conn
    }

    fn stored_version(conn: &Connection) -> SchemaVersion {
        conn.query_row("SELECT conf_version FROM metadata", [], |row| {
            row.get::<_, String>(0)
        })
        .unwrap()
        .parse()
        .unwrap()
    }

    #[test]
    fn test_upgrade_from_10_reaches_current() {
        let mut conn = v10_store();
        let tables = TableNames::with_prefix("");
        let version = upgrade(&mut conn, &tables, SchemaVersion::new(1, 0)).unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        assert_eq!(stored_version(&conn), CURRENT_SCHEMA_VERSION);

        // New columns exist and accept writes.
        conn.execute(
            "INSERT INTO records (id, position, node_type, name, credential_ref, inherit_username)
             VALUES ('x', 0, 'Connection', 'n', 'cred-1', 1)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_upgrade_is_idempotent() {
        let mut conn = v10_store();
        let tables = TableNames::with_prefix("");
        upgrade(&mut conn, &tables, SchemaVersion::new(1, 0)).unwrap();
        // Second run: every can_upgrade guard says no; nothing changes.
        let version = upgrade(&mut conn, &tables, CURRENT_SCHEMA_VERSION).unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        assert_eq!(stored_version(&conn), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_failed_step_rolls_back_version() {
        let mut conn = v10_store();
        // Sabotage: records table missing entirely makes the first step fail.
        conn.execute_batch("DROP TABLE records").unwrap();
        let tables = TableNames::with_prefix("");
        let result = upgrade(&mut conn, &tables, SchemaVersion::new(1, 0));
        assert!(result.is_err());
        // The transaction rolled back; the stored version is untouched.
        assert_eq!(stored_version(&conn), SchemaVersion::new(1, 0));
    }

    #[test]
    fn test_caller_supplied_transaction_not_committed() {
        let mut conn = v10_store();
        let tables = TableNames::with_prefix("");
        {
            let tx = conn.transaction().unwrap();
            let version = upgrade_within(&tx, &tables, SchemaVersion::new(1, 0)).unwrap();
            assert_eq!(version, CURRENT_SCHEMA_VERSION);
            // Dropped without commit.
        }
        assert_eq!(stored_version(&conn), SchemaVersion::new(1, 0));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut conn = v10_store();
        let tables = TableNames::with_prefix("");
        let result = upgrade(&mut conn, &tables, SchemaVersion::new(3, 0));
        assert!(matches!(result, Err(UpgradeError::UnsupportedVersion(_))));
    }
}
