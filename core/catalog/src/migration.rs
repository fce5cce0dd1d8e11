use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Schema version written by this build.
pub const SCHEMA_VERSION: SchemaVersion = SchemaVersion(0, 4, 0);

/// `major.minor.patch`, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion(pub u32, pub u32, pub u32);

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid schema version: {0:?}")]
pub struct InvalidVersion(pub String);

impl FromStr for SchemaVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| InvalidVersion(s.to_string()))?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(SchemaVersion(*major, *minor, *patch)),
            _ => Err(InvalidVersion(s.to_string())),
        }
    }
}

/// Upgrade statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStats {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub steps_applied: usize,
}

struct Upgrade {
    version: SchemaVersion,
    summary: &'static str,
    apply: fn(&Connection) -> Result<()>,
}

/// Ordered oldest first. Each step brings a database written by any earlier
/// version up to the shape `version` introduced.
const UPGRADES: &[Upgrade] = &[
    Upgrade {
        version: SchemaVersion(0, 1, 1),
        summary: "icon/description columns and version bookkeeping",
        apply: upgrade_0_1_1,
    },
    Upgrade {
        version: SchemaVersion(0, 3, 0),
        summary: "replace is_dir flag with path kind",
        apply: upgrade_0_3_0,
    },
    Upgrade {
        version: SchemaVersion(0, 3, 3),
        summary: "pinned tags",
        apply: upgrade_0_3_3,
    },
    Upgrade {
        version: SchemaVersion(0, 4, 0),
        summary: "tag and file visit times",
        apply: upgrade_0_4_0,
    },
];

// ============================================================================
// Schema
// ============================================================================

const FILES_TABLE: &str = "CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    path TEXT NOT NULL,
    ctime TEXT NOT NULL,
    vtime TEXT NOT NULL,
    icon TEXT,
    description TEXT NOT NULL DEFAULT ''
)";

const FILES_INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS files_name ON files(name);
    CREATE INDEX IF NOT EXISTS files_ctime ON files(ctime);
    CREATE INDEX IF NOT EXISTS files_vtime ON files(vtime);";

const INFOS_TABLE: &str = "CREATE TABLE IF NOT EXISTS infos (
    key TEXT PRIMARY KEY,
    value TEXT
)";

const PIN_TABLE: &str = "CREATE TABLE IF NOT EXISTS pin_label (
    label TEXT PRIMARY KEY,
    icon TEXT,
    rank INTEGER NOT NULL
)";

const LABELS_INDEX: &str = "CREATE INDEX IF NOT EXISTS file_labels_label ON file_labels(label)";

const VISIT_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS tag_visit (
        tag TEXT PRIMARY KEY,
        time TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS file_visit (
        file_id INTEGER PRIMARY KEY,
        time TEXT NOT NULL
    );";

/// Create every table at the current version on an empty database.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(FILES_TABLE, [])?;
    conn.execute_batch(FILES_INDEXES)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS file_labels (
            label TEXT NOT NULL,
            file_id INTEGER NOT NULL,
            PRIMARY KEY (file_id, label)
        )",
        [],
    )?;
    conn.execute(INFOS_TABLE, [])?;
    ensure_side_tables(conn)?;

    write_version(conn, SCHEMA_VERSION)?;
    debug!("Created schema {}", SCHEMA_VERSION);
    Ok(())
}

// ============================================================================
// Upgrades
// ============================================================================

/// Tables and indexes every catalog needs whatever version wrote it. Catalogs
/// from other writers may carry a newer version yet keep visits elsewhere.
fn ensure_side_tables(conn: &Connection) -> Result<()> {
    conn.execute(LABELS_INDEX, [])?;
    conn.execute(PIN_TABLE, [])?;
    conn.execute_batch(VISIT_TABLES)?;
    Ok(())
}

/// Bring an existing database up to [`SCHEMA_VERSION`].
///
/// A database without version bookkeeping counts as `0.0.0`. Every step newer
/// than the stored version runs in its own transaction, and the stored version
/// moves forward after each one. A stored version newer than ours is kept.
pub fn upgrade(conn: &Connection) -> Result<MigrationStats> {
    let from = stored_version(conn)?;
    let mut stats = MigrationStats {
        from,
        to: from,
        steps_applied: 0,
    };

    for step in UPGRADES.iter().filter(|step| step.version > from) {
        info!("Upgrading database to {}: {}", step.version, step.summary);

        let tx = conn.unchecked_transaction()?;
        (step.apply)(&tx).with_context(|| format!("upgrade to {} failed", step.version))?;
        write_version(&tx, step.version)?;
        tx.commit()?;

        stats.to = step.version;
        stats.steps_applied += 1;
    }

    if stats.to < SCHEMA_VERSION {
        write_version(conn, SCHEMA_VERSION)?;
        stats.to = SCHEMA_VERSION;
    }
    ensure_side_tables(conn)?;

    if stats.steps_applied > 0 {
        info!(
            "Database upgraded from {} to {} ({} steps)",
            stats.from, stats.to, stats.steps_applied
        );
    }
    Ok(stats)
}

fn upgrade_0_1_1(conn: &Connection) -> Result<()> {
    if !has_column(conn, "files", "icon")? {
        conn.execute("ALTER TABLE files ADD COLUMN icon TEXT", [])?;
    }
    if !has_column(conn, "files", "description")? {
        conn.execute(
            "ALTER TABLE files ADD COLUMN description TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    conn.execute(INFOS_TABLE, [])?;
    Ok(())
}

fn upgrade_0_3_0(conn: &Connection) -> Result<()> {
    if !has_column(conn, "files", "is_dir")? {
        return Ok(());
    }

    conn.execute_batch(
        "ALTER TABLE files RENAME TO files_legacy;
         DROP INDEX IF EXISTS files_name;
         DROP INDEX IF EXISTS files_ctime;
         DROP INDEX IF EXISTS files_vtime;",
    )?;
    conn.execute(FILES_TABLE, [])?;

    let migrated = conn.execute(
        "INSERT INTO files (id, name, type, path, ctime, vtime, icon, description)
         SELECT id, name,
                CASE WHEN is_dir THEN 'folder' ELSE 'file' END,
                path, ctime, vtime, icon, COALESCE(description, '')
         FROM files_legacy",
        [],
    )?;

    conn.execute("DROP TABLE files_legacy", [])?;
    conn.execute_batch(FILES_INDEXES)?;

    debug!("Converted {} legacy file rows", migrated);
    Ok(())
}

fn upgrade_0_3_3(conn: &Connection) -> Result<()> {
    conn.execute(PIN_TABLE, [])?;
    Ok(())
}

fn upgrade_0_4_0(conn: &Connection) -> Result<()> {
    conn.execute_batch(VISIT_TABLES)?;
    Ok(())
}

// ============================================================================
// Bookkeeping
// ============================================================================

pub fn stored_version(conn: &Connection) -> Result<SchemaVersion> {
    if !has_table(conn, "infos")? {
        return Ok(SchemaVersion(0, 0, 0));
    }

    let raw: Option<Option<String>> = conn
        .query_row("SELECT value FROM infos WHERE key = 'version'", [], |row| {
            row.get(0)
        })
        .optional()?;

    match raw.flatten() {
        Some(value) => Ok(value.parse::<SchemaVersion>()?),
        None => Ok(SchemaVersion(0, 0, 0)),
    }
}

fn write_version(conn: &Connection, version: SchemaVersion) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO infos (key, value) VALUES ('version', ?1)",
        params![version.to_string()],
    )?;
    Ok(())
}

pub fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Check if a column exists in a table
pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let query = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&query)?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns.iter().any(|c| c == column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                path TEXT,
                is_dir BOOLEAN,
                ctime TEXT,
                vtime TEXT
            );
            CREATE TABLE file_labels (
                label TEXT,
                file_id INTEGER,
                PRIMARY KEY (file_id, label)
            );
            INSERT INTO files (name, path, is_dir, ctime, vtime)
                VALUES ('notes', '/home/me/notes', 1, '2020-06-15 12:30:30.123456', '2020-06-15 12:30:30.123456');
            INSERT INTO files (name, path, is_dir, ctime, vtime)
                VALUES ('todo.txt', '/home/me/todo.txt', 0, '2020-06-15 12:30:30', '2020-06-15 12:30:30');
            INSERT INTO file_labels VALUES ('work/notes', 1);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_version_parse_and_order() {
        let v: SchemaVersion = "0.3.3".parse().unwrap();
        assert_eq!(v, SchemaVersion(0, 3, 3));
        assert!(SchemaVersion(0, 3, 10) > v);
        assert!(SchemaVersion(0, 10, 0) > SchemaVersion(0, 9, 9));
        assert_eq!(v.to_string(), "0.3.3");

        assert!("0.3".parse::<SchemaVersion>().is_err());
        assert!("a.b.c".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_fresh_schema_is_current() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();

        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);
        for table in ["files", "file_labels", "pin_label", "tag_visit", "file_visit", "infos"] {
            assert!(has_table(&conn, table).unwrap(), "missing {}", table);
        }

        let stats = upgrade(&conn).unwrap();
        assert_eq!(stats.steps_applied, 0);
    }

    #[test]
    fn test_legacy_upgrade() {
        let conn = legacy_connection();
        assert_eq!(stored_version(&conn).unwrap(), SchemaVersion(0, 0, 0));

        let stats = upgrade(&conn).unwrap();
        assert_eq!(stats.from, SchemaVersion(0, 0, 0));
        assert_eq!(stats.to, SCHEMA_VERSION);
        assert_eq!(stats.steps_applied, UPGRADES.len());

        assert!(!has_column(&conn, "files", "is_dir").unwrap());
        assert!(has_column(&conn, "files", "type").unwrap());
        assert!(has_table(&conn, "pin_label").unwrap());
        assert!(has_table(&conn, "tag_visit").unwrap());

        let kinds: Vec<String> = conn
            .prepare("SELECT type FROM files ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(kinds, vec!["folder", "file"]);

        let labels: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_labels", [], |row| row.get(0))
            .unwrap();
        assert_eq!(labels, 1);

        let label_index: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'file_labels_label'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(label_index, 1);
    }

    #[test]
    fn test_newer_version_still_gets_visit_tables() {
        let conn = legacy_connection();
        upgrade_0_1_1(&conn).unwrap();
        upgrade_0_3_0(&conn).unwrap();
        write_version(&conn, SchemaVersion(0, 4, 6)).unwrap();

        let stats = upgrade(&conn).unwrap();
        assert_eq!(stats.steps_applied, 0);
        assert_eq!(stored_version(&conn).unwrap(), SchemaVersion(0, 4, 6));
        for table in ["pin_label", "tag_visit", "file_visit"] {
            assert!(has_table(&conn, table).unwrap(), "missing {}", table);
        }
    }

    #[test]
    fn test_upgrade_skips_applied_steps() {
        let conn = legacy_connection();
        upgrade_0_1_1(&conn).unwrap();
        upgrade_0_3_0(&conn).unwrap();
        write_version(&conn, SchemaVersion(0, 3, 0)).unwrap();

        let stats = upgrade(&conn).unwrap();
        assert_eq!(stats.from, SchemaVersion(0, 3, 0));
        assert_eq!(stats.steps_applied, 2);
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
