use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use labeled_files_hierarchy::{compose, LabelIndex};
use labeled_files_schemas::{FileId, FileRecord, PathKind, PinTag, TagOccurrence};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::migration::{self, SchemaVersion};

/// File name of the catalog database inside a workspace.
pub const DB_FILE_NAME: &str = "LABELED_FILES.sqlite3";

const FILE_COLUMNS: &str = "id, name, type, path, ctime, vtime, icon, description";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the catalog and bring its schema up to date
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self::from_connection(conn)?;

        info!("Database initialized at {}", path.as_ref().display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        if migration::has_table(&self.conn, "files")? {
            migration::upgrade(&self.conn)?;
        } else {
            migration::create_schema(&self.conn)?;
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<SchemaVersion> {
        migration::stored_version(&self.conn)
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Insert a record with its tags, returning the assigned id
    pub fn insert_file(&self, file: &FileRecord) -> Result<FileId> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO files (name, type, path, ctime, vtime, icon, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file.name,
                file.kind.as_str(),
                file.path,
                format_timestamp(&file.ctime),
                format_timestamp(&file.vtime),
                file.icon,
                file.description,
            ],
        )?;
        let id = FileId(tx.last_insert_rowid());

        let tags: BTreeSet<&String> = file.tags.iter().collect();
        for tag in &tags {
            tx.execute(
                "INSERT OR IGNORE INTO file_labels (label, file_id) VALUES (?1, ?2)",
                params![tag, id.0],
            )?;
        }
        tx.commit()?;

        info!("Inserted file {} '{}' with {} tags", id, file.name, tags.len());
        Ok(id)
    }

    pub fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let query = format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS);
        let file = self
            .conn
            .query_row(&query, params![id.0], row_to_file)
            .optional()?;

        match file {
            Some(mut file) => {
                file.tags = self.file_tags(id)?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Overwrite a stored record's fields and tags. Visit times are left alone.
    pub fn update_file(&self, file: &FileRecord) -> Result<()> {
        let id = file
            .id
            .ok_or_else(|| anyhow!("cannot update '{}': record has no id", file.name))?;

        let updated = self.conn.execute(
            "UPDATE files SET name = ?1, type = ?2, path = ?3, icon = ?4, description = ?5
             WHERE id = ?6",
            params![
                file.name,
                file.kind.as_str(),
                file.path,
                file.icon,
                file.description,
                id.0
            ],
        )?;
        if updated == 0 {
            bail!("file {} not found", id);
        }

        self.set_file_tags(id, &file.tags)
    }

    /// Delete records together with their tags and visit history
    pub fn delete_files(&self, ids: &[FileId]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        for id in ids {
            tx.execute("DELETE FROM file_labels WHERE file_id = ?1", params![id.0])?;
            tx.execute("DELETE FROM file_visit WHERE file_id = ?1", params![id.0])?;
            deleted += tx.execute("DELETE FROM files WHERE id = ?1", params![id.0])?;
        }
        tx.commit()?;

        info!("Deleted {} files", deleted);
        Ok(deleted)
    }

    pub fn count_files(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn file_tags(&self, id: FileId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM file_labels WHERE file_id = ?1 ORDER BY label")?;
        let tags = stmt
            .query_map(params![id.0], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    /// Replace a record's tags, touching only the labels that changed
    pub fn set_file_tags(&self, id: FileId, tags: &[String]) -> Result<()> {
        let current: BTreeSet<String> = self.file_tags(id)?.into_iter().collect();
        let wanted: BTreeSet<String> = tags.iter().cloned().collect();

        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        for tag in current.difference(&wanted) {
            removed += tx.execute(
                "DELETE FROM file_labels WHERE file_id = ?1 AND label = ?2",
                params![id.0, tag],
            )?;
        }
        let mut added = 0;
        for tag in wanted.difference(&current) {
            added += tx.execute(
                "INSERT INTO file_labels (label, file_id) VALUES (?1, ?2)",
                params![tag, id.0],
            )?;
        }
        tx.commit()?;

        debug!("Retagged file {}: +{} -{}", id, added, removed);
        Ok(())
    }

    pub fn add_file_tags(&self, id: FileId, tags: &[String]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut added = 0;
        for tag in tags {
            added += tx.execute(
                "INSERT OR IGNORE INTO file_labels (label, file_id) VALUES (?1, ?2)",
                params![tag, id.0],
            )?;
        }
        tx.commit()?;
        Ok(added)
    }

    pub fn remove_file_tags(&self, id: FileId, tags: &[String]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        for tag in tags {
            removed += tx.execute(
                "DELETE FROM file_labels WHERE file_id = ?1 AND label = ?2",
                params![id.0, tag],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Every distinct label in use, sorted
    pub fn all_labels(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT label FROM file_labels ORDER BY label")?;
        let labels = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(labels)
    }

    /// One occurrence per distinct label: how many records carry it and the
    /// later of its last visit and its newest record's visit.
    ///
    /// `keyword` keeps labels containing it anywhere; `under` keeps a tag and
    /// everything beneath it.
    pub fn tag_occurrences(
        &self,
        keyword: Option<&str>,
        under: Option<&str>,
    ) -> Result<Vec<TagOccurrence>> {
        let pattern = keyword.map(like_pattern);
        let mut stmt = self.conn.prepare(
            "SELECT fl.label, COUNT(*), MAX(f.vtime), MAX(tv.time)
             FROM file_labels fl
             JOIN files f ON f.id = fl.file_id
             LEFT JOIN tag_visit tv ON tv.tag = fl.label
             WHERE (?1 IS NULL OR fl.label LIKE ?1 ESCAPE '\\')
               AND (?2 IS NULL OR fl.label = ?2
                    OR substr(fl.label, 1, length(?2) + 1) = ?2 || '/')
             GROUP BY fl.label
             ORDER BY fl.label",
        )?;

        let occurrences = stmt
            .query_map(params![pattern, under], |row| {
                let file_time = parse_optional_timestamp(row.get(2)?)?;
                let tag_time = parse_optional_timestamp(row.get(3)?)?;
                let last_access = file_time
                    .max(tag_time)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

                Ok(TagOccurrence::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as u64,
                    last_access,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Loaded {} tag occurrences (keyword: {:?}, under: {:?})",
            occurrences.len(),
            keyword,
            under
        );
        Ok(occurrences)
    }

    // ========================================================================
    // Visits
    // ========================================================================

    /// Record that a file was opened. Returns false when the id is unknown.
    pub fn visit_file(&self, id: FileId) -> Result<bool> {
        let now = format_timestamp(&Utc::now());

        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE files SET vtime = ?1 WHERE id = ?2",
            params![now, id.0],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR REPLACE INTO file_visit (file_id, time) VALUES (?1, ?2)",
            params![id.0, now],
        )?;
        tx.commit()?;

        debug!("Visited file {}", id);
        Ok(true)
    }

    pub fn visit_tag(&self, tag: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tag_visit (tag, time) VALUES (?1, ?2)",
            params![tag, format_timestamp(&Utc::now())],
        )?;
        debug!("Visited tag {}", tag);
        Ok(())
    }

    pub fn file_visit_time(&self, id: FileId) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT time FROM file_visit WHERE file_id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(parse_optional_timestamp(raw)?)
    }

    pub fn tag_visit_time(&self, tag: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT time FROM tag_visit WHERE tag = ?1",
                params![tag],
                |row| row.get(0),
            )
            .optional()?;
        Ok(parse_optional_timestamp(raw)?)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Most recently visited records first
    pub fn recent_files(&self, limit: usize) -> Result<Vec<FileRecord>> {
        self.select_files(None, None, Some(limit))
    }

    pub fn files_by_ids(&self, ids: &BTreeSet<FileId>) -> Result<Vec<FileRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select_files(None, Some(ids), None)
    }

    /// Records whose name contains `keyword` and that satisfy every tag
    /// filter, most recently visited first
    pub fn search_files(
        &self,
        keyword: Option<&str>,
        filters: &[String],
        limit: usize,
    ) -> Result<Vec<FileRecord>> {
        let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());

        let files = match compose(self, filters)? {
            Some(ids) if ids.is_empty() => Vec::new(),
            Some(ids) => self.select_files(keyword, Some(&ids), Some(limit))?,
            None => self.select_files(keyword, None, Some(limit))?,
        };

        debug!(
            "Search (keyword: {:?}, filters: {:?}) matched {} files",
            keyword,
            filters,
            files.len()
        );
        Ok(files)
    }

    fn select_files(
        &self,
        keyword: Option<&str>,
        ids: Option<&BTreeSet<FileId>>,
        limit: Option<usize>,
    ) -> Result<Vec<FileRecord>> {
        let id_clause = match ids {
            Some(ids) => format!(
                "AND id IN ({})",
                ids.iter()
                    .map(|id| id.0.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            None => String::new(),
        };
        let query = format!(
            "SELECT {} FROM files
             WHERE (?1 IS NULL OR name LIKE ?1 ESCAPE '\\') {}
             ORDER BY vtime DESC, id DESC
             LIMIT ?2",
            FILE_COLUMNS, id_clause
        );

        let pattern = keyword.map(like_pattern);
        // A negative LIMIT means no limit in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = self.conn.prepare(&query)?;
        let mut files = stmt
            .query_map(params![pattern, limit], row_to_file)?
            .collect::<Result<Vec<_>, _>>()?;

        for file in &mut files {
            if let Some(id) = file.id {
                file.tags = self.file_tags(id)?;
            }
        }
        Ok(files)
    }

    // ========================================================================
    // Pinned Tags
    // ========================================================================

    pub fn pin_tags(&self) -> Result<Vec<PinTag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label, icon, rank FROM pin_label ORDER BY rank, label")?;
        let pins = stmt
            .query_map([], |row| {
                Ok(PinTag {
                    tag: row.get(0)?,
                    icon: row.get(1)?,
                    rank: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pins)
    }

    /// Append a tag to the pin bar. Pinning an already pinned tag keeps its
    /// place.
    pub fn pin_tag(&self, tag: &str, icon: Option<&str>) -> Result<PinTag> {
        let existing = self
            .conn
            .query_row(
                "SELECT label, icon, rank FROM pin_label WHERE label = ?1",
                params![tag],
                |row| {
                    Ok(PinTag {
                        tag: row.get(0)?,
                        icon: row.get(1)?,
                        rank: row.get(2)?,
                    })
                },
            )
            .optional()?;
        if let Some(pin) = existing {
            return Ok(pin);
        }

        let max_rank: Option<i64> =
            self.conn
                .query_row("SELECT MAX(rank) FROM pin_label", [], |row| row.get(0))?;
        let rank = max_rank.map(|r| r + 1).unwrap_or(1);

        self.conn.execute(
            "INSERT INTO pin_label (label, icon, rank) VALUES (?1, ?2, ?3)",
            params![tag, icon, rank],
        )?;

        info!("Pinned tag {} at rank {}", tag, rank);
        Ok(PinTag {
            tag: tag.to_string(),
            icon: icon.map(str::to_string),
            rank,
        })
    }

    pub fn unpin_tag(&self, tag: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM pin_label WHERE label = ?1", params![tag])?;
        Ok(removed > 0)
    }
}

impl LabelIndex for Database {
    type Error = anyhow::Error;

    fn files_matching(&self, filter: &str) -> Result<BTreeSet<FileId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT file_id FROM file_labels
             WHERE label = ?1 OR substr(label, 1, length(?1) + 1) = ?1 || '/'",
        )?;
        let ids = stmt
            .query_map(params![filter], |row| Ok(FileId(row.get(0)?)))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }
}

fn row_to_file(row: &Row) -> rusqlite::Result<FileRecord> {
    let kind_raw: String = row.get(2)?;
    let kind: PathKind = kind_raw
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(FileRecord {
        id: Some(FileId(row.get(0)?)),
        name: row.get(1)?,
        kind,
        path: row.get(3)?,
        tags: Vec::new(),
        ctime: parse_timestamp(&row.get::<_, String>(4)?)?,
        vtime: parse_timestamp(&row.get::<_, String>(5)?)?,
        icon: row.get(6)?,
        description: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

/// Fixed-width RFC 3339, so stored times sort correctly as text.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 as well as the naive `YYYY-MM-DD HH:MM:SS[.ffffff]`
/// layout older catalogs stored.
fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

/// `%keyword%` with LIKE wildcards in the keyword escaped.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
