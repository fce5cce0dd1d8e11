use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use labeled_files_hierarchy::{
    aggregate, compose, format_elapsed, occurrences_from_file_tags, render, strip_filtered_tags,
    tag_matches, DisplayNode, OutlineStyle, RenderOptions, TreeTextRenderer,
};
use labeled_files_schemas::{EditorTarget, FileId, FileRecord, PathKind, TagOccurrence};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::Database;
use crate::intake::{normalize_tags, IntakeRequest, RecordIntake};

/// Listing size when no keyword or tag narrows a search.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// What the tag tree should cover and how it is laid out.
#[derive(Debug, Clone, Default)]
pub struct TreeQuery {
    /// Keep labels containing this text
    pub keyword: Option<String>,
    /// Keep one tag and everything beneath it
    pub under: Option<String>,
    /// Only count tags of records matching every filter
    pub filters: Vec<String>,
    pub threshold: Option<usize>,
    pub hide_empty: bool,
}

/// An open catalog plus the settings that shape its output. Every command
/// returns the text to print.
pub struct Session {
    pub db: Database,
    pub config: Config,
}

impl Session {
    pub fn open<P: AsRef<Path>>(db_path: P, config: Config) -> Result<Self> {
        let db = Database::new(db_path)?;
        Ok(Self { db, config })
    }

    pub fn new(db: Database, config: Config) -> Self {
        Self { db, config }
    }

    // ========================================================================
    // Records
    // ========================================================================

    pub fn add(&self, request: IntakeRequest) -> Result<String> {
        let record = RecordIntake::new(&self.config).build(request)?;
        let id = self.db.insert_file(&record)?;
        Ok(format!("Added {}: {} ({})", id, record.name, record.describe()))
    }

    pub fn show(&self, id: FileId, now: DateTime<Utc>) -> Result<String> {
        let file = self.require_file(id)?;

        let mut lines = vec![
            format!("id:          {}", id),
            format!("name:        {}", file.name),
            format!("kind:        {}", file.kind),
            format!("path:        {}", file.path),
            format!("tags:        {}", file.tags.join(", ")),
        ];
        if !file.description.is_empty() {
            lines.push(format!("description: {}", file.description));
        }
        lines.push(format!("created:     {}", file.ctime.format("%Y-%m-%d %H:%M")));
        lines.push(format!(
            "visited:     {} ago",
            format_elapsed(file.vtime, now)
        ));

        if file.kind == PathKind::Vscode {
            if let Ok(target) = file.path.parse::<EditorTarget>() {
                lines.push(format!(
                    "open with:   code {} {}",
                    target.kind.uri_flag(),
                    target.uri()
                ));
            }
        }
        Ok(lines.join("\n"))
    }

    /// Record that a file was opened, along with each of its tags
    pub fn visit(&self, id: FileId) -> Result<String> {
        if !self.db.visit_file(id)? {
            bail!("file {} not found", id);
        }
        let tags = self.db.file_tags(id)?;
        for tag in &tags {
            self.db.visit_tag(tag)?;
        }

        info!("Visited file {} and {} tags", id, tags.len());
        let file = self.require_file(id)?;
        Ok(file.path)
    }

    pub fn remove(&self, ids: &[FileId]) -> Result<String> {
        let deleted = self.db.delete_files(ids)?;
        Ok(format!("Removed {} files", deleted))
    }

    pub fn tag(&self, id: FileId, tags: &[String]) -> Result<String> {
        self.require_file(id)?;
        let added = self.db.add_file_tags(id, &normalize_tags(tags))?;
        Ok(format!(
            "Added {} tags to {}: {}",
            added,
            id,
            self.db.file_tags(id)?.join(", ")
        ))
    }

    pub fn untag(&self, id: FileId, tags: &[String]) -> Result<String> {
        self.require_file(id)?;
        let removed = self.db.remove_file_tags(id, &normalize_tags(tags))?;
        Ok(format!(
            "Removed {} tags from {}: {}",
            removed,
            id,
            self.db.file_tags(id)?.join(", ")
        ))
    }

    fn require_file(&self, id: FileId) -> Result<FileRecord> {
        match self.db.get_file(id)? {
            Some(file) => Ok(file),
            None => bail!("file {} not found", id),
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    pub fn search(
        &self,
        keyword: Option<&str>,
        filters: &[String],
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let filters = normalize_tags(filters);
        for filter in &filters {
            self.db.visit_tag(filter)?;
        }

        let files = self.db.search_files(keyword, &filters, limit)?;
        if files.is_empty() {
            return Ok("No files found".to_string());
        }

        let lines: Vec<String> = files
            .iter()
            .map(|file| {
                let tags = if self.config.hide_search_tag_in_result {
                    strip_filtered_tags(&file.tags, &filters)
                } else {
                    file.tags.clone()
                };
                format!(
                    "{:>5}  {}  [{}]  {}  ({} ago)",
                    file.id.map(|id| id.to_string()).unwrap_or_default(),
                    file.name,
                    tags.join(", "),
                    file.describe(),
                    format_elapsed(file.vtime, now)
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }

    // ========================================================================
    // Tag Tree
    // ========================================================================

    pub fn tag_tree(&self, query: &TreeQuery) -> Result<Vec<DisplayNode>> {
        let filters = normalize_tags(&query.filters);
        let keyword = query
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let under = query.under.as_deref().filter(|u| !u.is_empty());

        let occurrences = match compose(&self.db, &filters)? {
            None => self.db.tag_occurrences(keyword, under)?,
            Some(ids) => self.filtered_occurrences(&ids, keyword, under)?,
        };

        let options = RenderOptions {
            top_level_expand_threshold: query
                .threshold
                .unwrap_or(self.config.tree_expand_threshold),
            hide_empty: query.hide_empty,
        };
        let rows = render(&aggregate(&occurrences), &options);

        debug!(
            "Tag tree from {} labels has {} top-level rows",
            occurrences.len(),
            rows.len()
        );
        Ok(rows)
    }

    /// Tag occurrences counted over a filtered set of records only
    fn filtered_occurrences(
        &self,
        ids: &std::collections::BTreeSet<FileId>,
        keyword: Option<&str>,
        under: Option<&str>,
    ) -> Result<Vec<TagOccurrence>> {
        let files = self.db.files_by_ids(ids)?;
        let needle = keyword.map(str::to_lowercase);

        let mut occurrences = Vec::new();
        for mut occurrence in occurrences_from_file_tags(files.iter().map(|f| (&f.tags, f.vtime))) {
            if let Some(needle) = &needle {
                if !occurrence.label.to_lowercase().contains(needle.as_str()) {
                    continue;
                }
            }
            if let Some(under) = under {
                if !tag_matches(&occurrence.label, under) {
                    continue;
                }
            }
            if let Some(visited) = self.db.tag_visit_time(&occurrence.label)? {
                occurrence.last_access = occurrence.last_access.max(visited);
            }
            occurrences.push(occurrence);
        }
        Ok(occurrences)
    }

    pub fn tree_text(&self, query: &TreeQuery, style: OutlineStyle) -> Result<String> {
        let rows = self.tag_tree(query)?;
        if rows.is_empty() {
            return Ok("No tags found".to_string());
        }
        Ok(TreeTextRenderer::new().with_style(style).render(&rows))
    }

    pub fn tree_json(&self, query: &TreeQuery) -> Result<String> {
        let rows = self.tag_tree(query)?;
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    /// Every label in use, one per line
    pub fn labels(&self) -> Result<String> {
        Ok(self.db.all_labels()?.join("\n"))
    }

    // ========================================================================
    // Pinned Tags
    // ========================================================================

    pub fn pin(&self, tag: &str) -> Result<String> {
        let Some(tag) = normalize_tags(&[tag.to_string()]).pop() else {
            bail!("cannot pin an empty tag");
        };
        let pin = self.db.pin_tag(&tag, None)?;
        Ok(format!("Pinned {} at position {}", pin.tag, pin.rank))
    }

    pub fn unpin(&self, tag: &str) -> Result<String> {
        if self.db.unpin_tag(tag)? {
            Ok(format!("Unpinned {}", tag))
        } else {
            Ok(format!("{} was not pinned", tag))
        }
    }

    pub fn pins(&self) -> Result<String> {
        let pins = self.db.pin_tags()?;
        if pins.is_empty() {
            return Ok("No pinned tags".to_string());
        }
        Ok(pins
            .iter()
            .map(|pin| format!("{:>3}  {}", pin.rank, pin.tag))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
