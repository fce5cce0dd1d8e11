use anyhow::{Context, Result};
use labeled_files_schemas::{EditorTarget, FileRecord, PathKind, TAG_SEPARATOR};
use std::path::Path;
use tracing::debug;

use crate::config::Config;

/// Turns raw user input (a path, URL or editor target plus tags) into a
/// record ready for the catalog.
pub struct RecordIntake<'a> {
    config: &'a Config,
}

/// What the user typed for one new record.
#[derive(Debug, Clone, Default)]
pub struct IntakeRequest {
    pub location: String,
    pub kind: Option<PathKind>,
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

impl<'a> RecordIntake<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn build(&self, request: IntakeRequest) -> Result<FileRecord> {
        let location = request.location.trim();
        let kind = request.kind.unwrap_or_else(|| infer_kind(location));

        let path = match kind {
            PathKind::File | PathKind::Folder => {
                let path = Path::new(location);
                let absolute = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    std::env::current_dir()
                        .context("cannot resolve relative path")?
                        .join(path)
                };
                self.config
                    .convert_path(&absolute)
                    .to_string_lossy()
                    .into_owned()
            }
            PathKind::Url | PathKind::Vscode => location.to_string(),
        };

        let name = request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name(kind, &path));

        let mut record = FileRecord::new(name, kind, path);
        record.tags = normalize_tags(&request.tags);
        record.description = request.description.unwrap_or_default();

        debug!(
            "Prepared {} record '{}' with tags {:?}",
            record.kind, record.name, record.tags
        );
        Ok(record)
    }
}

/// Guess the kind of a location from its shape
pub fn infer_kind(location: &str) -> PathKind {
    if location.starts_with("http://") || location.starts_with("https://") {
        return PathKind::Url;
    }
    if location.parse::<EditorTarget>().is_ok() {
        return PathKind::Vscode;
    }
    if Path::new(location).is_dir() {
        PathKind::Folder
    } else {
        PathKind::File
    }
}

/// Display name used when the user gives none
pub fn default_name(kind: PathKind, path: &str) -> String {
    match kind {
        PathKind::File | PathKind::Folder => Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
        PathKind::Url => {
            let rest = path.split("://").nth(1).unwrap_or(path);
            let host = rest.split('/').next().unwrap_or(rest);
            if host.is_empty() {
                path.to_string()
            } else {
                host.to_string()
            }
        }
        PathKind::Vscode => match path.parse::<EditorTarget>() {
            Ok(target) => target
                .path
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(target.path),
            Err(_) => path.to_string(),
        },
    }
}

/// Trim every segment and drop blank ones: `" a / /b "` becomes `a/b`.
/// Returns `None` when nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let segments: Vec<&str> = raw
        .split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Normalize, then drop duplicates keeping first occurrence order
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.iter().filter_map(|t| normalize_tag(t)) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_inference() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().to_string_lossy().into_owned();

        assert_eq!(infer_kind("https://example.com/page"), PathKind::Url);
        assert_eq!(
            infer_kind("folder+vscode-remote://ssh-remote+box/srv/app"),
            PathKind::Vscode
        );
        assert_eq!(infer_kind(&folder), PathKind::Folder);
        assert_eq!(infer_kind(&format!("{}/missing.txt", folder)), PathKind::File);
    }

    #[test]
    fn test_default_names() {
        assert_eq!(default_name(PathKind::File, "/home/me/todo.txt"), "todo.txt");
        assert_eq!(default_name(PathKind::Folder, "/home/me/notes/"), "notes");
        assert_eq!(default_name(PathKind::Url, "https://docs.rs/serde/latest"), "docs.rs");
        assert_eq!(
            default_name(PathKind::Vscode, "folder+file:///home/me/code/app/"),
            "app"
        );
        assert_eq!(default_name(PathKind::Vscode, "garbage"), "garbage");
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(normalize_tag(" a / /b "), Some("a/b".to_string()));
        assert_eq!(normalize_tag("/work/"), Some("work".to_string()));
        assert_eq!(normalize_tag(" / "), None);

        let raw: Vec<String> = ["b", "a", " b", "", "a/"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(normalize_tags(&raw), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_build_applies_mapping_and_tags() {
        let config =
            Config::from_json(r#"{"path_mapping": {"/mnt/share": "/data"}}"#).unwrap();
        let intake = RecordIntake::new(&config);

        let record = intake
            .build(IntakeRequest {
                location: "/mnt/share/report.pdf".to_string(),
                kind: Some(PathKind::File),
                tags: vec!["work / report".to_string(), "work/report".to_string()],
                ..IntakeRequest::default()
            })
            .unwrap();

        assert_eq!(record.path, "/data/report.pdf");
        assert_eq!(record.name, "report.pdf");
        assert_eq!(record.tags, vec!["work/report".to_string()]);
        assert!(record.id.is_none());
    }

    #[test]
    fn test_build_url_keeps_location() {
        let config = Config::default();
        let record = RecordIntake::new(&config)
            .build(IntakeRequest {
                location: " https://example.com/a ".to_string(),
                name: Some("  ".to_string()),
                description: Some("bookmark".to_string()),
                ..IntakeRequest::default()
            })
            .unwrap();

        assert_eq!(record.kind, PathKind::Url);
        assert_eq!(record.path, "https://example.com/a");
        assert_eq!(record.name, "example.com");
        assert_eq!(record.description, "bookmark");
    }
}
