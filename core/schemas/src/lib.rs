use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ID Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tag Schema
// ============================================================================

/// Separator between the segments of a hierarchical tag.
pub const TAG_SEPARATOR: char = '/';

/// One hierarchical label with how many records carry it and when it was
/// last touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOccurrence {
    pub label: String,
    pub count: u64,
    pub last_access: DateTime<Utc>,
}

impl TagOccurrence {
    pub fn new(label: impl Into<String>, count: u64, last_access: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            count,
            last_access,
        }
    }
}

/// A tag pinned to the quick-access bar, ordered by `rank`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinTag {
    pub tag: String,
    pub icon: Option<String>,
    pub rank: i64,
}

// ============================================================================
// File Schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "folder")]
    Folder,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "vscode")]
    Vscode,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::File => "file",
            PathKind::Folder => "folder",
            PathKind::Url => "url",
            PathKind::Vscode => "vscode",
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown path kind: {0}")]
pub struct PathKindError(pub String);

impl FromStr for PathKind {
    type Err = PathKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(PathKind::File),
            "folder" => Ok(PathKind::Folder),
            "url" => Ok(PathKind::Url),
            "vscode" => Ok(PathKind::Vscode),
            other => Err(PathKindError(other.to_string())),
        }
    }
}

/// A tagged record: a local file or folder, a web page, or an editor workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Option<FileId>,
    pub name: String,
    pub kind: PathKind,
    pub path: String,
    pub tags: Vec<String>,
    pub ctime: DateTime<Utc>,
    pub vtime: DateTime<Utc>,
    pub icon: Option<String>, // base64 PNG
    pub description: String,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, kind: PathKind, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            kind,
            path: path.into(),
            tags: Vec::new(),
            ctime: now,
            vtime: now,
            icon: None,
            description: String::new(),
        }
    }

    /// One-line summary shown next to the record name.
    pub fn describe(&self) -> String {
        match self.kind {
            PathKind::File | PathKind::Folder => format!("{}: {}", self.kind, self.path),
            PathKind::Url => format!("url: {}", self.path),
            PathKind::Vscode => {
                if self.path.is_empty() {
                    return "vscode: empty".to_string();
                }
                match self.path.parse::<EditorTarget>() {
                    Ok(target) => format!(
                        "vscode: {} - {} - {}",
                        target.kind.as_str(),
                        target.protocol.label(),
                        self.name
                    ),
                    Err(_) => format!("vscode: {}", self.name),
                }
            }
        }
    }
}

// ============================================================================
// Editor Workspace Targets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorTargetKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "folder")]
    Folder,
    #[serde(rename = "workspace")]
    Workspace,
}

impl EditorTargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditorTargetKind::File => "file",
            EditorTargetKind::Folder => "folder",
            EditorTargetKind::Workspace => "workspace",
        }
    }

    /// Command-line flag the editor expects for this kind of target.
    pub fn uri_flag(&self) -> &'static str {
        match self {
            EditorTargetKind::File | EditorTargetKind::Workspace => "--file-uri",
            EditorTargetKind::Folder => "--folder-uri",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorProtocol {
    Local,
    Ssh { host: String },
}

impl EditorProtocol {
    pub fn label(&self) -> &'static str {
        match self {
            EditorProtocol::Local => "Local",
            EditorProtocol::Ssh { .. } => "Remote",
        }
    }
}

/// Where an editor workspace record points. Stored in `FileRecord::path` as
/// `<kind>+<uri>`, e.g. `folder+vscode-remote://ssh-remote+1.2.3.4/home`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorTarget {
    pub kind: EditorTargetKind,
    pub protocol: EditorProtocol,
    pub path: String,
}

const LOCAL_SCHEME: &str = "file://";
const SSH_SCHEME: &str = "vscode-remote://ssh-remote+";

impl EditorTarget {
    pub fn uri(&self) -> String {
        match &self.protocol {
            EditorProtocol::Local => format!("{}{}", LOCAL_SCHEME, self.path),
            EditorProtocol::Ssh { host } => format!("{}{}{}", SSH_SCHEME, host, self.path),
        }
    }
}

impl fmt::Display for EditorTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}+{}", self.kind.as_str(), self.uri())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EditorTargetError {
    #[error("missing '+' between target kind and uri in {0:?}")]
    MissingSeparator(String),
    #[error("unknown target kind: {0}")]
    UnknownKind(String),
    #[error("unsupported uri: {0}")]
    UnsupportedUri(String),
}

impl FromStr for EditorTarget {
    type Err = EditorTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, uri) = s
            .split_once('+')
            .ok_or_else(|| EditorTargetError::MissingSeparator(s.to_string()))?;

        let kind = match kind {
            "file" => EditorTargetKind::File,
            "folder" => EditorTargetKind::Folder,
            "workspace" => EditorTargetKind::Workspace,
            other => return Err(EditorTargetError::UnknownKind(other.to_string())),
        };

        if let Some(path) = uri.strip_prefix(LOCAL_SCHEME) {
            return Ok(EditorTarget {
                kind,
                protocol: EditorProtocol::Local,
                path: path.to_string(),
            });
        }

        if let Some(rest) = uri.strip_prefix(SSH_SCHEME) {
            // host ends where the absolute path begins
            let split = rest.find('/').unwrap_or(rest.len());
            let (host, path) = rest.split_at(split);
            return Ok(EditorTarget {
                kind,
                protocol: EditorProtocol::Ssh {
                    host: host.to_string(),
                },
                path: path.to_string(),
            });
        }

        Err(EditorTargetError::UnsupportedUri(uri.to_string()))
    }
}
