use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use labeled_files_catalog::{
    Config, IntakeRequest, Session, TreeQuery, CONFIG_FILE_NAME, DEFAULT_SEARCH_LIMIT,
    HOME_DIR_NAME,
};
use labeled_files_hierarchy::OutlineStyle;
use labeled_files_schemas::{FileId, PathKind};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "labeled-files", version)]
#[command(about = "Tag files, folders and links, and browse them through a tag tree")]
struct Cli {
    /// Catalog database (overrides LABELED_FILES_DB and the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON config file (defaults to ~/.labeled_files/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a file, folder, URL or editor workspace
    Add {
        location: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long = "tag", short)]
        tags: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Add tags to a record
    Tag {
        id: i64,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags from a record
    Untag {
        id: i64,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Delete records
    Rm {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Show one record
    Show { id: i64 },
    /// Mark a record as opened and print its location
    Visit { id: i64 },
    /// List records by name and tags, most recently visited first
    Search {
        keyword: Option<String>,
        #[arg(long = "tag", short)]
        tags: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Print the tag tree
    Tree {
        keyword: Option<String>,
        /// Only this tag and what lies beneath it
        #[arg(long)]
        under: Option<String>,
        /// Count only records carrying every given tag
        #[arg(long = "tag", short)]
        tags: Vec<String>,
        #[arg(long)]
        json: bool,
        /// Auto-expand the top level below this many top-level tags
        #[arg(long)]
        threshold: Option<usize>,
        #[arg(long)]
        hide_empty: bool,
        /// Fold rows the way a tree widget first shows them
        #[arg(long)]
        collapsed: bool,
    },
    /// List every tag in use
    Labels,
    /// Pin a tag to the quick-access list
    Pin { tag: String },
    Unpin { tag: String },
    /// List pinned tags
    Pins,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    File,
    Folder,
    Url,
    Vscode,
}

impl From<KindArg> for PathKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::File => PathKind::File,
            KindArg::Folder => PathKind::Folder,
            KindArg::Url => PathKind::Url,
            KindArg::Vscode => PathKind::Vscode,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let home = std::env::var_os("HOME").map(PathBuf::from);

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => match &home {
            Some(home) => Config::load_or_default(home.join(HOME_DIR_NAME).join(CONFIG_FILE_NAME))?,
            None => Config::default(),
        },
    };

    let db_path = match cli
        .db
        .clone()
        .or_else(|| std::env::var_os("LABELED_FILES_DB").map(PathBuf::from))
    {
        Some(path) => path,
        None => config
            .database_path(home.as_deref())?
            .context("no database location: pass --db, set LABELED_FILES_DB or HOME")?,
    };

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let session = Session::open(&db_path, config)?;
    info!("Opened catalog {}", db_path.display());
    let output = run(&session, cli.command)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

fn run(session: &Session, command: Command) -> Result<String> {
    let now = Utc::now();
    debug!("Running {:?}", command);

    match command {
        Command::Add {
            location,
            name,
            kind,
            tags,
            description,
        } => session.add(IntakeRequest {
            location,
            kind: kind.map(PathKind::from),
            name,
            tags,
            description,
        }),
        Command::Tag { id, tags } => session.tag(FileId(id), &tags),
        Command::Untag { id, tags } => session.untag(FileId(id), &tags),
        Command::Rm { ids } => {
            let ids: Vec<FileId> = ids.into_iter().map(FileId).collect();
            session.remove(&ids)
        }
        Command::Show { id } => session.show(FileId(id), now),
        Command::Visit { id } => session.visit(FileId(id)),
        Command::Search {
            keyword,
            tags,
            limit,
        } => session.search(keyword.as_deref(), &tags, limit, now),
        Command::Tree {
            keyword,
            under,
            tags,
            json,
            threshold,
            hide_empty,
            collapsed,
        } => {
            let query = TreeQuery {
                keyword,
                under,
                filters: tags,
                threshold,
                hide_empty,
            };
            if json {
                session.tree_json(&query)
            } else {
                let style = if collapsed {
                    OutlineStyle::Initial
                } else {
                    OutlineStyle::Full
                };
                session.tree_text(&query, style)
            }
        }
        Command::Labels => session.labels(),
        Command::Pin { tag } => session.pin(&tag),
        Command::Unpin { tag } => session.unpin(&tag),
        Command::Pins => session.pins(),
    }
}
