pub mod config;
pub mod database;
pub mod intake;
pub mod migration;
pub mod session;

pub use config::{Config, ConfigError, CONFIG_FILE_NAME, HOME_DIR_NAME};
pub use database::{Database, DB_FILE_NAME};
pub use intake::{default_name, infer_kind, normalize_tag, normalize_tags, IntakeRequest, RecordIntake};
pub use migration::{MigrationStats, SchemaVersion, SCHEMA_VERSION};
pub use session::{Session, TreeQuery, DEFAULT_SEARCH_LIMIT};
