use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::{assets::thumbnail, error::ConfigError};

/// The file name of the database, inside of [`Config::data_dir`].
pub const DATABASE_FILE_NAME: &str = "canopy.sqlite";

#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Path to the app's data directory. The database lives here.
    pub data_dir: Utf8PathBuf,

    /// The folder that all original images and thumbnails are written to.
    pub image_root: Utf8PathBuf,

    /// Height, in pixels, of every generated thumbnail.
    #[serde(default = "Config::default_thumbnail_height")]
    pub thumbnail_height: u32,

    /// Upper bound for any single image file operation.
    #[serde(default = "Config::default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// How many database connections the pool may hold.
    #[serde(default = "Config::default_max_connections")]
    pub max_connections: u32,

    /// Where users should report bugs. Shows up at the end of bug logs.
    #[serde(default = "Config::default_bug_report_repo")]
    pub bug_report_repo: String,
}

impl Config {
    /// Creates a config with the given paths and defaults for everything else.
    pub fn new(data_dir: impl Into<Utf8PathBuf>, image_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            image_root: image_root.into(),
            thumbnail_height: Self::default_thumbnail_height(),
            io_timeout_ms: Self::default_io_timeout_ms(),
            max_connections: Self::default_max_connections(),
            bug_report_repo: Self::default_bug_report_repo(),
        }
    }

    /// Attempts to read a `Config` from a TOML file on disk.
    pub async fn from_disk(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        // read the config from disk
        let s = tokio::fs::read_to_string(path)
            .await
            .inspect_err(|e| tracing::warn!("Failed to read config at `{path}`. err: {e}"))
            .map_err(ConfigError::ReadFailed)?;

        // parse with `toml` crate
        toml::from_str(s.as_str()).map_err(ConfigError::ParseFailed)
    }

    /// The full path to the database file.
    pub fn database_path(&self) -> Utf8PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    fn default_thumbnail_height() -> u32 {
        thumbnail::DEFAULT_HEIGHT
    }

    fn default_io_timeout_ms() -> u64 {
        10_000
    }

    fn default_max_connections() -> u32 {
        4
    }

    fn default_bug_report_repo() -> String {
        String::from("https://github.com/canopy-photos/canopy")
    }
}
