use core::error::Error;
use pisserror::Error;

use crate::models::{PhotoId, TagId};

/// Stick this at the end of bug warnings/errors.
///
/// It helps users find out where to report bugs when looking at logs.
pub fn bug_msg(repo: &str) -> String {
    format!("this is a bug, so please report it! you can do so by heading to this git repo: {repo}")
}

#[derive(Debug, Error)]
pub enum CanopyError {
    #[error("The database has encountered an error. See: `{_0}`")]
    DatabaseError(#[from] DatabaseError),

    #[error("An image file operation failed. See: `{_0}`")]
    StorageError(#[from] StorageError),

    #[error("The tag hierarchy is inconsistent. See: `{_0}`")]
    HierarchyError(#[from] HierarchyError),

    #[error("The configuration couldn't be loaded. See: `{_0}`")]
    ConfigError(#[from] ConfigError),

    #[error("No tag exists with ID `{_0}`.")]
    TagNotFound(TagId),

    #[error("No photo exists with ID `{_0}`.")]
    PhotoNotFound(PhotoId),

    #[error("The request was rejected: {_0}")]
    InvalidRequest(String),

    #[error("The ROOT tag can't be renamed, moved, or deleted.")]
    RootIsImmutable,

    #[error("A tag named `{name}` already exists under the same parent.")]
    DuplicateTagName { name: String },
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to the database. See: {_0}")]
    ConnectionError(String),

    #[error("Database connection succeeded, but migrating it failed. See: {_0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to complete database query. See: {_0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("The database has no ROOT tag, and one couldn't be created.")]
    MissingRoot,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// during fs read from disk
    #[error("Failed to read config file. See: `{_0}`")]
    ReadFailed(#[from] tokio::io::Error),

    /// parsing
    #[error("Failed to parse config file. See: `{_0}`")]
    ParseFailed(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("There were no image bytes to store.")]
    EmptyPayload,

    #[error("Failed to create the image root at `{path}`. Err: `{err}`")]
    RootCreationFailed { path: String, err: std::io::Error },

    #[error("Failed to write image file at `{path}`. Err: `{err}`")]
    WriteFailed { path: String, err: std::io::Error },

    #[error("Failed to delete image file at `{path}`. Err: `{err}`")]
    DeleteFailed { path: String, err: std::io::Error },

    #[error("The image file operation on `{_0}` timed out.")]
    TimedOut(String),

    #[error("A `tokio` task unexpectedly panicked. See: `{_0}`")]
    TokioJoinError(#[from] tokio::task::JoinError),

    #[error("An error occurred when processing thumbnail data. See: `{_0}`")]
    Thumbnail(#[from] ThumbnailError),
}

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("The `image` crate failed to parse this file into an image. Err: `{_0}`, name: `{_1}`.")]
    ImageParsingFailed(image::ImageError, String),

    #[error("The `image` crate can't write thumbnails with extension `{_0}`.")]
    UnsupportedFormat(String),

    #[error(
        "Thumbnail creation succeeded, but writing to disk failed. Err: `{_0}`, path: `{_1}`."
    )]
    ThumbnailSaveFailure(image::ImageError, String),
}

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("The tag tree doesn't contain a tag with ID `{_0}`.")]
    UnknownTag(TagId),

    #[error("The tag tree loops back on itself at tag `{_0}`.")]
    CycleDetected(TagId),
}
