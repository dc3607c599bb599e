//! Stores, loads, and deletes the image files behind each photo.
//!
//! Every photo has two files in the image root:
//!
//! - `<root>/<file_name>.<ext>`: the original, exactly as uploaded
//! - `<root>/<file_name>-thumbnail.<ext>`: a fixed-height copy
//!
//! Thumbnails are best-effort. If one can't be made, the original is still
//! kept and loading the thumbnail later just finds nothing.

use std::{future::Future, io::ErrorKind, time::Duration};

use base64::Engine as _;
use camino::{Utf8Path, Utf8PathBuf};

use crate::{config::Config, error::StorageError};

pub mod exif;
pub mod thumbnail;

/// The Image Asset Manager.
#[derive(Clone, Debug)]
pub struct ImageAssets {
    root: Utf8PathBuf,
    thumbnail_height: u32,
    timeout: Duration,
}

impl ImageAssets {
    /// Prepares the image root described by `config`, creating it if needed.
    #[tracing::instrument(skip_all)]
    pub async fn open(config: &Config) -> Result<Self, StorageError> {
        let root = config.image_root.clone();

        tokio::fs::create_dir_all(&root)
            .await
            .inspect_err(|e| tracing::error!("Failed to create image root at `{root}`. err: {e}"))
            .map_err(|e| StorageError::RootCreationFailed {
                path: root.to_string(),
                err: e,
            })?;

        Ok(Self {
            root,
            thumbnail_height: config.thumbnail_height,
            timeout: config.io_timeout(),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Where the original image for `file_name` lives.
    pub fn original_path(&self, file_name: &str, extension: &str) -> Utf8PathBuf {
        self.root.join(format!("{file_name}.{extension}"))
    }

    /// Where the thumbnail for `file_name` lives.
    pub fn thumbnail_path(&self, file_name: &str, extension: &str) -> Utf8PathBuf {
        self.root.join(format!("{file_name}-thumbnail.{extension}"))
    }

    /// Writes the original image, then tries to derive its thumbnail.
    ///
    /// Only a failure to write the original is an error.
    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn store(
        &self,
        bytes: &[u8],
        file_name: &str,
        extension: &str,
    ) -> Result<(), StorageError> {
        if bytes.is_empty() {
            tracing::warn!("Asked to store an image, but there were no bytes!");
            return Err(StorageError::EmptyPayload);
        }

        let original = self.original_path(file_name, extension);
        let written = self
            .bounded(original.as_str(), tokio::fs::write(&original, bytes))
            .await
            .and_then(|res| {
                res.map_err(|e| StorageError::WriteFailed {
                    path: original.to_string(),
                    err: e,
                })
            });

        if let Err(e) = written {
            tracing::error!("Failed to write original image. err: {e}");

            // don't leave half a file behind
            if let Err(e) = tokio::fs::remove_file(&original).await {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to clean up partial image at `{original}`. err: {e}");
                }
            }
            return Err(e);
        }
        tracing::debug!("Stored original image at `{original}`.");

        match self.store_thumbnail(bytes, file_name, extension).await {
            Ok(path) => tracing::debug!("Stored thumbnail at `{path}`."),
            Err(e) => tracing::warn!(
                "Original was stored, but its thumbnail couldn't be made. Continuing without one. err: {e}"
            ),
        }

        Ok(())
    }

    /// Reads an image and wraps it into a `data:` URI, ready for display.
    ///
    /// Anything going wrong here (including the file not existing) just means
    /// there's no image to show, so this returns `None` instead of failing.
    #[tracing::instrument(skip(self))]
    pub async fn load(
        &self,
        file_name: &str,
        extension: &str,
        want_thumbnail: bool,
    ) -> Option<String> {
        let path = if want_thumbnail {
            self.thumbnail_path(file_name, extension)
        } else {
            self.original_path(file_name, extension)
        };

        match self.bounded(path.as_str(), tokio::fs::read(&path)).await {
            Ok(Ok(bytes)) => Some(data_uri(extension, &bytes)),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No image to load at `{path}`.");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to read image at `{path}`. err: {e}");
                None
            }
            Err(e) => {
                tracing::warn!("Gave up loading image. err: {e}");
                None
            }
        }
    }

    /// Removes both the original and the thumbnail.
    ///
    /// Files that are already gone are fine.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, file_name: &str, extension: &str) -> Result<(), StorageError> {
        let original = self.original_path(file_name, extension);
        let thumbnail = self.thumbnail_path(file_name, extension);

        let (original_res, thumbnail_res) =
            futures::future::join(self.remove(&original), self.remove(&thumbnail)).await;

        original_res.and(thumbnail_res)
    }
}

// the private impl
impl ImageAssets {
    /// Makes the thumbnail, returning where it was written.
    async fn store_thumbnail(
        &self,
        bytes: &[u8],
        file_name: &str,
        extension: &str,
    ) -> Result<Utf8PathBuf, StorageError> {
        let path = self.thumbnail_path(file_name, extension);

        let encoded = {
            let (bytes, height) = (bytes.to_vec(), self.thumbnail_height);
            let (extension, name) = (extension.to_string(), file_name.to_string());

            self.bounded(
                path.as_str(),
                tokio::task::spawn_blocking(move || {
                    thumbnail::render(&bytes, height, &extension, &name)
                }),
            )
            .await???
        };

        self.bounded(path.as_str(), tokio::fs::write(&path, encoded))
            .await?
            .map_err(|e| StorageError::WriteFailed {
                path: path.to_string(),
                err: e,
            })?;

        Ok(path)
    }

    async fn remove(&self, path: &Utf8Path) -> Result<(), StorageError> {
        match self.bounded(path.as_str(), tokio::fs::remove_file(path)).await? {
            Ok(()) => {
                tracing::info!("Deleted image file at `{path}`.");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No image file found to delete at `{path}`.");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to delete image file at `{path}`. err: {e}");
                Err(StorageError::DeleteFailed {
                    path: path.to_string(),
                    err: e,
                })
            }
        }
    }

    /// Runs a file operation, giving up once the configured timeout passes.
    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = T>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .inspect_err(|_| tracing::warn!("File operation on `{what}` timed out."))
            .map_err(|_| StorageError::TimedOut(what.to_string()))
    }
}

/// Wraps image bytes into a `data:image/<ext>;base64,...` URI.
pub fn data_uri(extension: &str, bytes: &[u8]) -> String {
    format!(
        "data:image/{};base64,{}",
        extension.to_lowercase(),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
