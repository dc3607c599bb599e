use core::fmt;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::{TagId, UserId};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct PhotoId(pub i64);

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A photo, alongside its full (ancestor-propagated) tag set.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Photo {
    pub id: PhotoId,

    /// The storage key of the image files, without an extension.
    ///
    /// This is unique for every stored image, so files never collide.
    pub file_name: String,

    /// The name of the file as it was uploaded, without an extension.
    pub original_name: String,

    /// Where the original lives, relative to the image root.
    pub path: String,

    /// The file extension, as uploaded. Also tells us the image format.
    pub kind: String,

    /// When the photo was taken (according to EXIF), or else when it was
    /// uploaded.
    pub date_created: DateTime<Utc>,

    pub owner_id: Option<UserId>,

    /// Every tag this photo has, including the implied ancestor tags.
    pub tags: BTreeSet<TagId>,
}

/// A row in the photos table. Doesn't know about tags.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct PhotoRecord {
    pub id: PhotoId,
    pub file_name: String,
    pub original_name: String,
    pub path: String,
    pub kind: String,
    pub date_created: DateTime<Utc>,
    pub owner_id: Option<UserId>,
}

impl PhotoRecord {
    /// Attaches a tag set, making a full [`Photo`].
    pub fn with_tags(self, tags: BTreeSet<TagId>) -> Photo {
        Photo {
            id: self.id,
            file_name: self.file_name,
            original_name: self.original_name,
            path: self.path,
            kind: self.kind,
            date_created: self.date_created,
            owner_id: self.owner_id,
            tags,
        }
    }
}

/// The stored fields of a photo that doesn't have an ID yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPhoto {
    pub file_name: String,
    pub original_name: String,
    pub path: String,
    pub kind: String,
    pub date_created: DateTime<Utc>,
    pub owner_id: Option<UserId>,
}

/// An uploaded image, before it's stored anywhere.
#[derive(Clone, PartialEq)]
pub struct Upload {
    /// The name the file had on the uploader's machine, like `beach.JPG`.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Splits the uploaded name at its last dot into `(stem, extension)`.
    ///
    /// The extension is `None` when there isn't a non-empty one.
    pub fn split_name(&self) -> (String, Option<String>) {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext)) if !ext.is_empty() => (stem.to_string(), Some(ext.to_string())),
            _ => (self.file_name.clone(), None),
        }
    }
}

// the bytes are huge. don't print them
impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Which slice of a listing to return. Pages start at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

impl Page {
    pub const DEFAULT_SIZE: u64 = 20;

    pub fn new(number: u64, size: u64) -> Self {
        Self { number, size }
    }

    pub fn offset(&self) -> u64 {
        self.number.saturating_mul(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

/// One page of photos, plus how many there are in total.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PhotoPage {
    pub photos: Vec<Photo>,
    pub total: u64,
}
