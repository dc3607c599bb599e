//! Types that are really the bedrock of the app.

use core::fmt;

pub mod photo;
pub mod tag;

pub use photo::{NewPhoto, Page, Photo, PhotoId, PhotoPage, PhotoRecord, Upload};
pub use tag::{parse_tag_ids, NewTag, Tag, TagId, TagSelector, ROOT_TAG_KIND, ROOT_TAG_NAME};

/// Identifies whoever owns a tag or photo. Users themselves live elsewhere.
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
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
