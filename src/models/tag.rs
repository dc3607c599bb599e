//! Represents tags in all their glory.

use core::fmt;

use crate::error::CanopyError;

use super::UserId;

/// The name of the sentinel tag at the top of the hierarchy.
pub const ROOT_TAG_NAME: &str = "ROOT";

/// The kind given to the sentinel tag.
pub const ROOT_TAG_KIND: &str = "root";

/// A unique, store-assigned identifier for a tag.
///
/// Never zero. Zero is only ever a routing alias for ROOT, which
/// [`TagSelector`] takes care of.
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
pub struct TagId(pub i64);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Tag {
    /// A unique identifier.
    ///
    /// Always use this when referencing the tag externally.
    pub id: TagId,

    /// The tag's name. Siblings never share one.
    pub name: String,

    /// A free-form category label, like "place" or "person".
    pub kind: String,

    /// The single parent of this tag. Forest roots (including ROOT) have none.
    pub parent_id: Option<TagId>,

    /// Who made this tag.
    pub owner_id: Option<UserId>,
}

impl Tag {
    /// Whether this is the sentinel ROOT tag.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.name == ROOT_TAG_NAME
    }
}

/// Everything needed to make a new tag. The store picks the ID.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewTag {
    pub name: String,
    pub kind: String,
    pub parent_id: Option<TagId>,
    pub owner_id: Option<UserId>,
}

impl NewTag {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Places the new tag under `parent`.
    pub fn under(mut self, parent: TagId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn owned_by(mut self, owner: UserId) -> Self {
        self.owner_id = Some(owner);
        self
    }
}

/// Picks a tag from the outside world.
///
/// Callers that speak in raw numbers use `0` for ROOT; [`From<i64>`] handles
/// that translation so nothing else has to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagSelector {
    Root,
    Id(TagId),
}

impl From<TagId> for TagSelector {
    fn from(id: TagId) -> Self {
        Self::Id(id)
    }
}

impl From<i64> for TagSelector {
    fn from(raw: i64) -> Self {
        match raw {
            0 => Self::Root,
            other => Self::Id(TagId(other)),
        }
    }
}

/// Parses a comma-separated list of tag IDs, like `"4,8,15"`.
///
/// Whitespace around each ID is ignored, and so is a fully blank input (which
/// yields no selectors at all). Anything else that isn't a non-negative
/// integer makes the whole list invalid.
pub fn parse_tag_ids(raw: &str) -> Result<Vec<TagSelector>, CanopyError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    raw.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<i64>()
                .ok()
                .filter(|id| *id >= 0)
                .map(TagSelector::from)
                .ok_or_else(|| {
                    tracing::debug!("Rejecting malformed tag ID `{part}` in list `{raw}`");
                    CanopyError::InvalidRequest(format!("`{part}` is not a valid tag ID"))
                })
        })
        .collect()
}
