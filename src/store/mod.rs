//! The Tag Store and Photo Store.
//!
//! Both are plain async functions over a borrowed connection. That lets one
//! transaction span an entire hierarchy operation, so a cascade either
//! happens completely or not at all.
//!
//! Membership only ever lives in the `photo_tags` table. A photo's tags and a
//! tag's photos are two reads of that single relation, so they can't disagree.

use sea_query::Iden;

pub mod photos;
pub mod tags;

/// the tags table
#[derive(Iden)]
pub enum Tags {
    Table,
    Id,
    Name,
    Kind,
    ParentId,
    OwnerId,
}

/// the photos table
#[derive(Iden)]
pub enum Photos {
    Table,
    Id,
    FileName,
    OriginalName,
    Path,
    Kind,
    DateCreated,
    OwnerId,
}

/// the membership table
#[derive(Iden)]
pub enum PhotoTags {
    Table,
    PhotoId,
    TagId,
}
