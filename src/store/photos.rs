//! The Photo Store. Owns photos and the photo-tag membership relation.
//!
//! Tags are only opaque keys here.

use std::collections::BTreeSet;

use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder as _;
use sqlx::SqliteConnection;

use crate::{
    error::DatabaseError,
    models::{NewPhoto, Page, Photo, PhotoId, PhotoRecord, TagId},
};

use super::{PhotoTags, Photos};

/// A `SELECT` of every photo column, optionally limited to one tag's photos.
fn select_records(tag: Option<TagId>) -> SelectStatement {
    let mut stmt = Query::select()
        .columns([
            (Photos::Table, Photos::Id),
            (Photos::Table, Photos::FileName),
            (Photos::Table, Photos::OriginalName),
            (Photos::Table, Photos::Path),
            (Photos::Table, Photos::Kind),
            (Photos::Table, Photos::DateCreated),
            (Photos::Table, Photos::OwnerId),
        ])
        .from(Photos::Table)
        .to_owned();

    if let Some(tag) = tag {
        stmt.inner_join(
            PhotoTags::Table,
            Expr::col((PhotoTags::Table, PhotoTags::PhotoId)).equals((Photos::Table, Photos::Id)),
        )
        .and_where(Expr::col((PhotoTags::Table, PhotoTags::TagId)).eq(tag.0));
    }

    stmt
}

/// Grabs the bare photo row, without its tags.
pub async fn record(
    conn: &mut SqliteConnection,
    id: PhotoId,
) -> Result<Option<PhotoRecord>, DatabaseError> {
    let (select, values) = select_records(None)
        .and_where(Expr::col((Photos::Table, Photos::Id)).eq(id.0))
        .build_sqlx(SqliteQueryBuilder);

    sqlx::query_as_with::<_, PhotoRecord, _>(&select, values)
        .fetch_optional(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Photo query failed! err: {e}"))
        .map_err(DatabaseError::QueryFailed)
}

/// Grabs a photo alongside its tags.
pub async fn get(conn: &mut SqliteConnection, id: PhotoId) -> Result<Option<Photo>, DatabaseError> {
    let Some(record) = record(conn, id).await? else {
        return Ok(None);
    };

    let tags = tags_of(conn, id).await?;
    Ok(Some(record.with_tags(tags)))
}

/// The tags of a photo.
pub async fn tags_of(
    conn: &mut SqliteConnection,
    id: PhotoId,
) -> Result<BTreeSet<TagId>, DatabaseError> {
    let tags = sqlx::query_scalar::<_, TagId>("SELECT tag_id FROM photo_tags WHERE photo_id = $1")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(tags.into_iter().collect())
}

/// The tags a photo was given directly, without the implied ancestors.
pub async fn explicit_tags_of(
    conn: &mut SqliteConnection,
    id: PhotoId,
) -> Result<BTreeSet<TagId>, DatabaseError> {
    let tags = sqlx::query_scalar::<_, TagId>(
        "SELECT tag_id FROM photo_tags WHERE photo_id = $1 AND explicit",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(tags.into_iter().collect())
}

/// The photos of a tag.
pub async fn ids_with_tag(
    conn: &mut SqliteConnection,
    tag: TagId,
) -> Result<BTreeSet<PhotoId>, DatabaseError> {
    let photos =
        sqlx::query_scalar::<_, PhotoId>("SELECT photo_id FROM photo_tags WHERE tag_id = $1")
            .bind(tag)
            .fetch_all(&mut *conn)
            .await?;

    Ok(photos.into_iter().collect())
}

/// The photos with at least one of `tags`.
pub async fn ids_with_any_tag(
    conn: &mut SqliteConnection,
    tags: &[TagId],
) -> Result<BTreeSet<PhotoId>, DatabaseError> {
    if tags.is_empty() {
        return Ok(BTreeSet::new());
    }

    let (select, values) = Query::select()
        .distinct()
        .column(PhotoTags::PhotoId)
        .from(PhotoTags::Table)
        .and_where(Expr::col(PhotoTags::TagId).is_in(tags.iter().map(|t| t.0)))
        .build_sqlx(SqliteQueryBuilder);

    let photos = sqlx::query_scalar_with::<_, PhotoId, _>(&select, values)
        .fetch_all(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Photo membership query failed! err: {e}"))?;

    Ok(photos.into_iter().collect())
}

/// Lists photos (optionally only those with `tag`), one page at a time.
pub async fn page(
    conn: &mut SqliteConnection,
    tag: Option<TagId>,
    page: Page,
) -> Result<Vec<Photo>, DatabaseError> {
    let (select, values) = select_records(tag)
        .order_by((Photos::Table, Photos::Id), Order::Asc)
        .limit(page.size)
        .offset(page.offset())
        .build_sqlx(SqliteQueryBuilder);
    tracing::trace!("running photo page query: {select}");

    let records = sqlx::query_as_with::<_, PhotoRecord, _>(&select, values)
        .fetch_all(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Photo page query failed! err: {e}"))?;

    let mut photos = Vec::with_capacity(records.len());
    for record in records {
        let tags = tags_of(conn, record.id).await?;
        photos.push(record.with_tags(tags));
    }

    Ok(photos)
}

/// Counts photos (optionally only those with `tag`).
pub async fn count(conn: &mut SqliteConnection, tag: Option<TagId>) -> Result<u64, DatabaseError> {
    let count = match tag {
        Some(tag) => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM photo_tags WHERE tag_id = $1")
                .bind(tag)
                .fetch_one(&mut *conn)
                .await?
        }
        None => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM photos")
                .fetch_one(&mut *conn)
                .await?
        }
    };

    Ok(u64::try_from(count).unwrap_or_default())
}

/// Saves a new photo row, returning its ID. Tags are set separately.
pub async fn insert(conn: &mut SqliteConnection, new: &NewPhoto) -> Result<PhotoId, DatabaseError> {
    let id = sqlx::query(
        r#"
        INSERT INTO photos
        (file_name, original_name, path, kind, date_created, owner_id)
        VALUES
        ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&new.file_name)
    .bind(&new.original_name)
    .bind(&new.path)
    .bind(&new.kind)
    .bind(new.date_created)
    .bind(new.owner_id)
    .execute(&mut *conn)
    .await
    .inspect_err(|e| tracing::error!("Photo insertion failed! err: {e}"))?
    .last_insert_rowid();

    Ok(PhotoId(id))
}

/// Overwrites the stored fields of an existing photo.
pub async fn update(
    conn: &mut SqliteConnection,
    id: PhotoId,
    fields: &NewPhoto,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        UPDATE photos SET
            file_name = $1,
            original_name = $2,
            path = $3,
            kind = $4,
            date_created = $5,
            owner_id = $6
        WHERE id = $7
        "#,
    )
    .bind(&fields.file_name)
    .bind(&fields.original_name)
    .bind(&fields.path)
    .bind(&fields.kind)
    .bind(fields.date_created)
    .bind(fields.owner_id)
    .bind(id)
    .execute(&mut *conn)
    .await
    .inspect_err(|e| tracing::error!("Photo update failed! err: {e}"))
    .map(|_| ())
    .map_err(DatabaseError::QueryFailed)
}

/// Replaces a photo's whole tag set.
///
/// `explicit` are the tags the photo was given directly. Each of them should
/// also be in `tags`.
pub async fn set_tags(
    conn: &mut SqliteConnection,
    id: PhotoId,
    tags: &BTreeSet<TagId>,
    explicit: &BTreeSet<TagId>,
) -> Result<(), DatabaseError> {
    sqlx::query("DELETE FROM photo_tags WHERE photo_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    for tag in tags {
        sqlx::query("INSERT INTO photo_tags (photo_id, tag_id, explicit) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(*tag)
            .bind(explicit.contains(tag))
            .execute(&mut *conn)
            .await
            .inspect_err(|e| tracing::error!("Failed to tag photo `{id}` with `{tag}`. err: {e}"))?;
    }

    Ok(())
}

/// Removes `tag` from every photo that has it.
///
/// Photos that had `tag` explicitly get `promote_to` (the tag's parent)
/// marked explicit instead, so they stay where they were in the tree.
///
/// Returns the photos that lost the tag.
pub async fn detach_tag(
    conn: &mut SqliteConnection,
    tag: TagId,
    promote_to: Option<TagId>,
) -> Result<BTreeSet<PhotoId>, DatabaseError> {
    let photos = ids_with_tag(conn, tag).await?;

    if let Some(parent) = promote_to {
        sqlx::query(
            r#"
            UPDATE photo_tags SET explicit = TRUE
            WHERE tag_id = $1 AND photo_id IN
                (SELECT photo_id FROM photo_tags WHERE tag_id = $2 AND explicit)
            "#,
        )
        .bind(parent)
        .bind(tag)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::error!("Failed to promote tag `{parent}` on photos. err: {e}"))?;
    }

    sqlx::query("DELETE FROM photo_tags WHERE tag_id = $1")
        .bind(tag)
        .execute(&mut *conn)
        .await?;

    Ok(photos)
}

/// How many tags a photo has, not counting `ignored`.
pub async fn tag_count_without(
    conn: &mut SqliteConnection,
    id: PhotoId,
    ignored: TagId,
) -> Result<u64, DatabaseError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM photo_tags WHERE photo_id = $1 AND tag_id != $2",
    )
    .bind(id)
    .bind(ignored)
    .fetch_one(&mut *conn)
    .await?;

    Ok(u64::try_from(count).unwrap_or_default())
}

/// Removes a photo row and its memberships.
pub async fn delete(conn: &mut SqliteConnection, id: PhotoId) -> Result<(), DatabaseError> {
    sqlx::query("DELETE FROM photo_tags WHERE photo_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM photos WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::error!("Photo deletion failed! err: {e}"))
        .map(|_| ())
        .map_err(DatabaseError::QueryFailed)
}
