//! The Tag Store. Owns tags and their parent edges, and knows nothing about
//! photos.

use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder as _;
use sqlx::SqliteConnection;

use crate::{
    error::DatabaseError,
    models::{NewTag, Page, Tag, TagId},
};

use super::Tags;

/// A `SELECT` of every tag column.
fn select_tags() -> SelectStatement {
    Query::select()
        .columns([
            Tags::Id,
            Tags::Name,
            Tags::Kind,
            Tags::ParentId,
            Tags::OwnerId,
        ])
        .from(Tags::Table)
        .to_owned()
}

async fn fetch_tags(
    conn: &mut SqliteConnection,
    stmt: &SelectStatement,
) -> Result<Vec<Tag>, DatabaseError> {
    let (select, values) = stmt.build_sqlx(SqliteQueryBuilder);
    tracing::trace!("running tag query: {select}");

    sqlx::query_as_with::<_, Tag, _>(&select, values)
        .fetch_all(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Tag query failed! err: {e}"))
        .map_err(DatabaseError::QueryFailed)
}

/// Grabs one tag, if it exists.
pub async fn get(conn: &mut SqliteConnection, id: TagId) -> Result<Option<Tag>, DatabaseError> {
    let stmt = select_tags()
        .and_where(Expr::col(Tags::Id).eq(id.0))
        .to_owned();

    Ok(fetch_tags(conn, &stmt).await?.into_iter().next())
}

/// Grabs every tag with one of the given IDs. Missing IDs are skipped.
pub async fn get_many(
    conn: &mut SqliteConnection,
    ids: &[TagId],
) -> Result<Vec<Tag>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let stmt = select_tags()
        .and_where(Expr::col(Tags::Id).is_in(ids.iter().map(|id| id.0)))
        .order_by(Tags::Id, Order::Asc)
        .to_owned();

    fetch_tags(conn, &stmt).await
}

/// Finds the tags whose parent is exactly `id`. Grandchildren aren't included.
pub async fn children(
    conn: &mut SqliteConnection,
    id: TagId,
) -> Result<Vec<Tag>, DatabaseError> {
    let stmt = select_tags()
        .and_where(Expr::col(Tags::ParentId).eq(id.0))
        .order_by(Tags::Id, Order::Asc)
        .to_owned();

    fetch_tags(conn, &stmt).await
}

/// Lists all tags, one page at a time.
pub async fn page(conn: &mut SqliteConnection, page: Page) -> Result<Vec<Tag>, DatabaseError> {
    let stmt = select_tags()
        .order_by(Tags::Id, Order::Asc)
        .limit(page.size)
        .offset(page.offset())
        .to_owned();

    fetch_tags(conn, &stmt).await
}

/// Every `(tag, parent)` edge in the store. The hierarchy is built from these.
pub async fn edges(
    conn: &mut SqliteConnection,
) -> Result<Vec<(TagId, Option<TagId>)>, DatabaseError> {
    sqlx::query_as::<_, (TagId, Option<TagId>)>("SELECT id, parent_id FROM tags")
        .fetch_all(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Failed to read tag edges! err: {e}"))
        .map_err(DatabaseError::QueryFailed)
}

/// Whether a sibling under `parent` already uses `name`.
///
/// `except` lets a tag ignore itself when it's being renamed.
pub async fn name_taken(
    conn: &mut SqliteConnection,
    name: &str,
    parent: Option<TagId>,
    except: Option<TagId>,
) -> Result<bool, DatabaseError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tags WHERE name = $1 AND parent_id IS $2 AND id IS NOT $3",
    )
    .bind(name)
    .bind(parent)
    .bind(except)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Saves a new tag, returning it with its fresh ID.
pub async fn insert(conn: &mut SqliteConnection, new: &NewTag) -> Result<Tag, DatabaseError> {
    let id = sqlx::query("INSERT INTO tags (name, kind, parent_id, owner_id) VALUES ($1, $2, $3, $4)")
        .bind(&new.name)
        .bind(&new.kind)
        .bind(new.parent_id)
        .bind(new.owner_id)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::error!("Tag insertion failed! err: {e}"))?
        .last_insert_rowid();

    Ok(Tag {
        id: TagId(id),
        name: new.name.clone(),
        kind: new.kind.clone(),
        parent_id: new.parent_id,
        owner_id: new.owner_id,
    })
}

/// Overwrites the stored fields of an existing tag.
pub async fn update(conn: &mut SqliteConnection, tag: &Tag) -> Result<(), DatabaseError> {
    sqlx::query("UPDATE tags SET name = $1, kind = $2, parent_id = $3, owner_id = $4 WHERE id = $5")
        .bind(&tag.name)
        .bind(&tag.kind)
        .bind(tag.parent_id)
        .bind(tag.owner_id)
        .bind(tag.id)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::error!("Tag update failed! err: {e}"))
        .map(|_| ())
        .map_err(DatabaseError::QueryFailed)
}

/// Removes a single tag row. The caller is responsible for its children and
/// memberships.
pub async fn delete(conn: &mut SqliteConnection, id: TagId) -> Result<(), DatabaseError> {
    sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::error!("Tag deletion failed! err: {e}"))
        .map(|_| ())
        .map_err(DatabaseError::QueryFailed)
}
