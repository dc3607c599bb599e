//! Helps to connect to the database.

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite, SqliteConnection,
};

use crate::{
    config::Config,
    error::DatabaseError,
    models::{TagId, ROOT_TAG_KIND, ROOT_TAG_NAME},
};

/// A migrated connection pool, alongside the ID of its ROOT tag.
#[derive(Clone, Debug)]
pub struct Database {
    pool: Pool<Sqlite>,
    root: TagId,
}

impl Database {
    /// Connects to (or creates) the database described by `config`, runs the
    /// migrations, then finds or makes the ROOT tag.
    #[tracing::instrument(skip_all)]
    pub async fn connect(config: &Config) -> Result<Self, DatabaseError> {
        let path = config.database_path();

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .inspect_err(|e| tracing::error!("Failed to create the data directory. err: {e}"))
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .inspect_err(|e| tracing::error!("Failed to connect to database at `{path}`. err: {e}"))
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        // we'll also run migrations here real quick
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    "Database connection succeeded, but migrating the database failed! err: {e}"
                )
            })?;

        let root = {
            let mut conn = pool.acquire().await?;
            ensure_root(&mut conn).await?
        };
        tracing::debug!("Database is ready! ROOT tag has ID `{root}`.");

        Ok(Self { pool, root })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// The store ID of the sentinel ROOT tag.
    pub fn root(&self) -> TagId {
        self.root
    }
}

/// Finds the ROOT tag, creating it if this is a fresh database.
async fn ensure_root(conn: &mut SqliteConnection) -> Result<TagId, DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO tags (name, kind, parent_id)
        SELECT $1, $2, NULL
        WHERE NOT EXISTS (SELECT 1 FROM tags WHERE name = $1 AND parent_id IS NULL)
        "#,
    )
    .bind(ROOT_TAG_NAME)
    .bind(ROOT_TAG_KIND)
    .execute(&mut *conn)
    .await
    .inspect_err(|e| tracing::error!("Failed to insert the ROOT tag! err: {e}"))?;

    sqlx::query_scalar::<_, TagId>(
        "SELECT id FROM tags WHERE name = $1 AND parent_id IS NULL ORDER BY id LIMIT 1",
    )
    .bind(ROOT_TAG_NAME)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DatabaseError::MissingRoot)
}
