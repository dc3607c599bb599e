//! The photo library: tag and photo operations, glued to the hierarchy.
//!
//! Every write takes the library's tree lock and runs in one database
//! transaction. Image files are only removed after that transaction commits,
//! so a failed operation never leaves a photo without its files.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use image::ImageFormat;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    assets::{exif, ImageAssets},
    config::Config,
    database::Database,
    error::{bug_msg, CanopyError, DatabaseError, HierarchyError},
    hierarchy::TagTree,
    models::{
        NewPhoto, NewTag, Page, Photo, PhotoId, PhotoPage, PhotoRecord, Tag, TagId, TagSelector,
        Upload, UserId,
    },
    store::{photos, tags},
};

/// An upload that's been checked, but not written anywhere yet.
struct PreparedImage {
    bytes: Vec<u8>,
    file_name: String,
    original_name: String,
    kind: String,
    date_created: DateTime<Utc>,
}

/// The tag hierarchy and photo engine.
#[derive(Debug)]
pub struct Library {
    config: Config,
    db: Database,
    assets: ImageAssets,
    /// Held for the whole of any write, so no two writes interleave on the tree.
    tree_lock: Mutex<()>,
}

impl Library {
    /// Opens the library described by `config`, creating the database and
    /// image root if they don't exist yet.
    #[tracing::instrument(skip_all)]
    pub async fn open(config: Config) -> Result<Self, CanopyError> {
        let db = Database::connect(&config).await?;
        let assets = ImageAssets::open(&config).await?;
        tracing::info!(
            "Library opened! database: `{}`, images: `{}`",
            config.database_path(),
            assets.root()
        );

        Ok(Self {
            config,
            db,
            assets,
            tree_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn assets(&self) -> &ImageAssets {
        &self.assets
    }

    /// The ID of the sentinel ROOT tag.
    pub fn root_id(&self) -> TagId {
        self.db.root()
    }

    /// Turns a selector into a concrete tag ID. This doesn't check that the
    /// tag exists.
    pub fn resolve(&self, selector: TagSelector) -> TagId {
        match selector {
            TagSelector::Root => self.db.root(),
            TagSelector::Id(id) => id,
        }
    }
}

// tags
impl Library {
    #[tracing::instrument(skip(self))]
    pub async fn get_tag(&self, selector: TagSelector) -> Result<Tag, CanopyError> {
        let mut conn = self.conn().await?;
        require_tag(&mut conn, self.resolve(selector)).await
    }

    /// Lists all tags, by ID.
    #[tracing::instrument(skip(self))]
    pub async fn list_tags(&self, page: Page) -> Result<Vec<Tag>, CanopyError> {
        let mut conn = self.conn().await?;
        Ok(tags::page(&mut conn, page).await?)
    }

    /// Lists the direct children of a tag.
    #[tracing::instrument(skip(self))]
    pub async fn list_children(&self, selector: TagSelector) -> Result<Vec<Tag>, CanopyError> {
        let mut conn = self.conn().await?;
        let tag = require_tag(&mut conn, self.resolve(selector)).await?;
        Ok(tags::children(&mut conn, tag.id).await?)
    }

    /// Every tag below this one, at any depth.
    #[tracing::instrument(skip(self))]
    pub async fn list_descendant_tags(
        &self,
        selector: TagSelector,
    ) -> Result<Vec<Tag>, CanopyError> {
        let mut conn = self.conn().await?;
        let tag = require_tag(&mut conn, self.resolve(selector)).await?;

        let tree = self.tree(&mut conn).await?;
        let ids = tree
            .descendants(tag.id)
            .map_err(|e| self.inconsistent(e))?;

        Ok(tags::get_many(&mut conn, &ids).await?)
    }

    /// Every tag above this one, nearest first. Handy for breadcrumbs.
    #[tracing::instrument(skip(self))]
    pub async fn list_ancestor_tags(
        &self,
        selector: TagSelector,
    ) -> Result<Vec<Tag>, CanopyError> {
        let mut conn = self.conn().await?;
        let tag = require_tag(&mut conn, self.resolve(selector)).await?;

        let tree = self.tree(&mut conn).await?;
        let ids = tree.ancestors(tag.id).map_err(|e| self.inconsistent(e))?;

        let mut by_id: HashMap<TagId, Tag> = tags::get_many(&mut conn, &ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Makes a new tag, either standalone or under a parent.
    #[tracing::instrument(skip(self))]
    pub async fn create_tag(&self, new: NewTag) -> Result<Tag, CanopyError> {
        validate_name(&new.name)?;

        let _guard = self.tree_lock.lock().await;
        let mut tx = self.begin().await?;

        if let Some(parent) = new.parent_id {
            require_tag(&mut tx, parent).await?;
        }

        if tags::name_taken(&mut tx, &new.name, new.parent_id, None).await? {
            return Err(CanopyError::DuplicateTagName { name: new.name });
        }

        let tag = tags::insert(&mut tx, &new).await?;
        commit(tx).await?;

        tracing::info!("Created tag `{}` with ID `{}`.", tag.name, tag.id);
        Ok(tag)
    }

    /// Saves new values for an existing tag: its name, kind, owner, or parent.
    ///
    /// Moving a tag under itself (or anything below it) is refused. After a
    /// move, every photo in the moved subtree gets its ancestors recomputed.
    #[tracing::instrument(skip(self))]
    pub async fn update_tag(&self, tag: Tag) -> Result<Tag, CanopyError> {
        if tag.id == self.root_id() {
            return Err(CanopyError::RootIsImmutable);
        }
        validate_name(&tag.name)?;

        let _guard = self.tree_lock.lock().await;
        let mut tx = self.begin().await?;

        let stored = require_tag(&mut tx, tag.id).await?;

        if let Some(parent) = tag.parent_id {
            require_tag(&mut tx, parent).await?;

            let tree = self.tree(&mut tx).await?;
            if tree
                .would_cycle(tag.id, parent)
                .map_err(|e| self.inconsistent(e))?
            {
                tracing::warn!("Refusing to move tag `{}` under `{parent}`.", tag.id);
                return Err(HierarchyError::CycleDetected(tag.id).into());
            }
        }

        if tags::name_taken(&mut tx, &tag.name, tag.parent_id, Some(tag.id)).await? {
            return Err(CanopyError::DuplicateTagName { name: tag.name });
        }

        tags::update(&mut tx, &tag).await?;

        if stored.parent_id != tag.parent_id {
            let moved = self.retag_subtree(&mut tx, tag.id).await?;
            tracing::debug!(
                "Moved tag `{}` from `{:?}` to `{:?}`. Photos retagged: {moved}",
                tag.id,
                stored.parent_id,
                tag.parent_id
            );
        }

        commit(tx).await?;
        Ok(tag)
    }

    /// Deletes a tag along with everything below it.
    ///
    /// Children go before their parents. Each deleted tag is taken off of
    /// every photo that had it, and a photo left with nothing but ROOT is
    /// deleted too (files included).
    ///
    /// This is all-or-nothing. Returns the IDs of every deleted tag.
    #[tracing::instrument(skip(self))]
    pub async fn delete_tag(&self, selector: TagSelector) -> Result<BTreeSet<TagId>, CanopyError> {
        let id = self.resolve(selector);
        if id == self.root_id() {
            return Err(CanopyError::RootIsImmutable);
        }

        let _guard = self.tree_lock.lock().await;
        let mut tx = self.begin().await?;

        require_tag(&mut tx, id).await?;
        let tree = self.tree(&mut tx).await?;
        let order = tree.deletion_order(id).map_err(|e| self.inconsistent(e))?;

        let mut orphans = Vec::new();
        for tag in &order {
            let parent = tree.parent(*tag).map_err(|e| self.inconsistent(e))?;

            for photo in photos::detach_tag(&mut tx, *tag, parent).await? {
                if photos::tag_count_without(&mut tx, photo, self.root_id()).await? > 0 {
                    continue;
                }

                if let Some(record) = photos::record(&mut tx, photo).await? {
                    tracing::debug!("Photo `{photo}` lost its last tag. Deleting it...");
                    photos::delete(&mut tx, photo).await?;
                    orphans.push(record);
                }
            }

            tags::delete(&mut tx, *tag).await?;
        }

        commit(tx).await?;
        tracing::info!(
            "Tags deleted: {order:?}. Photos deleted with them: {}",
            orphans.len()
        );

        self.release_files(&orphans).await;
        Ok(order.into_iter().collect())
    }
}

// photos
impl Library {
    /// Adds a new photo with the given explicit tags.
    pub async fn create_photo(
        &self,
        image: Upload,
        explicit_tags: &[TagSelector],
        owner: Option<UserId>,
    ) -> Result<Photo, CanopyError> {
        self.create_or_update_photo(None, explicit_tags, Some(image), owner)
            .await
    }

    /// Re-tags a photo, optionally swapping out its image.
    pub async fn update_photo(
        &self,
        id: PhotoId,
        image: Option<Upload>,
        explicit_tags: &[TagSelector],
        owner: Option<UserId>,
    ) -> Result<Photo, CanopyError> {
        self.create_or_update_photo(Some(id), explicit_tags, image, owner)
            .await
    }

    /// Creates (`target` is `None`) or updates a photo.
    ///
    /// The photo ends up with the explicit tags plus all of their ancestors.
    /// With no explicit tags at all, it gets ROOT alone. New photos need an
    /// image; updates may keep the old one.
    #[tracing::instrument(skip(self))]
    pub async fn create_or_update_photo(
        &self,
        target: Option<PhotoId>,
        explicit_tags: &[TagSelector],
        image: Option<Upload>,
        owner: Option<UserId>,
    ) -> Result<Photo, CanopyError> {
        if target.is_none() && image.is_none() {
            return Err(CanopyError::InvalidRequest(
                "a new photo needs an image".into(),
            ));
        }

        let prepared = match image {
            Some(upload) => Some(prepare(upload).await?),
            None => None,
        };

        let _guard = self.tree_lock.lock().await;
        let mut tx = self.begin().await?;

        let existing = match target {
            Some(id) => Some(
                photos::record(&mut tx, id)
                    .await?
                    .ok_or(CanopyError::PhotoNotFound(id))?,
            ),
            None => None,
        };

        let (explicit, tags) = self.propagate(&mut tx, explicit_tags).await?;

        let fields = match (&prepared, &existing) {
            (Some(img), _) => NewPhoto {
                file_name: img.file_name.clone(),
                original_name: img.original_name.clone(),
                path: format!("{}.{}", img.file_name, img.kind),
                kind: img.kind.clone(),
                date_created: img.date_created,
                owner_id: owner,
            },
            (None, Some(old)) => NewPhoto {
                file_name: old.file_name.clone(),
                original_name: old.original_name.clone(),
                path: old.path.clone(),
                kind: old.kind.clone(),
                date_created: old.date_created,
                owner_id: owner,
            },
            (None, None) => {
                return Err(CanopyError::InvalidRequest(
                    "a new photo needs an image".into(),
                ))
            }
        };

        if let Some(img) = &prepared {
            self.assets
                .store(&img.bytes, &img.file_name, &img.kind)
                .await?;
        }

        let saved = save_photo(
            tx,
            existing.as_ref().map(|p| p.id),
            &fields,
            &tags,
            &explicit,
        )
        .await;
        let id = match saved {
            Ok(id) => id,
            Err(e) => {
                // the new files belong to nothing now
                if prepared.is_some() {
                    self.release_file(&fields.file_name, &fields.kind).await;
                }
                return Err(e);
            }
        };

        // a new image means the old one is garbage
        if let (Some(_), Some(old)) = (&prepared, &existing) {
            self.release_file(&old.file_name, &old.kind).await;
        }

        tracing::info!("Saved photo `{id}` with tags {tags:?}.");
        Ok(Photo {
            id,
            file_name: fields.file_name,
            original_name: fields.original_name,
            path: fields.path,
            kind: fields.kind,
            date_created: fields.date_created,
            owner_id: fields.owner_id,
            tags,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_photo(&self, id: PhotoId) -> Result<Photo, CanopyError> {
        let mut conn = self.conn().await?;
        photos::get(&mut conn, id)
            .await?
            .ok_or(CanopyError::PhotoNotFound(id))
    }

    /// The original image, as a `data:` URI. `None` if its file is missing.
    #[tracing::instrument(skip(self))]
    pub async fn get_image(&self, id: PhotoId) -> Result<Option<String>, CanopyError> {
        let record = self.photo_record(id).await?;
        Ok(self
            .assets
            .load(&record.file_name, &record.kind, false)
            .await)
    }

    /// The thumbnail, as a `data:` URI. `None` if it was never made.
    #[tracing::instrument(skip(self))]
    pub async fn get_thumbnail(&self, id: PhotoId) -> Result<Option<String>, CanopyError> {
        let record = self.photo_record(id).await?;
        Ok(self
            .assets
            .load(&record.file_name, &record.kind, true)
            .await)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_photos(&self, page: Page) -> Result<PhotoPage, CanopyError> {
        let mut conn = self.conn().await?;
        Ok(PhotoPage {
            photos: photos::page(&mut conn, None, page).await?,
            total: photos::count(&mut conn, None).await?,
        })
    }

    /// Lists the photos with a tag. Since ancestors are propagated, this
    /// includes photos tagged anywhere below it.
    #[tracing::instrument(skip(self))]
    pub async fn list_photos_by_tag(
        &self,
        selector: TagSelector,
        page: Page,
    ) -> Result<PhotoPage, CanopyError> {
        let mut conn = self.conn().await?;
        let tag = require_tag(&mut conn, self.resolve(selector)).await?;

        Ok(PhotoPage {
            photos: photos::page(&mut conn, Some(tag.id), page).await?,
            total: photos::count(&mut conn, Some(tag.id)).await?,
        })
    }

    /// The IDs of every photo with a tag.
    #[tracing::instrument(skip(self))]
    pub async fn photos_of_tag(
        &self,
        selector: TagSelector,
    ) -> Result<BTreeSet<PhotoId>, CanopyError> {
        let mut conn = self.conn().await?;
        let tag = require_tag(&mut conn, self.resolve(selector)).await?;
        Ok(photos::ids_with_tag(&mut conn, tag.id).await?)
    }

    /// Deletes a photo and its files.
    #[tracing::instrument(skip(self))]
    pub async fn delete_photo(&self, id: PhotoId) -> Result<(), CanopyError> {
        let _guard = self.tree_lock.lock().await;
        let mut tx = self.begin().await?;

        let record = photos::record(&mut tx, id)
            .await?
            .ok_or(CanopyError::PhotoNotFound(id))?;
        photos::delete(&mut tx, id).await?;
        commit(tx).await?;

        self.release_files(std::slice::from_ref(&record)).await;
        Ok(())
    }
}

// the private impl
impl Library {
    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, DatabaseError> {
        self.db
            .pool()
            .acquire()
            .await
            .inspect_err(|e| tracing::error!("Failed to get database connection! err: {e}"))
            .map_err(DatabaseError::QueryFailed)
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>, DatabaseError> {
        self.db
            .pool()
            .begin()
            .await
            .inspect_err(|e| tracing::error!("Failed to start a transaction! err: {e}"))
            .map_err(DatabaseError::QueryFailed)
    }

    async fn tree(&self, conn: &mut SqliteConnection) -> Result<TagTree, DatabaseError> {
        Ok(TagTree::from_edges(tags::edges(conn).await?))
    }

    async fn photo_record(&self, id: PhotoId) -> Result<PhotoRecord, CanopyError> {
        let mut conn = self.conn().await?;
        photos::record(&mut conn, id)
            .await?
            .ok_or(CanopyError::PhotoNotFound(id))
    }

    /// Resolves the explicit tags and adds all of their ancestors.
    ///
    /// Returns `(explicit, all)`. With no explicit tags, ROOT is the one.
    async fn propagate(
        &self,
        conn: &mut SqliteConnection,
        explicit_tags: &[TagSelector],
    ) -> Result<(BTreeSet<TagId>, BTreeSet<TagId>), CanopyError> {
        let tree = self.tree(conn).await?;

        let mut explicit = BTreeSet::new();
        for selector in explicit_tags {
            let id = self.resolve(*selector);
            if !tree.contains(id) {
                return Err(CanopyError::TagNotFound(id));
            }
            explicit.insert(id);
        }

        if explicit.is_empty() {
            explicit.insert(self.root_id());
        }

        let all = tree
            .close_over_ancestors(&explicit)
            .map_err(|e| self.inconsistent(e))?;
        Ok((explicit, all))
    }

    /// Recomputes the tags of every photo tagged with `moved` or anything
    /// below it, from their explicit tags and the current tree.
    ///
    /// Returns how many photos were touched.
    async fn retag_subtree(
        &self,
        conn: &mut SqliteConnection,
        moved: TagId,
    ) -> Result<usize, CanopyError> {
        let tree = self.tree(conn).await?;

        let mut subtree = tree.descendants(moved).map_err(|e| self.inconsistent(e))?;
        subtree.push(moved);

        let affected = photos::ids_with_any_tag(conn, &subtree).await?;
        for photo in &affected {
            let mut explicit = photos::explicit_tags_of(conn, *photo).await?;
            if explicit.is_empty() {
                explicit.insert(self.root_id());
            }

            let all = tree
                .close_over_ancestors(&explicit)
                .map_err(|e| self.inconsistent(e))?;
            photos::set_tags(conn, *photo, &all, &explicit).await?;
        }

        Ok(affected.len())
    }

    /// The stored tags contradict themselves. That should never happen.
    fn inconsistent(&self, e: HierarchyError) -> CanopyError {
        tracing::error!(
            "The tag hierarchy is inconsistent! err: {e}. {}",
            bug_msg(&self.config.bug_report_repo)
        );
        e.into()
    }

    /// Deletes the files of photos that no longer exist.
    async fn release_files(&self, records: &[PhotoRecord]) {
        let deletions = records
            .iter()
            .map(|record| self.release_file(&record.file_name, &record.kind));
        futures::future::join_all(deletions).await;
    }

    /// The database no longer points at these files, so failing to delete
    /// them only leaves clutter behind.
    async fn release_file(&self, file_name: &str, kind: &str) {
        if let Err(e) = self.assets.delete(file_name, kind).await {
            tracing::warn!("Left image files for `{file_name}` behind. err: {e}");
        }
    }
}

async fn require_tag(conn: &mut SqliteConnection, id: TagId) -> Result<Tag, CanopyError> {
    tags::get(conn, id)
        .await?
        .ok_or(CanopyError::TagNotFound(id))
}

async fn commit(tx: Transaction<'static, Sqlite>) -> Result<(), DatabaseError> {
    tx.commit()
        .await
        .inspect_err(|e| tracing::error!("Failed to commit transaction! err: {e}"))
        .map_err(DatabaseError::QueryFailed)
}

/// Writes the photo row and its memberships, then commits.
async fn save_photo(
    mut tx: Transaction<'static, Sqlite>,
    existing: Option<PhotoId>,
    fields: &NewPhoto,
    tags: &BTreeSet<TagId>,
    explicit: &BTreeSet<TagId>,
) -> Result<PhotoId, CanopyError> {
    let id = match existing {
        Some(id) => {
            photos::update(&mut tx, id, fields).await?;
            id
        }
        None => photos::insert(&mut tx, fields).await?,
    };

    photos::set_tags(&mut tx, id, tags, explicit).await?;
    commit(tx).await?;
    Ok(id)
}

fn validate_name(name: &str) -> Result<(), CanopyError> {
    if name.trim().is_empty() {
        return Err(CanopyError::InvalidRequest(
            "tag names can't be empty".into(),
        ));
    }
    Ok(())
}

/// Checks an upload and works out everything about it, without touching the
/// disk or the database.
async fn prepare(upload: Upload) -> Result<PreparedImage, CanopyError> {
    if upload.bytes.is_empty() {
        tracing::info!("No image to store found for photo. The uploaded file is empty.");
        return Err(CanopyError::InvalidRequest(
            "the uploaded image is empty".into(),
        ));
    }

    let sniffed = infer::get(&upload.bytes)
        .filter(|t| t.matcher_type() == infer::MatcherType::Image)
        .ok_or_else(|| {
            tracing::info!("Upload `{}` doesn't look like an image.", upload.file_name);
            CanopyError::InvalidRequest(format!("`{}` is not an image", upload.file_name))
        })?;

    let (original_name, extension) = upload.split_name();
    let kind = pick_extension(extension.as_deref(), sniffed.extension());

    let date_created = exif::capture_date_blocking(upload.bytes.clone())
        .await
        .unwrap_or_else(Utc::now);

    Ok(PreparedImage {
        bytes: upload.bytes,
        file_name: Uuid::new_v4().to_string(),
        original_name,
        kind,
        date_created,
    })
}

/// Chooses the extension a stored image gets.
///
/// The uploaded one is kept (lower-cased) only if it's a plain alphanumeric
/// word naming the same format as the sniffed bytes. Otherwise the sniffed
/// extension wins.
fn pick_extension(uploaded: Option<&str>, sniffed: &str) -> String {
    let Some(uploaded) = uploaded
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
    else {
        return sniffed.to_string();
    };

    let same_format = match (
        ImageFormat::from_extension(&uploaded),
        ImageFormat::from_extension(sniffed),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => uploaded == sniffed,
    };

    if same_format {
        uploaded
    } else {
        tracing::debug!("Upload claimed to be `.{uploaded}`, but it's `.{sniffed}`. Using that.");
        sniffed.to_string()
    }
}
