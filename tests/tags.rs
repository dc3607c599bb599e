//! Tests for the tag tree: creating, moving, browsing, and cascading deletes.

mod common;

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use canopy::{
        error::{CanopyError, HierarchyError},
        library::Library,
        models::{NewTag, Page, Tag, TagId, TagSelector, Upload, ROOT_TAG_NAME},
    };

    use crate::common::{self, png, setup};

    /// ROOT -> Vacation -> Beach, plus Mountain under Vacation.
    async fn vacation_tree(library: &Library) -> (Tag, Tag, Tag) {
        let vacation = library
            .create_tag(NewTag::new("Vacation", "event").under(library.root_id()))
            .await
            .unwrap();
        let beach = library
            .create_tag(NewTag::new("Beach", "place").under(vacation.id))
            .await
            .unwrap();
        let mountain = library
            .create_tag(NewTag::new("Mountain", "place").under(vacation.id))
            .await
            .unwrap();

        (vacation, beach, mountain)
    }

    fn ids(tags: &[Tag]) -> Vec<TagId> {
        tags.iter().map(|t| t.id).collect()
    }

    #[tokio::test]
    async fn root_exists_and_is_aliased() {
        let s = setup().await;
        let library = &s.library;

        let root = library.get_tag(TagSelector::Root).await.unwrap();
        assert_eq!(root.name, ROOT_TAG_NAME);
        assert_eq!(root.parent_id, None);
        assert!(root.is_root());
        assert_eq!(root.id, library.root_id());

        // routing id 0 means ROOT
        let aliased = library.get_tag(TagSelector::from(0)).await.unwrap();
        assert_eq!(aliased, root);
        assert_ne!(root.id, TagId(0), "0 is never a real id");
    }

    #[tokio::test]
    async fn root_survives_reopening() -> anyhow::Result<()> {
        let s = setup().await;
        let (vacation, _, _) = vacation_tree(&s.library).await;

        let reopened = Library::open(s.library.config().clone()).await?;
        assert_eq!(reopened.root_id(), s.library.root_id());
        assert_eq!(reopened.get_tag(vacation.id.into()).await?, vacation);

        // and there's still exactly one ROOT
        let roots = reopened
            .list_tags(Page::new(0, 100))
            .await?
            .into_iter()
            .filter(|t| t.name == ROOT_TAG_NAME)
            .count();
        assert_eq!(roots, 1);

        Ok(())
    }

    #[tokio::test]
    async fn children_are_direct_only() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, mountain) = vacation_tree(library).await;
        let sunset = library
            .create_tag(NewTag::new("Sunset", "mood").under(beach.id))
            .await
            .unwrap();

        assert_eq!(
            ids(&library.list_children(vacation.id.into()).await.unwrap()),
            vec![beach.id, mountain.id]
        );
        assert_eq!(
            ids(&library.list_children(TagSelector::Root).await.unwrap()),
            vec![vacation.id]
        );
        assert_eq!(
            ids(&library.list_children(beach.id.into()).await.unwrap()),
            vec![sunset.id]
        );
        assert!(library
            .list_children(sunset.id.into())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn descendants_and_ancestors() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, mountain) = vacation_tree(library).await;
        let sunset = library
            .create_tag(NewTag::new("Sunset", "mood").under(beach.id))
            .await
            .unwrap();

        let descendants: BTreeSet<_> = ids(
            &library
                .list_descendant_tags(vacation.id.into())
                .await
                .unwrap(),
        )
        .into_iter()
        .collect();
        assert_eq!(
            descendants,
            BTreeSet::from([beach.id, mountain.id, sunset.id])
        );

        // breadcrumbs: nearest first
        assert_eq!(
            ids(&library.list_ancestor_tags(sunset.id.into()).await.unwrap()),
            vec![beach.id, vacation.id, library.root_id()]
        );
        assert!(library
            .list_ancestor_tags(TagSelector::Root)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_tags_are_not_found() {
        let s = setup().await;
        let library = &s.library;
        let missing = TagSelector::Id(TagId(4242));

        assert!(matches!(
            library.get_tag(missing).await,
            Err(CanopyError::TagNotFound(TagId(4242)))
        ));
        assert!(matches!(
            library.list_children(missing).await,
            Err(CanopyError::TagNotFound(_))
        ));
        assert!(matches!(
            library.delete_tag(missing).await,
            Err(CanopyError::TagNotFound(_))
        ));
        assert!(matches!(
            library
                .create_tag(NewTag::new("Orphan", "").under(TagId(4242)))
                .await,
            Err(CanopyError::TagNotFound(_))
        ));
    }

    #[tokio::test]
    async fn sibling_names_are_unique() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, _) = vacation_tree(library).await;

        assert!(matches!(
            library
                .create_tag(NewTag::new("Beach", "place").under(vacation.id))
                .await,
            Err(CanopyError::DuplicateTagName { .. })
        ));

        // same name, different parent is fine
        library
            .create_tag(NewTag::new("Beach", "place").under(library.root_id()))
            .await
            .expect("a cousin may share a name");

        // ROOT's name is taken at the top level
        assert!(matches!(
            library.create_tag(NewTag::new(ROOT_TAG_NAME, "")).await,
            Err(CanopyError::DuplicateTagName { .. })
        ));

        // renaming onto a sibling is refused, but keeping your own name isn't
        let mut renamed = beach.clone();
        renamed.name = "Mountain".into();
        assert!(matches!(
            library.update_tag(renamed).await,
            Err(CanopyError::DuplicateTagName { .. })
        ));

        let mut retyped = beach.clone();
        retyped.kind = "location".into();
        assert_eq!(library.update_tag(retyped.clone()).await.unwrap(), retyped);
    }

    #[tokio::test]
    async fn empty_names_are_rejected() {
        let s = setup().await;

        assert!(matches!(
            s.library.create_tag(NewTag::new("  ", "place")).await,
            Err(CanopyError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn moving_tags() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, mountain) = vacation_tree(library).await;
        let sunset = library
            .create_tag(NewTag::new("Sunset", "mood").under(beach.id))
            .await
            .unwrap();

        // under itself, or under its own descendant: both loops
        for new_parent in [vacation.id, sunset.id] {
            let mut moved = vacation.clone();
            moved.parent_id = Some(new_parent);
            assert!(
                matches!(
                    library.update_tag(moved).await,
                    Err(CanopyError::HierarchyError(HierarchyError::CycleDetected(_)))
                ),
                "moving under `{new_parent}` must be refused"
            );
        }

        // a legit move
        let mut moved = sunset.clone();
        moved.parent_id = Some(mountain.id);
        library.update_tag(moved).await.unwrap();
        assert_eq!(
            ids(&library.list_ancestor_tags(sunset.id.into()).await.unwrap()),
            vec![mountain.id, vacation.id, library.root_id()]
        );
    }

    #[tokio::test]
    async fn photos_follow_moved_tags() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, mountain) = vacation_tree(library).await;
        let sunset = library
            .create_tag(NewTag::new("Sunset", "mood").under(beach.id))
            .await
            .unwrap();
        let family = library
            .create_tag(NewTag::new("Family", "people").under(library.root_id()))
            .await
            .unwrap();

        let on_beach = library
            .create_photo(Upload::new("a.png", png(8, 8)), &[beach.id.into()], None)
            .await
            .unwrap();
        let at_sunset = library
            .create_photo(Upload::new("b.png", png(8, 8)), &[sunset.id.into()], None)
            .await
            .unwrap();
        let elsewhere = library
            .create_photo(Upload::new("c.png", png(8, 8)), &[vacation.id.into()], None)
            .await
            .unwrap();

        let mut moved = beach.clone();
        moved.parent_id = Some(family.id);
        library.update_tag(moved).await.unwrap();

        let root = library.root_id();
        assert_eq!(
            library.get_photo(on_beach.id).await.unwrap().tags,
            BTreeSet::from([beach.id, family.id, root])
        );
        assert_eq!(
            library.get_photo(at_sunset.id).await.unwrap().tags,
            BTreeSet::from([sunset.id, beach.id, family.id, root])
        );
        assert_eq!(
            library.get_photo(elsewhere.id).await.unwrap().tags,
            BTreeSet::from([vacation.id, root])
        );

        // the listings agree
        let page = Page::new(0, 100);
        let by_family = library
            .list_photos_by_tag(family.id.into(), page)
            .await
            .unwrap();
        assert_eq!(by_family.total, 2);
        assert_eq!(
            library
                .photos_of_tag(vacation.id.into())
                .await
                .unwrap(),
            BTreeSet::from([elsewhere.id])
        );

        // and a later cascade works off the new tree
        let deleted = library.delete_tag(vacation.id.into()).await.unwrap();
        assert_eq!(deleted, BTreeSet::from([vacation.id, mountain.id]));
        assert_eq!(
            library.get_photo(on_beach.id).await.unwrap().tags,
            BTreeSet::from([beach.id, family.id, root])
        );
        assert!(matches!(
            library.get_photo(elsewhere.id).await,
            Err(CanopyError::PhotoNotFound(_))
        ));
    }

    /// Renaming keeps the parent, so nobody's tags change.
    #[tokio::test]
    async fn renaming_leaves_photos_alone() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, _) = vacation_tree(library).await;

        let photo = library
            .create_photo(Upload::new("a.png", png(8, 8)), &[beach.id.into()], None)
            .await
            .unwrap();

        let mut renamed = beach.clone();
        renamed.name = "Seaside".into();
        library.update_tag(renamed).await.unwrap();

        assert_eq!(
            library.get_photo(photo.id).await.unwrap().tags,
            BTreeSet::from([beach.id, vacation.id, library.root_id()])
        );
    }

    #[tokio::test]
    async fn root_is_immutable() {
        let s = setup().await;
        let library = &s.library;

        assert!(matches!(
            library.delete_tag(TagSelector::Root).await,
            Err(CanopyError::RootIsImmutable)
        ));
        assert!(matches!(
            library.delete_tag(library.root_id().into()).await,
            Err(CanopyError::RootIsImmutable)
        ));

        let mut root = library.get_tag(TagSelector::Root).await.unwrap();
        root.name = "TOP".into();
        assert!(matches!(
            library.update_tag(root).await,
            Err(CanopyError::RootIsImmutable)
        ));
    }

    #[tokio::test]
    async fn cascade_deletes_the_whole_subtree() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, mountain) = vacation_tree(library).await;
        let sunset = library
            .create_tag(NewTag::new("Sunset", "mood").under(beach.id))
            .await
            .unwrap();
        let family = library
            .create_tag(NewTag::new("Family", "people").under(library.root_id()))
            .await
            .unwrap();

        let deleted = library.delete_tag(vacation.id.into()).await.unwrap();
        assert_eq!(
            deleted,
            BTreeSet::from([vacation.id, beach.id, mountain.id, sunset.id])
        );

        for gone in &deleted {
            assert!(matches!(
                library.get_tag((*gone).into()).await,
                Err(CanopyError::TagNotFound(_))
            ));
        }

        // the other branch is untouched
        assert_eq!(library.get_tag(family.id.into()).await.unwrap(), family);
        assert_eq!(
            ids(&library.list_children(TagSelector::Root).await.unwrap()),
            vec![family.id]
        );
    }

    #[tokio::test]
    async fn deleting_a_leaf() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, mountain) = vacation_tree(library).await;

        assert_eq!(
            library.delete_tag(beach.id.into()).await.unwrap(),
            BTreeSet::from([beach.id])
        );
        assert_eq!(
            ids(&library.list_children(vacation.id.into()).await.unwrap()),
            vec![mountain.id]
        );
    }

    /// The full example: tag a beach photo, then delete the vacation.
    #[tokio::test]
    async fn vacation_scenario() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, _) = vacation_tree(library).await;

        let photo = library
            .create_photo(Upload::new("p.png", png(40, 30)), &[beach.id.into()], None)
            .await
            .unwrap();
        assert_eq!(
            photo.tags,
            BTreeSet::from([beach.id, vacation.id, library.root_id()])
        );

        let original = s.library.assets().original_path(&photo.file_name, &photo.kind);
        let thumbnail = s
            .library
            .assets()
            .thumbnail_path(&photo.file_name, &photo.kind);
        assert!(original.exists() && thumbnail.exists());

        let deleted = library.delete_tag(vacation.id.into()).await.unwrap();
        assert!(deleted.contains(&vacation.id) && deleted.contains(&beach.id));

        // only ROOT was left, so the photo went with them
        assert!(matches!(
            library.get_photo(photo.id).await,
            Err(CanopyError::PhotoNotFound(_))
        ));
        assert!(!original.exists(), "original should be deleted");
        assert!(!thumbnail.exists(), "thumbnail should be deleted");
        assert!(library
            .photos_of_tag(TagSelector::Root)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn photos_with_other_tags_survive() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, _) = vacation_tree(library).await;
        let family = library
            .create_tag(NewTag::new("Family", "people").under(library.root_id()))
            .await
            .unwrap();
        let grandma = library
            .create_tag(NewTag::new("Grandma", "person").under(family.id))
            .await
            .unwrap();

        let only_beach = library
            .create_photo(Upload::new("a.png", png(8, 8)), &[beach.id.into()], None)
            .await
            .unwrap();
        let beach_and_grandma = library
            .create_photo(
                Upload::new("b.png", png(8, 8)),
                &[beach.id.into(), grandma.id.into()],
                None,
            )
            .await
            .unwrap();

        library.delete_tag(vacation.id.into()).await.unwrap();

        assert!(matches!(
            library.get_photo(only_beach.id).await,
            Err(CanopyError::PhotoNotFound(_))
        ));

        let survivor = library.get_photo(beach_and_grandma.id).await.unwrap();
        assert_eq!(
            survivor.tags,
            BTreeSet::from([grandma.id, family.id, library.root_id()])
        );
        assert!(library
            .get_image(survivor.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn photos_keep_ancestors_when_a_child_goes() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, _) = vacation_tree(library).await;
        let family = library
            .create_tag(NewTag::new("Family", "people").under(library.root_id()))
            .await
            .unwrap();

        let photo = library
            .create_photo(Upload::new("a.png", png(8, 8)), &[beach.id.into()], None)
            .await
            .unwrap();

        library.delete_tag(beach.id.into()).await.unwrap();

        // still tagged with vacation (and ROOT), so it stays
        let kept = library.get_photo(photo.id).await.unwrap();
        assert_eq!(kept.tags, BTreeSet::from([vacation.id, library.root_id()]));

        // vacation now stands in for beach, so the photo moves along with it
        let mut moved = vacation.clone();
        moved.parent_id = Some(family.id);
        library.update_tag(moved).await.unwrap();
        assert_eq!(
            library.get_photo(photo.id).await.unwrap().tags,
            BTreeSet::from([vacation.id, family.id, library.root_id()])
        );
    }

    #[tokio::test]
    async fn failed_cascades_change_nothing() {
        let s = setup().await;
        let library = &s.library;
        let (vacation, beach, mountain) = vacation_tree(library).await;

        let photo = library
            .create_photo(Upload::new("p.png", png(20, 20)), &[beach.id.into()], None)
            .await
            .unwrap();
        let original = library.assets().original_path(&photo.file_name, &photo.kind);
        let thumbnail = library.assets().thumbnail_path(&photo.file_name, &photo.kind);

        // the children go first, then vacation itself refuses to go
        let mut conn = common::raw_connection(&s).await;
        sqlx::query(&format!(
            "CREATE TRIGGER keep_vacation BEFORE DELETE ON tags WHEN OLD.id = {} \
             BEGIN SELECT RAISE(ABORT, 'vacation stays'); END",
            vacation.id
        ))
        .execute(&mut conn)
        .await
        .unwrap();

        assert!(matches!(
            library.delete_tag(vacation.id.into()).await,
            Err(CanopyError::DatabaseError(_))
        ));

        for tag in [&vacation, &beach, &mountain] {
            assert_eq!(&library.get_tag(tag.id.into()).await.unwrap(), tag);
        }

        let still_here = library.get_photo(photo.id).await.unwrap();
        assert_eq!(still_here.tags, photo.tags);
        assert_eq!(
            library.photos_of_tag(beach.id.into()).await.unwrap(),
            BTreeSet::from([photo.id])
        );
        assert!(original.exists() && thumbnail.exists());

        // without the trigger, it goes through
        sqlx::query("DROP TRIGGER keep_vacation")
            .execute(&mut conn)
            .await
            .unwrap();
        library.delete_tag(vacation.id.into()).await.unwrap();
        assert!(!original.exists());
    }
}
