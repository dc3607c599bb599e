//! Tests for the image files behind each photo.

mod common;

#[cfg(test)]
mod tests {
    use canopy::{
        error::{CanopyError, StorageError},
        models::{Page, Upload},
    };
    use image::ImageFormat;

    use crate::common::{image_bytes, png, setup};

    #[tokio::test]
    async fn thumbnails_are_always_200_tall() {
        let s = setup().await;
        let library = &s.library;

        // (uploaded size, expected thumbnail size)
        let cases = [
            ((600, 400), (300, 200)),
            ((90, 300), (60, 200)),
            ((40, 20), (400, 200)),
            ((200, 200), (200, 200)),
            ((50, 1), (10_000, 200)),
        ];

        for ((w, h), expected) in cases {
            let photo = library
                .create_photo(Upload::new("pic.png", png(w, h)), &[], None)
                .await
                .unwrap();

            let path = library
                .assets()
                .thumbnail_path(&photo.file_name, &photo.kind);
            let got = image::image_dimensions(&path).expect("thumbnail should be readable");
            assert_eq!(got, expected, "wrong thumbnail size for a {w}x{h} image");

            // the original isn't touched
            let original = library.assets().original_path(&photo.file_name, &photo.kind);
            assert_eq!(image::image_dimensions(&original).unwrap(), (w, h));
        }
    }

    #[tokio::test]
    async fn jpeg_thumbnails() {
        let s = setup().await;
        let library = &s.library;

        let photo = library
            .create_photo(
                Upload::new("pic.JPEG", image_bytes(300, 600, ImageFormat::Jpeg)),
                &[],
                None,
            )
            .await
            .unwrap();

        let path = library
            .assets()
            .thumbnail_path(&photo.file_name, &photo.kind);
        assert_eq!(photo.kind, "jpeg");
        assert_eq!(path.extension(), Some("jpeg"));
        assert_eq!(image::image_dimensions(&path).unwrap(), (100, 200));

        let thumbnail = library.get_thumbnail(photo.id).await.unwrap().unwrap();
        assert!(thumbnail.starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn loading_as_data_uris() {
        let s = setup().await;
        let library = &s.library;
        let bytes = png(12, 12);

        let photo = library
            .create_photo(Upload::new("pic.png", bytes.clone()), &[], None)
            .await
            .unwrap();

        let image = library.get_image(photo.id).await.unwrap().unwrap();
        assert_eq!(image, canopy::assets::data_uri("png", &bytes));

        let thumbnail = library.get_thumbnail(photo.id).await.unwrap().unwrap();
        assert!(thumbnail.starts_with("data:image/png;base64,"));
        assert_ne!(thumbnail, image, "thumbnail is a different size");
    }

    #[tokio::test]
    async fn missing_files_load_as_none() {
        let s = setup().await;
        let library = &s.library;

        let photo = library
            .create_photo(Upload::new("pic.png", png(12, 12)), &[], None)
            .await
            .unwrap();

        std::fs::remove_file(
            library
                .assets()
                .thumbnail_path(&photo.file_name, &photo.kind),
        )
        .unwrap();
        assert_eq!(library.get_thumbnail(photo.id).await.unwrap(), None);
        assert!(library.get_image(photo.id).await.unwrap().is_some());

        std::fs::remove_file(library.assets().original_path(&photo.file_name, &photo.kind))
            .unwrap();
        assert_eq!(library.get_image(photo.id).await.unwrap(), None);

        // deleting the photo doesn't mind that the files are gone
        library.delete_photo(photo.id).await.unwrap();
    }

    /// A format we can't make thumbnails for still stores the original.
    #[tokio::test]
    async fn thumbnails_are_best_effort() {
        let s = setup().await;
        let library = &s.library;

        // a photoshop header. sniffs as an image, but `image` can't read it
        let mut psd = b"8BPS".to_vec();
        psd.resize(64, 0);

        let photo = library
            .create_photo(Upload::new("layers.psd", psd), &[], None)
            .await
            .expect("the original can still be stored");
        assert_eq!(photo.kind, "psd");

        assert!(library.get_image(photo.id).await.unwrap().is_some());
        assert_eq!(library.get_thumbnail(photo.id).await.unwrap(), None);
        assert!(!library
            .assets()
            .thumbnail_path(&photo.file_name, &photo.kind)
            .exists());
    }

    /// The stored extension comes from what the bytes actually are.
    #[tokio::test]
    async fn extensions_must_match_the_bytes() {
        let s = setup().await;
        let library = &s.library;

        for name in ["evil.html", "a.b/c", "pic.jpg", "../../escape", "LOUD.PNG"] {
            let photo = library
                .create_photo(Upload::new(name, png(12, 12)), &[], None)
                .await
                .unwrap_or_else(|e| panic!("`{name}` should be stored as a png. err: {e}"));
            assert_eq!(photo.kind, "png", "wrong kind for `{name}`");

            let image = library.get_image(photo.id).await.unwrap().unwrap();
            assert!(image.starts_with("data:image/png;base64,"));
            assert!(library.get_thumbnail(photo.id).await.unwrap().is_some());

            // everything stays inside the image root
            let original = library.assets().original_path(&photo.file_name, &photo.kind);
            assert_eq!(original.parent(), Some(s.image_root().as_path()));
        }
    }

    #[tokio::test]
    async fn failed_writes_store_nothing() {
        let s = setup().await;
        let library = &s.library;

        // swap the image root for a plain file, so nothing can go inside it
        std::fs::remove_dir_all(s.image_root()).unwrap();
        std::fs::write(s.image_root(), b"not a folder").unwrap();

        assert!(matches!(
            library
                .create_photo(Upload::new("pic.png", png(12, 12)), &[], None)
                .await,
            Err(CanopyError::StorageError(StorageError::WriteFailed { .. }))
        ));
        assert_eq!(library.list_photos(Page::default()).await.unwrap().total, 0);
    }
}
