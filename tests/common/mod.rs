//! The parent of the other tests.
//!
//! Mostly to import the setup stuff below.

use std::io::Cursor;

use camino::Utf8PathBuf;
use canopy::{config::Config, library::Library};
use image::{DynamicImage, ImageFormat, RgbImage};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions as _, SqliteConnection};
use temp_dir::TempDir;

/// A library in its own temporary folder.
///
/// The folder is removed when this is dropped, so keep it around for the
/// whole test!
#[allow(dead_code, reason = "it's used in the other tests")]
pub struct Setup {
    pub library: Library,
    pub dir: TempDir,
}

impl Setup {
    #[allow(dead_code, reason = "it's used in the other tests")]
    pub fn image_root(&self) -> Utf8PathBuf {
        self.library.assets().root().to_path_buf()
    }
}

/// call this at the top of any new test func! :)
#[allow(dead_code, reason = "it's used in the other tests")]
pub async fn setup() -> Setup {
    setup_with(|_| ()).await
}

/// Like [`setup`], but lets the test tweak the config first.
#[allow(dead_code, reason = "it's used in the other tests")]
pub async fn setup_with(configure: impl FnOnce(&mut Config)) -> Setup {
    logging();

    let dir = TempDir::new().expect("make temp dir");
    let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir is utf-8");

    let mut config = Config::new(base.join("data"), base.join("source"));
    configure(&mut config);
    let library = Library::open(config).await.expect("open library");

    Setup { library, dir }
}

/// A separate connection to the library's database, for poking at it
/// behind the library's back.
#[allow(dead_code, reason = "it's used in the other tests")]
pub async fn raw_connection(setup: &Setup) -> SqliteConnection {
    SqliteConnectOptions::new()
        .filename(setup.library.config().database_path())
        .connect()
        .await
        .expect("connect to the library's database")
}

/// Starts logging. Only the first call in each test binary does anything.
#[allow(dead_code, reason = "it's used in the other tests")]
pub fn logging() {
    _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Encodes a blank image of the given size.
#[allow(dead_code, reason = "it's used in the other tests")]
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

#[allow(dead_code, reason = "it's used in the other tests")]
pub fn png(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Png)
}
