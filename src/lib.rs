/*! # `canopy`

A library crate for organizing photos with a tree of tags.

## Purpose

Each tag has at most one parent, and a distinguished `ROOT` tag sits on top.
Tagging a photo with `Beach` (under `Vacation`) implicitly tags it with
`Vacation` and `ROOT` too, so browsing any tag shows everything below it.

Deleting a tag deletes its whole subtree. Photos that are left with nothing
but `ROOT` afterwards are deleted as well, image files included.

## Layout

- [`library::Library`] is the entry point. It owns everything else.
- [`hierarchy`] holds the tree walks: ancestors, descendants, and the
  post-order used for deletion.
- [`store`] talks to SQLite.
- [`assets`] writes originals and fixed-height thumbnails to disk.

## Usage

```no_run
use canopy::{config::Config, library::Library, models::{NewTag, Upload}};

# async fn run() -> Result<(), canopy::error::CanopyError> {
let library = Library::open(Config::new("/var/lib/canopy", "/var/lib/canopy/source")).await?;

let vacation = library
    .create_tag(NewTag::new("Vacation", "event").under(library.root_id()))
    .await?;
let beach = library
    .create_tag(NewTag::new("Beach", "place").under(vacation.id))
    .await?;

let bytes = std::fs::read("beach.jpg").unwrap();
let photo = library
    .create_photo(Upload::new("beach.jpg", bytes), &[beach.id.into()], None)
    .await?;
assert!(photo.tags.contains(&vacation.id));
# Ok(())
# }
```
*/

pub mod assets;
pub mod config;
pub mod database;
pub mod error;
pub mod hierarchy;
pub mod library;
pub mod models;
pub mod store;
