//! Reads when a photo was taken from its EXIF data, using `kamadak_exif`.

use std::io::Cursor;

use chrono::{DateTime, NaiveDate, Utc};
use kamadak_exif::{In, Tag, Value};

/// Looks for a capture date in the given image bytes.
///
/// `DateTimeOriginal` is preferred, then the plain `DateTime` field. Images
/// without EXIF (or with garbage in it) just return `None`.
pub fn capture_date(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let exif = kamadak_exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .inspect_err(|e| tracing::debug!("No usable EXIF data in image. err: {e}"))
        .ok()?;

    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
        .find_map(|field| match field.value {
            Value::Ascii(ref lines) => lines.first().and_then(|line| parse(line)),
            _ => None,
        })
}

/// Like [`capture_date`], but runs on a blocking thread.
pub async fn capture_date_blocking(bytes: Vec<u8>) -> Option<DateTime<Utc>> {
    tokio::task::spawn_blocking(move || capture_date(&bytes))
        .await
        .inspect_err(|e| tracing::warn!("EXIF task panicked! err: {e}"))
        .ok()
        .flatten()
}

/// EXIF dates look like `2016:09:23 16:07:28`, with no time zone.
fn parse(ascii: &[u8]) -> Option<DateTime<Utc>> {
    let dt = kamadak_exif::DateTime::from_ascii(ascii)
        .inspect_err(|e| tracing::debug!("Malformed EXIF date. err: {e}"))
        .ok()?;

    NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))?
        .and_hms_opt(
            u32::from(dt.hour),
            u32::from(dt.minute),
            u32::from(dt.second),
        )
        .map(|naive| naive.and_utc())
}
