/// Retention rules: which directory entries are eligible, and when they expire.
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// Extensions (lowercase, without the dot) that mark a file as an image.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif"];

/// Timestamp below which a file is expired: `now - retention_days`.
///
/// Returns `None` when the window reaches past the representable range,
/// in which case nothing can be old enough to expire.
pub fn cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(Duration::days(i64::from(retention_days)))
}

/// True iff `modified_at` lies strictly before the cutoff.
///
/// A file modified exactly at the cutoff instant is retained. With
/// `retention_days = 0` the cutoff is `now`, so anything older than the
/// current instant expires.
pub fn is_expired(modified_at: DateTime<Utc>, now: DateTime<Utc>, retention_days: u32) -> bool {
    match cutoff(now, retention_days) {
        Some(cutoff) => modified_at < cutoff,
        None => false,
    }
}

/// True if the path's extension is one of [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_cutoff_subtracts_whole_days() {
        let now = at(2026, 3, 10, 12);
        assert_eq!(cutoff(now, 7), Some(at(2026, 3, 3, 12)));
        assert_eq!(cutoff(now, 0), Some(now));
    }

    #[test]
    fn test_older_than_cutoff_is_expired() {
        let now = at(2026, 3, 10, 12);
        let modified = at(2026, 3, 1, 0);
        assert!(is_expired(modified, now, 7));
    }

    #[test]
    fn test_newer_than_cutoff_is_retained() {
        let now = at(2026, 3, 10, 12);
        let modified = at(2026, 3, 9, 0);
        assert!(!is_expired(modified, now, 7));
    }

    #[test]
    fn test_exactly_at_cutoff_is_retained() {
        let now = at(2026, 3, 10, 12);
        let modified = at(2026, 3, 3, 12);
        assert!(!is_expired(modified, now, 7));
        // One second earlier tips it over
        assert!(is_expired(modified - Duration::seconds(1), now, 7));
    }

    #[test]
    fn test_zero_days_expires_anything_before_now() {
        let now = at(2026, 3, 10, 12);
        assert!(is_expired(now - Duration::milliseconds(1), now, 0));
        assert!(!is_expired(now, now, 0));
    }

    #[test]
    fn test_future_mtime_is_never_expired() {
        let now = at(2026, 3, 10, 12);
        assert!(!is_expired(now + Duration::days(3), now, 0));
    }

    #[test]
    fn test_huge_retention_never_expires() {
        let now = at(2026, 3, 10, 12);
        let ancient = at(1970, 1, 1, 0);
        assert!(!is_expired(ancient, now, u32::MAX));
    }

    #[test]
    fn test_image_extensions_case_insensitive() {
        for name in [
            "a.png", "b.JPG", "c.jpeg", "d.Gif", "e.bmp", "f.TIFF", "g.tif",
        ] {
            assert!(is_image_file(Path::new(name)), "{name} should match");
        }
    }

    #[test]
    fn test_non_images_rejected() {
        for name in [
            "notes.txt",
            "archive.png.zip",
            "raw.webp",
            "png",
            ".png",
            "noext",
            "photo.jp g",
        ] {
            assert!(!is_image_file(Path::new(name)), "{name} should not match");
        }
    }
}
