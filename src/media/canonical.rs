//! WordPress upload URL canonicalization.
//!
//! WordPress generates resized copies of every uploaded image by appending
//! `-WxH` to the filename, and a `-scaled` copy for very large originals.
//! Canonicalization collapses those suffixes so all variants share one dedup
//! key. Query strings and fragments are always stripped. Non-image assets
//! keep their filenames untouched since WordPress never resizes them.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "avif", "svg"];

fn dimension_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\d+x\d+$").unwrap())
}

/// Canonicalize an upload URL. Pure and idempotent: re-canonicalizing a
/// canonical URL is a no-op.
pub fn canonicalize(source_url: &str) -> String {
    let mut url = match Url::parse(source_url) {
        Ok(u) => u,
        // Not parseable as an absolute URL; strip query/hash textually.
        Err(_) => {
            let s = source_url.split(['?', '#']).next().unwrap_or(source_url);
            return s.to_string();
        }
    };
    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().to_string();
    let (dir, filename) = match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path.as_str()),
    };
    let (stem, ext) = match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], &filename[idx + 1..]),
        _ => return url.to_string(),
    };

    if !IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        return url.to_string();
    }

    // Variant suffixes can stack (a resized copy of a scaled original);
    // strip until the stem is stable.
    let mut stem = stem.to_string();
    loop {
        let stripped = dimension_suffix().replace(&stem, "").into_owned();
        let stripped = stripped
            .strip_suffix("-scaled")
            .map(str::to_string)
            .unwrap_or(stripped);
        if stripped == stem || stripped.is_empty() {
            break;
        }
        stem = stripped;
    }

    url.set_path(&format!("{dir}{stem}.{ext}"));
    url.to_string()
}

/// The path of an upload relative to WordPress's uploads directory, used as
/// the storage key suffix. `None` when the URL is not an uploads URL.
pub fn upload_relative_path(canonical_url: &str) -> Option<String> {
    let url = Url::parse(canonical_url).ok()?;
    let path = url.path();
    let idx = path.find("/wp-content/uploads/")?;
    let rel = &path[idx + "/wp-content/uploads/".len()..];
    if rel.is_empty() {
        return None;
    }
    Some(rel.trim_start_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent() {
        let inputs = [
            "https://x.example/wp-content/uploads/2020/05/img-300x200.jpg",
            "https://x.example/wp-content/uploads/doc.pdf?dl=1",
            "https://x.example/wp-content/uploads/clip.mp4#t=3",
        ];
        for input in inputs {
            let once = canonicalize(input);
            assert_eq!(canonicalize(&once), once);
        }
    }

    #[test]
    fn test_collapses_size_variants() {
        assert_eq!(
            canonicalize("https://x.example/img-300x200.jpg"),
            "https://x.example/img.jpg"
        );
        assert_eq!(
            canonicalize("https://x.example/img-1024x768-scaled.jpg"),
            "https://x.example/img.jpg"
        );
        assert_eq!(
            canonicalize("https://x.example/img-scaled.jpg"),
            "https://x.example/img.jpg"
        );
    }

    #[test]
    fn test_variants_share_one_key() {
        let a = canonicalize("https://x.example/photo-150x150.jpg");
        let b = canonicalize("https://x.example/photo-1024x768.jpg");
        assert_eq!(a, b);
        assert!(a.ends_with("/photo.jpg"));
    }

    #[test]
    fn test_non_image_passthrough() {
        assert_eq!(
            canonicalize("https://x.example/video.mp4?v=2"),
            "https://x.example/video.mp4"
        );
        // Dimension-shaped names on non-images are left alone.
        assert_eq!(
            canonicalize("https://x.example/render-300x200.mp4"),
            "https://x.example/render-300x200.mp4"
        );
    }

    #[test]
    fn test_strips_query_and_fragment() {
        assert_eq!(
            canonicalize("https://x.example/a/b-640x480.png?cache=9#top"),
            "https://x.example/a/b.png"
        );
    }

    #[test]
    fn test_upload_relative_path() {
        assert_eq!(
            upload_relative_path("https://x.example/wp-content/uploads/2020/05/img.jpg"),
            Some("2020/05/img.jpg".to_string())
        );
        assert_eq!(upload_relative_path("https://x.example/about/"), None);
    }
}
