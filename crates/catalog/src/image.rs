//! Image identity.
//!
//! Images are compared by content identity rather than by URL: WooCommerce
//! re-hosts every pushed image under its own media URL, so storefront URLs
//! never match the ERP ones.

use sha2::{Digest, Sha256};

use crate::record::ImageRef;

impl ImageRef {
    /// Stable identity of the asset: the ERP content hash when known, else a
    /// SHA-256 of the source URL.
    pub fn fingerprint(&self) -> String {
        match self.content_hash.as_deref().map(str::trim) {
            Some(hash) if !hash.is_empty() => hash.to_ascii_lowercase(),
            _ => url_fingerprint(&self.url),
        }
    }
}

/// SHA-256 (hex) of a URL, prefixed so it can never collide with a content hash.
pub fn url_fingerprint(url: &str) -> String {
    format!("url-sha256:{:x}", Sha256::digest(url.trim().as_bytes()))
}

/// Ordered fingerprints of an image list.
pub fn fingerprints(images: &[ImageRef]) -> Vec<String> {
    images.iter().map(ImageRef::fingerprint).collect()
}

/// Whether the ERP image list differs from what the storefront shows.
///
/// With a recorded fingerprint list (from the last push) the comparison is by
/// ordered content identity. Without one the storefront images have unknown
/// provenance, so any image on either side counts as changed and the next
/// push establishes the baseline.
pub fn images_changed(
    erp: &[ImageRef],
    recorded: Option<&[String]>,
    wc_image_count: usize,
) -> bool {
    match recorded {
        Some(recorded) => fingerprints(erp) != recorded,
        None => !erp.is_empty() || wc_image_count != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(url: &str, hash: Option<&str>) -> ImageRef {
        ImageRef {
            url: url.to_string(),
            content_hash: hash.map(str::to_string),
        }
    }

    #[test]
    fn content_hash_wins_over_url() {
        let a = img("https://erp/files/a.jpg", Some("ABC123"));
        let b = img("https://cdn/other.jpg", Some("abc123"));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn url_fallback_is_stable_and_prefixed() {
        let a = img("https://erp/files/a.jpg", None);
        assert_eq!(a.fingerprint(), img("https://erp/files/a.jpg", Some("  ")).fingerprint());
        assert!(a.fingerprint().starts_with("url-sha256:"));
        assert_eq!(a.fingerprint().len(), "url-sha256:".len() + 64);
    }

    #[test]
    fn recorded_fingerprints_are_order_sensitive() {
        let erp = vec![img("a", Some("h1")), img("b", Some("h2"))];
        let same = vec!["h1".to_string(), "h2".to_string()];
        let swapped = vec!["h2".to_string(), "h1".to_string()];
        assert!(!images_changed(&erp, Some(&same), 0));
        assert!(images_changed(&erp, Some(&swapped), 2));
    }

    #[test]
    fn without_record_any_image_needs_a_push() {
        let erp = vec![img("https://erp/files/new.jpg", Some("new"))];
        // same count on both sides says nothing about content
        assert!(images_changed(&erp, None, 1));
        assert!(images_changed(&erp, None, 0));
        assert!(images_changed(&[], None, 2));
        assert!(!images_changed(&[], None, 0));
    }
}
