//! Image tag matching.

use crate::container::ImageSummary;

/// Default tag the daemon applies to untagged references.
pub const DEFAULT_TAG: &str = "latest";

/// Add `:latest` to a reference without a tag or digest.
///
/// The daemon reports repo tags fully qualified (`couchbase:latest`), so an
/// untagged reference would otherwise never match and trigger a pull on
/// every run.
pub fn normalize_image_reference(image: &str) -> String {
    if image.contains('@') {
        return image.to_string();
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if last_segment.contains(':') {
        image.to_string()
    } else {
        format!("{}:{}", image, DEFAULT_TAG)
    }
}

/// First image carrying a repo tag equal to `image` (after normalization).
pub fn find_image<'a>(images: &'a [ImageSummary], image: &str) -> Option<&'a ImageSummary> {
    let wanted = normalize_image_reference(image);
    images
        .iter()
        .find(|summary| summary.repo_tags.iter().any(|tag| *tag == wanted))
}
