//! Markdown image reference scanning and link rewriting.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Path segment marking an image served by the upload relay.
pub const LOCAL_SEGMENT: &str = "/uploads/";

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[(.*?)\]\((.*?)\)").expect("valid image regex"));

/// A markdown image: `![alt](url)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Alt text
    pub alt: String,
    /// Link target exactly as written
    pub url: String,
}

impl ImageRef {
    /// Whether the image is served from `segment` (normally [`LOCAL_SEGMENT`]).
    pub fn is_locally_hosted(&self, segment: &str) -> bool {
        self.url.contains(segment)
    }

    /// Last path component of the URL, ignoring any query or fragment.
    pub fn file_name(&self) -> &str {
        file_name(&self.url)
    }
}

/// Every markdown image in `text`, in document order.
pub fn find_images(text: &str) -> Vec<ImageRef> {
    IMAGE_RE
        .captures_iter(text)
        .map(|caps| ImageRef {
            alt: caps[1].to_string(),
            url: caps[2].to_string(),
        })
        .collect()
}

/// Locally hosted images in `text`, one entry per distinct URL.
pub fn local_images(text: &str, segment: &str) -> Vec<ImageRef> {
    let mut seen = HashSet::new();
    find_images(text)
        .into_iter()
        .filter(|img| img.is_locally_hosted(segment))
        .filter(|img| seen.insert(img.url.clone()))
        .collect()
}

/// Replace the link target of every `![alt](url)` whose `url` is a key of
/// `targets`. Text outside image links is left untouched.
pub fn rewrite_images(text: &str, targets: &HashMap<String, String>) -> String {
    IMAGE_RE
        .replace_all(text, |caps: &regex::Captures<'_>| match targets.get(&caps[2]) {
            Some(target) => format!("![{}]({})", &caps[1], target),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Last path component of a URL, ignoring any query or fragment.
pub fn file_name(url: &str) -> &str {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    let path = path.trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

/// Permanent URL of a file committed to a repository's `main` branch.
pub fn permanent_url(host: &str, owner: &str, repo: &str, dir: &str, file_name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        format!("https://{host}/{owner}/{repo}/blob/main/{file_name}?raw=true")
    } else {
        format!("https://{host}/{owner}/{repo}/blob/main/{dir}/{file_name}?raw=true")
    }
}
