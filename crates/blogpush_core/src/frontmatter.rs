//! Frontmatter parsing and validation.
//!
//! Posts carry a `---` delimited header of `key: value` lines with one list
//! field, `tags`:
//!
//! ```text
//! ---
//! author: jane
//! pubDatetime: 2024-05-01T09:00:00Z
//! modDatetime: 2024-05-02T09:00:00Z
//! title: My Post
//! slug: my-post
//! featured: true
//! draft: false
//! tags:
//!   - rust
//!   - blog
//! description: A short summary
//! ---
//! ## Table of contents
//! ```
//!
//! The parser is deliberately line based rather than full YAML: it accepts
//! exactly what the editor's frontmatter form produces.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Heading every post body must contain.
pub const BODY_MARKER: &str = "## Table of contents";

/// Frontmatter block delimiter.
const DELIMITER: &str = "---";

/// Required fields, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 9] = [
    "author",
    "pubDatetime",
    "modDatetime",
    "title",
    "slug",
    "featured",
    "draft",
    "tags",
    "description",
];

/// A validated frontmatter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frontmatter {
    /// Post author
    pub author: String,
    /// Publish timestamp
    pub pub_datetime: String,
    /// Last-modified timestamp
    pub mod_datetime: String,
    /// Post title
    pub title: String,
    /// URL slug
    pub slug: String,
    /// Featured flag, kept as written
    pub featured: String,
    /// Draft flag, kept as written
    pub draft: String,
    /// Tags, in document order (never empty)
    pub tags: Vec<String>,
    /// Short description
    pub description: String,
}

impl Frontmatter {
    /// Filename stem for the post: the title with spaces replaced by `_`.
    pub fn file_stem(&self) -> String {
        self.title.replace(' ', "_")
    }
}

/// Return the contents of the leading frontmatter block, if there is one.
///
/// The block must open at the very first byte of the text and ends at the next
/// `---`, wherever that appears.
pub fn extract_block(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(DELIMITER)?;
    let end = rest.find(DELIMITER)?;
    Some(&rest[..end])
}

/// Raw fields parsed out of a frontmatter block.
#[derive(Debug, Default)]
struct RawFields {
    scalars: HashMap<String, String>,
    tags: Option<Vec<String>>,
}

fn parse_block(block: &str) -> RawFields {
    let lines: Vec<&str> = block
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut fields = RawFields::default();
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        idx += 1;

        if line.starts_with("tags:") {
            let mut tags = Vec::new();
            while let Some(item) = lines.get(idx).and_then(|l| l.strip_prefix('-')) {
                let item = item.trim();
                if !item.is_empty() {
                    tags.push(item.to_string());
                }
                idx += 1;
            }
            fields.tags = Some(tags);
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                fields
                    .scalars
                    .insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    fields
}

/// Validate a full document and return its frontmatter.
///
/// Checks run in a fixed order: the block itself, then each entry of
/// [`REQUIRED_FIELDS`], then the [`BODY_MARKER`] anywhere in `text`.
pub fn validate(text: &str) -> Result<Frontmatter, ValidationError> {
    let block = extract_block(text).ok_or(ValidationError::MissingFrontmatter)?;
    let mut fields = parse_block(block);

    for field in REQUIRED_FIELDS {
        if field == "tags" {
            match &fields.tags {
                None => return Err(ValidationError::MissingField(field.to_string())),
                Some(tags) if tags.is_empty() => {
                    return Err(ValidationError::EmptyField(field.to_string()));
                }
                Some(_) => {}
            }
            continue;
        }
        match fields.scalars.get(field) {
            None => return Err(ValidationError::MissingField(field.to_string())),
            Some(value) if value.is_empty() => {
                return Err(ValidationError::EmptyField(field.to_string()));
            }
            Some(_) => {}
        }
    }

    if !text.contains(BODY_MARKER) {
        return Err(ValidationError::MissingBodyMarker(BODY_MARKER));
    }

    let mut take = |key: &str| fields.scalars.remove(key).unwrap_or_default();
    Ok(Frontmatter {
        author: take("author"),
        pub_datetime: take("pubDatetime"),
        mod_datetime: take("modDatetime"),
        title: take("title"),
        slug: take("slug"),
        featured: take("featured"),
        draft: take("draft"),
        description: take("description"),
        tags: fields.tags.unwrap_or_default(),
    })
}

/// Current time formatted for the datetime fields.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Form fields for generating a frontmatter block.
///
/// Unlike [`Frontmatter`] nothing here is required; blank fields render as
/// blank values and are caught later by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontmatterDraft {
    /// Post author
    pub author: String,
    /// Publish timestamp
    pub pub_datetime: String,
    /// Last-modified timestamp
    pub mod_datetime: String,
    /// Post title
    pub title: String,
    /// URL slug
    pub slug: String,
    /// Featured flag
    pub featured: String,
    /// Draft flag
    pub draft: String,
    /// Comma-separated tags
    pub tags: String,
    /// Short description
    pub description: String,
}

impl Default for FrontmatterDraft {
    fn default() -> Self {
        Self {
            author: String::new(),
            pub_datetime: String::new(),
            mod_datetime: String::new(),
            title: String::new(),
            slug: String::new(),
            featured: "true".to_string(),
            draft: "false".to_string(),
            tags: String::new(),
            description: String::new(),
        }
    }
}

impl FrontmatterDraft {
    /// Set both datetime fields to now.
    pub fn stamp_now(&mut self) {
        let now = now_timestamp();
        self.pub_datetime = now.clone();
        self.mod_datetime = now;
    }

    /// Render the draft as a frontmatter block, including the trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        let mut line = |key: &str, value: &str| {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        };
        line("author", &self.author);
        line("pubDatetime", &self.pub_datetime);
        line("modDatetime", &self.mod_datetime);
        line("title", &self.title);
        line("slug", &self.slug);
        line("featured", &self.featured);
        line("draft", &self.draft);

        out.push_str("tags:\n");
        for tag in self.tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            out.push_str("  - ");
            out.push_str(tag);
            out.push('\n');
        }
        out.push_str("description: ");
        out.push_str(&self.description);
        out.push_str("\n---\n");
        out
    }
}
