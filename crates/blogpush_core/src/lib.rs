//! # `blogpush_core`
//!
//! Shared code for the blogpush editor and upload proxy.
//!
//! A post travels through this crate in a fixed order:
//! 1. [`session`] holds the text being edited and mirrors it to local storage.
//! 2. [`frontmatter`] gates submission on a complete metadata header.
//! 3. [`publish`] re-homes locally hosted images and commits the markdown file
//!    through the GitHub Contents API ([`github`]).
//!
//! [`client`] is the editor side of the upload proxy, and [`templates`] holds
//! the snippets the editor toolbar inserts.

#![warn(missing_docs)]

/// Editor-side client for the upload proxy
pub mod client;

/// Error types
pub mod error;

/// Frontmatter parsing and validation
pub mod frontmatter;

/// GitHub Contents API access
pub mod github;

/// Markdown image reference scanning
pub mod images;

/// The publish pipeline
pub mod publish;

/// Editor session state
pub mod session;

/// Snippets for the editor toolbar
pub mod templates;

pub use error::{PublishError, SessionError, UploadError, ValidationError};
pub use frontmatter::{BODY_MARKER, Frontmatter, validate};
pub use publish::{PublishRequest, Publisher, PublisherConfig, RepositoryTarget};
pub use session::{EditorSession, SnapshotStore};
