//! Error types for blogpush.
//!
//! Every failure is terminal for the attempt that produced it. Nothing here is
//! retried automatically; callers report the error and let the user try again.

use thiserror::Error;

/// Why a document was refused before publishing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The text does not start with a `---` delimited block.
    #[error("frontmatter block is missing")]
    MissingFrontmatter,

    /// A required frontmatter field is absent.
    #[error("frontmatter field `{0}` is missing")]
    MissingField(String),

    /// A required frontmatter field is present but blank.
    #[error("frontmatter field `{0}` is empty")]
    EmptyField(String),

    /// The body does not contain the marker heading.
    #[error("document does not contain \"{0}\"")]
    MissingBodyMarker(&'static str),
}

/// Errors raised by the publish pipeline.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No bearer token was supplied and no fallback token is configured.
    #[error("GitHub access token is missing")]
    AuthRequired,

    /// GitHub rejected an image commit.
    #[error("image push failed with status {status}")]
    ImagePushFailed {
        /// Upstream HTTP status
        status: u16,
        /// Upstream response body
        body: serde_json::Value,
    },

    /// GitHub rejected the markdown commit.
    #[error("markdown push failed with status {status}")]
    MarkdownPushFailed {
        /// Upstream HTTP status
        status: u16,
        /// Upstream response body
        body: serde_json::Value,
    },

    /// The remote file changed since its revision marker was captured.
    #[error("remote file changed: expected revision {expected}, found {current}")]
    RevisionConflict {
        /// Revision marker the caller edited against
        expected: String,
        /// Revision marker currently on the remote
        current: String,
    },

    /// The repository target is incomplete.
    #[error("repository target is missing `{0}`")]
    InvalidTarget(&'static str),

    /// The document failed frontmatter validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Any other upstream response that could not be used.
    #[error("unexpected upstream response ({status}): {message}")]
    Upstream {
        /// Upstream HTTP status
        status: u16,
        /// What went wrong
        message: String,
    },

    /// The HTTP transport failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl PublishError {
    /// Upstream status and body when the error mirrors a GitHub response.
    pub fn upstream(&self) -> Option<(u16, &serde_json::Value)> {
        match self {
            PublishError::ImagePushFailed { status, body }
            | PublishError::MarkdownPushFailed { status, body } => Some((*status, body)),
            _ => None,
        }
    }
}

/// Errors raised by the editor session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A cursor or selection does not address a char boundary of the text.
    #[error("invalid cursor range {start}..{end} for text of length {len}")]
    InvalidCursor {
        /// Selection start (bytes)
        start: usize,
        /// Selection end (bytes)
        end: usize,
        /// Text length (bytes)
        len: usize,
    },

    /// The snapshot store could not be read or written.
    #[error("snapshot store error: {0}")]
    Store(#[from] std::io::Error),

    /// A snapshot record was not valid JSON.
    #[error("snapshot record is malformed: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Remote file content could not be decoded into text.
    #[error("remote file could not be decoded: {0}")]
    Decode(String),

    /// Fetching the remote file failed.
    #[error(transparent)]
    Remote(#[from] PublishError),
}

/// Errors raised when handing an image to the upload relay.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The file is not image content; nothing was transferred.
    #[error("only image files can be uploaded ({0})")]
    NotAnImage(String),

    /// The relay refused the upload.
    #[error("upload rejected with status {status}: {body}")]
    Rejected {
        /// Relay HTTP status
        status: u16,
        /// Relay response body
        body: String,
    },

    /// The HTTP transport failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The file could not be read.
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}
