//! Editor session state.
//!
//! An [`EditorSession`] owns the document being edited and mirrors it to a
//! [`SnapshotStore`] after every change, so an accidental reload within
//! [`SNAPSHOT_TTL_MS`] brings the text back. Times are passed in explicitly,
//! which keeps expiry testable.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PublishError, SessionError};
use crate::frontmatter::{BODY_MARKER, FrontmatterDraft};
use crate::github::{ContentsApi, RemoteRef};
use crate::publish::{PublishRequest, RepositoryTarget};
use crate::templates::{self, Template};

/// Key the document is mirrored under.
pub const STORAGE_KEY: &str = "markdown-content";

/// How long a mirrored snapshot stays restorable (thirty minutes).
pub const SNAPSHOT_TTL_MS: i64 = 30 * 60 * 1000;

/// Text of a fresh document.
pub const DEFAULT_TEXT: &str = BODY_MARKER;

/// A mirrored copy of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Document text
    pub value: String,
    /// Write time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Snapshot {
    /// Whether the snapshot is still restorable at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - self.timestamp < SNAPSHOT_TTL_MS
    }
}

/// Keyed storage for snapshots, standing in for the browser's local storage.
pub trait SnapshotStore {
    /// Read the snapshot under `key`.
    fn load(&self, key: &str) -> Result<Option<Snapshot>, SessionError>;

    /// Write the snapshot under `key`, replacing any previous one.
    fn save(&self, key: &str, snapshot: &Snapshot) -> Result<(), SessionError>;

    /// Delete the snapshot under `key`, if any.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// In-memory [`SnapshotStore`].
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    records: Mutex<HashMap<String, Snapshot>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, Snapshot>> {
        // A poisoned map still holds whole snapshots.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Snapshot>, SessionError> {
        Ok(self.records().get(key).cloned())
    }

    fn save(&self, key: &str, snapshot: &Snapshot) -> Result<(), SessionError> {
        self.records().insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.records().remove(key);
        Ok(())
    }
}

/// [`SnapshotStore`] keeping one `<key>.json` file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Store snapshots under `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Snapshot>, SessionError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, snapshot: &Snapshot) -> Result<(), SessionError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), serde_json::to_vec(snapshot)?)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        match std::fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// The markdown buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Raw text
    pub text: String,
    /// Revision marker of the remote file this text was loaded from
    pub revision: Option<String>,
    /// The remote file this text was loaded from
    pub source: Option<RemoteRef>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_string(),
            revision: None,
            source: None,
        }
    }
}

/// A byte range of the document; `start == end` is a plain caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// First selected byte
    pub start: usize,
    /// One past the last selected byte
    pub end: usize,
}

impl Selection {
    /// An empty selection at `pos`.
    pub fn caret(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

/// A live editing session.
#[derive(Debug)]
pub struct EditorSession<S: SnapshotStore> {
    store: S,
    doc: Document,
    selection: Selection,
}

impl<S: SnapshotStore> EditorSession<S> {
    /// Open a session, restoring a snapshot younger than [`SNAPSHOT_TTL_MS`].
    ///
    /// Stale or unreadable snapshots are deleted. The opened document is
    /// mirrored immediately, so a restore refreshes the snapshot's timestamp.
    pub fn open(store: S, now: DateTime<Utc>) -> Result<Self, SessionError> {
        let mut doc = Document::default();
        match store.load(STORAGE_KEY) {
            Ok(Some(snapshot)) if snapshot.is_fresh(now) => {
                debug!("Restored snapshot written at {}", snapshot.timestamp);
                doc.text = snapshot.value;
            }
            Ok(Some(_)) => {
                debug!("Discarding expired snapshot");
                store.remove(STORAGE_KEY)?;
            }
            Ok(None) => {}
            Err(SessionError::Snapshot(e)) => {
                warn!("Discarding malformed snapshot: {}", e);
                store.remove(STORAGE_KEY)?;
            }
            Err(e) => return Err(e),
        }

        let selection = Selection::caret(doc.text.len());
        let session = Self {
            store,
            doc,
            selection,
        };
        session.persist(now)?;
        Ok(session)
    }

    /// Current text.
    pub fn text(&self) -> &str {
        &self.doc.text
    }

    /// Current document.
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current selection.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Move the selection.
    pub fn select(&mut self, selection: Selection) -> Result<(), SessionError> {
        self.check(selection)?;
        self.selection = selection;
        Ok(())
    }

    fn check(&self, sel: Selection) -> Result<(), SessionError> {
        let text = &self.doc.text;
        if sel.start > sel.end
            || sel.end > text.len()
            || !text.is_char_boundary(sel.start)
            || !text.is_char_boundary(sel.end)
        {
            return Err(SessionError::InvalidCursor {
                start: sel.start,
                end: sel.end,
                len: text.len(),
            });
        }
        Ok(())
    }

    fn persist(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.store.save(
            STORAGE_KEY,
            &Snapshot {
                value: self.doc.text.clone(),
                timestamp: now.timestamp_millis(),
            },
        )
    }

    /// Replace the whole text, as a keystroke in the editor does.
    pub fn set_text(
        &mut self,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.doc.text = text.into();
        self.selection = Selection::caret(self.doc.text.len());
        self.persist(now)
    }

    /// Replace `selection` with `text`; returns the new caret position,
    /// `selection.start + text.len()`.
    pub fn insert_at(
        &mut self,
        selection: Selection,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, SessionError> {
        self.check(selection)?;
        self.doc.text.replace_range(selection.start..selection.end, text);
        let caret = selection.start + text.len();
        self.selection = Selection::caret(caret);
        self.persist(now)?;
        Ok(caret)
    }

    /// Replace the current selection with `text`.
    pub fn insert(&mut self, text: &str, now: DateTime<Utc>) -> Result<usize, SessionError> {
        self.insert_at(self.selection, text, now)
    }

    /// Prepend `text` regardless of the selection; the caret ends after it.
    pub fn insert_at_start(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, SessionError> {
        self.insert_at(Selection::caret(0), text, now)
    }

    /// Insert a toolbar snippet at the selection.
    pub fn insert_template(
        &mut self,
        template: Template,
        now: DateTime<Utc>,
    ) -> Result<usize, SessionError> {
        self.insert(template.text(), now)
    }

    /// Insert a generated table at the selection.
    pub fn insert_table(
        &mut self,
        columns: usize,
        now: DateTime<Utc>,
    ) -> Result<usize, SessionError> {
        self.insert(&templates::table(columns), now)
    }

    /// Insert the Tab key's indentation at the selection.
    pub fn insert_tab(&mut self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        self.insert(templates::TAB, now)
    }

    /// Prepend a frontmatter block rendered from `draft`.
    pub fn insert_frontmatter(
        &mut self,
        draft: &FrontmatterDraft,
        now: DateTime<Utc>,
    ) -> Result<usize, SessionError> {
        self.insert_at_start(&draft.render(), now)
    }

    /// Insert a reference to an image the relay accepted. `image_url` is the
    /// absolute URL of the relay path.
    pub fn insert_uploaded_image(
        &mut self,
        image_url: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, SessionError> {
        self.insert(&format!("\n![uploaded image]({image_url})"), now)
    }

    /// Replace the document with an existing repository file, remembering its
    /// revision marker for a later update.
    pub async fn load_remote(
        &mut self,
        api: &dyn ContentsApi,
        token: &str,
        file: RemoteRef,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let remote = api.get_file(token, &file).await?;
        let bytes = remote
            .decode()
            .map_err(|e| SessionError::Decode(e.to_string()))?;
        let text = String::from_utf8(bytes).map_err(|e| SessionError::Decode(e.to_string()))?;

        info!(
            "Loaded {}/{}/{} at revision {}",
            file.owner, file.repo, file.path, remote.sha
        );
        self.doc = Document {
            text,
            revision: Some(remote.sha),
            source: Some(file),
        };
        self.selection = Selection::caret(self.doc.text.len());
        self.persist(now)
    }

    /// Validate the document and build the request publishing it to `target`.
    ///
    /// A document loaded with [`load_remote`](Self::load_remote) carries its
    /// revision marker, which turns the commit into an update.
    pub fn publish_request(
        &self,
        target: &RepositoryTarget,
        message: Option<String>,
    ) -> Result<PublishRequest, PublishError> {
        PublishRequest::from_document(&self.doc.text, target, message, self.doc.revision.clone())
    }

    /// Reset to a fresh document after a successful publish.
    pub fn clear(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.doc = Document::default();
        self.selection = Selection::caret(self.doc.text.len());
        self.persist(now)
    }
}
