//! Sessions, their stored inputs, and the registry shared between sessions

use parking_lot::RwLock;
use seqstream_core::{Error, InputFormat, Result, SessionId};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Stages of a session's analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    Reading,
    Classifying,
    Aggregating,
    Verifying,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Reading => "reading",
            Self::Classifying => "classifying",
            Self::Aggregating => "aggregating",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis run
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// Known once the stored input has been resolved
    pub input_format: Option<InputFormat>,
    pub state: PipelineState,
    entered_at: Instant,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            input_format: None,
            state: PipelineState::Validating,
            entered_at: Instant::now(),
        }
    }

    /// Move to `next`, returning the time spent in the state being left
    ///
    /// Terminal states are final; transitions out of them are ignored.
    pub fn transition(&mut self, next: PipelineState) -> Option<Duration> {
        if self.state.is_terminal() {
            warn!(session = %self.id, from = %self.state, to = %next, "ignoring transition out of terminal state");
            return None;
        }
        let spent = self.entered_at.elapsed();
        debug!(
            session = %self.id,
            from = %self.state,
            to = %next,
            elapsed_us = spent.as_micros() as u64,
            "state transition"
        );
        self.state = next;
        self.entered_at = Instant::now();
        Some(spent)
    }
}

/// An uploaded file waiting to be analysed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInput {
    pub path: PathBuf,
    pub format: InputFormat,
}

/// Exclusive ownership of a session's stored input
///
/// The file is deleted exactly once: by [`InputLease::release`], or on drop if
/// the lease was never released.
#[derive(Debug)]
pub struct InputLease {
    session: SessionId,
    input: StoredInput,
    released: bool,
}

impl InputLease {
    pub fn path(&self) -> &Path {
        &self.input.path
    }

    pub fn format(&self) -> InputFormat {
        self.input.format
    }

    /// Delete the stored input
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_input(&self.input.path)
    }
}

impl Drop for InputLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_input(&self.input.path) {
            warn!(session = %self.session, path = ?self.input.path, error = %e, "failed to remove stored input");
        }
    }
}

fn remove_input(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Extensions probed for inputs stored before the registry knew about them
const KNOWN_EXTENSIONS: [&str; 4] = ["fastq", "fq", "fasta", "fa"];

#[derive(Debug)]
struct Entry {
    input: StoredInput,
    stored_at: tokio::time::Instant,
}

/// Maps session ids to stored inputs; shared by all sessions
#[derive(Debug)]
pub struct SessionRegistry {
    upload_dir: PathBuf,
    entries: RwLock<HashMap<SessionId, Entry>>,
}

impl SessionRegistry {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Number of sessions waiting to be claimed
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Persist an upload and create its session
    pub async fn store(&self, bytes: &[u8], format: InputFormat) -> Result<SessionId> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let id = SessionId::new();
        let path = self
            .upload_dir
            .join(format!("{}.{}", id, format.extension()));
        tokio::fs::write(&path, bytes).await?;

        info!(session = %id, %format, bytes = bytes.len(), "stored upload");
        self.entries.write().insert(
            id,
            Entry {
                input: StoredInput { path, format },
                stored_at: tokio::time::Instant::now(),
            },
        );
        Ok(id)
    }

    /// Drop uploads that nobody claimed within `max_age`, deleting their files
    ///
    /// Returns the number of sessions removed.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let stale: Vec<(SessionId, Entry)> = {
            let mut entries = self.entries.write();
            let expired: Vec<SessionId> = entries
                .iter()
                .filter(|(_, entry)| entry.stored_at.elapsed() >= max_age)
                .map(|(id, _)| *id)
                .collect();
            expired
                .into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, entry) in &stale {
            match remove_input(&entry.input.path) {
                Ok(()) => info!(session = %id, "evicted unclaimed upload"),
                Err(e) => {
                    warn!(session = %id, path = ?entry.input.path, error = %e, "failed to remove stale upload")
                }
            }
        }
        stale.len()
    }

    /// Take exclusive ownership of a session's input
    ///
    /// Falls back to looking for `<id>.<ext>` in the upload directory. Fails if
    /// nothing is found or the id matches more than one stored file.
    pub fn claim(&self, id: SessionId) -> Result<InputLease> {
        let registered = self.entries.write().remove(&id);
        let input = match registered {
            Some(entry) => entry.input,
            None => self.probe(id)?,
        };

        if !input.path.exists() {
            return Err(Error::validation("File not found"));
        }

        Ok(InputLease {
            session: id,
            input,
            released: false,
        })
    }

    fn probe(&self, id: SessionId) -> Result<StoredInput> {
        let mut found: Vec<StoredInput> = KNOWN_EXTENSIONS
            .iter()
            .filter_map(|ext| {
                let path = self.upload_dir.join(format!("{}.{}", id, ext));
                let format = ext.parse().ok()?;
                path.exists().then_some(StoredInput { path, format })
            })
            .collect();

        match found.len() {
            0 => Err(Error::validation("File not found")),
            1 => Ok(found.remove(0)),
            _ => Err(Error::validation(format!(
                "Unsupported format: {} stored inputs match this session",
                found.len()
            ))),
        }
    }
}
