//! JSON persistence for sessions: one `<id>.json` file per session.

use crate::errors::SessionError;
use crate::session::state::{SessionState, SessionSummary};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub struct SessionStore {
    sessions_dir: PathBuf,
}

/// Advisory lock held while a process drives a session. Released on drop.
#[derive(Debug)]
pub struct SessionLock {
    id: String,
    file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release session lock");
        }
    }
}

impl SessionStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.sessions_dir.join("archive")
    }

    fn session_path(&self, id: &str) -> Result<PathBuf, SessionError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SessionError::InvalidId { id: id.to_string() });
        }
        Ok(self.sessions_dir.join(format!("{id}.json")))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{id}.lock"))
    }

    fn ensure_dir(&self, dir: &Path) -> Result<(), SessionError> {
        fs::create_dir_all(dir).map_err(|source| SessionError::Io {
            path: dir.to_path_buf(),
            source,
        })
    }

    /// Create and persist a fresh session.
    pub fn create_session(&self) -> Result<SessionState, SessionError> {
        let mut session = SessionState::new();
        self.save_session(&mut session)?;
        tracing::info!(session_id = %session.id, "Created session");
        Ok(session)
    }

    /// Stamp `last_updated_at` and write the session atomically.
    ///
    /// The file is written to a temporary sibling and renamed over the target,
    /// so a crash mid-save leaves the previous version intact.
    pub fn save_session(&self, session: &mut SessionState) -> Result<(), SessionError> {
        let path = self.session_path(&session.id)?;
        self.ensure_dir(&self.sessions_dir)?;
        session.last_updated_at = Utc::now();

        let json =
            serde_json::to_string_pretty(session).map_err(|source| SessionError::Serialize {
                id: session.id.clone(),
                source,
            })?;

        let io_err = |source: std::io::Error| SessionError::Io {
            path: path.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.sessions_dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        tracing::debug!(
            session_id = %session.id,
            phase = %session.current_phase,
            "Session saved"
        );
        Ok(())
    }

    pub fn load_session(&self, id: &str) -> Result<SessionState, SessionError> {
        let path = self.session_path(id)?;
        if !path.exists() {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        let content = fs::read_to_string(&path).map_err(|source| SessionError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SessionError::Parse { path, source })
    }

    /// Fail with [`SessionError::Stale`] when the stored copy was saved after
    /// `session` was loaded. A session that was never saved is current.
    pub fn ensure_current(&self, session: &SessionState) -> Result<(), SessionError> {
        let path = self.session_path(&session.id)?;
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(&path).map_err(|source| SessionError::Io {
            path: path.clone(),
            source,
        })?;
        let stored: SessionSummary =
            serde_json::from_str(&content).map_err(|source| SessionError::Parse { path, source })?;
        if stored.last_updated_at != session.last_updated_at {
            tracing::warn!(
                session_id = %session.id,
                stored = %stored.last_updated_at,
                loaded = %session.last_updated_at,
                "Refusing to run a stale session copy"
            );
            return Err(SessionError::Stale {
                id: session.id.clone(),
            });
        }
        Ok(())
    }

    /// All readable sessions, most recently updated first. Unreadable files are skipped.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.sessions_dir).map_err(|source| SessionError::Io {
            path: self.sessions_dir.clone(),
            source,
        })?;

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| {
                    serde_json::from_str::<SessionSummary>(&c).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session file")
                }
            }
        }

        summaries.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(summaries)
    }

    /// Move a session file into the archive directory. Fails with
    /// [`SessionError::Locked`] while another process drives the session.
    pub fn archive_session(&self, id: &str) -> Result<PathBuf, SessionError> {
        let path = self.session_path(id)?;
        if !path.exists() {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        let _lock = self.lock(id)?;
        let archive_dir = self.archive_dir();
        self.ensure_dir(&archive_dir)?;
        let target = archive_dir.join(format!("{id}.json"));
        fs::rename(&path, &target).map_err(|source| SessionError::Io {
            path: target.clone(),
            source,
        })?;
        tracing::info!(session_id = %id, "Session archived");
        Ok(target)
    }

    pub fn delete_session(&self, id: &str) -> Result<(), SessionError> {
        let path = self.session_path(id)?;
        if !path.exists() {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        let _lock = self.lock(id)?;
        fs::remove_file(&path).map_err(|source| SessionError::Io { path, source })?;
        Ok(())
    }

    /// Take the advisory lock for `id`, failing fast if another process holds it.
    pub fn lock(&self, id: &str) -> Result<SessionLock, SessionError> {
        self.session_path(id)?;
        self.ensure_dir(&self.sessions_dir)?;
        let path = self.lock_path(id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;
        fs2::FileExt::try_lock_exclusive(&file)
            .map_err(|_| SessionError::Locked { id: id.to_string() })?;
        Ok(SessionLock {
            id: id.to_string(),
            file,
            path,
        })
    }
}
