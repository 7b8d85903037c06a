//! File-backed session store — one JSON document per session key.
//!
//! Keys contain characters that are unsafe in filenames (`:`, `/`), so the
//! on-disk name is a sanitized form of the key. The key inside the document
//! stays authoritative.

use async_trait::async_trait;
use ferrobot_core::error::SessionError;
use ferrobot_core::session::{Session, SessionStore};
use std::path::PathBuf;
use tracing::debug;

/// Stores each session as `<dir>/<sanitized-key>.json`.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

/// Replace filesystem-hostile characters so any session key maps to a valid
/// filename. Distinct keys can only collide if they differ solely in the
/// replaced characters, which channel/chat-id keys never do.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_or_create(&self, key: &str) -> Result<Session, SessionError> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(key, "No session file, starting fresh");
            return Ok(Session::new(key));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SessionError::Storage(format!("{}: {e}", path.display())))?;

        serde_json::from_str(&content).map_err(|e| SessionError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SessionError::Storage(format!("{}: {e}", self.dir.display())))?;

        let content =
            serde_json::to_string_pretty(session).map_err(|e| SessionError::Serialization {
                key: session.key.clone(),
                reason: e.to_string(),
            })?;

        let path = self.path_for(&session.key);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| SessionError::Storage(format!("{}: {e}", path.display())))?;

        debug!(key = %session.key, turns = session.len(), "Session saved");
        Ok(())
    }
}
