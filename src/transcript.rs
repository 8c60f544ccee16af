//! The conversation as a flat, ordered message list, and the JSON file that
//! keeps it between runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Chat-completion role for this speaker.
    pub fn role(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "You"),
            Speaker::Assistant => write!(f, "AI"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    /// Unix seconds.
    pub timestamp: u64,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        TranscriptEntry {
            id: Uuid::new_v4(),
            speaker,
            text: text.into(),
            timestamp,
        }
    }

    /// `"You: ..."` / `"AI: ..."`.
    pub fn line(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }

    /// Assistant entries recording a failed request rather than a reply.
    pub fn is_error(&self) -> bool {
        self.speaker == Speaker::Assistant && self.text.starts_with("Error: ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) -> &TranscriptEntry {
        self.entries.push(TranscriptEntry::new(speaker, text));
        // just pushed
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(TranscriptEntry::line).collect()
    }
}

/// One JSON document on disk holding a [`Transcript`].
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    path: PathBuf,
}

impl TranscriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TranscriptStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored transcript.
    ///
    /// A missing file is an empty conversation. A file that does not parse is
    /// moved aside to `<path>.corrupt` and also treated as empty, so the next
    /// save does not destroy it.
    pub fn load(&self) -> Result<Transcript> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no transcript yet");
                return Ok(Transcript::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Transcript>(&raw) {
            Ok(t) => {
                debug!(path = %self.path.display(), entries = t.len(), "transcript loaded");
                Ok(t)
            }
            Err(e) => {
                let aside = self.sidecar("corrupt");
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "transcript unreadable, starting fresh"
                );
                std::fs::rename(&self.path, &aside)?;
                Ok(Transcript::new())
            }
        }
    }

    /// Write the transcript via a temp file and rename, so a crash never
    /// leaves a half-written document behind.
    pub fn save(&self, transcript: &Transcript) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.sidecar("tmp");
        let json = serde_json::to_vec_pretty(transcript)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = transcript.len(), "transcript saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn sidecar(&self, ext: &str) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }
}
