//! Audible cue
//!
//! Fire-and-forget playback, a client-scoped on/off preference persisted as a
//! small JSON file, and the arm step. A cue must be armed by a user gesture
//! before it may play; until then playback is reported as blocked.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Sound preference errors
#[derive(Debug, Error)]
pub enum CueError {
    #[error("preference io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Something that can make a noise
pub trait AudioCue: Send + Sync {
    fn play(&self) -> std::io::Result<()>;
}

/// Rings the terminal bell
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl AudioCue for TerminalBell {
    fn play(&self) -> std::io::Result<()> {
        let mut stdout = std::io::stdout();
        stdout.write_all(b"\x07")?;
        stdout.flush()
    }
}

/// Plays nothing, but counts how often it was asked to
#[derive(Debug, Default)]
pub struct SilentCue {
    plays: AtomicUsize,
}

impl SilentCue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl AudioCue for SilentCue {
    fn play(&self) -> std::io::Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Result of asking the controller to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Played,
    /// Not armed yet
    Blocked,
    /// The device refused; the announcement still counts
    Failed,
}

impl PlayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayOutcome::Played => "played",
            PlayOutcome::Blocked => "blocked",
            PlayOutcome::Failed => "failed",
        }
    }
}

/// Persisted on/off switch for the cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundPreference {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for SoundPreference {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

impl SoundPreference {
    /// Load from `path`; a missing or unreadable file means the default
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt sound preference");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CueError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default location: `~/.config/inbox-sync/sound.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("inbox-sync").join("sound.json"))
    }
}

/// Owns the cue, its preference and the armed flag for one session
pub struct CueController {
    cue: Arc<dyn AudioCue>,
    armed: AtomicBool,
    preference: Mutex<SoundPreference>,
    preference_path: Option<PathBuf>,
}

impl CueController {
    /// Controller with an in-memory preference (enabled)
    pub fn new(cue: Arc<dyn AudioCue>) -> Self {
        Self {
            cue,
            armed: AtomicBool::new(false),
            preference: Mutex::new(SoundPreference::default()),
            preference_path: None,
        }
    }

    /// Load and persist the preference at `path`
    pub fn with_preference_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.preference = Mutex::new(SoundPreference::load(&path));
        self.preference_path = Some(path);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.preference
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .enabled
    }

    /// Switch the cue on or off, persisting when backed by a file
    pub fn set_enabled(&self, enabled: bool) -> Result<(), CueError> {
        let mut preference = self
            .preference
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        preference.enabled = enabled;
        if let Some(path) = &self.preference_path {
            preference.save(path)?;
        }
        tracing::debug!(enabled, "Sound preference changed");
        Ok(())
    }

    /// Record a user gesture. Idempotent.
    pub fn arm(&self) {
        if !self.armed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Audible cue armed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Play once without waiting on the outcome
    pub fn play(&self) -> PlayOutcome {
        let outcome = if !self.is_armed() {
            tracing::info!("Cue blocked: not armed by a user gesture yet");
            PlayOutcome::Blocked
        } else {
            match self.cue.play() {
                Ok(()) => PlayOutcome::Played,
                Err(e) => {
                    tracing::warn!(error = %e, "Cue playback failed");
                    PlayOutcome::Failed
                }
            }
        };
        crate::metrics::record_cue(outcome.as_str());
        outcome
    }
}
