use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    #[default]
    Today,
    Plan,
    Library,
    Stats,
}

impl Screen {
    pub fn as_str(self) -> &'static str {
        match self {
            Screen::Today => "today",
            Screen::Plan => "plan",
            Screen::Library => "library",
            Screen::Stats => "stats",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    #[serde(default)]
    pub screen: Screen,
}

/// The one place navigation state crosses the process boundary.
#[derive(Debug)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or corrupt file yields the default state.
    #[tracing::instrument(skip(self), fields(file = %self.path.display()))]
    pub fn load(&self) -> NavigationState {
        if !self.path.exists() {
            debug!("no session file; using defaults");
            return NavigationState::default();
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed reading session file");
                return NavigationState::default();
            }
        };

        match serde_json::from_str::<NavigationState>(&raw) {
            Ok(state) => {
                debug!(screen = state.screen.as_str(), "restored navigation state");
                state
            }
            Err(err) => {
                warn!(error = %err, "failed parsing session file; using defaults");
                NavigationState::default()
            }
        }
    }

    #[tracing::instrument(skip(self, state), fields(file = %self.path.display(), screen = state.screen.as_str()))]
    pub fn save(&self, state: &NavigationState) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let mut temp = NamedTempFile::new_in(dir)?;
        let serialized = serde_json::to_string_pretty(state)?;
        writeln!(temp, "{serialized}")?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;

        info!("saved navigation state");
        Ok(())
    }
}
