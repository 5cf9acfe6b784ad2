//! XDG-compliant path resolution for noetic.
//!
//! One set of process-wide directories — no per-workspace layout, since
//! contexts (§3.4) are already partitioned inside a single engine instance
//! rather than across separate on-disk trees.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(noetic::paths::no_home),
        help("Set the HOME environment variable or ensure a valid user profile exists.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(noetic::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir { path: String, #[source] source: std::io::Error },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for noetic.
#[derive(Debug, Clone)]
pub struct NoeticPaths {
    /// `$XDG_CONFIG_HOME/noetic/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/noetic/`
    pub data_dir: PathBuf,
    /// `$XDG_STATE_HOME/noetic/`
    pub state_dir: PathBuf,
    /// `$XDG_RUNTIME_DIR/noetic/` (falls back to `state_dir/run/`)
    pub runtime_dir: PathBuf,
}

impl NoeticPaths {
    /// Resolve XDG directories from environment variables with standard
    /// fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME").map(PathBuf::from).map_err(|_| PathError::NoHome)?;

        let config_dir =
            std::env::var("XDG_CONFIG_HOME").map(PathBuf::from).unwrap_or_else(|_| home.join(".config")).join("noetic");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("noetic");

        let state_dir = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/state"))
            .join("noetic");

        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(|d| PathBuf::from(d).join("noetic"))
            .unwrap_or_else(|_| state_dir.join("run"));

        Ok(Self { config_dir, data_dir, state_dir, runtime_dir })
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.state_dir, &self.runtime_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir { path: dir.display().to_string(), source: e })?;
        }
        Ok(())
    }

    /// Path to the engine configuration file (§6.5).
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("noetic.toml")
    }

    /// Path to the default persistence snapshot (§6.4).
    pub fn snapshot_file(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }

    /// Path to the running server's pid file, used by client discovery.
    pub fn pid_file(&self) -> PathBuf {
        self.runtime_dir.join("noetic-server.pid")
    }
}
