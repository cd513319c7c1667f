use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;

/// Centralized path management for the honeypot.
/// Handles XDG directories and fallbacks consistently across the application.
#[derive(Debug, Clone)]
pub struct PathManager {
    /// Directory for configuration files
    pub config_dir: PathBuf,
    /// Directory for server host keys
    pub key_dir: PathBuf,
}

impl PathManager {
    /// Create a new PathManager, using XDG directories when available
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "sshpot") {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let key_dir = config_dir.join("keys");

            // Test if we can actually create the directories
            if fs::create_dir_all(&config_dir).is_err() {
                log::warn!("Cannot create XDG config directory {config_dir:?}, falling back to current directory");
                return Self::new_fallback();
            }
            if fs::create_dir_all(&key_dir).is_err() {
                log::warn!("Cannot create XDG key directory {key_dir:?}, falling back to current directory");
                return Self::new_fallback();
            }

            log::info!("Using XDG directories for configuration");

            Self { config_dir, key_dir }
        } else {
            Self::new_fallback()
        }
    }

    /// Create PathManager with fallback directories (current directory)
    fn new_fallback() -> Self {
        log::info!("Using fallback directories for configuration");
        // Fallback to current directory (Docker-friendly)
        let base_dir = PathBuf::from(".");
        let key_dir = base_dir.join("keys");

        Self { config_dir: base_dir, key_dir }
    }

    /// Get the default deployment configuration file path
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("honeypot.toml")
    }

    /// Log the current directory configuration
    pub fn log_paths(&self) {
        log::info!("Path configuration:");
        log::info!("  Config directory: {}", self.config_dir.display());
        log::info!("  Key directory: {}", self.key_dir.display());
        log::info!("  Config file: {}", self.config_file().display());
    }
}

impl Default for PathManager {
    fn default() -> Self {
        Self::new()
    }
}
