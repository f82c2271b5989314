// Persistent configuration: a single YAML file recognised by all three
// daemons. Stored at <config_dir>/platterd/config.yaml by default, or at the
// path given on the command line.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PlatterError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the on-disk track library.
    pub library_root: PathBuf,
    /// Path to the library lookup index file.
    pub db_path: PathBuf,
    /// Device path for the optical drive.
    pub cd_device: String,
    /// User the daemons drop privileges to after opening the device.
    pub daemon_user: Option<String>,
    /// Group the daemons drop privileges to.
    pub daemon_group: Option<String>,
    /// PID file paths, keyed by daemon name.
    pub pid_files: PidFiles,
    /// Log file paths, keyed by daemon name. Empty means stderr.
    pub log_files: LogFiles,
    /// Folder name template for an album with a well-defined artist.
    pub album_folder_template: String,
    /// Folder name template for a various-artists compilation.
    pub va_album_folder_template: String,
    /// Track filename template.
    pub track_filename_template: String,
    /// Interval, in seconds, between background library rebuild scans.
    pub db_rebuild_interval_secs: u64,
    /// Online metadata registry base URL.
    pub metadata_base_url: String,
    /// Number of times a failed track rip is retried before the Ripper
    /// gives up and parks in RIPPING until ejected.
    pub rip_retry_limit: u32,
    /// Unix socket paths for the bus endpoints.
    pub bus: BusConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PidFiles {
    pub player: Option<PathBuf>,
    pub ripper: Option<PathBuf>,
    pub commander: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFiles {
    pub player: Option<PathBuf>,
    pub ripper: Option<PathBuf>,
    pub commander: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub state_topic: PathBuf,
    pub error_topic: PathBuf,
    pub command_queue: PathBuf,
    pub command_playback_queue: PathBuf,
    pub command_ripping_queue: PathBuf,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            state_topic: PathBuf::from("/tmp/platterd-state.sock"),
            error_topic: PathBuf::from("/tmp/platterd-error.sock"),
            command_queue: PathBuf::from("/tmp/platterd-command.sock"),
            command_playback_queue: PathBuf::from("/tmp/platterd-command-playback.sock"),
            command_ripping_queue: PathBuf::from("/tmp/platterd-command-ripping.sock"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library_root: PathBuf::from("/var/lib/platterd/library"),
            db_path: PathBuf::from("/var/lib/platterd/library.db"),
            cd_device: "/dev/cdrom".to_string(),
            daemon_user: None,
            daemon_group: None,
            pid_files: PidFiles::default(),
            log_files: LogFiles::default(),
            album_folder_template: "{artist} - {title}".to_string(),
            va_album_folder_template: "{title}".to_string(),
            track_filename_template: "{track:02} {artist} - {title}".to_string(),
            db_rebuild_interval_secs: 3600,
            metadata_base_url: "https://metadata.example.invalid".to_string(),
            rip_retry_limit: 3,
            bus: BusConfig::default(),
        }
    }
}

impl AppConfig {
    /// Default path to the config file, platform-dependent.
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.yaml"))
    }

    /// Load config from `path`, or the default location if `path` is `None`.
    /// Returns defaults when no file exists at all.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.clone()),
            None => Self::default_path(),
        };

        let Some(resolved) = resolved else {
            return Ok(Self::default());
        };

        if !resolved.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&resolved)?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .map_err(|e| PlatterError::Config(format!("{}: {e}", resolved.display())))?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("platterd"),
        )
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("platterd"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join("platterd"));
        }
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("platterd"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.yaml");
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cd_device, "/dev/cdrom");
    }

    #[test]
    fn round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = AppConfig::default();
        config.cd_device = "/dev/sr1".to_string();
        config.rip_retry_limit = 5;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.cd_device, "/dev/sr1");
        assert_eq!(loaded.rip_retry_limit, 5);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "cd_device: /dev/sr2\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cd_device, "/dev/sr2");
        assert_eq!(config.rip_retry_limit, 3);
    }
}
