//! Configuration loading, updating and path resolution.
//!
//! Supports HOSTGUARD_HOME env var override for testing.

use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{line_at, HostsError, Result};
use crate::platform;

pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 20;
pub const MAX_HISTORY_ENTRIES_LIMIT: usize = 1000;

/// Paths for hostguard's own data.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    pub default_history_dir: PathBuf,
}

impl AppPaths {
    /// Build paths from base directory (e.g. ProjectDirs data dir or HOSTGUARD_HOME).
    pub fn from_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.toml"),
            default_history_dir: base.join("history"),
            base_dir: base,
        }
    }

    /// Paths for testing: use a temp dir as base.
    pub fn for_test(base: impl AsRef<Path>) -> Self {
        Self::from_base(base.as_ref().to_path_buf())
    }

    /// Get default paths (respects HOSTGUARD_HOME).
    pub fn default_paths() -> Self {
        let base = if let Some(home) = std::env::var_os("HOSTGUARD_HOME") {
            PathBuf::from(home)
        } else if let Some(dirs) = directories::ProjectDirs::from("org", "hostguard", "hostguard")
        {
            dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from(".hostguard")
        };
        Self::from_base(base)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

/// Effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Hosts file override; `None` means the platform default.
    pub host_file_path: Option<PathBuf>,
    /// History directory override; `None` means the data-dir default.
    pub history_dir: Option<PathBuf>,
    pub max_history_entries: usize,
    pub theme: Theme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_file_path: None,
            history_dir: None,
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            theme: Theme::default(),
        }
    }
}

impl Config {
    pub fn resolved_host_file(&self) -> PathBuf {
        self.host_file_path
            .clone()
            .unwrap_or_else(platform::default_hosts_file_path)
    }

    pub fn resolved_history_dir(&self, paths: &AppPaths) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| paths.default_history_dir.clone())
    }
}

/// Partial update; `None` leaves a field unchanged, an empty path clears
/// an override.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub host_file_path: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    pub max_history_entries: Option<usize>,
    pub theme: Option<Theme>,
}

// On-disk layout. Unknown keys and sections are carried through `extra`.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsSection,
    #[serde(default)]
    history: HistorySection,
    #[serde(default)]
    appearance: AppearanceSection,
    #[serde(flatten)]
    extra: toml::Table,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PathsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    history_dir: Option<PathBuf>,
    #[serde(flatten)]
    extra: toml::Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistorySection {
    #[serde(default = "default_max_entries")]
    max_entries: i64,
    #[serde(flatten)]
    extra: toml::Table,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            extra: toml::Table::new(),
        }
    }
}

fn default_max_entries() -> i64 {
    DEFAULT_MAX_HISTORY_ENTRIES as i64
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AppearanceSection {
    #[serde(default)]
    theme: Theme,
    #[serde(flatten)]
    extra: toml::Table,
}

/// Parse config text. `max_entries` outside 1..=1000 is clamped.
fn parse_config(text: &str) -> Result<ConfigFile> {
    let mut file: ConfigFile = toml::from_str(text).map_err(|e| {
        let (line, content) = e
            .span()
            .map(|span| line_at(text, span.start))
            .unwrap_or((0, String::new()));
        HostsError::parse(line, content, e.message().to_string())
    })?;
    let clamped = file
        .history
        .max_entries
        .clamp(1, MAX_HISTORY_ENTRIES_LIMIT as i64);
    if clamped != file.history.max_entries {
        warn!(
            configured = file.history.max_entries,
            clamped, "history.max_entries out of range"
        );
        file.history.max_entries = clamped;
    }
    Ok(file)
}

impl ConfigFile {
    fn to_config(&self) -> Config {
        Config {
            host_file_path: self.paths.host_file.clone(),
            history_dir: self.paths.history_dir.clone(),
            max_history_entries: self.history.max_entries as usize,
            theme: self.appearance.theme,
        }
    }
}

fn serialize_config(file: &ConfigFile) -> Result<String> {
    toml::to_string_pretty(file).map_err(|e| HostsError::Encode {
        what: "config",
        message: e.to_string(),
    })
}

/// Config file plus the path it lives at.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    file: ConfigFile,
}

impl ConfigStore {
    /// In-memory defaults bound to `path`; nothing is written.
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: ConfigFile::default(),
        }
    }

    /// Load config from `path` (with shared lock when file exists).
    /// A missing file yields defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Ok(Self::with_defaults(path));
        }
        let mut f = fs::OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| HostsError::io(&path, e))?;
        fs2::FileExt::lock_shared(&f).map_err(|e| HostsError::io(&path, e))?;
        let mut s = String::new();
        f.read_to_string(&mut s)
            .map_err(|e| HostsError::io(&path, e))?;
        let file = parse_config(&s)?;
        Ok(Self { path, file })
    }

    /// Save config (with exclusive lock). Creates parent dirs if needed.
    pub fn save(&self) -> Result<()> {
        if let Some(p) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(p).map_err(|e| HostsError::io(p, e))?;
        }
        let s = serialize_config(&self.file)?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| HostsError::io(&self.path, e))?;
        fs2::FileExt::lock_exclusive(&f).map_err(|e| HostsError::io(&self.path, e))?;
        f.set_len(0).map_err(|e| HostsError::io(&self.path, e))?;
        f.rewind().map_err(|e| HostsError::io(&self.path, e))?;
        f.write_all(s.as_bytes())
            .map_err(|e| HostsError::io(&self.path, e))?;
        f.sync_all().map_err(|e| HostsError::io(&self.path, e))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> Config {
        self.file.to_config()
    }

    fn merged(&self, update: &ConfigUpdate) -> Result<ConfigFile> {
        let mut next = self.file.clone();
        if let Some(p) = &update.host_file_path {
            next.paths.host_file = non_empty(p.clone());
        }
        if let Some(p) = &update.history_dir {
            next.paths.history_dir = non_empty(p.clone());
        }
        if let Some(max) = update.max_history_entries {
            if !(1..=MAX_HISTORY_ENTRIES_LIMIT).contains(&max) {
                return Err(HostsError::validation(
                    "max_history_entries",
                    format!("{max} is outside 1..={MAX_HISTORY_ENTRIES_LIMIT}"),
                ));
            }
            next.history.max_entries = max as i64;
        }
        if let Some(theme) = update.theme {
            next.appearance.theme = theme;
        }
        Ok(next)
    }

    /// The config `update` would produce, without applying or persisting it.
    pub fn preview(&self, update: &ConfigUpdate) -> Result<Config> {
        Ok(self.merged(update)?.to_config())
    }

    /// Merge `update`, persist, and return the new config. On a validation
    /// or write failure the in-memory config is left unchanged.
    pub fn update(&mut self, update: ConfigUpdate) -> Result<Config> {
        let next = self.merged(&update)?;
        let prev = std::mem::replace(&mut self.file, next);
        if let Err(e) = self.save() {
            self.file = prev;
            return Err(e);
        }
        Ok(self.config())
    }
}

fn non_empty(p: PathBuf) -> Option<PathBuf> {
    if p.as_os_str().is_empty() {
        None
    } else {
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("config.toml")).unwrap();
        assert_eq!(store.config(), Config::default());
    }

    #[test]
    fn reads_sections() {
        let file = parse_config(
            "[paths]\nhost_file = \"/tmp/hosts\"\n\n[history]\nmax_entries = 5\n\n[appearance]\ntheme = \"dark\"\n",
        )
        .unwrap();
        assert_eq!(file.paths.host_file, Some(PathBuf::from("/tmp/hosts")));
        assert_eq!(file.history.max_entries, 5);
        assert_eq!(file.appearance.theme, Theme::Dark);
    }

    #[test]
    fn clamps_max_entries_on_load() {
        assert_eq!(parse_config("[history]\nmax_entries = 0\n").unwrap().history.max_entries, 1);
        assert_eq!(
            parse_config("[history]\nmax_entries = 5000\n").unwrap().history.max_entries,
            1000
        );
        assert_eq!(parse_config("[history]\nmax_entries = -3\n").unwrap().history.max_entries, 1);
    }

    #[test]
    fn parse_error_has_line() {
        let err = parse_config("[history]\nmax_entries = = 3\n").unwrap_err();
        match err {
            HostsError::Parse { line, text, .. } => {
                assert_eq!(line, 2);
                assert_eq!(text, "max_entries = = 3");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_theme_is_rejected() {
        let err = parse_config("[appearance]\ntheme = \"neon\"\n").unwrap_err();
        assert!(matches!(err, HostsError::Parse { .. }));
    }

    #[test]
    fn save_load_save_is_stable_and_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[history]\nmax_entries = 7\nkeep_days = 30\n\n[plugins]\nenabled = true\n",
        )
        .unwrap();

        let store = ConfigStore::load(&path).unwrap();
        store.save().unwrap();
        let first = fs::read_to_string(&path).unwrap();
        ConfigStore::load(&path).unwrap().save().unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert!(first.contains("keep_days = 30"));
        assert!(first.contains("[plugins]"));
        assert_eq!(ConfigStore::load(&path).unwrap().config().max_history_entries, 7);
    }

    #[test]
    fn update_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut store = ConfigStore::load(&path).unwrap();

        let cfg = store
            .update(ConfigUpdate {
                host_file_path: Some(PathBuf::from("/tmp/hosts")),
                theme: Some(Theme::Light),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.host_file_path, Some(PathBuf::from("/tmp/hosts")));
        assert_eq!(cfg.theme, Theme::Light);
        assert_eq!(cfg.max_history_entries, DEFAULT_MAX_HISTORY_ENTRIES);

        let reloaded = ConfigStore::load(&path).unwrap().config();
        assert_eq!(reloaded, cfg);

        let cleared = store
            .update(ConfigUpdate {
                host_file_path: Some(PathBuf::new()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cleared.host_file_path, None);
    }

    #[test]
    fn update_rejects_out_of_range_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::load(dir.path().join("config.toml")).unwrap();
        for bad in [0, 1001] {
            let err = store
                .update(ConfigUpdate {
                    max_history_entries: Some(bad),
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, HostsError::Validation { .. }));
        }
        assert_eq!(store.config().max_history_entries, DEFAULT_MAX_HISTORY_ENTRIES);
        assert!(!store.path().exists());
    }

    #[test]
    fn preview_does_not_apply_or_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("config.toml")).unwrap();
        let cfg = store
            .preview(&ConfigUpdate {
                host_file_path: Some(PathBuf::from("/tmp/other")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.host_file_path, Some(PathBuf::from("/tmp/other")));
        assert_eq!(store.config(), Config::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn resolves_defaults() {
        let paths = AppPaths::for_test("/tmp/hg");
        let cfg = Config::default();
        assert_eq!(cfg.resolved_history_dir(&paths), PathBuf::from("/tmp/hg/history"));
        assert!(!cfg.resolved_host_file().as_os_str().is_empty());
    }
}
