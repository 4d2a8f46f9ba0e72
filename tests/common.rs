//! Shared test helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hostguard::config::{AppPaths, ConfigStore, ConfigUpdate};
use hostguard::platform::{DnsFlusher, NoopDnsFlusher};
use hostguard::AppState;
use parking_lot::Mutex;
use tempfile::TempDir;

/// Create a temp directory for use as HOSTGUARD_HOME.
/// Uses current dir (workspace) so sandbox allows full access.
pub fn temp_home() -> TempDir {
    tempfile::Builder::new()
        .prefix("hostguard_test_")
        .tempdir_in(std::env::current_dir().unwrap_or_else(|_| Path::new(".").into()))
        .expect("temp dir")
}

/// A temp home with a config pointing at `<home>/hosts`.
pub struct TestEnv {
    pub home: TempDir,
    pub paths: AppPaths,
    pub hosts: PathBuf,
}

impl TestEnv {
    /// Create the env; `hosts` of `None` leaves the hosts file absent.
    pub fn new(hosts: Option<&str>) -> Self {
        let home = temp_home();
        let paths = AppPaths::for_test(home.path());
        let hosts_path = home.path().join("hosts");
        if let Some(content) = hosts {
            std::fs::write(&hosts_path, content).unwrap();
        }
        let mut config = ConfigStore::load(&paths.config_file).unwrap();
        config
            .update(ConfigUpdate {
                host_file_path: Some(hosts_path.clone()),
                ..Default::default()
            })
            .unwrap();
        Self {
            home,
            paths,
            hosts: hosts_path,
        }
    }

    pub fn open(&self) -> AppState {
        AppState::open(self.paths.clone(), Box::new(NoopDnsFlusher)).unwrap()
    }

    pub fn open_with(&self, flusher: impl DnsFlusher + 'static) -> AppState {
        AppState::open(self.paths.clone(), Box::new(flusher)).unwrap()
    }

    pub fn read_hosts(&self) -> String {
        std::fs::read_to_string(&self.hosts).unwrap()
    }
}

/// Flusher that counts calls and records the hosts file content it saw.
#[derive(Clone, Default)]
pub struct RecordingFlusher {
    pub watch: Option<PathBuf>,
    pub calls: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl RecordingFlusher {
    pub fn watching(path: &Path) -> Self {
        Self {
            watch: Some(path.to_path_buf()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DnsFlusher for RecordingFlusher {
    fn flush(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(p) = &self.watch {
            self.seen
                .lock()
                .push(std::fs::read_to_string(p).unwrap_or_default());
        }
        if self.fail {
            anyhow::bail!("resolver cache unavailable");
        }
        Ok(())
    }
}
