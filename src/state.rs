//! Shared application state: the live hosts document, its history and the
//! configuration, behind one handle that command handlers and the file
//! watcher share.
//!
//! Lock order: `disk` gate, then `hosts`, `config`, `history`. Everything
//! that touches the live file (save, rollback, reload) holds the disk gate
//! for its whole duration; the watcher only ever try-locks it and defers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::commit;
use crate::config::{AppPaths, Config, ConfigStore, ConfigUpdate};
use crate::error::{HostsError, Result};
use crate::history::{DeleteReport, HistoryEntry, HistoryManager};
use crate::platform::{self, DnsFlusher};
use crate::store::{BlockedDomain, DomainStore, Statistics};

pub struct AppState {
    paths: AppPaths,
    hosts: RwLock<DomainStore>,
    config: RwLock<ConfigStore>,
    history: Mutex<HistoryManager>,
    disk: Mutex<()>,
    reload_pending: AtomicBool,
    flusher: Box<dyn DnsFlusher>,
}

impl AppState {
    /// Load config, open history and read the live hosts file.
    ///
    /// Writes a default config file on first run. A missing hosts file starts
    /// an empty document; one that fails to parse is an error, since saving
    /// over it would lose its content.
    pub fn open(paths: AppPaths, flusher: Box<dyn DnsFlusher>) -> Result<Self> {
        let config = ConfigStore::load(&paths.config_file)?;
        if !config.path().exists() {
            match config.save() {
                Ok(()) => info!(path = %config.path().display(), "wrote default config"),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
        }
        let cfg = config.config();

        let history = HistoryManager::open(cfg.resolved_history_dir(&paths))?;
        let hosts = load_or_empty(&cfg.resolved_host_file())?;

        Ok(Self {
            paths,
            hosts: RwLock::new(hosts),
            config: RwLock::new(config),
            history: Mutex::new(history),
            disk: Mutex::new(()),
            reload_pending: AtomicBool::new(false),
            flusher,
        })
    }

    /// Open with default paths and the platform DNS flusher.
    pub fn open_default() -> Result<Self> {
        Self::open(AppPaths::default_paths(), platform::default_dns_flusher())
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    // --- hosts document ---

    pub fn get_blocked_domains(&self) -> Vec<BlockedDomain> {
        self.hosts.read().list_blocked()
    }

    pub fn get_statistics(&self) -> Statistics {
        self.hosts.read().statistics()
    }

    /// In-memory only. Returns false when the pair was already mapped.
    pub fn add_domain(&self, ip: &str, hostname: &str) -> Result<bool> {
        self.hosts.write().add(ip, hostname)
    }

    /// In-memory only.
    pub fn remove_domain(&self, ip: &str, hostname: &str) -> Result<()> {
        self.hosts.write().remove(ip, hostname)
    }

    /// Whether there are edits not yet written to disk.
    pub fn has_unsaved_changes(&self) -> bool {
        self.hosts.read().is_dirty()
    }

    pub fn export_hosts(&self) -> String {
        self.hosts.read().serialize()
    }

    /// Replace the in-memory document with `text`. Nothing is written until
    /// the next save; on a parse error the current document is kept.
    pub fn import_hosts(&self, text: &str) -> Result<()> {
        self.hosts.write().replace_text(text)
    }

    /// Snapshot the live file, commit the in-memory document over it, then
    /// prune history.
    pub fn save_changes(&self) -> Result<()> {
        {
            let _disk = self.disk.lock();
            let dest = self.require_writable()?;
            let (content, revision) = {
                let hosts = self.hosts.read();
                (hosts.serialize(), hosts.revision())
            };
            let max = self.config.read().config().max_history_entries;

            let mut history = self.history.lock();
            let entry = history.snapshot_file(&dest)?;
            if let Err(e) = commit::commit_content(&dest, &content, self.flusher.as_ref()) {
                history.discard(&entry.filename);
                return Err(e);
            }
            history.prune(max);
            drop(history);

            self.hosts.write().mark_synced(revision, content);
            info!(path = %dest.display(), snapshot = %entry.filename, "changes saved");
        }
        self.run_deferred_reload();
        Ok(())
    }

    // --- history ---

    /// Newest first.
    pub fn get_history_list(&self) -> Vec<HistoryEntry> {
        self.history.lock().list()
    }

    /// Restore the live file from a snapshot. The current live content is
    /// itself snapshotted first, so a rollback can be rolled back.
    pub fn rollback_to(&self, filename: &str) -> Result<()> {
        {
            let _disk = self.disk.lock();
            let dest = self.require_writable()?;
            let max = self.config.read().config().max_history_entries;

            let mut history = self.history.lock();
            let content = history.read_snapshot(filename)?;
            let entry = history.snapshot_file(&dest)?;
            if let Err(e) = commit::commit_content(&dest, &content, self.flusher.as_ref()) {
                history.discard(&entry.filename);
                return Err(e);
            }
            history.prune(max);
            drop(history);

            let mut hosts = self.hosts.write();
            if hosts.is_dirty() {
                warn!("discarding unsaved changes for rollback");
            }
            hosts.load(&dest)?;
            info!(snapshot = %filename, "rolled back hosts file");
        }
        self.run_deferred_reload();
        Ok(())
    }

    pub fn delete_history_files(&self, filenames: &[String]) -> DeleteReport {
        let report = self.history.lock().delete(filenames);
        for (name, e) in &report.failed {
            warn!(file = %name, error = %e, "history delete failed");
        }
        report
    }

    // --- config ---

    pub fn get_config(&self) -> Config {
        self.config.read().config()
    }

    /// Merge and persist `update`. A changed hosts file path reloads the
    /// document; a changed history directory reopens history there. The new
    /// document and history are prepared before the config is written, so a
    /// failure leaves config, document and history as they were.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<Config> {
        let result = self.apply_config(update);
        self.run_deferred_reload();
        result
    }

    fn apply_config(&self, update: ConfigUpdate) -> Result<Config> {
        let _disk = self.disk.lock();
        let (before, planned) = {
            let config = self.config.read();
            (config.config(), config.preview(&update)?)
        };

        let old_hosts = before.resolved_host_file();
        let new_hosts = planned.resolved_host_file();
        let old_history = before.resolved_history_dir(&self.paths);
        let new_history = planned.resolved_history_dir(&self.paths);

        let store = if old_hosts != new_hosts {
            Some(load_or_empty(&new_hosts)?)
        } else {
            None
        };
        let history = if old_history != new_history {
            Some(HistoryManager::open(&new_history)?)
        } else {
            None
        };

        let after = self.config.write().update(update)?;

        if let Some(history) = history {
            *self.history.lock() = history;
            info!(dir = %new_history.display(), "history directory changed");
        }
        if let Some(store) = store {
            let mut hosts = self.hosts.write();
            if hosts.is_dirty() {
                warn!("discarding unsaved changes after hosts file path change");
            }
            *hosts = store;
            info!(path = %new_hosts.display(), "hosts file path changed");
        }
        Ok(after)
    }

    /// Effective hosts file path (override or platform default).
    pub fn get_host_file_path(&self) -> PathBuf {
        self.config.read().config().resolved_host_file()
    }

    /// Whether this process may write the hosts file.
    pub fn check_admin_privileges(&self) -> bool {
        platform::can_write(&self.get_host_file_path())
    }

    // --- external changes ---

    /// Re-read the live file. Returns whether the document was replaced;
    /// content identical to what was last synced is left alone.
    pub fn reload(&self) -> Result<bool> {
        let _disk = self.disk.lock();
        self.reload_locked()
    }

    /// Reload triggered by a filesystem notification. Never blocks on a save
    /// in flight: the reload is deferred and run when that save finishes.
    /// Failures are logged and retried on the next notification.
    pub fn reload_from_watcher(&self) {
        loop {
            if let Some(_disk) = self.disk.try_lock() {
                self.reload_pending.store(false, Ordering::SeqCst);
                match self.reload_locked() {
                    Ok(true) => info!("reloaded hosts file after external change"),
                    Ok(false) => debug!("hosts file unchanged since last sync"),
                    Err(e) => warn!(error = %e, "hosts file reload failed"),
                }
                return;
            }
            self.reload_pending.store(true, Ordering::SeqCst);
            // The holder runs the deferred reload on release; if it already
            // released, try again ourselves.
            if self.disk.is_locked() {
                debug!("save in progress; deferring reload");
                return;
            }
        }
    }

    fn run_deferred_reload(&self) {
        if self.reload_pending.swap(false, Ordering::SeqCst) {
            self.reload_from_watcher();
        }
    }

    fn reload_locked(&self) -> Result<bool> {
        let dest = self.get_host_file_path();
        let content = fs::read_to_string(&dest).map_err(|e| HostsError::io(&dest, e))?;
        if self.hosts.read().synced_content() == Some(content.as_str()) {
            return Ok(false);
        }
        let mut hosts = self.hosts.write();
        if hosts.is_dirty() {
            warn!("discarding unsaved changes after external modification");
        }
        hosts.load_content(content)?;
        Ok(true)
    }

    fn require_writable(&self) -> Result<PathBuf> {
        let dest = self.get_host_file_path();
        if !platform::can_write(&dest) {
            return Err(HostsError::Privilege { path: dest });
        }
        Ok(dest)
    }
}

fn load_or_empty(path: &Path) -> Result<DomainStore> {
    let mut store = DomainStore::new();
    match store.load(path) {
        Ok(()) => Ok(store),
        Err(e) if e.is_not_found() => {
            debug!(path = %path.display(), "hosts file missing; starting empty");
            Ok(store)
        }
        Err(e) => Err(e),
    }
}
