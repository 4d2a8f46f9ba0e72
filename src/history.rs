//! Backup history of the live hosts file.
//!
//! Each save first copies the current live file into the history directory
//! as an immutable snapshot. Snapshots are indexed by `index.json`; the index
//! is reconciled against the directory on open so that no listed entry lacks
//! its file and no snapshot file is left out of the index.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commit;
use crate::error::{HostsError, Result};
use crate::parser;
use crate::store;

pub const INDEX_FILE: &str = "index.json";
const SNAPSHOT_PREFIX: &str = "hosts-backup-";
const SNAPSHOT_EXT: &str = "txt";
const INDEX_VERSION: u32 = 1;

/// Metadata for one snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub filename: String,
    pub path: PathBuf,
    /// Blocked pairs in the snapshot
    pub entry_count: usize,
    pub file_size: u64,
    /// Unix seconds
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Index {
    version: u32,
    entries: Vec<HistoryEntry>,
}

/// Outcome of a batch delete: which filenames went and which did not.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, HostsError)>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Snapshot directory plus its in-memory index, kept oldest-first.
#[derive(Debug)]
pub struct HistoryManager {
    dir: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryManager {
    /// Open (creating if needed) the history directory and reconcile its index.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| HostsError::io(&dir, e))?;

        let indexed = read_index(&dir);
        let mut manager = Self {
            dir,
            entries: Vec::new(),
        };
        let changed = manager.reconcile(indexed.clone().unwrap_or_default())?;
        if changed || indexed.is_none() {
            manager.write_index()?;
        }
        Ok(manager)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered newest-first.
    pub fn list(&self) -> Vec<HistoryEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn get(&self, filename: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    /// Snapshot the current bytes of `live`; a missing file is recorded as empty.
    pub fn snapshot_file(&mut self, live: &Path) -> Result<HistoryEntry> {
        let content = match fs::read(live) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(HostsError::io(live, e)),
        };
        self.snapshot_bytes(&content)
    }

    /// Write `content` as a new snapshot and record it in the index.
    pub fn snapshot_bytes(&mut self, content: &[u8]) -> Result<HistoryEntry> {
        let now = chrono::Utc::now();
        let stem = format!(
            "{SNAPSHOT_PREFIX}{}-{:09}",
            now.format("%Y%m%d-%H%M%S"),
            now.timestamp_subsec_nanos()
        );

        let (filename, path, mut file) = self.create_unique(&stem)?;
        let written = file
            .write_all(content)
            .and_then(|_| file.sync_all())
            .map_err(|e| HostsError::io(&path, e));
        if let Err(e) = written {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        let entry = HistoryEntry {
            entry_count: entry_count_of(content, &filename),
            file_size: content.len() as u64,
            timestamp: now.timestamp().max(0) as u64,
            filename,
            path,
        };
        self.entries.push(entry.clone());
        self.sort();

        if let Err(e) = self.write_index() {
            self.entries.retain(|x| x.filename != entry.filename);
            let _ = fs::remove_file(&entry.path);
            return Err(e);
        }
        debug!(file = %entry.filename, size = entry.file_size, "history snapshot written");
        Ok(entry)
    }

    /// Drop a snapshot whose commit did not happen.
    pub fn discard(&mut self, filename: &str) {
        if let Some(entry) = self.get(filename).cloned() {
            let _ = fs::remove_file(&entry.path);
            self.entries.retain(|e| e.filename != filename);
            if let Err(e) = self.write_index() {
                warn!(error = %e, "failed to update history index");
            }
        }
    }

    /// Evict oldest entries until at most `max` remain. Returns evicted filenames.
    pub fn prune(&mut self, max: usize) -> Vec<String> {
        let max = max.max(1);
        let mut evicted = Vec::new();
        let mut kept_over = Vec::new();
        while !self.entries.is_empty() && self.entries.len() + kept_over.len() > max {
            let entry = self.entries.remove(0);
            match remove_snapshot(&entry.path) {
                Ok(()) => evicted.push(entry.filename),
                Err(e) => {
                    warn!(file = %entry.filename, error = %e, "failed to evict history snapshot");
                    kept_over.push(entry);
                }
            }
        }
        if evicted.is_empty() && kept_over.is_empty() {
            return evicted;
        }
        self.entries.extend(kept_over);
        self.sort();
        if let Err(e) = self.write_index() {
            warn!(error = %e, "failed to update history index");
        }
        info!(count = evicted.len(), "pruned history");
        evicted
    }

    /// Read a snapshot and check that it parses as a hosts file.
    pub fn read_snapshot(&self, filename: &str) -> Result<String> {
        let entry = self
            .get(filename)
            .ok_or_else(|| HostsError::NotFound(format!("history entry {filename}")))?;
        let content = fs::read_to_string(&entry.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HostsError::NotFound(format!("history file {}", entry.path.display()))
            } else {
                HostsError::io(&entry.path, e)
            }
        })?;
        parser::parse(&content)?;
        Ok(content)
    }

    /// Delete snapshots by filename. Each name succeeds or fails on its own.
    pub fn delete(&mut self, filenames: &[String]) -> DeleteReport {
        let mut report = DeleteReport::default();
        for name in filenames {
            match self.delete_one(name) {
                Ok(()) => report.deleted.push(name.clone()),
                Err(e) => report.failed.push((name.clone(), e)),
            }
        }
        if let Err(e) = self.write_index() {
            warn!(error = %e, "failed to update history index");
        }
        report
    }

    fn delete_one(&mut self, name: &str) -> Result<()> {
        if !is_plain_filename(name) {
            return Err(HostsError::validation(
                "filename",
                format!("{name:?} is not a history file name"),
            ));
        }
        let idx = self
            .entries
            .iter()
            .position(|e| e.filename == name)
            .ok_or_else(|| HostsError::NotFound(format!("history entry {name}")))?;

        let path = self.entries[idx].path.clone();
        match fs::remove_file(&path) {
            Ok(()) => {
                self.entries.remove(idx);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // stale index entry; drop it but report the missing file
                self.entries.remove(idx);
                Err(HostsError::NotFound(format!("history file {}", path.display())))
            }
            Err(e) => Err(HostsError::io(&path, e)),
        }
    }

    fn create_unique(&self, stem: &str) -> Result<(String, PathBuf, fs::File)> {
        for seq in 0..1000u32 {
            let filename = format!("{stem}-{seq:03}.{SNAPSHOT_EXT}");
            let path = self.dir.join(&filename);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => return Ok((filename, path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(HostsError::io(&path, e)),
            }
        }
        Err(HostsError::io(
            self.dir.join(stem),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free snapshot name",
            ),
        ))
    }

    /// Align the index with the files on disk. Returns whether anything changed.
    fn reconcile(&mut self, indexed: Vec<HistoryEntry>) -> Result<bool> {
        let mut changed = false;
        let mut seen = HashSet::new();

        for mut entry in indexed {
            if !is_plain_filename(&entry.filename) || !seen.insert(entry.filename.clone()) {
                changed = true;
                continue;
            }
            let path = self.dir.join(&entry.filename);
            if !path.is_file() {
                warn!(file = %entry.filename, "history snapshot missing; dropping from index");
                changed = true;
                continue;
            }
            if entry.path != path {
                entry.path = path;
                changed = true;
            }
            self.entries.push(entry);
        }

        let listing = fs::read_dir(&self.dir).map_err(|e| HostsError::io(&self.dir, e))?;
        for dirent in listing {
            let dirent = dirent.map_err(|e| HostsError::io(&self.dir, e))?;
            let path = dirent.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if !is_snapshot_name(&name) || seen.contains(&name) || !path.is_file() {
                continue;
            }
            match adopt(&path, &name) {
                Ok(entry) => {
                    info!(file = %name, "adopted unindexed history snapshot");
                    seen.insert(name);
                    self.entries.push(entry);
                    changed = true;
                }
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable snapshot"),
            }
        }

        self.sort();
        Ok(changed)
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.filename.cmp(&b.filename))
        });
    }

    fn write_index(&self) -> Result<()> {
        let index = Index {
            version: INDEX_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&index).map_err(|e| HostsError::Encode {
            what: "history index",
            message: e.to_string(),
        })?;
        commit::write_atomic(&self.dir.join(INDEX_FILE), json.as_bytes())
    }
}

fn read_index(dir: &Path) -> Option<Vec<HistoryEntry>> {
    let path = dir.join(INDEX_FILE);
    let s = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<Index>(&s) {
        Ok(index) => Some(index.entries),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "history index unreadable; rebuilding");
            None
        }
    }
}

fn adopt(path: &Path, name: &str) -> Result<HistoryEntry> {
    let meta = fs::metadata(path).map_err(|e| HostsError::io(path, e))?;
    let content = fs::read(path).map_err(|e| HostsError::io(path, e))?;
    let timestamp = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(HistoryEntry {
        filename: name.to_string(),
        path: path.to_path_buf(),
        entry_count: entry_count_of(&content, name),
        file_size: meta.len(),
        timestamp,
    })
}

fn entry_count_of(content: &[u8], filename: &str) -> usize {
    let counted = std::str::from_utf8(content)
        .ok()
        .and_then(store::count_blocked);
    counted.unwrap_or_else(|| {
        warn!(file = %filename, "snapshot does not parse as a hosts file");
        0
    })
}

fn remove_snapshot(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && name != INDEX_FILE
}

fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX)
        && Path::new(name).extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXT)
}
