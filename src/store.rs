//! In-memory model of the hosts file.

use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use serde::Serialize;

use crate::domain;
use crate::error::{HostsError, Result};
use crate::parser::{self, LineEnding, LineRecord, MappingEntry};

/// A blocked `(ip, hostname)` pair derived from mapping lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BlockedDomain {
    pub ip: IpAddr,
    pub hostname: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_blocked: usize,
    pub unique_ips: usize,
}

/// Ordered line records plus the content last known to be on disk.
#[derive(Debug, Clone, Default)]
pub struct DomainStore {
    records: Vec<LineRecord>,
    revision: u64,
    synced_revision: u64,
    synced_content: Option<String>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from text without touching disk.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut store = Self::new();
        store.replace_text(text)?;
        Ok(store)
    }

    /// Read and parse `path`, replacing the current records. On failure the
    /// previous records are kept.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|e| HostsError::io(path, e))?;
        self.load_content(content)
    }

    /// Replace records with already-read disk content and mark them in sync.
    pub fn load_content(&mut self, content: String) -> Result<()> {
        let records = parser::parse(&content)?;
        self.records = records;
        self.revision += 1;
        self.mark_synced(self.revision, content);
        Ok(())
    }

    /// Replace records from text that is not (yet) on disk.
    pub fn replace_text(&mut self, text: &str) -> Result<()> {
        self.records = parser::parse(text)?;
        self.revision += 1;
        Ok(())
    }

    /// Append a mapping unless the exact pair is already mapped.
    /// Returns whether a record was added.
    pub fn add(&mut self, ip: &str, hostname: &str) -> Result<bool> {
        let ip = domain::parse_block_address(ip)?;
        let hostname = domain::validate_hostname(hostname)?;
        if self.mappings().any(|m| m.contains(&ip, &hostname)) {
            return Ok(false);
        }

        let ending = parser::dominant_ending(&self.records);
        if let Some(last) = self.records.last_mut() {
            if last.ending() == LineEnding::None {
                last.set_ending(ending);
            }
        }
        self.records.push(LineRecord::Mapping {
            entry: MappingEntry::new(ip, hostname),
            ending,
        });
        self.revision += 1;
        Ok(true)
    }

    /// Remove `(ip, hostname)` from every mapping line that carries it.
    /// Lines left without hostnames are dropped.
    pub fn remove(&mut self, ip: &str, hostname: &str) -> Result<()> {
        let addr = domain::parse_ip(ip.trim())
            .ok_or_else(|| HostsError::validation("ip", format!("{ip:?} is not an IP address")))?;
        let hostname = hostname.trim().trim_end_matches('.');

        let mut removed = false;
        self.records.retain_mut(|record| {
            let LineRecord::Mapping { entry, .. } = record else {
                return true;
            };
            if entry.ip() != addr {
                return true;
            }
            while entry.remove_hostname(hostname) {
                removed = true;
            }
            !entry.hostnames().is_empty()
        });
        if !removed {
            return Err(HostsError::NotFound(format!("{addr} {hostname}")));
        }
        self.revision += 1;
        Ok(())
    }

    /// Blocked pairs in insertion order, de-duplicated.
    pub fn list_blocked(&self) -> Vec<BlockedDomain> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entry in self.mappings() {
            for hostname in entry.hostnames() {
                if !domain::is_blocked(&entry.ip(), hostname) {
                    continue;
                }
                let item = BlockedDomain {
                    ip: entry.ip(),
                    hostname: hostname.trim_end_matches('.').to_ascii_lowercase(),
                };
                if seen.insert(item.clone()) {
                    out.push(item);
                }
            }
        }
        out
    }

    pub fn statistics(&self) -> Statistics {
        let blocked = self.list_blocked();
        let unique_ips: HashSet<IpAddr> = blocked.iter().map(|b| b.ip).collect();
        Statistics {
            total_blocked: blocked.len(),
            unique_ips: unique_ips.len(),
        }
    }

    pub fn records(&self) -> &[LineRecord] {
        &self.records
    }

    pub fn serialize(&self) -> String {
        parser::serialize(&self.records)
    }

    /// Monotonic counter bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when in-memory records differ from what was last loaded or written.
    pub fn is_dirty(&self) -> bool {
        self.revision != self.synced_revision
    }

    /// Content last read from or written to disk.
    pub fn synced_content(&self) -> Option<&str> {
        self.synced_content.as_deref()
    }

    /// Record that the state at `revision` is now on disk as `content`.
    pub fn mark_synced(&mut self, revision: u64, content: String) {
        self.synced_revision = revision;
        self.synced_content = Some(content);
    }

    fn mappings(&self) -> impl Iterator<Item = &MappingEntry> {
        self.records.iter().filter_map(LineRecord::as_mapping)
    }
}

/// Number of blocked pairs in hosts text, or `None` if it does not parse.
pub fn count_blocked(text: &str) -> Option<usize> {
    DomainStore::from_text(text)
        .ok()
        .map(|s| s.statistics().total_blocked)
}
