//! Windows platform implementations.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::DnsFlusher;

pub fn system_hosts_path() -> PathBuf {
    let root = std::env::var_os("SystemRoot").unwrap_or_else(|| r"C:\Windows".into());
    PathBuf::from(root)
        .join("System32")
        .join("drivers")
        .join("etc")
        .join("hosts")
}

pub fn can_write(path: &Path, dir: &Path) -> bool {
    if path.exists() {
        // Opening without truncate leaves the content untouched.
        return std::fs::OpenOptions::new().write(true).open(path).is_ok();
    }
    std::fs::metadata(dir)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

pub struct WindowsDnsFlusher;

impl DnsFlusher for WindowsDnsFlusher {
    fn flush(&self) -> Result<()> {
        let status = Command::new("ipconfig")
            .arg("/flushdns")
            .status()
            .context("ipconfig /flushdns")?;
        if !status.success() {
            anyhow::bail!("ipconfig /flushdns failed");
        }
        Ok(())
    }
}
