//! Platform abstraction for the hosts file location, write privileges and
//! DNS cache flushing.

use std::path::{Path, PathBuf};

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

use anyhow::Result;

/// Trait for flushing the OS resolver cache after the hosts file changes.
pub trait DnsFlusher: Send + Sync {
    /// Flush the resolver cache.
    fn flush(&self) -> Result<()>;
}

/// Flusher that does nothing (tests, or HOSTGUARD_SKIP_DNS_FLUSH).
pub struct NoopDnsFlusher;

impl DnsFlusher for NoopDnsFlusher {
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Get platform DnsFlusher implementation.
/// If HOSTGUARD_SKIP_DNS_FLUSH is set (e.g. in tests), flushing is a no-op.
pub fn default_dns_flusher() -> Box<dyn DnsFlusher> {
    if std::env::var_os("HOSTGUARD_SKIP_DNS_FLUSH").is_some() {
        return Box::new(NoopDnsFlusher);
    }
    #[cfg(unix)]
    return Box::new(unix::UnixDnsFlusher);

    #[cfg(windows)]
    return Box::new(windows::WindowsDnsFlusher);
}

/// Default hosts file for this platform.
/// HOSTGUARD_HOSTS_FILE overrides it (e.g. in tests).
pub fn default_hosts_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os("HOSTGUARD_HOSTS_FILE") {
        return PathBuf::from(path);
    }
    #[cfg(unix)]
    return unix::system_hosts_path();

    #[cfg(windows)]
    return windows::system_hosts_path();
}

/// Whether the current process may replace `path`.
///
/// Replacing goes through a temp file and rename, so this needs write access
/// to the file (when it exists) and to its directory.
pub fn can_write(path: &Path) -> bool {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        return false;
    }
    #[cfg(unix)]
    return unix::can_write(path, dir);

    #[cfg(windows)]
    return windows::can_write(path, dir);
}
