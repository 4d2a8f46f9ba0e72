//! Atomic replacement of the live hosts file.
//!
//! Content is written to a temp file in the destination's directory, synced,
//! given the destination's permissions and renamed over it. A crash at any
//! point leaves either the old or the new file, never a mix. The DNS cache
//! flush that follows is best-effort.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{HostsError, Result};
use crate::platform::DnsFlusher;
use crate::store::DomainStore;

/// Temp file used while replacing `dest`.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hosts".to_string());
    dest.with_file_name(format!(".{name}.hostguard-tmp"))
}

/// Write `content` to the temp file next to `dest` and sync it.
pub(crate) fn stage(dest: &Path, content: &[u8]) -> Result<PathBuf> {
    let temp_path = temp_path_for(dest);
    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&temp_path).map_err(|e| HostsError::io(&temp_path, e))?;
        file.write_all(content)
            .map_err(|e| HostsError::io(&temp_path, e))?;
        file.sync_all().map_err(|e| HostsError::io(&temp_path, e))?;

        // Keep the destination's mode (e.g. 0644 on /etc/hosts)
        if let Ok(meta) = fs::metadata(dest) {
            fs::set_permissions(&temp_path, meta.permissions())
                .map_err(|e| HostsError::io(&temp_path, e))?;
        }
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(temp_path)
}

fn finish(temp_path: &Path, dest: &Path) -> Result<()> {
    if let Err(source) = fs::rename(temp_path, dest) {
        let _ = fs::remove_file(temp_path);
        return Err(HostsError::AtomicRename {
            from: temp_path.to_path_buf(),
            to: dest.to_path_buf(),
            source,
        });
    }

    #[cfg(unix)]
    if let Some(dir) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

/// Replace `dest` with `content` atomically.
pub fn write_atomic(dest: &Path, content: &[u8]) -> Result<()> {
    let temp_path = stage(dest, content)?;
    finish(&temp_path, dest)?;
    debug!(path = %dest.display(), bytes = content.len(), "atomic write complete");
    Ok(())
}

/// Write already-serialized content to `dest`, then flush the DNS cache.
/// Flush failures are logged and do not fail the commit.
pub fn commit_content(dest: &Path, content: &str, flusher: &dyn DnsFlusher) -> Result<()> {
    write_atomic(dest, content.as_bytes())?;
    info!(path = %dest.display(), "hosts file committed");

    if let Err(e) = flusher.flush() {
        warn!(error = %e, "DNS cache flush failed");
    }
    Ok(())
}

/// Serialize `store` and commit it to `dest`.
pub fn commit(store: &DomainStore, dest: &Path, flusher: &dyn DnsFlusher) -> Result<()> {
    commit_content(dest, &store.serialize(), flusher)
}
