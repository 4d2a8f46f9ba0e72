//! Watches the live hosts file and reloads the shared document when another
//! process changes it.
//!
//! The parent directory is watched rather than the file itself: editors and
//! our own commit replace the file by rename, which would orphan a watch on
//! the old inode. Bursts of events are debounced into one reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer};
use tracing::{debug, info, warn};

use crate::error::{HostsError, Result};
use crate::state::AppState;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Running watcher; dropping it stops watching.
pub struct HostsWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    path: PathBuf,
}

impl HostsWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Start watching the current hosts file of `state`.
pub fn start_watcher(state: Arc<AppState>, debounce: Duration) -> Result<HostsWatcher> {
    let path = state.get_host_file_path();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(name) = path.file_name().map(|n| n.to_os_string()) else {
        return Err(HostsError::validation(
            "host_file_path",
            format!("{} has no file name", path.display()),
        ));
    };

    let handler_name = name.clone();
    let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
        Ok(events) => {
            if touches(&events, &handler_name) {
                debug!(events = events.len(), "hosts file change detected");
                state.reload_from_watcher();
            }
        }
        Err(e) => warn!(error = %e, "file watcher error"),
    })
    .map_err(|source| HostsError::Watch {
        path: path.clone(),
        source,
    })?;

    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|source| HostsError::Watch {
            path: dir.clone(),
            source,
        })?;

    info!(path = %path.display(), "watching hosts file");
    Ok(HostsWatcher {
        _debouncer: debouncer,
        path,
    })
}

/// Whether any event in the batch concerns a file named `name`.
fn touches(events: &[DebouncedEvent], name: &OsString) -> bool {
    events.iter().any(|e| is_target(&e.path, name))
}

fn is_target(event_path: &Path, name: &OsString) -> bool {
    event_path.file_name() == Some(name.as_os_str())
}
