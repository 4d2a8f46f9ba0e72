//! Unix (macOS, Linux) platform implementations.

use anyhow::Result;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::DnsFlusher;

pub fn system_hosts_path() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

fn access_w(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

pub fn can_write(path: &Path, dir: &Path) -> bool {
    if unsafe { libc::geteuid() } == 0 {
        return true;
    }
    access_w(dir) && (!path.exists() || access_w(path))
}

pub struct UnixDnsFlusher;

impl DnsFlusher for UnixDnsFlusher {
    fn flush(&self) -> Result<()> {
        #[cfg(target_os = "macos")]
        {
            use anyhow::Context;
            let _ = Command::new("dscacheutil").arg("-flushcache").status();
            let status = Command::new("killall")
                .args(["-HUP", "mDNSResponder"])
                .status()
                .context("killall -HUP mDNSResponder")?;
            if !status.success() {
                anyhow::bail!("killall -HUP mDNSResponder exited with {status}");
            }
        }

        #[cfg(not(target_os = "macos"))]
        {
            // systemd-resolved first, then the older alias, then nscd
            let candidates: [(&str, &[&str]); 3] = [
                ("resolvectl", &["flush-caches"]),
                ("systemd-resolve", &["--flush-caches"]),
                ("nscd", &["-i", "hosts"]),
            ];
            let mut last_err = None;
            for (program, args) in candidates {
                match Command::new(program).args(args).status() {
                    Ok(status) if status.success() => return Ok(()),
                    Ok(status) => {
                        last_err = Some(anyhow::anyhow!("{program} exited with {status}"))
                    }
                    Err(e) => last_err = Some(anyhow::Error::new(e).context(program)),
                }
            }
            if let Some(e) = last_err {
                return Err(e.context("no resolver cache could be flushed"));
            }
        }
        Ok(())
    }
}
