//! CLI definitions and command routing.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigUpdate, Theme};
use crate::history::HistoryEntry;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "hostguard")]
#[command(about = "Block domains through the system hosts file, with history and rollback")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List blocked (ip, hostname) pairs
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show blocked count and number of distinct block addresses
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Block a hostname and save
    Add {
        hostname: String,
        /// Block address to map the hostname to
        #[arg(long, default_value = "0.0.0.0")]
        ip: String,
    },
    /// Unblock a hostname and save; without --ip every blocked mapping of it is removed
    Remove {
        hostname: String,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Write the current document (snapshotting the previous file first)
    Save,
    /// Manage backups of the hosts file (list, rollback, delete)
    History {
        #[command(subcommand)]
        cmd: HistoryCmd,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    /// Print the hosts file path in use
    Path,
    /// Report whether the hosts file can be written by this user
    Privileges,
    /// Print the hosts document to stdout
    Export,
    /// Replace the hosts document with the content of a file and save
    Import { file: PathBuf },
    /// Watch the hosts file and reload on external changes until Ctrl-C
    Watch {
        /// Coalescing window for bursts of file events
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum HistoryCmd {
    /// List backups, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Restore the hosts file from a backup
    Rollback { filename: String },
    /// Delete one or more backups
    Delete {
        #[arg(num_args = 1.., required = true)]
        filenames: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the effective configuration
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Update settings; an empty path restores the default
    Set {
        #[arg(long)]
        host_file: Option<PathBuf>,
        #[arg(long)]
        history_dir: Option<PathBuf>,
        #[arg(long)]
        max_history: Option<usize>,
        #[arg(long, value_enum)]
        theme: Option<Theme>,
    },
}

/// Run CLI and dispatch to handlers.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let state = AppState::open_default()?;

    match cli.command {
        Commands::List { json } => cmd_list(&state, json),
        Commands::Stats { json } => cmd_stats(&state, json),
        Commands::Add { hostname, ip } => cmd_add(&state, &ip, &hostname),
        Commands::Remove { hostname, ip } => cmd_remove(&state, ip.as_deref(), &hostname),
        Commands::Save => {
            state.save_changes()?;
            println!("Saved {}", state.get_host_file_path().display());
            Ok(())
        }
        Commands::History { cmd } => cmd_history(&state, cmd),
        Commands::Config { cmd } => cmd_config(&state, cmd),
        Commands::Path => {
            println!("{}", state.get_host_file_path().display());
            Ok(())
        }
        Commands::Privileges => {
            let path = state.get_host_file_path();
            if state.check_admin_privileges() {
                println!("writable: {}", path.display());
            } else {
                println!("read-only: {}", path.display());
                eprintln!("Warning: saving requires elevated privileges (try sudo).");
            }
            Ok(())
        }
        Commands::Export => {
            print!("{}", state.export_hosts());
            Ok(())
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            state.import_hosts(&text)?;
            state.save_changes()?;
            println!("Imported {}", file.display());
            Ok(())
        }
        Commands::Watch { debounce_ms } => cmd_watch(state, debounce_ms),
    }
}

fn cmd_list(state: &AppState, json: bool) -> Result<()> {
    let blocked = state.get_blocked_domains();
    if json {
        println!("{}", serde_json::to_string_pretty(&blocked)?);
        return Ok(());
    }
    for d in &blocked {
        println!("{}\t{}", d.ip, d.hostname);
    }
    Ok(())
}

fn cmd_stats(state: &AppState, json: bool) -> Result<()> {
    let stats = state.get_statistics();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("blocked: {}", stats.total_blocked);
        println!("unique ips: {}", stats.unique_ips);
    }
    Ok(())
}

fn cmd_add(state: &AppState, ip: &str, hostname: &str) -> Result<()> {
    if !state.add_domain(ip, hostname)? {
        println!("Already blocked: {hostname} ({ip})");
        return Ok(());
    }
    state.save_changes()?;
    println!("Blocked: {hostname} ({ip})");
    Ok(())
}

fn cmd_remove(state: &AppState, ip: Option<&str>, hostname: &str) -> Result<()> {
    let ips: Vec<String> = match ip {
        Some(ip) => vec![ip.to_string()],
        None => {
            let wanted = hostname.to_ascii_lowercase();
            let ips: Vec<String> = state
                .get_blocked_domains()
                .into_iter()
                .filter(|d| d.hostname == wanted)
                .map(|d| d.ip.to_string())
                .collect();
            if ips.is_empty() {
                bail!("{hostname} is not blocked");
            }
            ips
        }
    };
    for ip in &ips {
        state.remove_domain(ip, hostname)?;
    }
    state.save_changes()?;
    println!("Unblocked: {hostname}");
    Ok(())
}

fn cmd_history(state: &AppState, cmd: HistoryCmd) -> Result<()> {
    match cmd {
        HistoryCmd::List { json } => {
            let entries = state.get_history_list();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            for e in &entries {
                println!("{}", format_entry(e));
            }
            Ok(())
        }
        HistoryCmd::Rollback { filename } => {
            state.rollback_to(&filename)?;
            println!("Rolled back to {filename}");
            Ok(())
        }
        HistoryCmd::Delete { filenames } => {
            let report = state.delete_history_files(&filenames);
            for name in &report.deleted {
                println!("Deleted: {name}");
            }
            for (name, e) in &report.failed {
                eprintln!("Failed: {name}: {e}");
            }
            if !report.is_complete() {
                bail!(
                    "{} of {} deletions failed",
                    report.failed.len(),
                    filenames.len()
                );
            }
            Ok(())
        }
    }
}

fn format_entry(e: &HistoryEntry) -> String {
    let when = chrono::DateTime::from_timestamp(e.timestamp as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| e.timestamp.to_string());
    format!(
        "{}\t{}\t{} entries\t{} bytes",
        e.filename, when, e.entry_count, e.file_size
    )
}

fn cmd_config(state: &AppState, cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Show { json } => {
            let config = state.get_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(());
            }
            let hosts = state.get_host_file_path();
            let history = config.resolved_history_dir(state.paths());
            let origin = |set: bool| if set { "" } else { " (default)" };
            println!(
                "host_file: {}{}",
                hosts.display(),
                origin(config.host_file_path.is_some())
            );
            println!(
                "history_dir: {}{}",
                history.display(),
                origin(config.history_dir.is_some())
            );
            println!("max_history_entries: {}", config.max_history_entries);
            println!("theme: {}", config.theme.as_str());
            Ok(())
        }
        ConfigCmd::Set {
            host_file,
            history_dir,
            max_history,
            theme,
        } => {
            let update = ConfigUpdate {
                host_file_path: host_file,
                history_dir,
                max_history_entries: max_history,
                theme,
            };
            if update.host_file_path.is_none()
                && update.history_dir.is_none()
                && update.max_history_entries.is_none()
                && update.theme.is_none()
            {
                bail!("nothing to set; pass at least one option");
            }
            state.update_config(update)?;
            println!("Updated {}", state.paths().config_file.display());
            Ok(())
        }
    }
}

fn cmd_watch(state: AppState, debounce_ms: u64) -> Result<()> {
    let state = Arc::new(state);
    let watcher =
        crate::watcher::start_watcher(Arc::clone(&state), Duration::from_millis(debounce_ms))?;
    println!("Watching {} (Ctrl-C to stop)", watcher.path().display());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(tokio::signal::ctrl_c())?;
    drop(watcher);
    println!("Stopped watching.");
    Ok(())
}
