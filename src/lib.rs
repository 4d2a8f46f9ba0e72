//! Hostguard - hosts-file domain blocking with backups and rollback.

pub mod cli;
pub mod commit;
pub mod config;
pub mod domain;
pub mod error;
pub mod history;
pub mod logging;
pub mod parser;
pub mod platform;
pub mod state;
pub mod store;
pub mod watcher;

pub use error::{HostsError, Result};
pub use state::AppState;
