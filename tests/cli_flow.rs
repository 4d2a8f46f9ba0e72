//! End-to-end CLI flow against a temp hosts file.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

struct Cli {
    home: tempfile::TempDir,
}

impl Cli {
    fn new(hosts: &str) -> Self {
        let home = common::temp_home();
        std::fs::write(home.path().join("hosts"), hosts).unwrap();
        Self { home }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("hostguard").unwrap();
        cmd.env("HOSTGUARD_HOME", self.home.path())
            .env("HOSTGUARD_HOSTS_FILE", self.home.path().join("hosts"))
            .env("HOSTGUARD_SKIP_DNS_FLUSH", "1")
            .env("RUST_LOG", "warn");
        cmd
    }

    fn hosts(&self) -> String {
        std::fs::read_to_string(self.home.path().join("hosts")).unwrap()
    }
}

#[test]
fn add_list_remove() {
    let cli = Cli::new("127.0.0.1 localhost\n");

    cli.cmd()
        .args(["add", "ads.example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Blocked: ads.example.com"));
    assert_eq!(cli.hosts(), "127.0.0.1 localhost\n0.0.0.0\tads.example.com\n");

    cli.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout("0.0.0.0\tads.example.com\n");

    cli.cmd()
        .args(["stats", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_blocked\": 1"));

    cli.cmd()
        .args(["remove", "ads.example.com"])
        .assert()
        .success();
    assert_eq!(cli.hosts(), "127.0.0.1 localhost\n");

    cli.cmd()
        .args(["remove", "ads.example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn history_and_rollback() {
    let cli = Cli::new("# original\n");
    cli.cmd().args(["add", "a.example.com"]).assert().success();

    let out = cli
        .cmd()
        .args(["history", "list", "--json"])
        .output()
        .unwrap();
    let entries: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let filename = entries[0]["filename"].as_str().unwrap().to_string();

    cli.cmd()
        .args(["history", "rollback", &filename])
        .assert()
        .success();
    assert_eq!(cli.hosts(), "# original\n");

    cli.cmd()
        .args(["history", "delete", &filename, "hosts-backup-missing.txt"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(format!("Deleted: {filename}")))
        .stderr(predicate::str::contains("1 of 2 deletions failed"));
}

#[test]
fn config_set_and_show() {
    let cli = Cli::new("");
    cli.cmd()
        .args(["config", "set", "--max-history", "5", "--theme", "dark"])
        .assert()
        .success();
    cli.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_history_entries: 5"))
        .stdout(predicate::str::contains("theme: dark"));

    cli.cmd()
        .args(["config", "set", "--max-history", "0"])
        .assert()
        .failure();
    cli.cmd().args(["config", "set"]).assert().failure();
}

#[test]
fn import_export_and_path() {
    let cli = Cli::new("");
    let source = cli.home.path().join("blocklist.txt");
    std::fs::write(&source, "# list\n0.0.0.0 x.example.com y.example.com\n").unwrap();

    cli.cmd()
        .args(["import", source.to_str().unwrap()])
        .assert()
        .success();
    cli.cmd()
        .arg("export")
        .assert()
        .success()
        .stdout("# list\n0.0.0.0 x.example.com y.example.com\n");
    cli.cmd()
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains("hosts"));
    cli.cmd().arg("privileges").assert().success();
}
