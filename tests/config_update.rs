//! Config updates persist and re-point the hosts file and history directory.

mod common;

use hostguard::config::{ConfigStore, ConfigUpdate, Theme};
use hostguard::HostsError;

#[test]
fn update_persists_across_reopen() {
    let env = common::TestEnv::new(Some(""));
    let state = env.open();
    state
        .update_config(ConfigUpdate {
            max_history_entries: Some(7),
            theme: Some(Theme::Dark),
            ..Default::default()
        })
        .unwrap();
    drop(state);

    let reopened = env.open();
    let config = reopened.get_config();
    assert_eq!(config.max_history_entries, 7);
    assert_eq!(config.theme, Theme::Dark);
    assert_eq!(config.host_file_path.as_deref(), Some(env.hosts.as_path()));
}

#[test]
fn out_of_range_limit_is_rejected() {
    let env = common::TestEnv::new(Some(""));
    let state = env.open();
    for bad in [0, 1001] {
        let err = state
            .update_config(ConfigUpdate {
                max_history_entries: Some(bad),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, HostsError::Validation { .. }));
    }
    assert_eq!(state.get_config().max_history_entries, 20);
}

#[test]
fn changing_hosts_path_reloads_document() {
    let env = common::TestEnv::new(Some("0.0.0.0 old.example.com\n"));
    let other = env.home.path().join("other-hosts");
    std::fs::write(&other, "0.0.0.0 new.example.com\n").unwrap();
    let state = env.open();

    state
        .update_config(ConfigUpdate {
            host_file_path: Some(other.clone()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(state.get_host_file_path(), other);
    let hosts: Vec<String> = state
        .get_blocked_domains()
        .into_iter()
        .map(|d| d.hostname)
        .collect();
    assert_eq!(hosts, vec!["new.example.com"]);
}

#[test]
fn changing_history_dir_moves_new_snapshots() {
    let env = common::TestEnv::new(Some(""));
    let state = env.open();
    state.add_domain("0.0.0.0", "a.example.com").unwrap();
    state.save_changes().unwrap();
    assert_eq!(state.get_history_list().len(), 1);

    let dir = env.home.path().join("elsewhere");
    state
        .update_config(ConfigUpdate {
            history_dir: Some(dir.clone()),
            ..Default::default()
        })
        .unwrap();
    assert!(state.get_history_list().is_empty());

    state.add_domain("0.0.0.0", "b.example.com").unwrap();
    state.save_changes().unwrap();
    let history = state.get_history_list();
    assert_eq!(history.len(), 1);
    assert!(history[0].path.starts_with(&dir));
}

#[test]
fn first_open_writes_default_config() {
    let home = common::temp_home();
    let paths = hostguard::config::AppPaths::for_test(home.path());
    assert!(!paths.config_file.exists());
    // other tests here set an explicit override, so the env default is only seen here
    std::env::set_var("HOSTGUARD_HOSTS_FILE", home.path().join("hosts"));
    let _state = hostguard::AppState::open(
        paths.clone(),
        Box::new(hostguard::platform::NoopDnsFlusher),
    )
    .unwrap();
    assert!(paths.config_file.is_file());
    assert!(paths.default_history_dir.is_dir());

    let loaded = ConfigStore::load(&paths.config_file).unwrap();
    assert_eq!(loaded.config().max_history_entries, 20);
}

#[test]
fn unparsable_new_hosts_file_leaves_everything_unchanged() {
    let env = common::TestEnv::new(Some("0.0.0.0 old.example.com\n"));
    let other = env.home.path().join("other-hosts");
    std::fs::write(&other, "[section]\nkey = value\n").unwrap();
    let state = env.open();

    let err = state
        .update_config(ConfigUpdate {
            host_file_path: Some(other.clone()),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, HostsError::Parse { line: 1, .. }));

    assert_eq!(state.get_host_file_path(), env.hosts);
    let reloaded = ConfigStore::load(&env.paths.config_file).unwrap();
    assert_eq!(reloaded.config().host_file_path.as_deref(), Some(env.hosts.as_path()));

    // a later save goes to the original file and never touches the other one
    state.add_domain("0.0.0.0", "new.example.com").unwrap();
    state.save_changes().unwrap();
    assert_eq!(
        std::fs::read_to_string(&other).unwrap(),
        "[section]\nkey = value\n"
    );
    assert_eq!(
        env.read_hosts(),
        "0.0.0.0 old.example.com\n0.0.0.0\tnew.example.com\n"
    );
}

#[test]
fn unusable_history_dir_leaves_everything_unchanged() {
    let env = common::TestEnv::new(Some("0.0.0.0 old.example.com\n"));
    let blocker = env.home.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();
    let other = env.home.path().join("other-hosts");
    std::fs::write(&other, "0.0.0.0 new.example.com\n").unwrap();
    let state = env.open();

    let before = state.get_config();
    let result = state.update_config(ConfigUpdate {
        host_file_path: Some(other),
        history_dir: Some(blocker.join("history")),
        ..Default::default()
    });
    assert!(result.is_err());
    assert_eq!(state.get_config(), before);
    let hosts: Vec<String> = state
        .get_blocked_domains()
        .into_iter()
        .map(|d| d.hostname)
        .collect();
    assert_eq!(hosts, vec!["old.example.com"]);
}
