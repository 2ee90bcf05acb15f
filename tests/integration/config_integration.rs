//! Integration tests for layered configuration loading

use super::test_utils::with_config_home;
use contree::config::{ConfigLoader, ContreeConfig, QueuePolicy, DEFAULT_POOL};
use contree::continuation::{ContinuationsManager, NewContinuation};
use contree::error::ApiError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_workspace_file_overrides_global_file() {
    let test_dir = TempDir::new().unwrap();
    with_config_home(&test_dir, || {
        let global_dir = test_dir.path().join("xdg").join("contree");
        fs::create_dir_all(&global_dir).unwrap();
        fs::write(
            global_dir.join("config.toml"),
            r#"
[continuations]
default_ttl_ms = 1000
legacy_scope_compat = true
"#,
        )
        .unwrap();

        let workspace = test_dir.path().join("ws");
        fs::create_dir_all(workspace.join("config")).unwrap();
        fs::write(
            workspace.join("config").join("config.toml"),
            r#"
[continuations]
default_ttl_ms = 2000

[scheduler.pools.sweeper]
min_threads = 1
max_threads = 1
queue_capacity = 4
"#,
        )
        .unwrap();

        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(config.continuations.default_ttl_ms, 2000);
        assert!(config.continuations.legacy_scope_compat);
        assert_eq!(
            config.scheduler.pools.get("sweeper").unwrap().queue_policy(),
            QueuePolicy::Bounded(4)
        );
        assert!(config.scheduler.pools.contains_key(DEFAULT_POOL));
        assert!(config.validate().is_ok());
    });
}

#[test]
fn test_environment_has_highest_precedence() {
    let test_dir = TempDir::new().unwrap();
    with_config_home(&test_dir, || {
        let workspace = test_dir.path().join("ws");
        fs::create_dir_all(workspace.join("config")).unwrap();
        fs::write(
            workspace.join("config").join("config.toml"),
            "[continuations]\nsweep_period_ms = 500\n",
        )
        .unwrap();

        std::env::set_var("CONTREE__CONTINUATIONS__SWEEP_PERIOD_MS", "750");
        std::env::set_var("CONTREE__CONTINUATIONS__SESSION_BOUND", "true");
        let result = ConfigLoader::load(&workspace);
        std::env::remove_var("CONTREE__CONTINUATIONS__SWEEP_PERIOD_MS");
        std::env::remove_var("CONTREE__CONTINUATIONS__SESSION_BOUND");

        let config = result.unwrap();
        assert_eq!(config.continuations.sweep_period_ms, 750);
        assert!(config.continuations.session_bound);
    });
}

#[test]
fn test_defaults_without_any_file() {
    let test_dir = TempDir::new().unwrap();
    with_config_home(&test_dir, || {
        let config = ConfigLoader::load(test_dir.path()).unwrap();
        assert_eq!(config.continuations.default_ttl_ms, 3_600_000);
        assert_eq!(config.continuations.id_bytes, 20);
        assert_eq!(config.scheduler.default_pool, DEFAULT_POOL);
    });
}

#[test]
fn test_invalid_file_fails_validation() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("bad.toml");
    fs::write(
        &config_file,
        r#"
[continuations]
sweep_period_ms = 0
sweep_pool = "nowhere"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(matches!(config.validated(), Err(ApiError::ConfigError(_))));
}

#[test]
fn test_loaded_config_drives_manager() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("contree.toml");
    fs::write(
        &config_file,
        "[continuations]\ndefault_ttl_ms = 42\nid_bytes = 8\n",
    )
    .unwrap();

    let config: ContreeConfig = ConfigLoader::load_from_file(&config_file)
        .unwrap()
        .validated()
        .unwrap();
    let manager: ContinuationsManager<()> = ContinuationsManager::new(config.continuations);
    let node = manager.create(NewContinuation::new((), "flow")).unwrap();
    assert_eq!(node.time_to_live().as_millis(), 42);
    assert_eq!(node.id().as_str().len(), 16);
}
