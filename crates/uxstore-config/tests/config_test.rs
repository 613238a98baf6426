#![allow(clippy::unwrap_used)]
// Integration tests for config loading and saving.

use std::path::Path;

use figment::Jail;
use pretty_assertions::assert_eq;

use uxstore_config::{Config, ConfigError, load_config_from, save_config_to};

#[test]
fn test_missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn test_save_then_load_preserves_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.store.initial_capacity = 512;
    cfg.preferences.autosave = false;
    cfg.preferences.path = Some(dir.path().join("prefs.toml"));
    save_config_to(&path, &cfg).unwrap();

    assert_eq!(load_config_from(&path).unwrap(), cfg);
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[store]\ncommand_channel_size = 8\n").unwrap();

    let cfg = load_config_from(&path).unwrap();
    assert_eq!(cfg.store.command_channel_size, 8);
    assert_eq!(cfg.store.update_channel_size, Config::default().store.update_channel_size);
    assert!(cfg.preferences.autosave);
}

#[test]
fn test_invalid_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[store]\ncommand_channel_size = \"many\"\n").unwrap();

    let result = load_config_from(&path);
    assert!(
        matches!(result, Err(ConfigError::Figment(_))),
        "expected Figment error, got: {result:?}"
    );
}

#[test]
fn test_env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[store]\ncommand_channel_size = 8\n")?;
        jail.set_env("UXSTORE_STORE__COMMAND_CHANNEL_SIZE", "16");
        jail.set_env("UXSTORE_PREFERENCES__AUTOSAVE", "false");

        let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
        assert_eq!(cfg.store.command_channel_size, 16);
        assert!(!cfg.preferences.autosave);
        Ok(())
    });
}

#[test]
fn test_zero_sized_channel_from_file_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[store]\nupdate_channel_size = 0\n").unwrap();

    let result = load_config_from(&path).unwrap().store_config();
    assert!(
        matches!(result, Err(ConfigError::Validation { .. })),
        "expected Validation error, got: {result:?}"
    );
}
