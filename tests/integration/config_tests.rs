use clap::Parser;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use hashgen::cli::Cli;
use hashgen::config::{Config, ConfigError};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

// Environment variables are process-wide; serialize the tests that set them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_toml_file_overrides_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "port = 9090\ncache_capacity = 50\nsync_writes = true\n").unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();

    assert_eq!(config.port, 9090);
    assert_eq!(config.cache_capacity, 50);
    assert!(config.sync_writes);
    assert_eq!(config.host, "localhost");
}

#[test]
fn test_env_overrides_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "port = 9090\njob_delay_ms = 10\n").unwrap();

    std::env::set_var("HASHGEN_PORT", "9191");
    let config: Config = Config::figment(Some(&path)).extract().unwrap();
    std::env::remove_var("HASHGEN_PORT");

    assert_eq!(config.port, 9191);
    assert_eq!(config.job_delay_ms, 10);
}

#[test]
fn test_cli_flags_override_everything() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "port = 9090\nsalt_length = 8\nhost = \"0.0.0.0\"\n").unwrap();

    std::env::set_var("HASHGEN_SALT_LENGTH", "16");
    let cli = Cli::try_parse_from([
        "hashgen",
        "--config",
        path.to_str().unwrap(),
        "--port",
        "7070",
        "--store",
        "/tmp/hashgen-test.jsonl",
    ])
    .unwrap();
    let config = Config::load(&cli);
    std::env::remove_var("HASHGEN_SALT_LENGTH");
    let config = config.unwrap();

    assert_eq!(config.port, 7070);
    assert_eq!(config.salt_length, 16);
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(
        config.store_path,
        Some(PathBuf::from("/tmp/hashgen-test.jsonl"))
    );
}

#[test]
fn test_missing_config_file_is_ignored() {
    let dir = tempdir().unwrap();
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let missing = dir.path().join("absent.toml");

    let config: Config = figment.merge(Toml::file(&missing)).extract().unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "salt_length = 4096\n").unwrap();

    let cli = Cli::try_parse_from(["hashgen", "--config", path.to_str().unwrap()]).unwrap();
    assert!(matches!(Config::load(&cli), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_wrong_type_is_load_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "port = \"eighty\"\n").unwrap();

    let cli = Cli::try_parse_from(["hashgen", "--config", path.to_str().unwrap()]).unwrap();
    assert!(matches!(Config::load(&cli), Err(ConfigError::Load(_))));
}

#[test]
fn test_env_prefix_only() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("HASHGEN_CACHE_CAPACITY", "12");
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("HASHGEN_"))
        .extract()
        .unwrap();
    std::env::remove_var("HASHGEN_CACHE_CAPACITY");

    assert_eq!(config.cache_capacity, 12);
}
