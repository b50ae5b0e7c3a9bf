//! Integration tests for happycache-config: real TOML files and real
//! environment variables, rather than the in-process unit tests in
//! `src/lib.rs` that only exercise `apply_env_overrides` directly.

use std::path::PathBuf;

use happycache_config::Config;

static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[test]
fn full_toml_file_round_trips_through_serde() {
    let toml_text = r#"
worker_threads = 8
chunk_pages = 4096
prefetch_block_pages = 16
max_page_budget = 1000000
map_path = "/var/cache/happycache.gz"
"#;
    let config: Config = toml::from_str(toml_text).unwrap();
    assert_eq!(config.worker_threads, Some(8));
    assert_eq!(config.chunk_pages, 4096);
    assert_eq!(config.prefetch_block_pages, 16);
    assert_eq!(config.max_page_budget, Some(1_000_000));
    assert_eq!(config.map_path, PathBuf::from("/var/cache/happycache.gz"));

    let serialized = toml::to_string(&config).unwrap();
    let reparsed: Config = toml::from_str(&serialized).unwrap();
    assert_eq!(config, reparsed);
}

#[test]
fn env_overrides_apply_on_top_of_defaults_via_load() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("HAPPYCACHE_CHUNK_PAGES", "9999");
    std::env::set_var("HAPPYCACHE_MAP_PATH", "/tmp/override.gz");
    let loaded = Config::load();
    std::env::remove_var("HAPPYCACHE_CHUNK_PAGES");
    std::env::remove_var("HAPPYCACHE_MAP_PATH");

    let config = loaded.unwrap();
    assert_eq!(config.chunk_pages, 9999);
    assert_eq!(config.map_path, PathBuf::from("/tmp/override.gz"));
}
