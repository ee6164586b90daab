// tests/config.rs
//
// Settings loading: file, env path override, env value overrides, sanitize.
// Env-mutating tests run serially.

use std::io::Write;

use finsight::config::{Settings, ENV_CONFIG_PATH, ENV_REDIS_URL};
use serial_test::serial;

const ENV_KEYS: &[&str] = &[
    ENV_CONFIG_PATH,
    ENV_REDIS_URL,
    "FINSIGHT_ALERT_PRICE_THRESHOLD",
    "FINSIGHT_CHUNK_SIZE",
    "FINSIGHT_CHUNK_OVERLAP",
    "FINSIGHT_RETRIEVAL_TOP_K",
];

fn clear_env() {
    for k in ENV_KEYS {
        std::env::remove_var(k);
    }
}

fn write_toml(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(body.as_bytes()).expect("write toml");
    f
}

#[test]
#[serial]
fn env_path_is_loaded() {
    clear_env();
    let f = write_toml(
        r#"
        [retrieval]
        top_k = 12

        [alerts]
        cooldown_secs = 300
        "#,
    );
    std::env::set_var(ENV_CONFIG_PATH, f.path());

    let s = Settings::load_default().unwrap();
    assert_eq!(s.retrieval.top_k, 12);
    assert_eq!(s.alerts.cooldown_secs, 300);
    assert_eq!(s.chunking.chunk_size, 500);
    clear_env();
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/finsight.toml");
    assert!(Settings::load_default().is_err());
    clear_env();
}

#[test]
#[serial]
fn env_values_override_file() {
    clear_env();
    let f = write_toml("[chunking]\nchunk_size = 300\n");
    std::env::set_var("FINSIGHT_CHUNK_SIZE", "256");
    std::env::set_var("FINSIGHT_ALERT_PRICE_THRESHOLD", "0.02");
    std::env::set_var("FINSIGHT_RETRIEVAL_TOP_K", "not-a-number");

    let s = Settings::load_from_file(f.path()).unwrap();
    assert_eq!(s.chunking.chunk_size, 256);
    assert!((s.alerts.price_move_threshold - 0.02).abs() < 1e-12);
    assert_eq!(s.retrieval.top_k, 8);
    clear_env();
}

#[test]
#[serial]
fn out_of_range_values_are_sanitized() {
    clear_env();
    let f = write_toml(
        r#"
        [chunking]
        chunk_size = 0

        [retrieval]
        overfetch_factor = 0

        [alerts]
        price_move_threshold = 5.0
        news_min_score = 0.95
        news_high_score = 0.8
        "#,
    );
    let s = Settings::load_from_file(f.path()).unwrap();
    assert_eq!(s.chunking.chunk_size, 500);
    assert_eq!(s.retrieval.overfetch_factor, 1);
    assert!((s.alerts.price_move_threshold - 0.015).abs() < 1e-12);
    assert!(s.alerts.news_min_score <= s.alerts.news_high_score);
    clear_env();
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    clear_env();
    let f = write_toml("[alerts\ncooldown_secs = ");
    let err = Settings::load_from_file(f.path()).unwrap_err();
    assert!(format!("{err:#}").contains("parsing settings"));
}

#[test]
#[serial]
fn redis_url_from_file_env_or_blank() {
    clear_env();
    let f = write_toml("[store]\nredis_url = \"redis://cache:6379/0\"\n");
    let s = Settings::load_from_file(f.path()).unwrap();
    assert_eq!(s.store.redis_url.as_deref(), Some("redis://cache:6379/0"));

    std::env::set_var(ENV_REDIS_URL, " redis://10.0.0.5:6380/1 ");
    let s = Settings::load_from_file(f.path()).unwrap();
    assert_eq!(s.store.redis_url.as_deref(), Some("redis://10.0.0.5:6380/1"));

    // blank disables the shared store
    std::env::set_var(ENV_REDIS_URL, "  ");
    let s = Settings::load_from_file(f.path()).unwrap();
    assert!(s.store.redis_url.is_none());
    clear_env();
}
