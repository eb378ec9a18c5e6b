use super::*;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 3004);
    assert_eq!(config.devtools.ports, vec![9000, 9001, 9002, 9003]);
    assert_eq!(config.devtools.default_port, 9000);
}

#[test]
fn test_devtools_config_default() {
    let devtools = DevtoolsConfig::default();
    assert_eq!(devtools.host, "127.0.0.1");
    assert_eq!(devtools.handshake_timeout_ms, 5000);
    assert_eq!(devtools.call_timeout_ms, 5000);
    assert_eq!(devtools.url_pattern, "workbench.html");
    assert!(devtools.title_exclude.contains("Launchpad"));
}

#[test]
fn test_devtools_endpoint() {
    let devtools = DevtoolsConfig::default();
    assert_eq!(devtools.endpoint(9001), "http://127.0.0.1:9001");
}

#[test]
fn test_devtools_durations() {
    let devtools = DevtoolsConfig::default();
    assert_eq!(devtools.call_timeout().as_millis(), 5000);
    assert_eq!(devtools.context_settle().as_millis(), 200);
}

#[test]
fn test_sync_config_default() {
    let sync = SyncConfig::default();
    assert_eq!(sync.poll_interval_ms, 1500);
    assert_eq!(sync.subscriber_buffer, 16);
    assert_eq!(sync.send_timeout().as_millis(), 2000);
    assert!(sync.capture_script.is_none());
}

#[test]
fn test_dedup_config_default() {
    let dedup = DedupConfig::default();
    assert_eq!(dedup.window().as_secs(), 30);
    assert_eq!(dedup.derive_bucket_secs, 5);
    assert!(dedup.release_on_failure);
}

#[test]
fn test_logging_config_default() {
    let logging = LoggingConfig::default();
    assert_eq!(logging.level, "info");
    assert!(logging.directory.is_none());
    assert_eq!(logging.max_files, 14);
}

#[test]
fn test_config_serialize_roundtrip_skips_unset_paths() {
    let config = Config::default();
    let toml = toml::to_string(&config).unwrap();
    assert!(!toml.contains("capture_script"));
    assert!(toml.contains("[devtools]"));
}
