use crate::config::models::AppConfig;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.database.connect_retries, 10);
    assert_eq!(config.coordinator.max_heartbeat_misses, 1);
    assert_eq!(config.worker.pool_size, 5);
    assert_eq!(config.api.bind_address, "0.0.0.0:8081");
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[database]
url = "postgresql://test:5432/taskly_test"
max_connections = 15

[coordinator]
bind_address = "127.0.0.1:7000"
heartbeat_interval_seconds = 3
max_heartbeat_misses = 2
scan_interval_seconds = 4

[worker]
bind_address = "127.0.0.1:7100"
coordinator_url = "http://127.0.0.1:7000"
pool_size = 8

[observability]
log_level = "debug"
log_format = "json"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.database.url, "postgresql://test:5432/taskly_test");
    assert_eq!(config.database.max_connections, 15);
    // 未指定的字段使用默认值
    assert_eq!(config.database.min_connections, 1);
    assert_eq!(config.coordinator.heartbeat_interval_seconds, 3);
    assert_eq!(config.coordinator.max_heartbeat_misses, 2);
    assert_eq!(config.coordinator.scan_interval_seconds, 4);
    assert_eq!(config.coordinator.rpc_timeout_seconds, 5);
    assert_eq!(config.worker.pool_size, 8);
    assert_eq!(config.observability.log_format, "json");
}

#[test]
fn test_config_toml_roundtrip_keeps_intervals() {
    let mut config = AppConfig::default();
    config.coordinator.scan_interval_seconds = 42;
    config.worker.advertise_address = Some("http://10.0.0.5:7100".to_string());

    let toml_str = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(parsed.coordinator.scan_interval_seconds, 42);
    assert_eq!(
        parsed.worker.advertise_address.as_deref(),
        Some("http://10.0.0.5:7100")
    );
}

#[test]
fn test_invalid_log_format_rejected() {
    let toml_content = r#"
[observability]
log_format = "xml"
"#;
    assert!(AppConfig::from_toml(toml_content).is_err());
}
