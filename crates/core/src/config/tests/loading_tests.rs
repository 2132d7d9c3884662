use std::io::Write;

use crate::config::models::AppConfig;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[database]
url = "sqlite::memory:"

[coordinator]
scan_interval_seconds = 2
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.coordinator.scan_interval_seconds, 2);
    assert_eq!(config.coordinator.heartbeat_interval_seconds, 10);
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/definitely/not/here/taskly.toml"));
    assert!(result.is_err());
}
