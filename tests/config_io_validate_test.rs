use talos::config::Config;

#[test]
fn from_file_reads_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        r#"
device_instance: 3
tick_interval_ms: 500
timezone: "Europe/Amsterdam"
settings_file: "/tmp/talos_settings.json"
logging:
  level: "DEBUG"
  console_output: false
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.device_instance, 3);
    assert_eq!(config.tick_interval_ms, 500);
    assert_eq!(config.timezone, "Europe/Amsterdam");
    assert_eq!(config.logging.level, "DEBUG");
    assert!(!config.logging.console_output);
    // Unspecified sections keep their defaults
    assert_eq!(config.relay.path, "/Relay/0/State");
    assert!(config.require_dbus);
}

#[test]
fn invalid_yaml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "tick_interval_ms: [not a number").unwrap();
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn validation_rejects_bad_values() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.tick_interval_ms = 0;
    assert!(config.validate().is_err());

    config = Config::default();
    config.settings_file = String::new();
    assert!(config.validate().is_err());

    config = Config::default();
    config.relay.service = String::new();
    assert!(config.validate().is_err());

    config = Config::default();
    config.timezone = "Not/AZone".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn timezone_resolution_falls_back_to_utc() {
    let mut config = Config::default();
    config.timezone = "garbage".to_string();
    assert_eq!(config.tz(), chrono_tz::UTC);

    config.timezone = "Europe/Amsterdam".to_string();
    assert_eq!(config.tz(), chrono_tz::Europe::Amsterdam);
}

#[test]
fn save_and_reload_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    let mut config = Config::default();
    config.device_instance = 7;
    config.save_to_file(&path).unwrap();

    let reloaded = Config::from_file(&path).unwrap();
    assert_eq!(reloaded.device_instance, 7);
    assert_eq!(reloaded.tick_interval_ms, config.tick_interval_ms);
}
