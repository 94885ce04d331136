use log_shipper::app::config::{DEFAULT_BATCH_SIZE, DEFAULT_ENDPOINT};
use log_shipper::app::{Command, Config, ConfigError, LogFormat, LogLevel};
use log_shipper::domain::{FileFormat, ListenAddress};
use log_shipper::sender::{Compression, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("shipper.toml");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_defaults_for_live_mode() {
    let config = Config::from_args(["log-shipper", "live"]).unwrap();

    assert_eq!(config.command, Command::Live);
    assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(config.poll_interval, Duration::from_secs(10));
    assert_eq!(config.file_batch_size, 5000);
    assert_eq!(config.compression, Compression::Lz4);
    assert!(config.host_tags);
    assert_eq!(RetryPolicy::from(config.retry), RetryPolicy::default());

    let channels: Vec<_> = config.bindings.iter().map(|b| b.channel.as_str()).collect();
    assert_eq!(
        channels,
        vec![
            "CpuInfoPipe",
            "DispatcherLogPipe",
            "DispatcherCSVPipe",
            "mlscenariocsvPipe",
            "AutoTestResult"
        ]
    );
    assert_eq!(config.live_bindings().count(), 4);
    assert_eq!(
        config.bindings[0].listen,
        Some(ListenAddress::Unix(PathBuf::from(
            "/tmp/log-shipper/CpuInfoPipe.sock"
        )))
    );
}

#[test]
fn test_file_values_fill_defaults_but_cli_wins() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
endpoint = "http://127.0.0.1:9000"
batch_size = 100
poll_interval_ms = 250
log_level = "debug"
log_format = "json"
compression = "deflate"
host_tags = false

[retry]
max_attempts = 3
delay_ms = 500

[[sources]]
channel = "Telemetry"
destination = "telemetry"
listen = "tcp:127.0.0.1:7000"
"#,
    );

    let config = Config::from_args([
        "log-shipper",
        "--config",
        path.as_str(),
        "--batch-size",
        "10",
        "live",
    ])
    .unwrap();

    assert_eq!(config.batch_size, 10);
    assert_eq!(config.endpoint, "http://127.0.0.1:9000");
    assert_eq!(config.poll_interval, Duration::from_millis(250));
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.compression, Compression::Deflate);
    assert!(!config.host_tags);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.delay, Duration::from_millis(500));
    assert_eq!(config.bindings.len(), 1);
    assert_eq!(config.bindings[0].file_format, FileFormat::Csv);
}

#[test]
fn test_file_mode_destination_is_case_insensitive() {
    let config = Config::from_args([
        "log-shipper",
        "file",
        "-d",
        "/AutoTestLog",
        "AutoTestResult_20250121-132444.csv",
    ])
    .unwrap();

    let target = config.file_target().unwrap().unwrap();
    assert_eq!(target.destination.as_str(), "autotestlog");
    assert_eq!(target.format, FileFormat::StampedCsv);
    assert_eq!(
        target.path,
        PathBuf::from("AutoTestResult_20250121-132444.csv")
    );
}

#[test]
fn test_file_mode_format_override() {
    let config = Config::from_args([
        "log-shipper",
        "file",
        "--destination",
        "dispatcherlog",
        "--format",
        "csv",
        "dispatcher.csv",
    ])
    .unwrap();

    assert_eq!(config.file_target().unwrap().unwrap().format, FileFormat::Csv);
}

#[test]
fn test_unknown_destination_lists_valid_names() {
    let err = Config::from_args(["log-shipper", "file", "-d", "nowhere", "x.csv"]).unwrap_err();
    match err {
        ConfigError::UnknownDestination { destination, valid } => {
            assert_eq!(destination, "nowhere");
            assert!(valid.contains("cpuinfolog"));
            assert!(valid.contains("autotestlog"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_values_are_rejected() {
    assert!(matches!(
        Config::from_args(["log-shipper", "--batch-size", "0", "live"]),
        Err(ConfigError::InvalidConfig(_))
    ));
    assert!(matches!(
        Config::from_args(["log-shipper", "--endpoint", "not a url", "live"]),
        Err(ConfigError::InvalidUrl(_))
    ));
    assert!(matches!(
        Config::from_args(["log-shipper", "--compression", "zstd", "live"]),
        Err(ConfigError::Cli(_))
    ));
    assert!(matches!(
        Config::from_args(["log-shipper"]),
        Err(ConfigError::Cli(_))
    ));
}

#[test]
fn test_duplicate_bindings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[sources]]
channel = "A"
destination = "cpuinfolog"
listen = "tcp:127.0.0.1:7000"

[[sources]]
channel = "B"
destination = "CpuInfoLog"
listen = "tcp:127.0.0.1:7001"
"#,
    );

    let err = Config::from_args(["log-shipper", "--config", path.as_str(), "live"]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidSource(_)));
}

#[test]
fn test_live_mode_needs_a_listening_source() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[sources]]
channel = "AutoTestResult"
destination = "autotestlog"
format = "stamped-csv"
"#,
    );

    let err = Config::from_args(["log-shipper", "--config", path.as_str(), "live"]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig(_)));
}

#[test]
fn test_bad_listen_address_and_unknown_keys() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[sources]]
channel = "A"
destination = "a"
listen = "pipe:A"
"#,
    );
    assert!(matches!(
        Config::from_args(["log-shipper", "--config", path.as_str(), "live"]),
        Err(ConfigError::InvalidSource(_))
    ));

    let path = write_config(&dir, "unknown_key = 1\n");
    assert!(matches!(
        Config::from_args(["log-shipper", "--config", path.as_str(), "live"]),
        Err(ConfigError::ParseError(_))
    ));
}
