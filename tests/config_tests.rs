use std::fs;

use rust_decimal_macros::dec;
use tempfile::TempDir;
use venuebridge::domain::{FeeMode, Symbol, VenueId};
use venuebridge::error::{ConfigError, Error};
use venuebridge::infrastructure::config::{LogFormat, Settings};

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).expect("write temp config");
    path
}

#[test]
fn loads_a_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[logging]
level = "debug"
format = "json"

[http]
timeout_ms = 5000
max_retries = 1

[stream]
max_reconnect_attempts = 3
channel_capacity = 256

[arbitrage]
min_spread_pct = "0.25"
fee_mode = "net_taker"

[[exchanges]]
name = "binance"
priority = 9
taker_fee = "0.00075"

[[exchanges]]
name = "coinbase"
enabled = false

[[exchanges]]
name = "kraken"
symbols = ["BTCUSD"]
"#,
    );

    let settings = Settings::load(&path).unwrap();

    assert_eq!(settings.logging.format, LogFormat::Json);
    assert_eq!(settings.http.timeout_ms, 5000);
    assert_eq!(settings.stream.channel_capacity, 256);
    assert_eq!(settings.arbitrage.min_spread_pct, dec!(0.25));
    assert_eq!(settings.arbitrage.fee_mode, FeeMode::NetTaker);

    let enabled: Vec<_> = settings.enabled_exchanges().map(|e| e.name).collect();
    assert_eq!(enabled, vec![VenueId::Binance, VenueId::Kraken]);

    let binance = &settings.exchanges[0];
    assert_eq!(binance.priority, 9);
    assert_eq!(binance.fees().taker, dec!(0.00075));

    let kraken = &settings.exchanges[2];
    assert!(kraken.allows(&Symbol::new("btcusd")));
    assert!(!kraken.allows(&Symbol::new("ETHUSD")));
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = TempDir::new().unwrap();
    let result = Settings::load(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Config(ConfigError::ReadFile(_)))));
}

#[test]
fn rejects_inverted_retry_delays() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[http]
retry_base_delay_ms = 500
retry_max_delay_ms = 100
"#,
    );

    match Settings::load(&path) {
        Err(Error::Config(ConfigError::InvalidValue {
            field: "retry_max_delay_ms",
            ..
        })) => {}
        Err(err) => panic!("Expected invalid retry delay error, got {err}"),
        Ok(_) => panic!("Expected inverted retry delays to be rejected"),
    }
}

#[test]
fn credentials_never_appear_in_debug_output() {
    let settings = Settings::parse_toml_with_env("", |name| match name {
        "KRAKEN_API_KEY" => Some("kraken-public-key-1234".into()),
        "KRAKEN_API_SECRET" => Some("super-secret".into()),
        _ => None,
    })
    .unwrap();

    let kraken = settings
        .exchanges
        .iter()
        .find(|e| e.name == VenueId::Kraken)
        .unwrap();
    assert!(kraken.has_credentials());

    let debug = format!("{kraken:?}");
    assert!(!debug.contains("super-secret"));
    assert!(!debug.contains("kraken-public-key"));
    assert!(debug.contains("****1234"));
}
