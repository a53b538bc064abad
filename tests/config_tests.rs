//! Configuration Module Tests
//!
//! Unit tests and property-based tests for the config module.
//!
//! Property tests validate:
//! - Written properties are read back unchanged
//! - Absent keys fall back to defaults

use hft_tcp_client::{Config, ReceiveMode};
use proptest::prelude::*;
use std::io::Write;

#[test]
fn test_default_config_values() {
    let config = Config::default();

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 8888);
    assert_eq!(config.client_id, 1);
    assert_eq!(config.connect_timeout_ms, 5000);
    assert!(config.auto_reconnect);
    assert_eq!(config.reconnect_interval_ms, 1000);
    assert_eq!(config.reconnect_timeout_ms, 5000);
    assert_eq!(config.heartbeat_interval_ms, 1000);
    assert_eq!(config.receive_mode, ReceiveMode::Event);
    assert_eq!(config.poll_interval_us, 100);
    assert_eq!(config.recv_buffer_size, 65536);
    assert_eq!(config.max_queue_depth, 0);
    assert!(!config.reassemble_frames);
    assert_eq!(config.histogram_significant_figures, 3);
}

#[test]
fn test_load_from_file() {
    let dir = std::env::temp_dir().join(format!("hft_tcp_client_cfg_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("client.properties");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# test config").unwrap();
    writeln!(file, "HOST=10.1.2.3").unwrap();
    writeln!(file, "PORT=7777").unwrap();
    writeln!(file, "RECEIVE_MODE=poll").unwrap();
    drop(file);

    let config = Config::load(&path).unwrap();
    assert_eq!(config.host, "10.1.2.3");
    assert_eq!(config.port, 7777);
    assert_eq!(config.receive_mode, ReceiveMode::Poll);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_load_missing_file_is_io_error() {
    let err = Config::load("/nonexistent/hft/client.properties").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_bool_values() {
    let config = Config::from_properties_str("AUTO_RECONNECT=FALSE\nREASSEMBLE_FRAMES=1\n").unwrap();
    assert!(!config.auto_reconnect);
    assert!(config.reassemble_frames);

    assert!(Config::from_properties_str("AUTO_RECONNECT=maybe\n").is_err());
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn ipv4_strategy() -> impl Strategy<Value = String> {
    (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d))
}

proptest! {
    #[test]
    fn prop_properties_round_trip(
        host in ipv4_strategy(),
        port in 1..=65535u16,
        client_id in any::<u32>(),
        heartbeat in 0..100_000u64,
        auto_reconnect in any::<bool>(),
        poll in any::<bool>(),
        depth in 0..10_000usize,
    ) {
        let content = format!(
            "HOST={}\nPORT={}\nCLIENT_ID={}\nHEARTBEAT_INTERVAL_MS={}\nAUTO_RECONNECT={}\nRECEIVE_MODE={}\nMAX_QUEUE_DEPTH={}\n",
            host, port, client_id, heartbeat, auto_reconnect, if poll { "poll" } else { "event" }, depth
        );
        let config = Config::from_properties_str(&content).unwrap();

        prop_assert_eq!(&config.host, &host);
        prop_assert_eq!(config.port, port);
        prop_assert_eq!(config.client_id, client_id);
        prop_assert_eq!(config.heartbeat_interval_ms, heartbeat);
        prop_assert_eq!(config.auto_reconnect, auto_reconnect);
        prop_assert_eq!(config.receive_mode, if poll { ReceiveMode::Poll } else { ReceiveMode::Event });
        prop_assert_eq!(config.queue_limit(), if depth == 0 { None } else { Some(depth) });
    }

    #[test]
    fn prop_unrelated_keys_keep_defaults(key in "[A-Z]{3,8}_UNUSED", value in "[a-z0-9]{1,8}") {
        let config = Config::from_properties_str(&format!("{}={}\n", key, value)).unwrap();
        prop_assert_eq!(config, Config::default());
    }
}
