//! HFT TCP Client Main Entry Point
//!
//! Connects to the server, runs the background tasks and prints statistics
//! periodically until Ctrl-C.

use hft_tcp_client::{Config, Frame, Handler, HftClient};
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Starting HFT TCP Client");

    // Load configuration
    let config = Config::load_or_default();
    config.log_config();
    let connect_timeout = config.connect_timeout();
    let stats_interval = Duration::from_secs(config.stats_interval_secs.max(1));

    let client = HftClient::new(config);
    client.register_handler(Handler::generic(|frame: &Frame| {
        log::debug!(
            "Message received: type={:?} id={} size={}",
            frame.msg_type,
            frame.id,
            frame.payload_size
        );
    }));

    if let Err(e) = client.try_connect(connect_timeout).await {
        log::error!("Client error: {}", e);
        std::process::exit(1);
    }

    client.start();

    let mut ticker = tokio::time::interval(stats_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => client.print_stats(),
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
                log::info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    client.stop().await;
    client.print_stats();
    log::info!("Client completed successfully");
}
