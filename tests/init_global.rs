mod common;

use tracing::Level;

use common::{config, harness};
use fluent_log_sink::init::{init_tracing, init_tracing_with_config, LayerConfig};

#[tokio::test]
async fn global_subscriber_is_installed_once() {
    let h = harness(config());
    init_tracing_with_config(
        h.logger.clone(),
        LayerConfig {
            min_level: Level::INFO,
            enable_stdout: false,
        },
    )
    .expect("first install succeeds");

    tracing::info!(step = "boot", "service started");
    h.logger.flush().await;
    assert_eq!(h.events.messages(), vec!["service started"]);

    assert!(init_tracing(h.logger.clone()).is_err());
}
