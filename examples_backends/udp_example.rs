use tracing::{error, info};

use fluent_log_sink::backend::{make_sink_from_config, parse_dsn};
use fluent_log_sink::init::init_tracing;
use fluent_log_sink::logger::Logger;
use fluent_log_sink::LoggingConfig;

/// Events go to a JSON collector and stat lines to a statsd-style listener.
///
/// Run `nc -ul 9999` and `nc -ul 8125` to watch the datagrams.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let events = make_sink_from_config(&parse_dsn("udp://127.0.0.1:9999")?)?;
    let metrics = make_sink_from_config(&parse_dsn("udp://127.0.0.1:8125?format=line")?)?;

    let logger = Logger::builder()
        .config(LoggingConfig::from_env())
        .event_sink(events.clone())
        .minimal_sink(events)
        .metrics_sink(metrics)
        .build()?;

    init_tracing(logger.clone())?;

    info!("udp example started");
    error!(order_id = 42_i64, "simulated error sent via udp");

    logger.write_count("Example.Started", None);
    logger.write_timer("Example.Startup", Some("udp"), 12);
    logger.write_minimal_data_log(r#"{"orderId":42}"#, None);

    logger.flush().await;
    Ok(())
}
