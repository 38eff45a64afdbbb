use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use fluent_log_sink::config::DispatchConfig;
use fluent_log_sink::init::{init_tracing_with_config, LayerConfig};
use fluent_log_sink::logger::Logger;
use fluent_log_sink::noop_sink::NoopSink;

/// Load test through the `tracing` bridge with a larger queue.
#[tokio::main]
async fn main() {
    let logger = Logger::builder()
        .event_sink(Arc::new(NoopSink::default()))
        .dispatch_config(DispatchConfig {
            channel_buffer: 50_000,
            batch_size: 1_000,
            flush_interval: Duration::from_millis(200),
        })
        .build()
        .expect("logger builds inside the runtime");

    let layer_config = LayerConfig {
        enable_stdout: false,
        ..LayerConfig::default()
    };
    init_tracing_with_config(logger.clone(), layer_config).expect("no subscriber installed yet");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    logger.flush().await;
    let (total, enqueued, dropped, failed) = logger.event_stats().snapshot();
    println!("total={} enqueued={} dropped={} failed={}", total, enqueued, dropped, failed);
}
