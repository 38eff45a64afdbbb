use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};

use fluent_log_sink::logger::Logger;
use fluent_log_sink::noop_sink::NoopSink;

#[tokio::main]
async fn main() {
    let logger = Logger::builder()
        .event_sink(Arc::new(NoopSink::default()))
        .build()
        .expect("logger builds inside the runtime");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger
            .message("default load test error")
            .error()
            .data("Iteration", i as i64)
            .write();
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let (_, enqueued, dropped, _) = logger.event_stats().snapshot();
    println!("enqueued={} dropped={}", enqueued, dropped);

    sleep(Duration::from_secs(2)).await;
}
