use std::sync::Arc;

use async_trait::async_trait;
use fluent_log_sink::{
    error::BoxError,
    exception::Exception,
    logger::Logger,
    record::LogRecord,
    sink::LogSink,
};

/// Example of integrating a completely custom backend by implementing
/// the `LogSink` trait directly. Imagine this talks to some
/// proprietary store for which this crate does not provide a built-in
/// sink.
struct MyCustomStoreSink;

#[async_trait]
impl LogSink for MyCustomStoreSink {
    async fn send(&self, record: &LogRecord) -> Result<(), BoxError> {
        // Here you would call your own client library for the target store.
        println!("[my-custom-store] {}", serde_json::to_string(record)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let sink: Arc<dyn LogSink> = Arc::new(MyCustomStoreSink);
    let logger = Logger::builder()
        .event_sink(sink)
        .build()
        .expect("logger builds inside the runtime");

    logger.message("custom backend example started").write();
    logger
        .exception(Exception::new("StoreError", "simulated error sent via custom backend"))
        .data("Store", "my-custom-store")
        .tag("example")
        .write();

    logger.flush().await;
}
