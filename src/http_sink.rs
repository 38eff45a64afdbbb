use crate::error::BoxError;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use reqwest::Client;

/// Sink that POSTs each record as a JSON document.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    /// Collector endpoint, e.g. "https://logs.example.com/ingest".
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSink {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LogSink for HttpSink {
    async fn send(&self, record: &LogRecord) -> Result<(), BoxError> {
        let resp = self.client.post(&self.url).json(record).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("log collector rejected record with status {}: {}", status, text).into())
        }
    }
}
