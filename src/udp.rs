use crate::error::BoxError;
use crate::record::LogRecord;
use crate::severity::Severity;
use crate::sink::LogSink;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::OnceCell;

/// What a [`UdpSink`] puts in each datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpPayload {
    /// The whole record as one JSON document (event stream, minimal channel).
    Json,
    /// Only the record message, e.g. a formatted stat line.
    MessageLine,
}

/// Fire-and-forget UDP sink, one datagram per record.
///
/// The socket is bound lazily on the first send, so the sink can be built
/// outside a runtime.
pub struct UdpSink {
    target: String,
    payload: UdpPayload,
    socket: OnceCell<UdpSocket>,
}

impl UdpSink {
    /// **Parameters**
    /// - `target`: `host:port` of the collector.
    /// - `payload`: datagram encoding.
    pub fn new(target: impl Into<String>, payload: UdpPayload) -> Self {
        UdpSink {
            target: target.into(),
            payload,
            socket: OnceCell::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn payload(&self) -> UdpPayload {
        self.payload
    }

    async fn socket(&self) -> Result<&UdpSocket, BoxError> {
        let socket = self
            .socket
            .get_or_try_init(|| async {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect(&self.target).await?;
                Ok::<_, std::io::Error>(socket)
            })
            .await?;
        Ok(socket)
    }
}

/// Encode `record` for the wire. A record that fails to serialize is
/// replaced by an error record describing the failure.
pub fn encode(record: &LogRecord, payload: UdpPayload) -> Vec<u8> {
    match payload {
        UdpPayload::MessageLine => record.message_or_empty().as_bytes().to_vec(),
        UdpPayload::Json => serde_json::to_vec(record).unwrap_or_else(|e| {
            let substitute = LogRecord::new(
                Severity::Error,
                Some(format!(
                    "Failed to serialize the log record. Original Message [{}] Exception Message [{}]",
                    record.message_or_empty(),
                    e
                )),
                record.machine_name.clone(),
            );
            serde_json::to_vec(&substitute).unwrap_or_default()
        }),
    }
}

#[async_trait]
impl LogSink for UdpSink {
    async fn send(&self, record: &LogRecord) -> Result<(), BoxError> {
        let bytes = encode(record, self.payload);
        let socket = self.socket().await?;
        socket.send(&bytes).await.map_err(|e| {
            format!("unable to send log record to remote host {}: {}", self.target, e)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_payload_is_the_message() {
        let record = LogRecord::new(Severity::Info, Some("stats.Hits:1|c".into()), "box1");
        assert_eq!(encode(&record, UdpPayload::MessageLine), b"stats.Hits:1|c".to_vec());
    }

    #[test]
    fn json_payload_is_the_record() {
        let record = LogRecord::new(Severity::Warn, Some("careful".into()), "box1");
        let value: serde_json::Value = serde_json::from_slice(&encode(&record, UdpPayload::Json)).unwrap();
        assert_eq!(value["severity"], "Warn");
        assert_eq!(value["message"], "careful");
        assert_eq!(value["machine_name"], "box1");
    }

    #[tokio::test]
    async fn sends_datagrams_to_target() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sink = UdpSink::new(receiver.local_addr().unwrap().to_string(), UdpPayload::MessageLine);

        let record = LogRecord::new(Severity::Info, Some("graphite.Test:1|c".into()), "box1");
        sink.send(&record).await.unwrap();

        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"graphite.Test:1|c");
    }
}
