//! Consumer worker configuration

use std::time::Duration;

/// Well-known stream the chat pipeline appends to
pub const MESSAGE_STREAM: &str = "message_stream";
/// Well-known consumer group of the message worker
pub const MESSAGE_GROUP: &str = "message_group";
/// Consumer name of the single worker within the group
pub const MESSAGE_CONSUMER: &str = "message_consumer";

/// Configuration for one consumer worker
///
/// Exactly one worker per (group, consumer) pair is assumed; nothing here
/// coordinates concurrent consumers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stream to consume
    pub stream: String,
    /// Consumer group name
    pub group: String,
    /// Consumer name within the group
    pub consumer: String,
    /// Delay before retrying after a read or persist failure
    pub retry_backoff: Duration,
    /// Upper bound on one blocking read before the stop flag is re-checked
    pub read_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stream: MESSAGE_STREAM.to_string(),
            group: MESSAGE_GROUP.to_string(),
            consumer: MESSAGE_CONSUMER.to_string(),
            retry_backoff: Duration::from_secs(5),
            read_timeout: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Set the stream name
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Set the group name
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the consumer name
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Set the failure retry backoff
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the blocking-read slice
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = WorkerConfig::default();
        assert_eq!(config.stream, "message_stream");
        assert_eq!(config.group, "message_group");
        assert_eq!(config.consumer, "message_consumer");
        assert_eq!(config.retry_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_builders() {
        let config = WorkerConfig::default()
            .with_stream("s")
            .with_group("g")
            .with_consumer("c")
            .with_retry_backoff(Duration::from_millis(10))
            .with_read_timeout(Duration::from_millis(20));
        assert_eq!(config.stream, "s");
        assert_eq!(config.group, "g");
        assert_eq!(config.consumer, "c");
        assert_eq!(config.retry_backoff, Duration::from_millis(10));
        assert_eq!(config.read_timeout, Duration::from_millis(20));
    }
}
