//! CSV sink: one log file per topic under a configured directory.
//!
//! With security disabled the sink appends plain rows; with security
//! enabled each topic gets a `trail-chain` secure writer whose chain
//! state lives in a per-topic key store derived from the configured
//! master container.

mod plain;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use trail_chain::codec;
use trail_chain::{
    KeyStore, SecureCsvWriter, SecureWriterOptions, INITIAL_KEY_ALIAS, SIGNATURE_ALIAS,
};
use trail_events::{
    AuditError, CsvSinkConfig, Event, EventSink, QueryFilter, QueryFlow, QueryHandler,
    QuerySummary, SchemaRegistry, TopicSchema,
};

use plain::PlainCsvWriter;

/// Registration name of the CSV sink.
pub const SINK_NAME: &str = "csv";

/// Event sink writing one CSV log per topic.
pub struct CsvSink {
    config: CsvSinkConfig,
    schemas: SchemaRegistry,
    writers: Mutex<HashMap<String, TopicWriter>>,
    shut_down: AtomicBool,
}

#[derive(Clone)]
enum TopicWriter {
    Plain(Arc<PlainCsvWriter>),
    Secure(SecureCsvWriter),
}

impl CsvSink {
    /// Builds the sink, validating the configured algorithm names up
    /// front when security is enabled.
    pub fn new(config: CsvSinkConfig, schemas: SchemaRegistry) -> Result<Self, AuditError> {
        if config.security.enabled {
            SecureWriterOptions::from_config(&config.security, &config.algorithms)?;
        }
        Ok(Self {
            config,
            schemas,
            writers: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    fn log_path(&self, topic: &str) -> PathBuf {
        self.config.log_directory.join(format!("{topic}.csv"))
    }

    /// Per-topic key store path: the configured master container path
    /// with the topic name appended.
    fn topic_store_path(&self, topic: &str) -> PathBuf {
        let mut os = self.config.security.filename.as_os_str().to_owned();
        os.push("-");
        os.push(topic);
        PathBuf::from(os)
    }

    /// Opens the topic's key store, seeding a fresh one from the master
    /// container's `InitialKey` and `Signature` entries.
    fn topic_keystore(&self, topic: &str) -> Result<KeyStore, AuditError> {
        let store_path = self.topic_store_path(topic);
        let password = self.config.security.password.clone();
        if store_path.exists() {
            KeyStore::open(store_path, password)
        } else {
            let master = KeyStore::open(&self.config.security.filename, password.clone())?;
            let initial = master.read_secret(INITIAL_KEY_ALIAS)?;
            let signing = master.read_private(SIGNATURE_ALIAS)?;
            KeyStore::provision(store_path, password, &initial, &signing)
        }
    }

    async fn writer_for(&self, topic: &str) -> Result<TopicWriter, AuditError> {
        let schema = self.schemas.get(topic)?.clone();
        let mut writers = self.writers.lock().await;
        if let Some(writer) = writers.get(topic) {
            return Ok(writer.clone());
        }

        std::fs::create_dir_all(&self.config.log_directory)
            .map_err(|err| AuditError::io(&self.config.log_directory, err))?;
        let path = self.log_path(topic);
        let fresh = plain::is_fresh(&path)?;

        let writer = if self.config.security.enabled {
            let options =
                SecureWriterOptions::from_config(&self.config.security, &self.config.algorithms)?;
            let keystore = self.topic_keystore(topic)?;
            let writer = SecureCsvWriter::open(&path, schema, keystore, options)?;
            if fresh {
                writer.write_header().await?;
            }
            TopicWriter::Secure(writer)
        } else {
            let writer = Arc::new(PlainCsvWriter::open(&path, schema)?);
            if fresh {
                writer.write_header().await?;
            }
            TopicWriter::Plain(writer)
        };

        info!(topic, path = %path.display(), secure = self.config.security.enabled, "csv writer created");
        writers.insert(topic.to_owned(), writer.clone());
        Ok(writer)
    }

    async fn flush_topic(&self, topic: &str) -> Result<(), AuditError> {
        let writer = { self.writers.lock().await.get(topic).cloned() };
        match writer {
            Some(TopicWriter::Plain(writer)) => writer.flush().await,
            Some(TopicWriter::Secure(writer)) => writer.flush().await,
            None => Ok(()),
        }
    }

    /// Streams data rows of one topic log as events.
    async fn scan(
        &self,
        schema: &TopicSchema,
        mut visit: impl FnMut(Event) -> QueryFlow + Send,
    ) -> Result<(), AuditError> {
        let path = self.log_path(schema.name());
        if !path.exists() {
            return Ok(());
        }
        self.flush_topic(schema.name()).await?;

        let width = schema.fields().len();
        let secure = self.config.security.enabled;
        let expected = if secure { width + 2 } else { width };

        let mut reader = codec::RowReader::open(&path)?;
        let mut header_seen = false;
        while let Some(row) = reader.next_row()? {
            if !header_seen {
                header_seen = true;
                continue;
            }
            if row.len() != expected {
                continue;
            }
            // signature rows carry no event data
            if secure && !row[width + 1].is_empty() {
                continue;
            }
            let event = codec::event_from_cells(schema, &row[..width]);
            if visit(event) == QueryFlow::Stop {
                break;
            }
        }
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<(), AuditError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("csv sink is shut down"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for CsvSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn startup(&self) -> Result<(), AuditError> {
        std::fs::create_dir_all(&self.config.log_directory)
            .map_err(|err| AuditError::io(&self.config.log_directory, err))
    }

    /// Closes every writer exactly once. Further publishes fail until the
    /// sink is rebuilt.
    async fn shutdown(&self) -> Result<(), AuditError> {
        self.shut_down.store(true, Ordering::SeqCst);
        let writers: Vec<(String, TopicWriter)> =
            self.writers.lock().await.drain().collect();

        let mut first_error = None;
        for (topic, writer) in writers {
            let result = match writer {
                TopicWriter::Plain(writer) => writer.close().await,
                TopicWriter::Secure(writer) => writer.close().await,
            };
            if let Err(err) = result {
                warn!(topic = %topic, error = %err, "closing csv writer failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[instrument(skip(self, event), fields(sink = SINK_NAME))]
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), AuditError> {
        self.ensure_accepting()?;
        match self.writer_for(topic).await? {
            TopicWriter::Plain(writer) => writer.write(event).await,
            TopicWriter::Secure(writer) => writer.write(event).await,
        }
    }

    async fn read(&self, topic: &str, id: &str) -> Result<Event, AuditError> {
        self.ensure_accepting()?;
        let schema = self.schemas.get(topic)?.clone();

        let mut found = None;
        self.scan(&schema, |event| {
            if event.id() == Some(id) {
                found = Some(event);
                QueryFlow::Stop
            } else {
                QueryFlow::Continue
            }
        })
        .await?;

        found.ok_or_else(|| AuditError::NotFound(id.to_owned()))
    }

    async fn query(
        &self,
        topic: &str,
        filter: &QueryFilter,
        handler: &mut QueryHandler<'_>,
    ) -> Result<QuerySummary, AuditError> {
        self.ensure_accepting()?;
        let schema = self.schemas.get(topic)?.clone();

        let mut summary = QuerySummary::default();
        self.scan(&schema, |event| {
            summary.scanned += 1;
            if !filter.matches(&event) {
                return QueryFlow::Continue;
            }
            summary.matched += 1;
            if handler(event) == QueryFlow::Stop {
                summary.stopped_early = true;
                return QueryFlow::Stop;
            }
            if filter.limit() == Some(summary.matched) {
                summary.stopped_early = true;
                return QueryFlow::Stop;
            }
            QueryFlow::Continue
        })
        .await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use ed25519_dalek::SigningKey;
    use serde_json::json;
    use tempfile::TempDir;
    use trail_events::{EventBuilder, SecurityConfig};

    const INITIAL_KEY_B64: &str = "zmq4EoprX52XLGyLkMENcin0gv0jwYyrySi3YOqfhFY=";

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([TopicSchema::core("access")])
    }

    fn plain_sink(dir: &TempDir) -> CsvSink {
        CsvSink::new(CsvSinkConfig::new(dir.path().join("logs")), registry()).unwrap()
    }

    fn secure_sink(dir: &TempDir) -> CsvSink {
        let store_path = dir.path().join("keystore");
        if !store_path.exists() {
            KeyStore::provision(
                &store_path,
                "pw",
                &STANDARD.decode(INITIAL_KEY_B64).unwrap(),
                &SigningKey::from_bytes(&[42u8; 32]),
            )
            .unwrap();
        }

        let mut config = CsvSinkConfig::new(dir.path().join("logs"));
        config.security = SecurityConfig {
            enabled: true,
            filename: store_path,
            password: "pw".to_owned(),
            signature_interval_ms: 600_000,
        };
        CsvSink::new(config, registry()).unwrap()
    }

    fn access_event(id: &str, timestamp: &str, transaction: &str) -> Event {
        EventBuilder::new()
            .event_id(id)
            .timestamp(timestamp)
            .transaction_id(transaction)
            .build()
    }

    #[tokio::test]
    async fn plain_mode_produces_the_exact_file() {
        let dir = TempDir::new().unwrap();
        let sink = plain_sink(&dir);
        sink.startup().await.unwrap();

        sink.publish("access", &access_event("_id1", "timestamp", "transactionId-X"))
            .await
            .unwrap();
        sink.publish("access", &access_event("_id2", "timestamp", "transactionId-X"))
            .await
            .unwrap();
        sink.shutdown().await.unwrap();

        let contents =
            std::fs::read_to_string(dir.path().join("logs").join("access.csv")).unwrap();
        assert_eq!(
            contents,
            "\"_id\",\"timestamp\",\"transactionId\"\n\
             \"_id1\",\"timestamp\",\"transactionId-X\"\n\
             \"_id2\",\"timestamp\",\"transactionId-X\"\n"
        );
    }

    #[tokio::test]
    async fn secure_mode_appends_the_mac_cell() {
        let dir = TempDir::new().unwrap();
        let sink = secure_sink(&dir);
        sink.startup().await.unwrap();

        sink.publish("access", &access_event("1", "123456", "A10000"))
            .await
            .unwrap();

        let contents =
            std::fs::read_to_string(dir.path().join("logs").join("access.csv")).unwrap();
        assert_eq!(
            contents,
            "\"_id\",\"timestamp\",\"transactionId\",\"HMAC\",\"SIGNATURE\"\n\
             \"1\",\"123456\",\"A10000\",\"Q9N19YzXbfB5smFiVUostRtjEkXOa8Re+MdEjZoZ4aQ=\",\"\"\n"
        );
        sink.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn read_finds_rows_by_id() {
        let dir = TempDir::new().unwrap();
        let sink = plain_sink(&dir);
        sink.publish("access", &access_event("a1", "t", "tx"))
            .await
            .unwrap();
        sink.publish("access", &access_event("a2", "t", "tx"))
            .await
            .unwrap();

        let event = sink.read("access", "a2").await.unwrap();
        assert_eq!(event.id(), Some("a2"));

        let err = sink.read("access", "a3").await.unwrap_err();
        assert!(matches!(err, AuditError::NotFound(_)));
    }

    #[tokio::test]
    async fn query_filters_and_stops_early() {
        let dir = TempDir::new().unwrap();
        let sink = plain_sink(&dir);
        for (id, tx) in [("a1", "tx-1"), ("a2", "tx-2"), ("a3", "tx-2"), ("a4", "tx-2")] {
            sink.publish("access", &access_event(id, "t", tx))
                .await
                .unwrap();
        }

        let filter = QueryFilter::new().field_equals("transactionId", json!("tx-2"));
        let mut seen = Vec::new();
        let summary = sink
            .query("access", &filter, &mut |event: Event| {
                seen.push(event.id().unwrap().to_owned());
                QueryFlow::Continue
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["a2", "a3", "a4"]);
        assert_eq!(summary.scanned, 4);
        assert_eq!(summary.matched, 3);
        assert!(!summary.stopped_early);

        let filter = QueryFilter::new().field_equals("transactionId", json!("tx-2"));
        let mut count = 0usize;
        let summary = sink
            .query("access", &filter, &mut |_| {
                count += 1;
                QueryFlow::Stop
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(summary.stopped_early);
    }

    #[tokio::test]
    async fn unknown_topics_are_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = plain_sink(&dir);
        let err = sink
            .publish("activity", &access_event("x", "t", "tx"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::NotSupported(_)));
    }

    #[tokio::test]
    async fn shutdown_is_terminal_for_publishing() {
        let dir = TempDir::new().unwrap();
        let sink = plain_sink(&dir);
        sink.publish("access", &access_event("a", "t", "tx"))
            .await
            .unwrap();
        sink.shutdown().await.unwrap();

        let err = sink
            .publish("access", &access_event("b", "t", "tx"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Unavailable(_)));
    }

    #[tokio::test]
    async fn secure_reads_skip_signature_rows() {
        let dir = TempDir::new().unwrap();
        let sink = secure_sink(&dir);
        sink.publish("access", &access_event("a1", "t", "tx"))
            .await
            .unwrap();
        sink.shutdown().await.unwrap();

        // reopening the sink resumes the same chain and still finds rows
        let sink = secure_sink(&dir);
        let event = sink.read("access", "a1").await.unwrap();
        assert_eq!(event.transaction_id(), Some("tx"));
    }
}
