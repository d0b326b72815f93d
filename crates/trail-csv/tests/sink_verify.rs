//! The sink's secure logs verify offline, across restarts and shutdowns.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::SigningKey;
use tempfile::TempDir;

use trail_chain::{KeyStore, LogVerifier, MacAlgorithm, SignatureAlgorithm, VerifyOutcome};
use trail_csv::CsvSink;
use trail_events::{
    CsvSinkConfig, EventBuilder, EventSink, SchemaRegistry, SecurityConfig, TopicSchema,
};

const INITIAL_KEY_B64: &str = "zmq4EoprX52XLGyLkMENcin0gv0jwYyrySi3YOqfhFY=";

fn sink(dir: &TempDir) -> CsvSink {
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
    CsvSink::new(config, SchemaRegistry::new([TopicSchema::core("access")])).unwrap()
}

#[tokio::test]
async fn shutdown_seals_the_log_for_the_verifier() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);
    sink.startup().await.unwrap();

    for i in 0..4 {
        let event = EventBuilder::new()
            .event_id(format!("id-{i}"))
            .timestamp("2024-05-01T12:00:00Z")
            .transaction_id("tx")
            .build();
        sink.publish("access", &event).await.unwrap();
    }
    sink.shutdown().await.unwrap();

    // verify against the per-topic container the sink derived
    let topic_store = KeyStore::open(dir.path().join("keystore-access"), "pw").unwrap();
    let verifier = LogVerifier::new(MacAlgorithm::HmacSha256, SignatureAlgorithm::Ed25519);
    let outcome = verifier
        .verify(&dir.path().join("logs").join("access.csv"), &topic_store)
        .unwrap();
    assert_eq!(
        outcome,
        VerifyOutcome::Valid {
            data_rows: 4,
            signature_rows: 1
        }
    );
}

#[tokio::test]
async fn logs_spanning_sink_restarts_still_verify() {
    let dir = TempDir::new().unwrap();

    let first = sink(&dir);
    let event = EventBuilder::new()
        .event_id("a")
        .timestamp("2024-05-01T12:00:00Z")
        .transaction_id("tx")
        .build();
    first.publish("access", &event).await.unwrap();
    first.shutdown().await.unwrap();

    let second = sink(&dir);
    let event = EventBuilder::new()
        .event_id("b")
        .timestamp("2024-05-01T12:05:00Z")
        .transaction_id("tx")
        .build();
    second.publish("access", &event).await.unwrap();
    second.shutdown().await.unwrap();

    let topic_store = KeyStore::open(dir.path().join("keystore-access"), "pw").unwrap();
    let verifier = LogVerifier::new(MacAlgorithm::HmacSha256, SignatureAlgorithm::Ed25519);
    let outcome = verifier
        .verify(&dir.path().join("logs").join("access.csv"), &topic_store)
        .unwrap();
    assert_eq!(
        outcome,
        VerifyOutcome::Valid {
            data_rows: 2,
            signature_rows: 2
        }
    );
}
