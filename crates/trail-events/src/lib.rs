//! Shared event fabric for the trail audit workspace.
//!
//! This crate defines the pieces every sink and the audit service agree on:
//! the event tree and its builder, per-topic schemas, the sink contract,
//! the error taxonomy and the configuration surface. Concrete sinks live in
//! their own crates (`trail-csv`) and are wired together by
//! `trail-service`.

pub mod config;
pub mod error;
pub mod event;
pub mod schema;
pub mod sink;

pub use config::{
    AlgorithmsConfig, BufferingConfig, CsvSinkConfig, SecurityConfig, ServiceConfig,
};
pub use error::AuditError;
pub use event::{Event, EventBuilder, ID_FIELD, TIMESTAMP_FIELD, TRANSACTION_ID_FIELD};
pub use schema::{SchemaRegistry, TopicSchema};
pub use sink::{EventSink, QueryFilter, QueryFlow, QueryHandler, QuerySummary};
