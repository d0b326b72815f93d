//! The contract every event sink implements, plus the query types.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AuditError;
use crate::event::Event;

/// Decision returned by a query handler for each delivered match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFlow {
    Continue,
    Stop,
}

/// Outcome summary of one `query` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuerySummary {
    /// Rows examined, matching or not.
    pub scanned: usize,
    /// Rows delivered to the handler.
    pub matched: usize,
    /// True when the handler stopped the stream before exhaustion.
    pub stopped_early: bool,
}

/// Callback receiving each matching event during a query.
pub type QueryHandler<'a> = dyn FnMut(Event) -> QueryFlow + Send + 'a;

/// Field-equality filter applied while streaming rows.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    equals: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to equal `value` exactly.
    pub fn field_equals(mut self, field: impl Into<String>, value: Value) -> Self {
        self.equals.push((field.into(), value));
        self
    }

    /// Caps the number of matches delivered to the handler.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// True when the event satisfies every equality predicate.
    pub fn matches(&self, event: &Event) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| event.field(field) == Some(expected))
    }
}

/// A destination for published audit events.
///
/// Implementations must be internally thread safe: the audit service fans
/// out from many request tasks concurrently. `startup` is called once
/// before the first publish and `shutdown` exactly once at the end of
/// life; a sink that has shut down may reject everything afterwards.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Stable name used for registration and query-sink designation.
    fn name(&self) -> &str;

    async fn startup(&self) -> Result<(), AuditError>;

    async fn shutdown(&self) -> Result<(), AuditError>;

    /// Appends one event under the given topic.
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), AuditError>;

    /// Retrieves the event whose `_id` matches, or `NotFound`.
    async fn read(&self, topic: &str, id: &str) -> Result<Event, AuditError>;

    /// Streams matching events to `handler` until it stops or rows are
    /// exhausted.
    async fn query(
        &self,
        topic: &str,
        filter: &QueryFilter,
        handler: &mut QueryHandler<'_>,
    ) -> Result<QuerySummary, AuditError>;
}
