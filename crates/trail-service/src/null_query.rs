//! Fallback query sink when no handler is designated.

use async_trait::async_trait;

use trail_events::{
    AuditError, Event, EventSink, QueryFilter, QueryHandler, QuerySummary,
};

/// Answers every read and query with an informative error. Substituted
/// when `handler_for_queries` is unset or names an unregistered sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullQuerySink;

#[async_trait]
impl EventSink for NullQuerySink {
    fn name(&self) -> &str {
        "null-query"
    }

    async fn startup(&self) -> Result<(), AuditError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AuditError> {
        Ok(())
    }

    async fn publish(&self, _topic: &str, _event: &Event) -> Result<(), AuditError> {
        Err(AuditError::NotSupported(
            "the null query sink accepts no events".to_owned(),
        ))
    }

    async fn read(&self, _topic: &str, _id: &str) -> Result<Event, AuditError> {
        Err(no_handler())
    }

    async fn query(
        &self,
        _topic: &str,
        _filter: &QueryFilter,
        _handler: &mut QueryHandler<'_>,
    ) -> Result<QuerySummary, AuditError> {
        Err(no_handler())
    }
}

fn no_handler() -> AuditError {
    AuditError::NotSupported(
        "no query handler is configured; designate one via 'handler_for_queries'".to_owned(),
    )
}
