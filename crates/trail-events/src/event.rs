//! The audit event tree and its fluent builder.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the event identifier assigned by the audit service.
pub const ID_FIELD: &str = "_id";
/// Field carrying the ISO-8601 timestamp. Mandatory on ingest.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Field carrying the transaction identifier. Mandatory on ingest.
pub const TRANSACTION_ID_FIELD: &str = "transactionId";

/// One audit event: a tree of named fields with JSON values.
///
/// Events are immutable once accepted by the service; the only mutation
/// entry points are [`EventBuilder`] and [`Event::with_id`], which the
/// service uses before acceptance to assign the identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Wraps an already assembled field map.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Looks up a field and returns it as text when it is a JSON string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// The event identifier, once assigned.
    pub fn id(&self) -> Option<&str> {
        self.text(ID_FIELD)
    }

    /// The mandatory transaction identifier.
    pub fn transaction_id(&self) -> Option<&str> {
        self.text(TRANSACTION_ID_FIELD)
    }

    /// The mandatory timestamp.
    pub fn timestamp(&self) -> Option<&str> {
        self.text(TIMESTAMP_FIELD)
    }

    /// Returns a copy with `_id` set. Used by the service when the caller
    /// did not provide an identifier; an existing `_id` is never replaced.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.fields
            .entry(ID_FIELD.to_owned())
            .or_insert_with(|| Value::String(id.into()));
        self
    }

    /// The underlying field map in insertion order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Returns true when `value` parses as an RFC-3339 timestamp.
///
/// The service itself only requires presence of the timestamp field;
/// builders and tests use this to catch malformed inputs early.
pub fn valid_timestamp(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
}

/// Fluent builder shaping one event tree.
#[derive(Debug, Default, Clone)]
pub struct EventBuilder {
    fields: Map<String, Value>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `_id` explicitly. Normally left to the service.
    pub fn event_id(self, id: impl Into<String>) -> Self {
        self.field(ID_FIELD, Value::String(id.into()))
    }

    pub fn transaction_id(self, id: impl Into<String>) -> Self {
        self.field(TRANSACTION_ID_FIELD, Value::String(id.into()))
    }

    pub fn timestamp(self, timestamp: impl Into<String>) -> Self {
        self.field(TIMESTAMP_FIELD, Value::String(timestamp.into()))
    }

    /// Sets an arbitrary field. Later calls with the same name win.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn build(self) -> Event {
        Event::from_fields(self.fields)
    }
}

/// Access-topic conveniences for [`EventBuilder`].
///
/// Product-specific field vocabularies extend the builder through traits
/// like this one instead of subclassing it.
pub trait AccessEventExt {
    fn user_id(self, user_id: impl Into<String>) -> Self;
    fn server_ip(self, address: impl Into<String>) -> Self;
    fn response_status(self, status: impl Into<String>) -> Self;
}

impl AccessEventExt for EventBuilder {
    fn user_id(self, user_id: impl Into<String>) -> Self {
        self.field("userId", Value::String(user_id.into()))
    }

    fn server_ip(self, address: impl Into<String>) -> Self {
        self.field("serverIp", Value::String(address.into()))
    }

    fn response_status(self, status: impl Into<String>) -> Self {
        self.field("responseStatus", Value::String(status.into()))
    }
}

/// Activity-topic conveniences for [`EventBuilder`].
pub trait ActivityEventExt {
    fn object_id(self, object_id: impl Into<String>) -> Self;
    fn operation(self, operation: impl Into<String>) -> Self;
}

impl ActivityEventExt for EventBuilder {
    fn object_id(self, object_id: impl Into<String>) -> Self {
        self.field("objectId", Value::String(object_id.into()))
    }

    fn operation(self, operation: impl Into<String>) -> Self {
        self.field("operation", Value::String(operation.into()))
    }
}
