//! Topic schemas and the immutable registry built at startup.

use std::collections::HashMap;

use crate::error::AuditError;
use crate::event::{ID_FIELD, TIMESTAMP_FIELD, TRANSACTION_ID_FIELD};

/// The ordered field list for one event topic.
///
/// Field order is the column order of every row written for the topic, so
/// it is fixed at registration and never reordered afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSchema {
    name: String,
    fields: Vec<String>,
}

impl TopicSchema {
    /// Builds a schema, enforcing the layout every topic shares: `_id`
    /// leads the row and the two mandatory ingest fields are present.
    pub fn new(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, AuditError> {
        let name = name.into();
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();

        if fields.first().map(String::as_str) != Some(ID_FIELD) {
            return Err(AuditError::BadRequest(format!(
                "schema for topic '{name}' must lead with '{ID_FIELD}'"
            )));
        }
        for required in [TIMESTAMP_FIELD, TRANSACTION_ID_FIELD] {
            if !fields.iter().any(|f| f == required) {
                return Err(AuditError::BadRequest(format!(
                    "schema for topic '{name}' is missing mandatory field '{required}'"
                )));
            }
        }

        Ok(Self { name, fields })
    }

    /// The minimal schema carrying only the core fields.
    pub fn core(name: impl Into<String>) -> Self {
        Self::new(name, [ID_FIELD, TIMESTAMP_FIELD, TRANSACTION_ID_FIELD])
            .expect("core field list is always valid")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Topic name to schema map. Built once before startup; immutable after,
/// so concurrent readers need no lock.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    topics: HashMap<String, TopicSchema>,
}

impl SchemaRegistry {
    pub fn new(schemas: impl IntoIterator<Item = TopicSchema>) -> Self {
        let topics = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), schema))
            .collect();
        Self { topics }
    }

    /// Resolves a topic, rejecting unknown ones.
    pub fn get(&self, topic: &str) -> Result<&TopicSchema, AuditError> {
        self.topics
            .get(topic)
            .ok_or_else(|| AuditError::NotSupported(format!("unknown event topic '{topic}'")))
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &TopicSchema> {
        self.topics.values()
    }
}
