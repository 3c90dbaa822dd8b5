//! The event envelope passed through the dispatch pipeline.
//!
//! An [`Event`] is assembled by its producer with the consuming `with*`
//! builders, then handed to the pipeline as `Arc<Event>`. From that point on
//! every handler sees the same read-only instance.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::Topic;

/// An immutable event record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    topic: Topic,
    source: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: HashMap<String, Value>,
}

impl Event {
    /// Creates an event with an empty payload, stamped with the current time.
    pub fn new(topic: Topic, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            source: source.into(),
            timestamp: Utc::now(),
            payload: HashMap::new(),
        }
    }

    /// Creates an event carrying a copy of `payload`.
    pub fn with_payload(
        topic: Topic,
        source: impl Into<String>,
        payload: HashMap<String, Value>,
    ) -> Self {
        Self {
            payload,
            ..Self::new(topic, source)
        }
    }

    /// Adds one payload entry, replacing any previous value under `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Unique id, used to correlate log lines across handlers.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Topic the event is published on.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Free-text identifier of the producer.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Full payload.
    pub fn payload(&self) -> &HashMap<String, Value> {
        &self.payload
    }

    /// Single payload value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Payload value as a string slice, if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sorted keys keep the rendering stable across runs.
        let mut keys: Vec<&String> = self.payload.keys().collect();
        keys.sort();

        write!(
            f,
            "Event{{topic={}, source='{}', timestamp={}, data={{",
            self.topic,
            self.source,
            self.timestamp.to_rfc3339()
        )?;
        for (i, key) in keys.into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, self.payload[key])?;
        }
        f.write_str("}}")
    }
}
