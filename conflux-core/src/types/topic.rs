//! The closed set of event topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfluxError, Result};

/// Topic an event is published on.
///
/// The set is closed: adding a topic means adding a variant here, never
/// passing an arbitrary string through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// A user signed in
    UserLogin,
    /// A user signed out
    UserLogout,
    /// An order was placed
    OrderCreated,
    /// A payment was settled
    PaymentProcessed,
    /// A component reported a failure
    SystemError,
    /// A notification was delivered
    NotificationSent,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Topic; 6] = [
        Topic::UserLogin,
        Topic::UserLogout,
        Topic::OrderCreated,
        Topic::PaymentProcessed,
        Topic::SystemError,
        Topic::NotificationSent,
    ];

    /// Kebab-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::UserLogin => "user-login",
            Topic::UserLogout => "user-logout",
            Topic::OrderCreated => "order-created",
            Topic::PaymentProcessed => "payment-processed",
            Topic::SystemError => "system-error",
            Topic::NotificationSent => "notification-sent",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == normalized)
            .ok_or_else(|| ConfluxError::UnknownTopic(s.to_string()))
    }
}
