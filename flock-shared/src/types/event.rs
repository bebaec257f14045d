use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ event envelope wrapping all domain events.
///
/// Routing key format: `flock.matching.{entity}.{action}`
/// Example: `flock.matching.suggestion.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys for the matching domain.
pub mod routing_keys {
    pub const SUGGESTION_CREATED: &str = "flock.matching.suggestion.created";
    pub const MATCH_ACTIVATED: &str = "flock.matching.match.activated";
    pub const MATCH_COMPLETED: &str = "flock.matching.match.completed";
    pub const ASSIGNMENT_CREATED: &str = "flock.matching.assignment.created";
}

/// Event data payloads published by the matching engine. These are
/// fire-and-forget notifications to out-of-scope collaborators (chat,
/// notifications) — the matching engine never waits on a response.
pub mod payloads {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SuggestionCreated {
        pub match_id: String,
        pub participant_ids: Vec<String>,
        pub kind: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchActivated {
        pub match_id: String,
        pub participant_ids: Vec<String>,
        pub chat_room_id: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchCompleted {
        pub match_id: String,
        pub participant_ids: Vec<String>,
        pub reason: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AssignmentCreated {
        pub match_id: String,
        pub participant_ids: Vec<String>,
        pub chat_room_id: String,
    }
}
