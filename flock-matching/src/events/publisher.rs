use flock_shared::clients::RabbitMQClient;
use flock_shared::types::event::{payloads, routing_keys, Event};

pub async fn publish_suggestion_created(rabbitmq: &RabbitMQClient, match_id: &str, participant_ids: &[String], kind: &str) {
    let event = Event::new(
        "flock-matching",
        routing_keys::SUGGESTION_CREATED,
        payloads::SuggestionCreated {
            match_id: match_id.to_string(),
            participant_ids: participant_ids.to_vec(),
            kind: kind.to_string(),
        },
    );

    if let Err(e) = rabbitmq.publish(routing_keys::SUGGESTION_CREATED, &event).await {
        tracing::error!(error = %e, match_id = %match_id, "failed to publish suggestion.created event");
    }
}

pub async fn publish_match_activated(rabbitmq: &RabbitMQClient, match_id: &str, participant_ids: &[String], chat_room_id: &str) {
    let event = Event::new(
        "flock-matching",
        routing_keys::MATCH_ACTIVATED,
        payloads::MatchActivated {
            match_id: match_id.to_string(),
            participant_ids: participant_ids.to_vec(),
            chat_room_id: chat_room_id.to_string(),
        },
    );

    if let Err(e) = rabbitmq.publish(routing_keys::MATCH_ACTIVATED, &event).await {
        tracing::error!(error = %e, match_id = %match_id, "failed to publish match.activated event");
    }
}

pub async fn publish_match_completed(rabbitmq: &RabbitMQClient, match_id: &str, participant_ids: &[String], reason: &str) {
    let event = Event::new(
        "flock-matching",
        routing_keys::MATCH_COMPLETED,
        payloads::MatchCompleted {
            match_id: match_id.to_string(),
            participant_ids: participant_ids.to_vec(),
            reason: reason.to_string(),
        },
    );

    if let Err(e) = rabbitmq.publish(routing_keys::MATCH_COMPLETED, &event).await {
        tracing::error!(error = %e, match_id = %match_id, "failed to publish match.completed event");
    }
}

pub async fn publish_assignment_created(rabbitmq: &RabbitMQClient, match_id: &str, participant_ids: &[String], chat_room_id: &str) {
    let event = Event::new(
        "flock-matching",
        routing_keys::ASSIGNMENT_CREATED,
        payloads::AssignmentCreated {
            match_id: match_id.to_string(),
            participant_ids: participant_ids.to_vec(),
            chat_room_id: chat_room_id.to_string(),
        },
    );

    if let Err(e) = rabbitmq.publish(routing_keys::ASSIGNMENT_CREATED, &event).await {
        tracing::error!(error = %e, match_id = %match_id, "failed to publish assignment.created event");
    }
}
