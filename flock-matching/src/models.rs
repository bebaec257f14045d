//! Plain record types shared by the engine, the store, and the REST surface.
//!
//! These are deliberately free of `bson`/MongoDB handles — `store` maps them
//! to and from documents so the pure algorithm code never sees a database
//! type.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Walk,
    Transit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Individual,
    Group,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Individual => "individual",
            MatchKind::Group => "group",
        }
    }
}

impl Default for MatchKind {
    fn default() -> Self {
        MatchKind::Individual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPreference {
    Individual,
    Group,
    Both,
}

impl MatchPreference {
    pub fn permits(&self, kind: MatchKind) -> bool {
        matches!(
            (self, kind),
            (MatchPreference::Both, _)
                | (MatchPreference::Individual, MatchKind::Individual)
                | (MatchPreference::Group, MatchKind::Group)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderPreference {
    Any,
    Same,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommuteStatus {
    Queued,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Suggested,
    QueueAssigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Suggested,
    Assigned,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub gender: String,
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupSizePreference {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_minute: i32,
    pub end_minute: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedPoint {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSegment {
    #[serde(rename = "type")]
    pub kind: TransportMode,
    pub coordinates: Vec<(f64, f64)>,
    pub label: Option<String>,
    pub transit_line: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commute {
    pub id: String,
    pub user_id: String,
    pub start: NamedPoint,
    pub end: NamedPoint,
    pub time_window: TimeWindow,
    pub transport_mode: TransportMode,
    pub match_preference: MatchPreference,
    pub group_size_pref: GroupSizePreference,
    pub gender_preference: GenderPreference,
    pub status: CommuteStatus,
    pub enable_queue_flow: bool,
    pub enable_suggestions_flow: bool,
    pub route_segments: Vec<RouteSegment>,
    pub route_coordinates: Vec<(f64, f64)>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commute {
    /// `route_coordinates` if populated, else the concatenation of segment
    /// coordinates with consecutive duplicate points collapsed.
    pub fn flattened_route(&self) -> Vec<(f64, f64)> {
        if !self.route_coordinates.is_empty() {
            return self.route_coordinates.clone();
        }
        let mut flattened: Vec<(f64, f64)> = Vec::new();
        for segment in &self.route_segments {
            for coordinate in &segment.coordinates {
                if flattened.last() != Some(coordinate) {
                    flattened.push(*coordinate);
                }
            }
        }
        flattened
    }

    /// Named anchors consulted by point naming: the commute's start/end,
    /// plus the last coordinate of any segment whose label looks like
    /// "... to <destination>" (excluding plain "walk segment" labels).
    pub fn named_anchors(&self) -> Vec<NamedPoint> {
        let mut anchors = vec![self.start.clone(), self.end.clone()];
        for segment in &self.route_segments {
            let Some(label) = &segment.label else {
                continue;
            };
            let trimmed = label.trim();
            // ASCII-only lowercasing keeps byte offsets aligned with `trimmed`,
            // so the split point found here slices the original casing below.
            let normalized = trimmed.to_ascii_lowercase();
            if normalized == "walk segment" {
                continue;
            }
            let Some(split_at) = normalized.rfind(" to ") else {
                continue;
            };
            if let Some((lat, lng)) = segment.coordinates.last() {
                let destination = trimmed[split_at + " to ".len()..].trim().to_string();
                anchors.push(NamedPoint {
                    name: destination,
                    lat: *lat,
                    lng: *lng,
                });
            }
        }
        anchors
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchScores {
    pub overlap_score: f64,
    pub interest_score: f64,
    pub composite_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDecision {
    pub user_id: String,
    pub accepted_at: Option<DateTime<Utc>>,
    pub passed_at: Option<DateTime<Utc>>,
    pub pass_cooldown_until: Option<DateTime<Utc>>,
}

impl ParticipantDecision {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            accepted_at: None,
            passed_at: None,
            pass_cooldown_until: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: MatchSource,
    pub kind: MatchKind,
    pub status: MatchStatus,
    pub participants: Vec<String>,
    pub transport_mode: TransportMode,
    pub scores: MatchScores,
    pub compatibility_percent: i32,
    pub shared_segment_start: NamedPoint,
    pub shared_segment_end: NamedPoint,
    pub estimated_time_minutes: i32,
    pub decisions: Vec<ParticipantDecision>,
    pub chat_room_id: Option<String>,
    pub commute_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchDocument {
    pub fn participant_set(&self) -> std::collections::BTreeSet<&str> {
        self.participants.iter().map(String::as_str).collect()
    }

    pub fn decision_for(&self, user_id: &str) -> Option<&ParticipantDecision> {
        self.decisions.iter().find(|d| d.user_id == user_id)
    }

    pub fn decision_for_mut(&mut self, user_id: &str) -> Option<&mut ParticipantDecision> {
        self.decisions.iter_mut().find(|d| d.user_id == user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRoomKind {
    Dm,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub match_id: String,
    pub participants: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ChatRoomKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn new(match_id: impl Into<String>, participants: Vec<String>) -> Self {
        let kind = if participants.len() > 2 {
            ChatRoomKind::Group
        } else {
            ChatRoomKind::Dm
        };
        let now = Utc::now();
        Self {
            id: None,
            match_id: match_id.into(),
            participants,
            kind,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commute_with_segment(label: &str) -> Commute {
        let now = Utc::now();
        Commute {
            id: "c1".into(),
            user_id: "u1".into(),
            start: NamedPoint { name: "Home".into(), lat: 0.0, lng: 0.0 },
            end: NamedPoint { name: "Work".into(), lat: 1.0, lng: 1.0 },
            time_window: TimeWindow { start_minute: 480, end_minute: 540 },
            transport_mode: TransportMode::Transit,
            match_preference: MatchPreference::Individual,
            group_size_pref: GroupSizePreference { min: 2, max: 2 },
            gender_preference: GenderPreference::Any,
            status: CommuteStatus::Queued,
            enable_queue_flow: true,
            enable_suggestions_flow: true,
            route_segments: vec![RouteSegment {
                kind: TransportMode::Transit,
                coordinates: vec![(0.5, 0.5)],
                label: Some(label.to_string()),
                transit_line: None,
                duration_minutes: Some(10),
            }],
            route_coordinates: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn named_anchors_preserves_destination_casing_with_mixed_case_label() {
        let commute = commute_with_segment("Bus To Downtown");
        let anchors = commute.named_anchors();
        assert!(anchors.iter().any(|a| a.name == "Downtown"));
    }

    #[test]
    fn named_anchors_skips_plain_walk_segment_label() {
        let commute = commute_with_segment("Walk Segment");
        let anchors = commute.named_anchors();
        assert_eq!(anchors.len(), 2, "only start/end, no segment-derived anchor");
    }
}
