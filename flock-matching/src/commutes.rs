//! Commute CRUD and route generation: the only way the engine's snapshot
//! loader ever receives non-empty input in a real deployment, even though
//! profile/commute storage is conceptually an external collaborator.

use bson::doc;
use bson::oid::ObjectId;
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::Collection;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Commute, CommuteStatus, GenderPreference, GroupSizePreference, MatchPreference, NamedPoint, RouteSegment, TimeWindow, TransportMode};
use crate::routing::{NormalizedRoute, PlannerClient, RoutingError};

#[derive(Debug, Serialize, Deserialize)]
struct CommuteDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(flatten)]
    body: Commute,
}

fn hydrate(mut doc: CommuteDoc) -> Commute {
    if let Some(id) = doc.id {
        doc.body.id = id.to_hex();
    }
    doc.body
}

pub struct CommuteRepository {
    collection: Collection<CommuteDoc>,
}

impl CommuteRepository {
    pub fn new(client: &flock_shared::clients::MongoClient) -> Self {
        Self { collection: client.collection("commutes") }
    }

    pub async fn find_by_user(&self, user_id: &str) -> anyhow::Result<Option<Commute>> {
        let result = self.collection.find_one(doc! { "user_id": user_id }, None).await?;
        Ok(result.map(hydrate))
    }

    async fn insert(&self, commute: &mut Commute) -> anyhow::Result<()> {
        let wire = CommuteDoc { id: None, body: commute.clone() };
        let result = self.collection.insert_one(wire, None).await?;
        if let Some(object_id) = result.inserted_id.as_object_id() {
            commute.id = object_id.to_hex();
        }
        Ok(())
    }

    async fn save(&self, commute: &Commute) -> anyhow::Result<()> {
        let object_id = ObjectId::parse_str(&commute.id)?;
        let wire = CommuteDoc { id: Some(object_id), body: commute.clone() };
        self.collection.replace_one(doc! { "_id": object_id }, wire, None).await?;
        Ok(())
    }

    /// Used by integration-style tests only; not part of the engine's own
    /// read path (that goes through `store::Store::find_commutes`).
    pub async fn list_all(&self) -> anyhow::Result<Vec<Commute>> {
        let mut cursor = self.collection.find(doc! {}, None).await?;
        let mut commutes = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            commutes.push(hydrate(doc));
        }
        Ok(commutes)
    }
}

/// `individual` always normalizes to (2, 2); any other preference clamps
/// the requested range to [max(3, min), max(min, min(4, max))].
pub fn normalized_group_size(preference: MatchPreference, requested_min: i32, requested_max: i32) -> (i32, i32) {
    if preference == MatchPreference::Individual {
        return (2, 2);
    }
    let normalized_min = requested_min.max(3);
    let normalized_max = normalized_min.max(requested_max.min(4));
    (normalized_min, normalized_max)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PointPayload {
    #[validate(length(min = 1))]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GroupSizePayload {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TimeWindowPayload {
    #[validate(range(min = 0, max = 1439))]
    pub start_minute: i32,
    #[validate(range(min = 1, max = 1440))]
    pub end_minute: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CommuteCreatePayload {
    #[validate]
    pub start: PointPayload,
    #[validate]
    pub end: PointPayload,
    #[validate]
    pub time_window: TimeWindowPayload,
    pub transport_mode: TransportMode,
    pub match_preference: MatchPreference,
    #[validate]
    pub group_size_pref: GroupSizePayload,
    #[serde(default)]
    pub gender_preference: Option<GenderPreference>,
    #[serde(default)]
    pub enable_queue_flow: Option<bool>,
    #[serde(default)]
    pub enable_suggestions_flow: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct CommuteUpdatePayload {
    #[validate]
    pub start: Option<PointPayload>,
    #[validate]
    pub end: Option<PointPayload>,
    #[validate]
    pub time_window: Option<TimeWindowPayload>,
    pub transport_mode: Option<TransportMode>,
    pub match_preference: Option<MatchPreference>,
    #[validate]
    pub group_size_pref: Option<GroupSizePayload>,
    pub gender_preference: Option<GenderPreference>,
    pub enable_queue_flow: Option<bool>,
    pub enable_suggestions_flow: Option<bool>,
}

fn segments_from_route(route: &NormalizedRoute) -> Vec<RouteSegment> {
    route
        .segments
        .iter()
        .map(|s| RouteSegment {
            kind: s.kind,
            coordinates: s.coordinates.clone(),
            label: s.label.clone(),
            transit_line: s.transit_line.clone(),
            duration_minutes: s.duration_minutes,
        })
        .collect()
}

async fn generate_route(
    planner: &PlannerClient,
    start: &NamedPoint,
    end: &NamedPoint,
    time_window: &TimeWindow,
    transport_mode: TransportMode,
) -> Result<NormalizedRoute, RoutingError> {
    planner
        .plan_route(start.lat, start.lng, end.lat, end.lng, time_window.start_minute, transport_mode)
        .await
}

pub async fn get_my_commute(repo: &CommuteRepository, user_id: &str) -> anyhow::Result<Option<Commute>> {
    repo.find_by_user(user_id).await
}

pub async fn create_or_replace_commute(
    repo: &CommuteRepository,
    planner: &PlannerClient,
    user_id: &str,
    payload: CommuteCreatePayload,
) -> anyhow::Result<Result<Commute, RoutingError>> {
    let existing = repo.find_by_user(user_id).await?;
    let (min_size, max_size) =
        normalized_group_size(payload.match_preference, payload.group_size_pref.min, payload.group_size_pref.max);

    let start = NamedPoint { name: payload.start.name, lat: payload.start.lat, lng: payload.start.lng };
    let end = NamedPoint { name: payload.end.name, lat: payload.end.lat, lng: payload.end.lng };
    let time_window = TimeWindow { start_minute: payload.time_window.start_minute, end_minute: payload.time_window.end_minute };

    let route = match generate_route(planner, &start, &end, &time_window, payload.transport_mode).await {
        Ok(route) => route,
        Err(e) => return Ok(Err(e)),
    };

    let now = Utc::now();
    let mut commute = existing.unwrap_or_else(|| Commute {
        id: String::new(),
        user_id: user_id.to_string(),
        start: start.clone(),
        end: end.clone(),
        time_window,
        transport_mode: payload.transport_mode,
        match_preference: payload.match_preference,
        group_size_pref: GroupSizePreference { min: min_size, max: max_size },
        gender_preference: payload.gender_preference.unwrap_or(GenderPreference::Any),
        status: CommuteStatus::Queued,
        enable_queue_flow: payload.enable_queue_flow.unwrap_or(false),
        enable_suggestions_flow: payload.enable_suggestions_flow.unwrap_or(true),
        route_segments: segments_from_route(&route),
        route_coordinates: route.coordinates.clone(),
        created_at: now,
        updated_at: now,
    });

    commute.start = start;
    commute.end = end;
    commute.time_window = time_window;
    commute.transport_mode = payload.transport_mode;
    commute.match_preference = payload.match_preference;
    commute.group_size_pref = GroupSizePreference { min: min_size, max: max_size };
    if let Some(gender) = payload.gender_preference {
        commute.gender_preference = gender;
    }
    if let Some(flag) = payload.enable_queue_flow {
        commute.enable_queue_flow = flag;
    }
    if let Some(flag) = payload.enable_suggestions_flow {
        commute.enable_suggestions_flow = flag;
    }
    commute.route_segments = segments_from_route(&route);
    commute.route_coordinates = route.coordinates;
    commute.updated_at = now;

    if commute.id.is_empty() {
        repo.insert(&mut commute).await?;
    } else {
        repo.save(&commute).await?;
    }
    Ok(Ok(commute))
}

fn should_refresh_route(payload: &CommuteUpdatePayload) -> bool {
    payload.start.is_some() || payload.end.is_some() || payload.time_window.is_some() || payload.transport_mode.is_some()
}

pub async fn patch_my_commute(
    repo: &CommuteRepository,
    planner: &PlannerClient,
    user_id: &str,
    payload: CommuteUpdatePayload,
) -> anyhow::Result<Option<Result<Commute, RoutingError>>> {
    let Some(mut commute) = repo.find_by_user(user_id).await? else {
        return Ok(None);
    };

    if let Some(point) = payload.start.clone() {
        commute.start = NamedPoint { name: point.name, lat: point.lat, lng: point.lng };
    }
    if let Some(point) = payload.end.clone() {
        commute.end = NamedPoint { name: point.name, lat: point.lat, lng: point.lng };
    }
    if let Some(window) = &payload.time_window {
        commute.time_window = TimeWindow { start_minute: window.start_minute, end_minute: window.end_minute };
    }
    if let Some(mode) = payload.transport_mode {
        commute.transport_mode = mode;
    }
    if let Some(preference) = payload.match_preference {
        commute.match_preference = preference;
    }
    if let Some(size) = &payload.group_size_pref {
        let (min_size, max_size) = normalized_group_size(commute.match_preference, size.min, size.max);
        commute.group_size_pref = GroupSizePreference { min: min_size, max: max_size };
    }
    if let Some(gender) = payload.gender_preference {
        commute.gender_preference = gender;
    }
    if let Some(flag) = payload.enable_queue_flow {
        commute.enable_queue_flow = flag;
    }
    if let Some(flag) = payload.enable_suggestions_flow {
        commute.enable_suggestions_flow = flag;
    }

    if commute.match_preference == MatchPreference::Individual {
        commute.group_size_pref = GroupSizePreference { min: 2, max: 2 };
    } else {
        let (min_size, max_size) =
            normalized_group_size(MatchPreference::Group, commute.group_size_pref.min, commute.group_size_pref.max);
        commute.group_size_pref = GroupSizePreference { min: min_size, max: max_size };
    }

    if should_refresh_route(&payload) {
        match generate_route(planner, &commute.start, &commute.end, &commute.time_window, commute.transport_mode).await {
            Ok(route) => {
                commute.route_segments = segments_from_route(&route);
                commute.route_coordinates = route.coordinates;
            }
            Err(e) => return Ok(Some(Err(e))),
        }
    }

    commute.updated_at = Utc::now();
    repo.save(&commute).await?;
    Ok(Some(Ok(commute)))
}

pub async fn set_queue_enabled(repo: &CommuteRepository, user_id: &str, enabled: bool) -> anyhow::Result<Option<Commute>> {
    let Some(mut commute) = repo.find_by_user(user_id).await? else {
        return Ok(None);
    };
    commute.enable_queue_flow = enabled;
    commute.status = if enabled { CommuteStatus::Queued } else { CommuteStatus::Paused };
    commute.updated_at = Utc::now();
    repo.save(&commute).await?;
    Ok(Some(commute))
}

pub async fn set_suggestions_enabled(repo: &CommuteRepository, user_id: &str, enabled: bool) -> anyhow::Result<Option<Commute>> {
    let Some(mut commute) = repo.find_by_user(user_id).await? else {
        return Ok(None);
    };
    commute.enable_suggestions_flow = enabled;
    commute.status = if enabled { CommuteStatus::Queued } else { CommuteStatus::Paused };
    commute.updated_at = Utc::now();
    repo.save(&commute).await?;
    Ok(Some(commute))
}

pub async fn pause_matching(repo: &CommuteRepository, user_id: &str) -> anyhow::Result<Option<Commute>> {
    let Some(mut commute) = repo.find_by_user(user_id).await? else {
        return Ok(None);
    };
    commute.status = CommuteStatus::Paused;
    commute.updated_at = Utc::now();
    repo.save(&commute).await?;
    Ok(Some(commute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_group_size_individual_is_fixed_pair() {
        assert_eq!(normalized_group_size(MatchPreference::Individual, 5, 8), (2, 2));
    }

    #[test]
    fn normalized_group_size_clamps_requested_range() {
        assert_eq!(normalized_group_size(MatchPreference::Group, 1, 10), (3, 4));
        assert_eq!(normalized_group_size(MatchPreference::Both, 2, 2), (3, 3));
        assert_eq!(normalized_group_size(MatchPreference::Group, 4, 4), (4, 4));
    }
}
