//! External routing planner client (§6.3, §9's "result type with variants
//! {Ok(plan), UpstreamError(kind, detail)}" redesign note). Speaks GraphQL
//! to an OpenTripPlanner-shaped backend and normalizes either response
//! shape into route segments the rest of the engine understands.

use std::time::Duration;

use chrono::{Local, NaiveTime, TimeZone};
use serde_json::Value;

use crate::models::{RouteSegment, TransportMode};

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("routing planner unreachable: {0}")]
    Unreachable(String),
    #[error("routing planner timed out")]
    Timeout,
    #[error("routing planner returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("routing planner returned no usable route geometry")]
    NoUsableGeometry,
}

pub struct NormalizedRoute {
    pub segments: Vec<RouteSegment>,
    pub coordinates: Vec<(f64, f64)>,
    pub total_duration_minutes: Option<i32>,
}

pub struct PlannerClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PlannerClient {
    pub fn new(base_url: &str, graphql_path: &str, timeout: Duration) -> Self {
        let normalized_base = base_url.trim_end_matches('/');
        let normalized_path = if graphql_path.starts_with('/') {
            graphql_path.to_string()
        } else {
            format!("/{graphql_path}")
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, endpoint: format!("{normalized_base}{normalized_path}") }
    }

    pub async fn plan_route(
        &self,
        start_lat: f64,
        start_lng: f64,
        end_lat: f64,
        end_lng: f64,
        start_minute: i32,
        transport_mode: TransportMode,
    ) -> Result<NormalizedRoute, RoutingError> {
        let departure_iso = build_departure_iso(start_minute);
        let query = build_plan_query(start_lat, start_lng, end_lat, end_lng, &departure_iso, transport_mode);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RoutingError::Timeout
                } else {
                    RoutingError::Unreachable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(RoutingError::Unreachable(format!("status {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RoutingError::MalformedResponse(e.to_string()))?;

        if body.get("errors").is_some() {
            return Err(RoutingError::MalformedResponse("planner returned GraphQL errors".into()));
        }
        let data = body
            .get("data")
            .ok_or_else(|| RoutingError::MalformedResponse("response missing data field".into()))?;

        normalize_plan(data)
    }
}

fn _mode_block(transport_mode: TransportMode) -> &'static str {
    match transport_mode {
        TransportMode::Walk => "direct: [WALK]",
        TransportMode::Transit => {
            "direct: [WALK]\n      transit: { transit: [{ mode: BUS }, { mode: RAIL }, { mode: TRAM }] }"
        }
    }
}

fn build_plan_query(
    from_lat: f64,
    from_lng: f64,
    to_lat: f64,
    to_lng: f64,
    departure_iso: &str,
    transport_mode: TransportMode,
) -> String {
    let modes = _mode_block(transport_mode);
    format!(
        "{{\n  plan(\n    from: {{ location: {{ coordinate: {{ latitude: {from_lat}, longitude: {from_lng} }} }} }}\n    to: {{ location: {{ coordinate: {{ latitude: {to_lat}, longitude: {to_lng} }} }} }}\n    dateTime: {{ earliestDeparture: \"{departure_iso}\" }}\n    modes: {{\n      {modes}\n    }}\n  ) {{\n    edges {{ node {{ legs {{ mode route {{ longName shortName }} legGeometry {{ points }} }} }} }}\n    itineraries {{ duration legs {{ mode duration route {{ longName shortName }} legGeometry {{ points }} }} }}\n  }}\n}}"
    )
}

/// Earliest departure at or after `start_minute` today (local time), rolled
/// to tomorrow if that clock time has already passed.
fn build_departure_iso(start_minute: i32) -> String {
    let now = Local::now();
    let hour = (start_minute / 60).rem_euclid(24) as u32;
    let minute = (start_minute % 60) as u32;
    let naive_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    let naive_datetime = now.date_naive().and_time(naive_time);
    let candidate = Local.from_local_datetime(&naive_datetime).single().unwrap_or(now);
    let departure = if candidate < now { candidate + chrono::Duration::days(1) } else { candidate };
    departure.format("%Y-%m-%dT%H:%M%:z").to_string()
}

/// Google/OSRM precision-5 polyline decoding.
pub fn decode_polyline(encoded: &str) -> Vec<(f64, f64)> {
    let bytes = encoded.as_bytes();
    let mut index = 0usize;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut coordinates = Vec::new();

    while index < bytes.len() {
        let mut shift = 0;
        let mut result: i64 = 0;
        loop {
            if index >= bytes.len() {
                break;
            }
            let value = bytes[index] as i64 - 63;
            index += 1;
            result |= (value & 0x1F) << shift;
            shift += 5;
            if value < 0x20 {
                break;
            }
        }
        let delta_lat = if result & 1 != 0 { !(result >> 1) } else { result >> 1 };
        lat += delta_lat;

        let mut shift = 0;
        let mut result: i64 = 0;
        loop {
            if index >= bytes.len() {
                break;
            }
            let value = bytes[index] as i64 - 63;
            index += 1;
            result |= (value & 0x1F) << shift;
            shift += 5;
            if value < 0x20 {
                break;
            }
        }
        let delta_lng = if result & 1 != 0 { !(result >> 1) } else { result >> 1 };
        lng += delta_lng;

        coordinates.push((lat as f64 / 1e5, lng as f64 / 1e5));
    }

    coordinates
}

/// Parses a duration expressed as numeric seconds or an ISO-8601
/// `PT#H#M#S` string into whole minutes (minimum 1).
fn duration_minutes(value: Option<&Value>) -> Option<i32> {
    let value = value?;
    if let Some(seconds) = value.as_f64() {
        return Some(((seconds / 60.0).round() as i32).max(1));
    }
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let upper = text.to_uppercase();
    if let Some(rest) = upper.strip_prefix("PT") {
        let mut hours = 0i64;
        let mut minutes = 0i64;
        let mut seconds = 0i64;
        let mut number = String::new();
        for ch in rest.chars() {
            match ch {
                '0'..='9' => number.push(ch),
                'H' => {
                    hours = number.parse().unwrap_or(0);
                    number.clear();
                }
                'M' => {
                    minutes = number.parse().unwrap_or(0);
                    number.clear();
                }
                'S' => {
                    seconds = number.parse().unwrap_or(0);
                    number.clear();
                }
                _ => return None,
            }
        }
        let total_seconds = hours * 3600 + minutes * 60 + seconds;
        return Some(((total_seconds as f64 / 60.0).round() as i32).max(1));
    }
    text.parse::<f64>().ok().map(|seconds| ((seconds / 60.0).round() as i32).max(1))
}

fn segment_type(mode: &str) -> TransportMode {
    if mode.eq_ignore_ascii_case("walk") {
        TransportMode::Walk
    } else {
        TransportMode::Transit
    }
}

fn legs_from_plan(plan: &Value) -> Option<(&Vec<Value>, Option<i32>)> {
    if let Some(edges) = plan.get("edges").and_then(Value::as_array) {
        if let Some(legs) = edges
            .first()
            .and_then(|edge| edge.get("node"))
            .and_then(|node| node.get("legs"))
            .and_then(Value::as_array)
        {
            return Some((legs, None));
        }
    }
    if let Some(itineraries) = plan.get("itineraries").and_then(Value::as_array) {
        if let Some(first) = itineraries.first() {
            if let Some(legs) = first.get("legs").and_then(Value::as_array) {
                let itinerary_minutes = duration_minutes(first.get("duration"));
                return Some((legs, itinerary_minutes));
            }
        }
    }
    None
}

/// Normalizes either the `edges→node→legs` or `itineraries→legs` plan shape
/// into route segments plus a flattened, de-duplicated coordinate list.
pub fn normalize_plan(data: &Value) -> Result<NormalizedRoute, RoutingError> {
    let plan = data
        .get("plan")
        .ok_or_else(|| RoutingError::MalformedResponse("response did not include a plan".into()))?;

    let (legs, itinerary_duration_minutes) =
        legs_from_plan(plan).ok_or_else(|| RoutingError::MalformedResponse("itinerary did not include legs".into()))?;

    let mut segments = Vec::new();
    let mut coordinates: Vec<(f64, f64)> = Vec::new();
    let mut total_duration_minutes = 0;
    let mut has_duration = false;

    for leg in legs {
        let Some(leg) = leg.as_object() else { continue };
        let mode = leg.get("mode").and_then(Value::as_str).unwrap_or("").to_string();
        let kind = segment_type(&mode);
        let Some(encoded) = leg.get("legGeometry").and_then(|g| g.get("points")).and_then(Value::as_str) else {
            continue;
        };
        if encoded.is_empty() {
            continue;
        }
        let leg_coordinates = decode_polyline(encoded);
        if leg_coordinates.len() < 2 {
            continue;
        }

        let route = leg.get("route");
        let short_name = route.and_then(|r| r.get("shortName")).and_then(Value::as_str);
        let long_name = route.and_then(|r| r.get("longName")).and_then(Value::as_str);
        let label = long_name.filter(|s| !s.is_empty()).or(short_name.filter(|s| !s.is_empty())).map(str::to_string);
        let transit_line = if matches!(kind, TransportMode::Transit) {
            short_name.map(str::to_string)
        } else {
            None
        };
        let segment_minutes = duration_minutes(leg.get("duration"));
        if let Some(minutes) = segment_minutes {
            total_duration_minutes += minutes;
            has_duration = true;
        }

        segments.push(RouteSegment {
            kind,
            coordinates: leg_coordinates.clone(),
            label,
            transit_line,
            duration_minutes: segment_minutes,
        });
        for coordinate in leg_coordinates {
            if coordinates.last() != Some(&coordinate) {
                coordinates.push(coordinate);
            }
        }
    }

    if segments.is_empty() || coordinates.len() < 2 {
        return Err(RoutingError::NoUsableGeometry);
    }

    Ok(NormalizedRoute {
        segments,
        coordinates,
        total_duration_minutes: if has_duration { Some(total_duration_minutes) } else { itinerary_duration_minutes },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_polyline_matches_known_example() {
        let decoded = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
        assert_eq!(decoded.len(), 3);
        assert!((decoded[0].0 - 38.5).abs() < 1e-4);
        assert!((decoded[0].1 - (-120.2)).abs() < 1e-4);
    }

    #[test]
    fn duration_minutes_parses_numeric_seconds() {
        assert_eq!(duration_minutes(Some(&serde_json::json!(150.0))), Some(3));
    }

    #[test]
    fn duration_minutes_parses_iso8601() {
        assert_eq!(duration_minutes(Some(&serde_json::json!("PT1H5M"))), Some(65));
        assert_eq!(duration_minutes(Some(&serde_json::json!("PT45S"))), Some(1));
    }

    #[test]
    fn normalize_plan_reads_edges_shape() {
        let data = serde_json::json!({
            "plan": {
                "edges": [{
                    "node": {
                        "legs": [{
                            "mode": "WALK",
                            "duration": 300.0,
                            "legGeometry": { "points": "_p~iF~ps|U_ulLnnqC_mqNvxq`@" },
                        }]
                    }
                }]
            }
        });
        let route = normalize_plan(&data).unwrap();
        assert_eq!(route.segments.len(), 1);
        assert_eq!(route.total_duration_minutes, Some(5));
    }

    #[test]
    fn normalize_plan_reads_itineraries_shape() {
        let data = serde_json::json!({
            "plan": {
                "itineraries": [{
                    "duration": 600.0,
                    "legs": [{
                        "mode": "BUS",
                        "route": { "shortName": "12", "longName": "Downtown Express" },
                        "legGeometry": { "points": "_p~iF~ps|U_ulLnnqC_mqNvxq`@" },
                    }]
                }]
            }
        });
        let route = normalize_plan(&data).unwrap();
        assert_eq!(route.segments[0].transit_line.as_deref(), Some("12"));
        assert_eq!(route.segments[0].label.as_deref(), Some("Downtown Express"));
    }

    #[test]
    fn normalize_plan_rejects_missing_geometry() {
        let data = serde_json::json!({ "plan": { "itineraries": [{ "legs": [] }] } });
        assert!(matches!(normalize_plan(&data), Err(RoutingError::MalformedResponse(_))));
    }
}
