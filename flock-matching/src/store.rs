//! `Store` trait abstracting document persistence, keeping the async I/O
//! boundary behind an interface. `MongoStore` is the real implementation;
//! `FakeStore` is an in-memory double used by tests so the suite never needs
//! a live MongoDB instance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bson::doc;
use bson::oid::ObjectId;
use chrono::NaiveDate;
use futures::stream::TryStreamExt;
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::models::{ChatRoom, Commute, MatchDocument, MatchKind, MatchPreference, MatchSource, MatchStatus, User};

#[derive(Debug, Clone, Default)]
pub struct CommuteFilter {
    pub status_queued: bool,
    pub enable_suggestions_flow: Option<bool>,
    pub enable_queue_flow: Option<bool>,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub source: Option<MatchSource>,
    pub kind: Option<MatchKind>,
    pub status_in: Option<Vec<MatchStatus>>,
    pub commute_date: Option<NaiveDate>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_commutes(&self, filter: CommuteFilter) -> anyhow::Result<Vec<(Commute, User)>>;
    async fn find_matches(&self, filter: MatchFilter) -> anyhow::Result<Vec<MatchDocument>>;
    async fn get_match(&self, id: &str) -> anyhow::Result<Option<MatchDocument>>;
    async fn insert_match(&self, doc: &mut MatchDocument) -> anyhow::Result<()>;
    async fn save_match(&self, doc: &MatchDocument) -> anyhow::Result<()>;
    async fn insert_chat_room(&self, room: &mut ChatRoom) -> anyhow::Result<()>;
    async fn pause_commute(&self, user_id: &str) -> anyhow::Result<()>;
}

fn preference_matches(preference: MatchPreference, kind: MatchKind) -> bool {
    preference.permits(kind)
}

// ---------------------------------------------------------------------------
// MongoDB implementation
// ---------------------------------------------------------------------------

/// On-wire document shape for a commute; mirrors `Commute` but carries a
/// real `ObjectId` rather than a hex string.
#[derive(Debug, Serialize, Deserialize)]
struct CommuteDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(flatten)]
    body: Commute,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(flatten)]
    body: User,
}

#[derive(Debug, Serialize, Deserialize)]
struct MatchDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(flatten)]
    body: MatchDocument,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatRoomDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(flatten)]
    body: ChatRoom,
}

// Commute/User documents carry their own store-assigned `id` in the
// flattened body already (see commutes.rs/users.rs) — unlike matches and
// chat rooms, they're never written through this module, so there's
// nothing to derive from the wrapper's `_id` here.
fn hydrate_commute(doc: CommuteDoc) -> Commute {
    doc.body
}

fn hydrate_user(doc: UserDoc) -> User {
    doc.body
}

fn hydrate_match(mut doc: MatchDoc) -> MatchDocument {
    if let Some(id) = doc.id {
        doc.body.id = Some(id.to_hex());
    }
    doc.body
}

pub struct MongoStore {
    commutes: Collection<CommuteDoc>,
    users: Collection<UserDoc>,
    matches: Collection<MatchDoc>,
    chat_rooms: Collection<ChatRoomDoc>,
}

impl MongoStore {
    pub fn new(client: &flock_shared::clients::MongoClient) -> Self {
        Self {
            commutes: client.collection("commutes"),
            users: client.collection("users"),
            matches: client.collection("matches"),
            chat_rooms: client.collection("chat_rooms"),
        }
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn find_commutes(&self, filter: CommuteFilter) -> anyhow::Result<Vec<(Commute, User)>> {
        let mut query = doc! {};
        if filter.status_queued {
            query.insert("status", "queued");
        }
        if let Some(flag) = filter.enable_suggestions_flow {
            query.insert("enable_suggestions_flow", flag);
        }
        if let Some(flag) = filter.enable_queue_flow {
            query.insert("enable_queue_flow", flag);
        }

        let mut cursor = self.commutes.find(query, None).await?;
        let mut commute_docs = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            commute_docs.push(doc);
        }

        let mut commutes: Vec<Commute> = commute_docs
            .into_iter()
            .map(hydrate_commute)
            .filter(|c| preference_matches(c.match_preference, filter.kind))
            .collect();
        if commutes.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<String> = commutes.iter().map(|c| c.user_id.clone()).collect();
        let user_query = doc! { "id": { "$in": &user_ids } };
        let mut user_cursor = self.users.find(user_query, None).await?;
        let mut users_by_id: HashMap<String, User> = HashMap::new();
        while let Some(doc) = user_cursor.try_next().await? {
            let user = hydrate_user(doc);
            users_by_id.insert(user.id.clone(), user);
        }

        commutes.retain(|c| users_by_id.contains_key(&c.user_id));
        Ok(commutes
            .into_iter()
            .map(|c| {
                let user = users_by_id[&c.user_id].clone();
                (c, user)
            })
            .collect())
    }

    async fn find_matches(&self, filter: MatchFilter) -> anyhow::Result<Vec<MatchDocument>> {
        let mut query = doc! {};
        if let Some(source) = filter.source {
            query.insert("source", source_str(source));
        }
        if let Some(kind) = filter.kind {
            query.insert("kind", kind.as_str());
        }
        if let Some(statuses) = &filter.status_in {
            let values: Vec<&str> = statuses.iter().map(|s| status_str(*s)).collect();
            query.insert("status", doc! { "$in": values });
        }
        if let Some(date) = filter.commute_date {
            query.insert("commute_date", date.to_string());
        }

        let mut cursor = self.matches.find(query, None).await?;
        let mut results = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            results.push(hydrate_match(doc));
        }
        Ok(results)
    }

    async fn get_match(&self, id: &str) -> anyhow::Result<Option<MatchDocument>> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let result = self.matches.find_one(doc! { "_id": object_id }, None).await?;
        Ok(result.map(hydrate_match))
    }

    async fn insert_match(&self, document: &mut MatchDocument) -> anyhow::Result<()> {
        let wire = MatchDoc {
            id: None,
            body: document.clone(),
        };
        let result = self.matches.insert_one(wire, None).await?;
        if let Some(object_id) = result.inserted_id.as_object_id() {
            document.id = Some(object_id.to_hex());
        }
        Ok(())
    }

    async fn save_match(&self, document: &MatchDocument) -> anyhow::Result<()> {
        let Some(id) = &document.id else {
            anyhow::bail!("cannot save a match document without an id");
        };
        let object_id = ObjectId::parse_str(id)?;
        let wire = MatchDoc {
            id: Some(object_id),
            body: document.clone(),
        };
        self.matches
            .replace_one(doc! { "_id": object_id }, wire, None)
            .await?;
        Ok(())
    }

    async fn insert_chat_room(&self, room: &mut ChatRoom) -> anyhow::Result<()> {
        let wire = ChatRoomDoc {
            id: None,
            body: room.clone(),
        };
        let result = self.chat_rooms.insert_one(wire, None).await?;
        if let Some(object_id) = result.inserted_id.as_object_id() {
            room.id = Some(object_id.to_hex());
        }
        Ok(())
    }

    async fn pause_commute(&self, user_id: &str) -> anyhow::Result<()> {
        self.commutes
            .update_one(
                doc! { "user_id": user_id },
                doc! { "$set": { "status": "paused", "enable_queue_flow": false } },
                None,
            )
            .await?;
        Ok(())
    }
}

fn source_str(source: MatchSource) -> &'static str {
    match source {
        MatchSource::Suggested => "suggested",
        MatchSource::QueueAssigned => "queue_assigned",
    }
}

fn status_str(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Suggested => "suggested",
        MatchStatus::Assigned => "assigned",
        MatchStatus::Active => "active",
        MatchStatus::Completed => "completed",
    }
}

// ---------------------------------------------------------------------------
// In-memory fake for unit and lifecycle tests
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeStore {
    commutes: Mutex<Vec<Commute>>,
    users: Mutex<Vec<User>>,
    matches: Mutex<Vec<MatchDocument>>,
    chat_rooms: Mutex<Vec<ChatRoom>>,
    next_id: Mutex<u64>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        format!("fake-{}", *guard)
    }

    pub fn seed_commute(&self, commute: Commute) {
        self.commutes.lock().unwrap().push(commute);
    }

    pub fn seed_user(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    pub fn seed_match(&self, mut document: MatchDocument) -> String {
        let id = self.next_id();
        document.id = Some(id.clone());
        self.matches.lock().unwrap().push(document);
        id
    }

    pub fn all_matches(&self) -> Vec<MatchDocument> {
        self.matches.lock().unwrap().clone()
    }

    pub fn commute_for(&self, user_id: &str) -> Option<Commute> {
        self.commutes
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.user_id == user_id)
            .cloned()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn find_commutes(&self, filter: CommuteFilter) -> anyhow::Result<Vec<(Commute, User)>> {
        let commutes = self.commutes.lock().unwrap().clone();
        let users = self.users.lock().unwrap().clone();
        let users_by_id: HashMap<String, User> = users.into_iter().map(|u| (u.id.clone(), u)).collect();

        Ok(commutes
            .into_iter()
            .filter(|c| !filter.status_queued || c.status == crate::models::CommuteStatus::Queued)
            .filter(|c| filter.enable_suggestions_flow.map_or(true, |flag| flag == c.enable_suggestions_flow))
            .filter(|c| filter.enable_queue_flow.map_or(true, |flag| flag == c.enable_queue_flow))
            .filter(|c| preference_matches(c.match_preference, filter.kind))
            .filter_map(|c| users_by_id.get(&c.user_id).cloned().map(|u| (c, u)))
            .collect())
    }

    async fn find_matches(&self, filter: MatchFilter) -> anyhow::Result<Vec<MatchDocument>> {
        let matches = self.matches.lock().unwrap().clone();
        Ok(matches
            .into_iter()
            .filter(|m| filter.source.map_or(true, |s| s == m.source))
            .filter(|m| filter.kind.map_or(true, |k| k == m.kind))
            .filter(|m| {
                filter
                    .status_in
                    .as_ref()
                    .map_or(true, |statuses| statuses.contains(&m.status))
            })
            .filter(|m| filter.commute_date.map_or(true, |date| m.commute_date == Some(date)))
            .collect())
    }

    async fn get_match(&self, id: &str) -> anyhow::Result<Option<MatchDocument>> {
        Ok(self.matches.lock().unwrap().iter().find(|m| m.id.as_deref() == Some(id)).cloned())
    }

    async fn insert_match(&self, document: &mut MatchDocument) -> anyhow::Result<()> {
        let id = self.next_id();
        document.id = Some(id);
        self.matches.lock().unwrap().push(document.clone());
        Ok(())
    }

    async fn save_match(&self, document: &MatchDocument) -> anyhow::Result<()> {
        let mut matches = self.matches.lock().unwrap();
        if let Some(existing) = matches.iter_mut().find(|m| m.id == document.id) {
            *existing = document.clone();
        }
        Ok(())
    }

    async fn insert_chat_room(&self, room: &mut ChatRoom) -> anyhow::Result<()> {
        let id = self.next_id();
        room.id = Some(id);
        self.chat_rooms.lock().unwrap().push(room.clone());
        Ok(())
    }

    async fn pause_commute(&self, user_id: &str) -> anyhow::Result<()> {
        let mut commutes = self.commutes.lock().unwrap();
        if let Some(commute) = commutes.iter_mut().find(|c| c.user_id == user_id) {
            commute.status = crate::models::CommuteStatus::Paused;
            commute.enable_queue_flow = false;
        }
        Ok(())
    }
}
