//! Minimal user profile CRUD: just enough for the engine's snapshot loader
//! to have something real to read. No photo upload, no search — those stay
//! an external collaborator's concern.

use bson::doc;
use bson::oid::ObjectId;
use mongodb::Collection;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::User;

#[derive(Debug, Serialize, Deserialize)]
struct UserDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(flatten)]
    body: User,
}

// `id` is the auth gateway's external subject, set explicitly at write
// time (`create_or_replace`) — not derived from the wrapper's `_id`.
fn hydrate(doc: UserDoc) -> User {
    doc.body
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UserCreatePayload {
    #[validate(length(min = 1))]
    pub gender: String,
    #[serde(default)]
    pub interests: Vec<String>,
}

pub struct UserRepository {
    collection: Collection<UserDoc>,
}

impl UserRepository {
    pub fn new(client: &flock_shared::clients::MongoClient) -> Self {
        Self { collection: client.collection("users") }
    }

    pub async fn find_by_id(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let result = self.collection.find_one(doc! { "id": user_id }, None).await?;
        Ok(result.map(hydrate))
    }

    pub async fn create_or_replace(&self, user_id: &str, payload: UserCreatePayload) -> anyhow::Result<User> {
        let mut user = User { id: user_id.to_string(), gender: payload.gender, interests: payload.interests };
        let wire = UserDoc { id: None, body: user.clone() };
        let filter = doc! { "id": user_id };
        self.collection
            .find_one_and_replace(filter, wire, Some(mongodb::options::FindOneAndReplaceOptions::builder().upsert(true).build()))
            .await?;
        // `find_one_and_replace` with upsert returns the pre-replace document (or none on
        // insert); re-read to get the store-assigned id rather than trust the stale return.
        if let Some(stored) = self.find_by_id(user_id).await? {
            user = stored;
        }
        Ok(user)
    }

    pub async fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        let result = self.collection.delete_one(doc! { "id": user_id }, None).await?;
        Ok(result.deleted_count > 0)
    }
}
