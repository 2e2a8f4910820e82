use std::sync::Arc;

use async_trait::async_trait;
use lapas_auth::Auth;
use lapas_postgrest::{PostgrestClient, PostgrestError};
use reqwest::Client;
use serde_json::Value;

use crate::profile::{NewProfile, Profile, ProfilePatch};
use crate::store::{ProfileStore, StoreError};

/// [`ProfileStore`] over a PostgREST table
///
/// Requests carry the signed-in user's access token so row level security
/// applies; without a session the anon key is used.
#[derive(Clone)]
pub struct PostgrestProfileStore {
    url: String,
    key: String,
    table: String,
    http_client: Client,
    auth: Arc<Auth>,
}

impl PostgrestProfileStore {
    pub fn new(url: &str, key: &str, table: &str, http_client: Client, auth: Arc<Auth>) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            table: table.to_string(),
            http_client,
            auth,
        }
    }

    fn query(&self) -> Result<PostgrestClient, StoreError> {
        let token = self
            .auth
            .session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.key.clone());

        let client = PostgrestClient::new(&self.url, &self.key, &self.table, self.http_client.clone())?;
        Ok(client.with_auth(&token)?)
    }
}

impl From<PostgrestError> for StoreError {
    fn from(err: PostgrestError) -> Self {
        if err.is_not_found() {
            return StoreError::NotFound;
        }
        match err {
            PostgrestError::NetworkError(e) => StoreError::Unreachable(e.to_string()),
            PostgrestError::DeserializationError(msg) => StoreError::Decode(msg),
            PostgrestError::SerializationError(e) => StoreError::Decode(e.to_string()),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

/// The single row of a `return=representation` response.
fn first_row(value: Value) -> Result<Profile, StoreError> {
    let row = match value {
        Value::Array(rows) => rows.into_iter().next().ok_or(StoreError::NotFound)?,
        Value::Null => return Err(StoreError::Decode("empty representation".to_string())),
        row => row,
    };
    serde_json::from_value(row).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn find_by_identity(&self, identity_id: &str) -> Result<Profile, StoreError> {
        let profile = self
            .query()?
            .select("*")
            .eq("user_id", identity_id)
            .single::<Profile>()
            .await?;
        Ok(profile)
    }

    async fn find_demo(&self, email: &str) -> Result<Profile, StoreError> {
        let profile = self
            .query()?
            .select("*")
            .eq("email", email)
            .eq("is_demo", "true")
            .single::<Profile>()
            .await?;
        Ok(profile)
    }

    async fn insert(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let value = self.query()?.insert(profile).await?;
        first_row(value)
    }

    async fn update(&self, identity_id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        let value = self
            .query()?
            .eq("user_id", identity_id)
            .update(patch)
            .await?;
        first_row(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_row_of_representation() {
        let rows = json!([{
            "id": "p1",
            "user_id": "u1",
            "email": "u1@lapas.id",
            "full_name": "Petugas",
            "role": "admin_lapas",
            "created_at": "2024-03-01T08:00:00Z",
            "updated_at": "2024-03-01T08:00:00Z"
        }]);

        let profile = first_row(rows).unwrap();
        assert_eq!(profile.id, "p1");
        assert!(!profile.is_demo);

        assert_eq!(first_row(json!([])), Err(StoreError::NotFound));
        assert!(matches!(first_row(Value::Null), Err(StoreError::Decode(_))));
    }
}
