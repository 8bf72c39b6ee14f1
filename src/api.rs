//! REST gateway for the chat backend - messages resource and object storage

use crate::dto::{MessageRow, NewMessage};
use crate::error::{Error, Result};
use crate::ClientConfig;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde_json::json;

pub const DEFAULT_ROOM_LIMIT: u32 = 100;
pub const DEFAULT_ALL_LIMIT: u32 = 1000;

pub struct ChatApi {
    http: Client,
    rest_url: String,
    storage_url: String,
    api_key: String,
    bucket: String,
    token: Mutex<Option<String>>,
}

impl ChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            rest_url: config.rest_url(),
            storage_url: config.storage_url(),
            api_key: config.api_key.clone(),
            bucket: config.bucket.clone(),
            token: Mutex::new(None),
        })
    }

    /// Store the bearer token attached to subsequent calls. Token refresh
    /// is the caller's concern.
    pub fn set_token(&self, token: &str) {
        *self.token.lock() = Some(token.to_string());
    }

    pub fn clear_token(&self) {
        *self.token.lock() = None;
    }

    fn auth_header(&self) -> Option<String> {
        self.token.lock().as_ref().map(|t| format!("Bearer {}", t))
    }

    fn with_auth(&self, mut req: RequestBuilder) -> RequestBuilder {
        req = req.header("apikey", &self.api_key);
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }
        req
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Insert one message row; returns the server-created row with its
    /// generated id and timestamps.
    pub async fn insert_message(&self, new: &NewMessage) -> Result<MessageRow> {
        let resp = self
            .with_auth(self.http.post(format!("{}/messages", self.rest_url)))
            .header("Prefer", "return=representation")
            .json(new)
            .send()
            .await?;

        let resp = Self::check_status(resp).await?;
        let mut rows: Vec<MessageRow> = resp.json().await?;

        rows.pop().ok_or_else(|| Error::Remote {
            status: 200,
            message: "insert returned no representation".to_string(),
        })
    }

    /// All messages for a room, oldest first.
    pub async fn fetch_by_room(&self, room_id: &str, limit: Option<u32>) -> Result<Vec<MessageRow>> {
        let limit = limit.unwrap_or(DEFAULT_ROOM_LIMIT);
        let resp = self
            .with_auth(self.http.get(format!("{}/messages", self.rest_url)))
            .query(&[
                ("select", "*".to_string()),
                ("room_id", format!("eq.{}", room_id)),
                ("order", "created_at.asc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Messages across all rooms, newest first. Used to fold conversation
    /// summaries client-side; the backend has no summary endpoint.
    pub async fn fetch_all(&self, limit: Option<u32>) -> Result<Vec<MessageRow>> {
        let limit = limit.unwrap_or(DEFAULT_ALL_LIMIT);
        let resp = self
            .with_auth(self.http.get(format!("{}/messages", self.rest_url)))
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Mark every unread message in a room that the reader did not send.
    pub async fn mark_read_by_room(&self, room_id: &str, reader_id: &str) -> Result<()> {
        let resp = self
            .with_auth(self.http.patch(format!("{}/messages", self.rest_url)))
            .query(&[
                ("room_id", format!("eq.{}", room_id)),
                ("sender_id", format!("neq.{}", reader_id)),
                ("is_read", "eq.false".to_string()),
            ])
            .json(&read_patch())
            .send()
            .await?;

        Self::check_status(resp).await?;
        Ok(())
    }

    /// Mark every unread message addressed to the receiver, across rooms.
    /// Row-level security scopes the match to the receiver's own rooms.
    pub async fn mark_read_for_receiver(&self, receiver_id: &str) -> Result<()> {
        let resp = self
            .with_auth(self.http.patch(format!("{}/messages", self.rest_url)))
            .query(&[
                ("sender_id", format!("neq.{}", receiver_id)),
                ("is_read", "eq.false".to_string()),
            ])
            .json(&read_patch())
            .send()
            .await?;

        Self::check_status(resp).await?;
        Ok(())
    }

    /// Delete one row by id. A missing id matches zero rows and still
    /// succeeds (idempotent no-op).
    pub async fn delete_by_id(&self, message_id: &str) -> Result<()> {
        let resp = self
            .with_auth(self.http.delete(format!("{}/messages", self.rest_url)))
            .query(&[("id", format!("eq.{}", message_id))])
            .send()
            .await?;

        Self::check_status(resp).await?;
        Ok(())
    }

    /// Search with caller-supplied column predicates, passed through
    /// verbatim; ordering and relevance stay with the backend.
    pub async fn search(
        &self,
        filters: &[(String, String)],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRow>> {
        let mut query: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        query.extend(filters.iter().cloned());
        query.push(("limit".to_string(), limit.to_string()));
        query.push(("offset".to_string(), offset.to_string()));

        let resp = self
            .with_auth(self.http.get(format!("{}/messages", self.rest_url)))
            .query(&query)
            .send()
            .await?;

        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    // ========================================================================
    // Object storage
    // ========================================================================

    pub async fn upload_file(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> Result<()> {
        let resp = self
            .with_auth(
                self.http
                    .post(format!("{}/object/{}/{}", self.storage_url, self.bucket, path)),
            )
            .header("Content-Type", mime_type)
            .body(bytes)
            .send()
            .await?;

        Self::check_status(resp).await?;
        Ok(())
    }

    /// Request a time-limited access URL for an uploaded object.
    pub async fn create_signed_url(&self, path: &str, expires_secs: u64) -> Result<String> {
        let resp = self
            .with_auth(
                self.http
                    .post(format!("{}/object/sign/{}/{}", self.storage_url, self.bucket, path)),
            )
            .json(&json!({ "expiresIn": expires_secs }))
            .send()
            .await?;

        let resp = Self::check_status(resp).await?;
        let data: serde_json::Value = resp.json().await?;

        let signed = data["signedURL"].as_str().ok_or_else(|| Error::Remote {
            status: 200,
            message: "sign response missing signedURL".to_string(),
        })?;

        Ok(format!("{}{}", self.storage_url, signed))
    }
}

fn read_patch() -> serde_json::Value {
    json!({
        "is_read": true,
        "read_at": chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_patch_shape() {
        let patch = read_patch();
        assert_eq!(patch["is_read"], true);
        assert!(patch["read_at"].as_str().is_some());
    }

    #[test]
    fn test_api_construction() {
        let config = ClientConfig::new("https://proj.example.co", "anon", "chat-media");
        let api = ChatApi::new(&config).unwrap();
        assert!(api.auth_header().is_none());

        api.set_token("jwt-token");
        assert_eq!(api.auth_header().as_deref(), Some("Bearer jwt-token"));

        api.clear_token();
        assert!(api.auth_header().is_none());
    }
}
