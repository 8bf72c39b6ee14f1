//! Marketplace Chat Core Library
//!
//! Client-side core for a buyer/seller marketplace chat, built over a hosted
//! backend: PostgREST-style message API, realtime WebSocket change feed, and
//! object storage for media. Also carries the embedded SQLite store for
//! offline favorites/wishlist data.

pub mod api;
pub mod dto;
pub mod error;
pub mod models;
pub mod realtime;
pub mod repository;
pub mod storage;
pub mod usecases;

pub use api::*;
pub use dto::*;
pub use error::*;
pub use models::*;
pub use realtime::*;
pub use repository::*;
pub use storage::*;

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend project base URL, e.g. `https://abc.example.co`
    pub base_url: String,
    /// Anonymous API key, attached to every REST call and the socket URL
    pub api_key: String,
    /// Object-storage bucket for chat media
    pub bucket: String,
}

impl ClientConfig {
    pub fn new(base_url: &str, api_key: &str, bucket: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base_url)
    }

    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.base_url)
    }

    pub fn ws_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", ws_base, self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_builders() {
        let config = ClientConfig::new("https://proj.example.co/", "anon-key", "chat-media");

        assert_eq!(config.rest_url(), "https://proj.example.co/rest/v1");
        assert_eq!(config.storage_url(), "https://proj.example.co/storage/v1");
        assert_eq!(
            config.ws_url(),
            "wss://proj.example.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
    }

    #[test]
    fn test_ws_url_plain_http() {
        let config = ClientConfig::new("http://localhost:54321", "k", "media");
        assert!(config.ws_url().starts_with("ws://localhost:54321/realtime/v1/websocket"));
    }
}
