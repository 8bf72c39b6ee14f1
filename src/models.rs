//! Data models for the marketplace chat core

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    /// Reply carrying a product card
    Reply,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Reply => "reply",
        }
    }

    /// Unknown kinds fall back to text so an old client keeps rendering
    pub fn parse(s: &str) -> Self {
        match s {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "reply" => Self::Reply,
            _ => Self::Text,
        }
    }
}

/// One chat message. Timestamps are the server's own strings; the client
/// never reorders, so they stay opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub attachment_url: Option<String>,
    pub metadata: HashMap<String, String>,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Raw media bytes queued for upload; never persisted as-is
#[derive(Debug, Clone)]
pub struct OutgoingMedia {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

// ============================================================================
// Conversations
// ============================================================================

/// Client-side summary of one two-party chat thread, folded from the
/// message rows of that room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub room_id: String,
    /// The participant who is not the local user; empty when only the local
    /// user has spoken in the fetched window
    pub other_party_id: String,
    pub last_message: String,
    pub last_message_at: String,
    pub unread_count: u32,
    pub created_at: String,
}

// ============================================================================
// Favorites / wishlist
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteProduct {
    pub product_id: String,
    pub title: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub added_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistCollection {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistItem {
    pub collection_id: String,
    pub product_id: String,
    pub title: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub added_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [MessageKind::Text, MessageKind::Image, MessageKind::Audio, MessageKind::Reply] {
            assert_eq!(MessageKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_text() {
        assert_eq!(MessageKind::parse("video"), MessageKind::Text);
        assert_eq!(MessageKind::parse(""), MessageKind::Text);
    }
}
