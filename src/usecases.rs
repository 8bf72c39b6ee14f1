//! Application-boundary operations, one per repository method.
//!
//! Each unit wraps exactly one [`ChatRepository`] call with no added logic;
//! they exist so the presentation layer depends on named operations instead
//! of the whole repository.

use crate::error::Result;
use crate::models::{Conversation, Message, OutgoingMedia};
use crate::repository::{ChatRepository, MessageSubscription};
use std::sync::Arc;

pub struct SendTextMessage {
    repo: Arc<ChatRepository>,
}

impl SendTextMessage {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(&self, room_id: &str, sender_id: &str, content: &str) -> Result<Message> {
        self.repo.send_text(room_id, sender_id, content).await
    }
}

pub struct SendImageMessage {
    repo: Arc<ChatRepository>,
}

impl SendImageMessage {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(
        &self,
        room_id: &str,
        sender_id: &str,
        media: &OutgoingMedia,
        caption: &str,
    ) -> Result<Message> {
        self.repo.send_image(room_id, sender_id, media, caption).await
    }
}

pub struct SendAudioMessage {
    repo: Arc<ChatRepository>,
}

impl SendAudioMessage {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(
        &self,
        room_id: &str,
        sender_id: &str,
        media: &OutgoingMedia,
        duration_ms: u64,
    ) -> Result<Message> {
        self.repo.send_audio(room_id, sender_id, media, duration_ms).await
    }
}

pub struct FetchChatByRoom {
    repo: Arc<ChatRepository>,
}

impl FetchChatByRoom {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(&self, room_id: &str, limit: Option<u32>) -> Result<Vec<Message>> {
        self.repo.fetch_chat_by_room_id(room_id, limit).await
    }
}

pub struct FetchAllChats {
    repo: Arc<ChatRepository>,
}

impl FetchAllChats {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(&self, limit: Option<u32>) -> Result<Vec<Message>> {
        self.repo.fetch_all_chats(limit).await
    }
}

pub struct FindChat {
    repo: Arc<ChatRepository>,
}

impl FindChat {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(
        &self,
        filters: &[(String, String)],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        self.repo.find_chat(filters, limit, offset).await
    }
}

pub struct FetchConversations {
    repo: Arc<ChatRepository>,
}

impl FetchConversations {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(&self, me: &str) -> Result<Vec<Conversation>> {
        self.repo.conversations(me).await
    }
}

pub struct ReadByRoom {
    repo: Arc<ChatRepository>,
}

impl ReadByRoom {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(&self, room_id: &str, reader_id: &str) -> Result<()> {
        self.repo.read_by_room_id(room_id, reader_id).await
    }
}

pub struct MarkAllAsRead {
    repo: Arc<ChatRepository>,
}

impl MarkAllAsRead {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(&self, receiver_id: &str) -> Result<()> {
        self.repo.mark_all_as_read(receiver_id).await
    }
}

pub struct DeleteChat {
    repo: Arc<ChatRepository>,
}

impl DeleteChat {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn call(&self, message_id: &str) -> Result<()> {
        self.repo.delete_chat(message_id).await
    }
}

pub struct CreateOrGetConversation {
    repo: Arc<ChatRepository>,
}

impl CreateOrGetConversation {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub fn call(&self, buyer_id: &str, seller_id: &str) -> String {
        self.repo.create_or_get_conversation(buyer_id, seller_id)
    }
}

pub struct ObserveIncomingMessages {
    repo: Arc<ChatRepository>,
}

impl ObserveIncomingMessages {
    pub fn new(repo: Arc<ChatRepository>) -> Self {
        Self { repo }
    }

    pub fn call(&self) -> MessageSubscription {
        self.repo.incoming_messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientConfig;

    #[test]
    fn test_create_or_get_conversation_delegates() {
        let config = ClientConfig::new("https://proj.example.co", "anon", "media");
        let repo = Arc::new(ChatRepository::new(config).unwrap());

        let usecase = CreateOrGetConversation::new(repo.clone());
        assert_eq!(usecase.call("A", "B"), usecase.call("B", "A"));
        assert_eq!(usecase.call("A", "B"), repo.create_or_get_conversation("A", "B"));
    }
}
