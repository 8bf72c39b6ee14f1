//! Chat repository - the single point combining realtime delivery with the
//! REST gateway, and the only place wire rows become domain messages.

use crate::api::ChatApi;
use crate::dto::{MessageRow, NewMessage};
use crate::error::Result;
use crate::models::{Conversation, Message, MessageKind, OutgoingMedia};
use crate::realtime::RealtimeClient;
use crate::ClientConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// New subscribers replay up to this many buffered messages.
pub const REPLAY_CAPACITY: usize = 50;

/// Signed media URLs stay valid for seven days.
pub const SIGNED_URL_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

// ============================================================================
// Message feed
// ============================================================================

/// Shared broadcast feed of incoming messages: a ring buffer of the last
/// [`REPLAY_CAPACITY`] messages plus a live broadcast channel. One producer
/// (the pump task), any number of subscribers.
pub struct MessageFeed {
    buffer: Mutex<VecDeque<Message>>,
    live: broadcast::Sender<Message>,
}

impl MessageFeed {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(REPLAY_CAPACITY);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(REPLAY_CAPACITY)),
            live,
        }
    }

    /// Publish one message to the buffer and all live subscribers.
    pub fn publish(&self, message: Message) {
        // Hold the lock across the broadcast so subscribe() can never see a
        // message both in its replay snapshot and on its live receiver.
        let mut buffer = self.buffer.lock();
        if buffer.len() == REPLAY_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(message.clone());
        let _ = self.live.send(message);
    }

    /// Subscribe: buffered messages first (oldest to newest), then live.
    pub fn subscribe(&self) -> MessageSubscription {
        let buffer = self.buffer.lock();
        MessageSubscription {
            replay: buffer.iter().cloned().collect(),
            live: self.live.subscribe(),
        }
    }
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MessageSubscription {
    replay: VecDeque<Message>,
    live: broadcast::Receiver<Message>,
}

impl MessageSubscription {
    /// Next message, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        if let Some(message) = self.replay.pop_front() {
            return Some(message);
        }
        loop {
            match self.live.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("subscriber lagged, skipped {} messages", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain whatever is immediately available without waiting.
    pub fn try_drain(&mut self) -> Vec<Message> {
        let mut out: Vec<Message> = self.replay.drain(..).collect();
        while let Ok(message) = self.live.try_recv() {
            out.push(message);
        }
        out
    }
}

// ============================================================================
// Repository
// ============================================================================

pub struct ChatRepository {
    config: ClientConfig,
    api: Arc<ChatApi>,
    feed: Arc<MessageFeed>,
    realtime: Mutex<Option<Arc<RealtimeClient>>>,
}

impl ChatRepository {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api = Arc::new(ChatApi::new(&config)?);
        Ok(Self {
            config,
            api,
            feed: Arc::new(MessageFeed::new()),
            realtime: Mutex::new(None),
        })
    }

    pub fn set_token(&self, token: &str) {
        self.api.set_token(token);
    }

    pub fn api(&self) -> &ChatApi {
        &self.api
    }

    // ========================================================================
    // Realtime
    // ========================================================================

    /// Connect the realtime feed for a room and start pumping decoded rows
    /// into the shared message feed.
    ///
    /// Replaces the previous client handle if one exists; the old socket
    /// lives until the server closes it. Call [`disconnect`](Self::disconnect)
    /// first to close it cleanly.
    pub async fn connect(&self, room_id: &str) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<MessageRow>();
        let client = RealtimeClient::connect(&self.config, room_id, tx).await?;
        *self.realtime.lock() = Some(Arc::new(client));

        let feed = self.feed.clone();
        tokio::spawn(async move {
            while let Some(row) = rx.recv().await {
                feed.publish(row.into_message());
            }
        });

        Ok(())
    }

    pub fn disconnect(&self) {
        if let Some(client) = self.realtime.lock().take() {
            client.disconnect();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.realtime
            .lock()
            .as_ref()
            .map(|c| c.is_connected())
            .unwrap_or(false)
    }

    /// Subscribe to the shared feed: up to the last 50 buffered messages,
    /// then everything that arrives while subscribed.
    pub fn incoming_messages(&self) -> MessageSubscription {
        self.feed.subscribe()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    pub async fn send_text(&self, room_id: &str, sender_id: &str, content: &str) -> Result<Message> {
        let row = self
            .api
            .insert_message(&NewMessage::text(room_id, sender_id, content))
            .await?;
        Ok(row.into_message())
    }

    pub async fn send_image(
        &self,
        room_id: &str,
        sender_id: &str,
        media: &OutgoingMedia,
        caption: &str,
    ) -> Result<Message> {
        let url = self.upload_media(room_id, media).await?;
        let row = self
            .api
            .insert_message(&NewMessage::image(room_id, sender_id, &url, caption))
            .await?;
        Ok(row.into_message())
    }

    pub async fn send_audio(
        &self,
        room_id: &str,
        sender_id: &str,
        media: &OutgoingMedia,
        duration_ms: u64,
    ) -> Result<Message> {
        let url = self.upload_media(room_id, media).await?;
        let row = self
            .api
            .insert_message(&NewMessage::audio(room_id, sender_id, &url, duration_ms))
            .await?;
        Ok(row.into_message())
    }

    /// Upload then sign. Sequential with the insert that follows, not
    /// transactional: a failed insert leaves the uploaded object behind.
    async fn upload_media(&self, room_id: &str, media: &OutgoingMedia) -> Result<String> {
        let path = media_object_path(
            room_id,
            chrono::Utc::now().timestamp_millis(),
            &media.file_name,
        );
        self.api
            .upload_file(&path, media.bytes.clone(), &media.mime_type)
            .await?;
        self.api.create_signed_url(&path, SIGNED_URL_EXPIRY_SECS).await
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    pub async fn fetch_chat_by_room_id(
        &self,
        room_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Message>> {
        let rows = self.api.fetch_by_room(room_id, limit).await?;
        Ok(map_rows(rows))
    }

    pub async fn fetch_all_chats(&self, limit: Option<u32>) -> Result<Vec<Message>> {
        let rows = self.api.fetch_all(limit).await?;
        Ok(map_rows(rows))
    }

    pub async fn find_chat(
        &self,
        filters: &[(String, String)],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let rows = self.api.search(filters, limit, offset).await?;
        Ok(map_rows(rows))
    }

    /// Conversation summaries for the local user, folded from the latest
    /// rows across all rooms, newest conversation first.
    pub async fn conversations(&self, me: &str) -> Result<Vec<Conversation>> {
        let rows = self.api.fetch_all(None).await?;
        Ok(build_conversations(rows, me))
    }

    // ========================================================================
    // Read state and deletion
    // ========================================================================

    pub async fn read_by_room_id(&self, room_id: &str, reader_id: &str) -> Result<()> {
        self.api.mark_read_by_room(room_id, reader_id).await
    }

    pub async fn mark_all_as_read(&self, receiver_id: &str) -> Result<()> {
        self.api.mark_read_for_receiver(receiver_id).await
    }

    pub async fn delete_chat(&self, message_id: &str) -> Result<()> {
        self.api.delete_by_id(message_id).await
    }

    // ========================================================================
    // Conversations
    // ========================================================================

    /// Room id for a buyer/seller pair. Deterministic over the ordered pair,
    /// so repeated calls (in either argument order) return the same id.
    pub fn create_or_get_conversation(&self, buyer_id: &str, seller_id: &str) -> String {
        conversation_room_id(buyer_id, seller_id)
    }
}

impl std::fmt::Debug for ChatRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRepository")
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn map_rows(rows: Vec<MessageRow>) -> Vec<Message> {
    rows.into_iter().map(MessageRow::into_message).collect()
}

pub fn conversation_room_id(buyer_id: &str, seller_id: &str) -> String {
    let (a, b) = if buyer_id <= seller_id {
        (buyer_id, seller_id)
    } else {
        (seller_id, buyer_id)
    };
    format!("{}__{}", a, b)
}

/// Object path for outgoing media: `room-<roomId>/<epoch-millis>_<filename>`.
pub fn media_object_path(room_id: &str, epoch_millis: i64, file_name: &str) -> String {
    format!("room-{}/{}_{}", room_id, epoch_millis, file_name)
}

/// Fold rows (newest first, as `fetch_all` returns them) into per-room
/// summaries. Unread counts only cover rows the local user did not send.
pub fn build_conversations(rows: Vec<MessageRow>, me: &str) -> Vec<Conversation> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Conversation> = Vec::new();

    for row in rows {
        let message = row.into_message();
        let from_other = message.sender_id != me;
        let unread = from_other && !message.is_read;

        match index.get(&message.room_id) {
            Some(&i) => {
                let conv = &mut out[i];
                if unread {
                    conv.unread_count += 1;
                }
                if conv.other_party_id.is_empty() && from_other {
                    conv.other_party_id = message.sender_id.clone();
                }
                // Rows arrive newest first, so the last one seen is the
                // oldest in the window
                conv.created_at = message.created_at;
            }
            None => {
                index.insert(message.room_id.clone(), out.len());
                out.push(Conversation {
                    room_id: message.room_id.clone(),
                    other_party_id: if from_other {
                        message.sender_id.clone()
                    } else {
                        String::new()
                    },
                    last_message: preview(&message),
                    last_message_at: message.created_at.clone(),
                    unread_count: u32::from(unread),
                    created_at: message.created_at,
                });
            }
        }
    }

    out
}

fn preview(message: &Message) -> String {
    if !message.content.is_empty() {
        return message.content.clone();
    }
    match message.kind {
        MessageKind::Image => "[image]".to_string(),
        MessageKind::Audio => "[audio]".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, room: &str, sender: &str, content: &str, read: bool, at: &str) -> MessageRow {
        serde_json::from_value(json!({
            "id": id,
            "room_id": room,
            "sender_id": sender,
            "content": content,
            "message_type": "text",
            "is_read": read,
            "created_at": at,
            "updated_at": at
        }))
        .unwrap()
    }

    fn message(n: usize) -> Message {
        row(
            &format!("m{}", n),
            "room-1",
            "peer",
            &format!("msg {}", n),
            false,
            "2024-01-01T00:00:00+00:00",
        )
        .into_message()
    }

    #[test]
    fn test_conversation_id_idempotent_and_symmetric() {
        let repo_id = conversation_room_id("A", "B");
        assert_eq!(conversation_room_id("A", "B"), repo_id);
        assert_eq!(conversation_room_id("B", "A"), repo_id);
        assert_ne!(conversation_room_id("A", "C"), repo_id);
    }

    #[test]
    fn test_media_object_path() {
        assert_eq!(
            media_object_path("42", 1700000000123, "photo.jpg"),
            "room-42/1700000000123_photo.jpg"
        );
    }

    #[tokio::test]
    async fn test_feed_replays_last_fifty() {
        let feed = MessageFeed::new();
        for n in 0..60 {
            feed.publish(message(n));
        }

        let mut sub = feed.subscribe();
        let drained = sub.try_drain();

        assert_eq!(drained.len(), REPLAY_CAPACITY);
        assert_eq!(drained[0].id, "m10");
        assert_eq!(drained[REPLAY_CAPACITY - 1].id, "m59");
    }

    #[tokio::test]
    async fn test_feed_replay_then_live() {
        let feed = MessageFeed::new();
        feed.publish(message(1));
        feed.publish(message(2));

        let mut sub = feed.subscribe();
        assert_eq!(sub.recv().await.unwrap().id, "m1");
        assert_eq!(sub.recv().await.unwrap().id, "m2");

        feed.publish(message(3));
        assert_eq!(sub.recv().await.unwrap().id, "m3");
    }

    #[tokio::test]
    async fn test_feed_multiple_subscribers() {
        let feed = MessageFeed::new();
        feed.publish(message(1));

        let mut a = feed.subscribe();
        let mut b = feed.subscribe();
        feed.publish(message(2));

        assert_eq!(a.recv().await.unwrap().id, "m1");
        assert_eq!(a.recv().await.unwrap().id, "m2");
        assert_eq!(b.recv().await.unwrap().id, "m1");
        assert_eq!(b.recv().await.unwrap().id, "m2");
    }

    #[test]
    fn test_build_conversations() {
        // fetch_all order: newest first
        let rows = vec![
            row("m4", "r2", "seller-2", "deal?", false, "2024-03-04T00:00:00+00:00"),
            row("m3", "r1", "seller-1", "yes", false, "2024-03-03T00:00:00+00:00"),
            row("m2", "r1", "seller-1", "hello", false, "2024-03-02T00:00:00+00:00"),
            row("m1", "r1", "me", "hi", true, "2024-03-01T00:00:00+00:00"),
        ];

        let convs = build_conversations(rows, "me");
        assert_eq!(convs.len(), 2);

        assert_eq!(convs[0].room_id, "r2");
        assert_eq!(convs[0].other_party_id, "seller-2");
        assert_eq!(convs[0].unread_count, 1);
        assert_eq!(convs[0].last_message, "deal?");

        assert_eq!(convs[1].room_id, "r1");
        assert_eq!(convs[1].other_party_id, "seller-1");
        // m1 is mine, never counted as unread
        assert_eq!(convs[1].unread_count, 2);
        assert_eq!(convs[1].last_message, "yes");
        assert_eq!(convs[1].last_message_at, "2024-03-03T00:00:00+00:00");
        assert_eq!(convs[1].created_at, "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_preview_for_media_without_caption() {
        let mut m = message(1);
        m.content = String::new();
        m.kind = MessageKind::Image;
        assert_eq!(preview(&m), "[image]");
        m.kind = MessageKind::Audio;
        assert_eq!(preview(&m), "[audio]");
    }
}
