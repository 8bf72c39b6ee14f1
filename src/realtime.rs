//! Realtime transport client - WebSocket change feed for the messages topic

use crate::dto::{decode_insert_frame, MessageRow};
use crate::error::Result;
use crate::ClientConfig;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message as WsMessage,
};

pub struct RealtimeClient {
    sender: mpsc::UnboundedSender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

impl RealtimeClient {
    /// Open the socket, join the message-change topic for a room, and pump
    /// decoded insert events into `events` until the socket closes.
    ///
    /// One socket per client instance. There is no reconnect or heartbeat
    /// here; the caller can watch [`is_connected`](Self::is_connected) and
    /// open a fresh client when the feed goes quiet.
    pub async fn connect(
        config: &ClientConfig,
        room_id: &str,
        events: mpsc::UnboundedSender<MessageRow>,
    ) -> Result<Self> {
        let (ws_stream, _) = connect_async(config.ws_url()).await?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let connected = Arc::new(Mutex::new(true));

        // Join the change topic before anything else goes out
        let join = json!({
            "topic": format!("realtime:public:messages:room_id=eq.{}", room_id),
            "event": "phx_join",
            "payload": {},
            "ref": "1"
        });
        write.send(WsMessage::Text(join.to_string())).await?;

        // Reader task: decode or drop, never fail
        let connected_reader = connected.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        if let Some(row) = decode_insert_frame(&text) {
                            if events.send(row).is_err() {
                                break;
                            }
                        } else {
                            log::debug!("dropping realtime frame ({} bytes)", text.len());
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        log::warn!("realtime socket closed by server");
                        *connected_reader.lock() = false;
                        break;
                    }
                    Err(e) => {
                        log::warn!("realtime socket error: {}", e);
                        *connected_reader.lock() = false;
                        break;
                    }
                    _ => {}
                }
            }
            *connected_reader.lock() = false;
        });

        // Writer task: stops after a close frame goes out
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if write.send(frame).await.is_err() || closing {
                    break;
                }
            }
        });

        Ok(Self {
            sender: tx,
            connected,
        })
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    /// Close the socket with a normal-closure code. Safe to call more than
    /// once or after the socket already dropped.
    pub fn disconnect(&self) {
        *self.connected.lock() = false;
        let _ = self.sender.send(WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        })));
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("connected", &self.is_connected())
            .finish()
    }
}
