use crate::models::{MediaKind, MediaRecord, WirePhoto};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Reconnect budget: bounded attempts with a fixed delay between them.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Room a host dashboard joins for its event.
pub fn host_room(event_code: &str) -> String {
    format!("host-{event_code}")
}

/// Room a guest dashboard joins for its event + guest pair.
pub fn guest_room(event_code: &str, guest_id: &str) -> String {
    format!("{event_code}-{guest_id}")
}

/// Push events arriving from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "photoUploaded", rename_all = "camelCase")]
    PhotoUploaded {
        event_code: String,
        images: Vec<WirePhoto>,
    },
    #[serde(rename = "newMessage", rename_all = "camelCase")]
    NewMessage {
        guest_id: String,
        guest_name: String,
        message: String,
    },
    #[serde(rename = "messageDeleted", rename_all = "camelCase")]
    MessageDeleted { guest_id: String, text: String },
}

/// What subscribers observe: server pushes plus connection lifecycle notices
/// generated locally.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Server(ServerEvent),
    /// Connection re-established after a drop. Events sent while disconnected
    /// were not replayed, so views should re-fetch once.
    Resynced,
    /// Reconnect attempts exhausted; the channel is gone for good.
    ConnectionLost,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
enum ClientMessage {
    #[serde(rename = "join")]
    Join(String),
    #[serde(rename = "leave")]
    Leave(String),
    #[serde(rename = "photoUploaded", rename_all = "camelCase")]
    PhotoUploaded {
        event_code: String,
        images: Vec<WirePhoto>,
    },
}

/// Handle to the shared realtime connection.
///
/// One connection exists per process; views clone this handle to join/leave
/// rooms and subscribe to events. Room membership is tracked here so it can
/// be replayed after a reconnect (the server forgets membership on drop).
#[derive(Clone)]
pub struct RealtimeHandle {
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
    events_tx: broadcast::Sender<RealtimeEvent>,
    rooms: Arc<Mutex<HashSet<String>>>,
}

impl RealtimeHandle {
    pub fn join(&self, room: &str) {
        self.rooms.lock().unwrap().insert(room.to_string());
        if self
            .outbound_tx
            .send(ClientMessage::Join(room.to_string()))
            .is_err()
        {
            warn!("Realtime: join {room} dropped, connection task gone");
        }
    }

    pub fn leave(&self, room: &str) {
        self.rooms.lock().unwrap().remove(room);
        let _ = self.outbound_tx.send(ClientMessage::Leave(room.to_string()));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events_tx.subscribe()
    }

    /// Announce a locally completed batch so other open views refresh
    /// without polling.
    pub fn announce_batch(&self, event_code: &str, media: &[MediaRecord]) {
        let images = media
            .iter()
            .map(|m| WirePhoto {
                photo_id: Some(m.id.clone()),
                image_url: (m.kind == MediaKind::Image).then(|| m.url.clone()),
                video_url: (m.kind == MediaKind::Video).then(|| m.url.clone()),
                ..Default::default()
            })
            .collect();

        let _ = self.outbound_tx.send(ClientMessage::PhotoUploaded {
            event_code: event_code.to_string(),
            images,
        });
    }
}

/// Owns the websocket and its reconnect loop.
pub struct RealtimeClient {
    url: String,
    outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    events_tx: broadcast::Sender<RealtimeEvent>,
    rooms: Arc<Mutex<HashSet<String>>>,
}

impl RealtimeClient {
    /// Start the connection task and return the shared handle.
    pub fn start(url: String) -> RealtimeHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(64);
        let rooms = Arc::new(Mutex::new(HashSet::new()));

        let client = RealtimeClient {
            url,
            outbound_rx,
            events_tx: events_tx.clone(),
            rooms: rooms.clone(),
        };

        tokio::spawn(client.run());

        RealtimeHandle {
            outbound_tx,
            events_tx,
            rooms,
        }
    }

    async fn run(mut self) {
        let mut consecutive_failures = 0u32;
        let mut was_connected = false;

        loop {
            match connect_async(&self.url).await {
                Ok((ws, _)) => {
                    info!("Realtime: connected to {}", self.url);
                    consecutive_failures = 0;

                    let (mut sink, mut stream) = ws.split();

                    // Membership is not preserved across connections
                    let rooms: Vec<String> =
                        self.rooms.lock().unwrap().iter().cloned().collect();
                    let mut send_failed = false;
                    for room in rooms {
                        debug!("Realtime: joining room {room}");
                        if let Err(e) = sink.send(to_text(&ClientMessage::Join(room))).await {
                            warn!("Realtime: rejoin failed: {e}");
                            send_failed = true;
                            break;
                        }
                    }

                    if send_failed {
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }

                    if was_connected {
                        // Events missed while disconnected are not replayed
                        let _ = self.events_tx.send(RealtimeEvent::Resynced);
                    }
                    was_connected = true;

                    loop {
                        tokio::select! {
                            outbound = self.outbound_rx.recv() => {
                                match outbound {
                                    Some(message) => {
                                        if let Err(e) = sink.send(to_text(&message)).await {
                                            warn!("Realtime: send failed: {e}");
                                            break;
                                        }
                                    }
                                    None => {
                                        // Every handle dropped; shut down cleanly
                                        let _ = sink.close().await;
                                        return;
                                    }
                                }
                            }
                            inbound = stream.next() => {
                                match inbound {
                                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                                    Some(Ok(Message::Close(_))) | None => {
                                        warn!("Realtime: connection closed by server");
                                        break;
                                    }
                                    Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                                    Some(Err(e)) => {
                                        warn!("Realtime: receive error: {e}");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Realtime: connect attempt {consecutive_failures}/{MAX_RECONNECT_ATTEMPTS} failed: {e}"
                    );
                    if consecutive_failures >= MAX_RECONNECT_ATTEMPTS {
                        error!("Realtime: reconnect attempts exhausted");
                        let _ = self.events_tx.send(RealtimeEvent::ConnectionLost);
                        return;
                    }
                }
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => {
                debug!("Realtime: received {event:?}");
                let _ = self.events_tx.send(RealtimeEvent::Server(event));
            }
            Err(e) => {
                // Unknown event names are expected; the server multiplexes
                // more than this client consumes
                debug!("Realtime: ignoring message ({e}): {text}");
            }
        }
    }
}

fn to_text(message: &ClientMessage) -> Message {
    // ClientMessage serialization cannot fail: plain strings and structs
    let json = serde_json::to_string(message).unwrap_or_default();
    Message::Text(json.into())
}
