use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::server::api::AppState;
use crate::server::hub::Membership;
use crate::server::ingest::DeviceRecord;

/// First client frame: `{userId}` for a device's own view, or
/// `{role: "admin", token}` for the privileged channel.
#[derive(Debug, Deserialize)]
struct Hello {
    #[serde(default)]
    role: Option<String>,
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum ServerFrame {
    SelfLocation {
        lat: f64,
        lon: f64,
    },
    LocationUpdate {
        #[serde(rename = "userId")]
        user_id: String,
        lat: f64,
        lon: f64,
        ts: i64,
    },
    AdminSnapshot {
        devices: Vec<DeviceRecord>,
    },
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let membership = match handshake(&mut receiver, &state).await {
        Some(m) => m,
        None => {
            // Bad admin token or the socket closed before saying hello.
            let _ = sender.close().await;
            return;
        }
    };

    // Subscribe before reading the snapshot so updates that land in
    // between are queued on the receiver instead of lost.
    let mut events = state.hub.subscribe();

    if membership == Membership::Admin {
        let snapshot = ServerFrame::AdminSnapshot {
            devices: state.store.snapshot(),
        };
        if send_frame(&mut sender, &snapshot).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = events.recv() => match result {
                Ok(event) => {
                    if !membership.wants(&event) {
                        continue;
                    }
                    let frame = match &membership {
                        Membership::Admin => ServerFrame::LocationUpdate {
                            user_id: event.user_id,
                            lat: event.lat,
                            lon: event.lon,
                            ts: event.ts,
                        },
                        Membership::Device(_) => ServerFrame::SelfLocation {
                            lat: event.lat,
                            lon: event.lon,
                        },
                    };
                    if send_frame(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("observer lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                // Membership is fixed at handshake; later frames are noise.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Reads frames until a `hello` arrives and turns it into a membership.
/// Admin hellos with a wrong or missing token yield `None`.
async fn handshake(receiver: &mut SplitStream<WebSocket>, state: &AppState) -> Option<Membership> {
    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return None,
            _ => continue,
        };
        let hello: Hello = match serde_json::from_str(text.as_str()) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("ignoring malformed hello: {}", e);
                continue;
            }
        };

        if hello.role.as_deref() == Some("admin") {
            let expected = state.config.web.admin_token.as_deref();
            return match (expected, hello.token.as_deref()) {
                (Some(want), Some(got)) if want == got => Some(Membership::Admin),
                _ => {
                    log::warn!("admin handshake rejected");
                    None
                }
            };
        }

        let id = hello.user_id.unwrap_or_else(|| "anon".to_string());
        return Some(Membership::Device(id));
    }
    None
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
