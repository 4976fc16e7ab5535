pub mod audio;
pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::session::AudioOutput;
use crate::state::AppState;

use self::audio::RemoteAudio;
use self::handlers::Connection;

/// Visitor address: the peer, unless a trusted proxy says otherwise
pub fn visitor_ip(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());

        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<IpAddr>().ok())
        };

        if let Some(ip) = forwarded.or_else(real_ip) {
            return ip;
        }
    }
    peer.ip()
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let ip = visitor_ip(&headers, peer, state.server.trust_forwarded_for);
    tracing::info!(%peer, visitor = %ip, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, ip, state))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Handle one page load
async fn handle_socket(socket: WebSocket, ip: IpAddr, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let remote_audio = state
        .session
        .audio_src
        .as_ref()
        .map(|_| Arc::new(RemoteAudio::new(outbox.clone(), state.session.audio_ack_timeout)));
    let output = remote_audio.clone().map(|a| a as Arc<dyn AudioOutput>);

    let session = Arc::new(state.new_session(Some(ip), output));
    let conn = Connection {
        session: session.clone(),
        outbox,
        audio: remote_audio,
    };

    tracing::info!(session = session.id(), visitor = %ip, "Session started");

    let mut snapshots = session.subscribe();
    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        session_id: session.id().to_string(),
        audio_src: state.session.audio_src.clone(),
        state: (*snapshots.borrow_and_update()).into(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    // Geolocation + page-opened report, off the socket loop
    tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = (*snapshots.borrow_and_update()).into();
                if !send_json(&mut sender, &ServerMessage::State { state }).await {
                    break;
                }
            }

            Some(msg) = outbox_rx.recv() => {
                if !send_json(&mut sender, &msg).await {
                    break;
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(session = session.id(), "Received message: {}", text.as_str());

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) = handlers::handle_message(client_msg, &conn).await {
                                    if !send_json(&mut sender, &response).await {
                                        tracing::error!("Failed to send response");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                let _ = send_json(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(session = session.id(), "Session ended");
}
