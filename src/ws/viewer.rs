//! Viewer endpoint: per-language subtitle frames out.

use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    Connection, ErrorPayload, HistoryPayload, MessageType, SessionQuery, StatePayload,
    WsMessage, ERR_AUTH_FAILED,
};
use crate::server::AppState;
use crate::subtitle::SubtitleForViewer;

pub async fn viewer_ws(
    ws: WebSocketUpgrade,
    Query(query): Query<SessionQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_viewer(socket, query, state))
}

async fn handle_viewer(socket: WebSocket, query: SessionQuery, state: AppState) {
    let viewer_id = Uuid::new_v4().to_string();
    let (conn, mut reader) = Connection::start(viewer_id.clone(), socket);
    info!("Viewer connected: {viewer_id}");

    if !query.is_complete() {
        conn.send_json(
            MessageType::Error,
            ErrorPayload {
                code: ERR_AUTH_FAILED.to_string(),
                message: "activityId, token and language are required".to_string(),
            },
        );
        return;
    }

    if let Err(e) = state
        .access
        .validate_viewer_session(&query.activity_id, &query.token, &query.language)
        .await
    {
        warn!("Viewer auth failed for activity {}: {e}", query.activity_id);
        conn.send_json(
            MessageType::Error,
            ErrorPayload {
                code: ERR_AUTH_FAILED.to_string(),
                message: e.to_string(),
            },
        );
        return;
    }

    let subtitle_rx = state
        .broadcaster
        .add_viewer(&query.activity_id, &viewer_id, &query.language);

    conn.send_json(
        MessageType::State,
        StatePayload {
            status: "CONNECTED".to_string(),
            message: Some("connected, subtitles will follow".to_string()),
        },
    );
    // History is not retained; the frame marks the start of live delivery.
    conn.send_json(
        MessageType::History,
        HistoryPayload { subtitles: vec![] },
    );

    let forward = tokio::spawn(forward_subtitles(conn.clone(), subtitle_rx));

    while let Some(text) = reader.next_text().await {
        handle_viewer_message(&text);
    }

    state.broadcaster.remove_viewer(&query.activity_id, &viewer_id);
    forward.abort();
    info!("Viewer disconnected: {viewer_id}");
}

/// Drain the viewer's queue until it closes (viewer removed or activity
/// unregistered) or the socket goes away.
async fn forward_subtitles(conn: Connection, mut subtitles: mpsc::Receiver<SubtitleForViewer>) {
    while let Some(subtitle) = subtitles.recv().await {
        conn.send_json(MessageType::Subtitle, subtitle);
    }
    debug!("Subtitle stream ended for connection {}", conn.id);
}

fn handle_viewer_message(text: &str) {
    let message: WsMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Malformed viewer message: {e}");
            return;
        }
    };

    match message.message_type {
        MessageType::Pong => {}
        other => debug!("Ignoring viewer message type {other:?}"),
    }
}
