//! Speaker endpoint: audio in, composite subtitles out.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    AudioPayload, Connection, ControlPayload, ErrorPayload, MessageType, SessionQuery,
    SpeakerSubtitlePayload, StatePayload, WsMessage, ERR_AUTH_FAILED, ERR_SESSION_FAILED,
};
use crate::broadcast::SubtitleBroadcaster;
use crate::error::PipelineError;
use crate::pipeline::PipelineSession;
use crate::server::AppState;
use crate::subtitle::Subtitle;

pub async fn speaker_ws(
    ws: WebSocketUpgrade,
    Query(query): Query<SessionQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_speaker(socket, query, state))
}

async fn handle_speaker(socket: WebSocket, query: SessionQuery, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let (conn, mut reader) = Connection::start(connection_id.clone(), socket);
    info!("Speaker connected: {connection_id}");

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

    let activity = match state
        .access
        .validate_speaker_session(&query.activity_id, &query.token, &query.language)
        .await
    {
        Ok(activity) => activity,
        Err(e) => {
            warn!("Speaker auth failed for activity {}: {e}", query.activity_id);
            conn.send_json(
                MessageType::Error,
                ErrorPayload {
                    code: ERR_AUTH_FAILED.to_string(),
                    message: e.to_string(),
                },
            );
            return;
        }
    };

    let (session, subtitle_rx) = match state.pipeline.start_session(
        &activity.id,
        &activity.input_language,
        &activity.target_languages,
    ) {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Failed to start session for activity {}: {e}", activity.id);
            conn.send_json(
                MessageType::Error,
                ErrorPayload {
                    code: ERR_SESSION_FAILED.to_string(),
                    message: e.to_string(),
                },
            );
            return;
        }
    };

    state.broadcaster.register_activity(&activity.id);

    conn.send_json(
        MessageType::State,
        StatePayload {
            status: "READY".to_string(),
            message: Some("connected, ready to receive audio".to_string()),
        },
    );

    let forward = tokio::spawn(forward_subtitles(
        conn.clone(),
        subtitle_rx,
        state.broadcaster.clone(),
        activity.id.clone(),
    ));

    while let Some(text) = reader.next_text().await {
        handle_speaker_message(&conn, &session, &text);
    }

    // Disconnect: tear the session down and close every viewer queue.
    if let Err(e) = state.pipeline.stop_session(&activity.id) {
        debug!("Session already gone for activity {}: {e}", activity.id);
    }
    state.broadcaster.unregister_activity(&activity.id);
    forward.abort();
    info!("Speaker disconnected: {connection_id}");
}

/// Fan each subtitle out to the viewers and echo it to the speaker
/// (original plus metadata only).
async fn forward_subtitles(
    conn: Connection,
    mut subtitles: mpsc::Receiver<Subtitle>,
    broadcaster: Arc<SubtitleBroadcaster>,
    activity_id: String,
) {
    while let Some(subtitle) = subtitles.recv().await {
        broadcaster.broadcast_subtitle(&activity_id, &subtitle);
        conn.send_json(MessageType::Subtitle, SpeakerSubtitlePayload::from(&subtitle));
    }
}

fn handle_speaker_message(conn: &Connection, session: &PipelineSession, text: &str) {
    let message: WsMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Malformed speaker message: {e}");
            return;
        }
    };

    match message.message_type {
        MessageType::Audio => handle_audio(session, message.payload),
        MessageType::Control => handle_control(conn, message.payload),
        MessageType::Pong => {}
        other => debug!("Ignoring speaker message type {other:?}"),
    }
}

fn handle_audio(session: &PipelineSession, payload: serde_json::Value) {
    let audio: AudioPayload = match serde_json::from_value(payload) {
        Ok(audio) => audio,
        Err(e) => {
            warn!("Invalid audio payload: {e}");
            return;
        }
    };

    let data = match BASE64.decode(audio.chunk.as_bytes()) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to decode audio chunk (seq {}): {e}", audio.sequence);
            return;
        }
    };

    match session.send_audio(data) {
        Ok(()) => {}
        Err(PipelineError::AudioBufferFull) => {
            // Capacity pressure is absorbed locally, never surfaced.
            warn!(
                "Audio buffer full for activity {}, dropping chunk {}",
                session.activity_id, audio.sequence
            );
        }
        Err(e) => debug!("Dropping audio chunk: {e}"),
    }
}

fn handle_control(conn: &Connection, payload: serde_json::Value) {
    let control: ControlPayload = match serde_json::from_value(payload) {
        Ok(control) => control,
        Err(e) => {
            warn!("Invalid control payload: {e}");
            return;
        }
    };

    debug!("Control action: {}", control.action);
    match control.action.as_str() {
        "START" => conn.send_json(
            MessageType::State,
            StatePayload {
                status: "STREAMING".to_string(),
                message: Some("receiving audio".to_string()),
            },
        ),
        "STOP" => conn.send_json(
            MessageType::State,
            StatePayload {
                status: "STOPPED".to_string(),
                message: Some("stopped receiving audio".to_string()),
            },
        ),
        // PAUSE and anything else: accepted, no state change.
        _ => {}
    }
}
