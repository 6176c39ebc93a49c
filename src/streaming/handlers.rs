use crate::board::{BoardStatus, ChannelKind, Outbound};
use crate::error::BoardError;
use crate::events::ChesscamEvent;
use crate::hub::Subscription;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::server::ServerState;

/// Body of `POST /boards/reset`
#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    pub fen: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    board_ids: Vec<u32>,
    initial_fen: String,
}

/// Websocket feed of a board's moves: history replay, then live moves
pub async fn move_socket_handler(
    ws: WebSocketUpgrade,
    Path(board_id): Path<String>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state, board_id, ChannelKind::Moves))
}

/// Websocket carrying the board's starting position once, then keep-alive only
pub async fn fen_socket_handler(
    ws: WebSocketUpgrade,
    Path(board_id): Path<String>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state, board_id, ChannelKind::Fen))
}

async fn serve_socket(socket: WebSocket, state: ServerState, board_id: String, kind: ChannelKind) {
    let subscription = match board_id.parse::<u32>() {
        Ok(id) => state.hub.subscribe(id, kind).await.ok(),
        Err(_) => None,
    };

    let Some(subscription) = subscription else {
        // Unknown boards are accepted and closed without payload
        debug!("Closing {} socket for unknown board '{}'", kind, board_id);
        state.stats.connection_rejected();
        let _ = socket.close().await;
        return;
    };

    state.stats.connection_opened();
    let client = subscription.client();
    let board_id = subscription.board_id();
    info!(
        "Client {} connected to board {} {} channel",
        client, board_id, kind
    );

    let reason = pump(socket, subscription, &state).await;

    state.stats.connection_closed();
    info!(
        "Client {} left board {} {} channel: {}",
        client, board_id, kind, reason
    );

    let _ = state
        .event_bus
        .publish(ChesscamEvent::ClientDropped {
            board_id,
            client_id: client.to_string(),
            reason: reason.to_string(),
        })
        .await;
}

/// Move queued items onto the socket until either side goes away. The
/// subscription is dropped on return, which unsubscribes the client.
async fn pump(socket: WebSocket, mut subscription: Subscription, state: &ServerState) -> &'static str {
    let (mut sender, mut receiver) = socket.split();
    let mut keepalive = interval(state.keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.tick().await;

    let reason = loop {
        tokio::select! {
            item = subscription.recv() => {
                let Some(item) = item else {
                    break "released by board";
                };
                let reset = item == Outbound::Reset;
                if let Err(e) = deliver(&mut sender, item, state).await {
                    debug!("Send to client {} failed: {}", subscription.client(), e);
                    return "send failed";
                }
                if reset {
                    break "board reset";
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => return "closed by client",
                Some(Ok(_)) => trace!("Ignoring inbound frame from {}", subscription.client()),
                Some(Err(e)) => {
                    debug!("Receive from client {} failed: {}", subscription.client(), e);
                    return "receive failed";
                }
            },
            _ = keepalive.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    return "keep-alive failed";
                }
            }
        }
    };

    let _ = sender.send(Message::Close(None)).await;
    reason
}

async fn deliver(
    sender: &mut SplitSink<WebSocket, Message>,
    item: Outbound,
    state: &ServerState,
) -> Result<(), axum::Error> {
    for text in item.into_messages() {
        sender.send(Message::Text(text)).await?;
        state.stats.message_sent();
    }
    Ok(())
}

/// Status of every board, ordered by id
pub async fn boards_handler(State(state): State<ServerState>) -> Json<Vec<BoardStatus>> {
    let boards = state.registry().snapshot();
    let mut statuses: Vec<BoardStatus> = boards.values().map(|board| board.status()).collect();
    statuses.sort_by_key(|status| status.id);
    Json(statuses)
}

/// Replace every board with a fresh one
pub async fn reset_all_handler(
    State(state): State<ServerState>,
    body: Option<Json<ResetRequest>>,
) -> Response {
    let fen = body
        .and_then(|Json(request)| request.fen)
        .unwrap_or_else(|| state.default_fen.clone());

    if state.registry().is_empty() {
        warn!("Reset requested with no active boards");
        return error_response(StatusCode::CONFLICT, "no boards are active".to_string());
    }

    match state.registry().reset_all(&fen) {
        Ok(boards) => {
            let mut board_ids: Vec<u32> = boards.keys().copied().collect();
            board_ids.sort_unstable();
            publish_reset(&state, board_ids.clone(), fen.clone()).await;
            (
                StatusCode::OK,
                Json(ResetResponse {
                    board_ids,
                    initial_fen: fen,
                }),
            )
                .into_response()
        }
        Err(e) => board_error_response(e),
    }
}

/// Replace one board with a fresh one at its starting position
pub async fn reset_board_handler(
    Path(board_id): Path<u32>,
    State(state): State<ServerState>,
) -> Response {
    match state.registry().reset_board(board_id) {
        Ok(board) => {
            let fen = board.initial_fen().to_string();
            publish_reset(&state, vec![board_id], fen.clone()).await;
            (
                StatusCode::OK,
                Json(ResetResponse {
                    board_ids: vec![board_id],
                    initial_fen: fen,
                }),
            )
                .into_response()
        }
        Err(e) => board_error_response(e),
    }
}

async fn publish_reset(state: &ServerState, board_ids: Vec<u32>, initial_fen: String) {
    let _ = state
        .event_bus
        .publish(ChesscamEvent::BoardsReset {
            board_ids,
            initial_fen,
            timestamp: SystemTime::now(),
        })
        .await;
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let health_info = serde_json::json!({
        "status": "healthy",
        "boards": state.registry().ids(),
        "connections": state.stats.snapshot(),
        "event_subscribers": state.event_bus.subscriber_count(),
    });

    (StatusCode::OK, Json(health_info))
}

fn board_error_response(error: BoardError) -> Response {
    let status = match &error {
        BoardError::NotFound { .. } => StatusCode::NOT_FOUND,
        BoardError::InvalidConfiguration { .. } => StatusCode::BAD_REQUEST,
        BoardError::CameraUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, error.to_string())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
