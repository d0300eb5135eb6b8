//! Event ingestion and the WebSocket push channel.
//!
//! Client frames: `{"action":"subscribe","patientId":"1"}` and `{"action":"get","topic":"inbox"}`.
//! Server frames: `{"topic":"...","payload":...}`.

use crate::AppState;
use api_shared::{ClientFrame, NotifyEventReq, NotifyEventRes};
use axum::{
    extract::{
        ws::{Message, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Json, Response},
};
use ehr_core::{ConnectionId, NotificationRelay, PushMessage, Topic};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

#[utoipa::path(
    post,
    path = "/events/notify",
    request_body = NotifyEventReq,
    responses(
        (status = 200, description = "Event accepted", body = NotifyEventRes),
        (status = 500, description = "Internal server error")
    )
)]
/// Webhook for node events
///
/// Consent-request events recompute every pushed view. Other subjects are acknowledged and ignored.
#[axum::debug_handler]
pub async fn notify_event(
    State(state): State<AppState>,
    Json(req): Json<NotifyEventReq>,
) -> Result<Json<NotifyEventRes>, (StatusCode, &'static str)> {
    tracing::debug!("event on {}: {}", req.subject, req.event);
    match state.services.relay.handle_event(&req.subject).await {
        Ok(refreshed) => Ok(Json(NotifyEventRes { refreshed })),
        Err(e) => {
            tracing::error!("Event handling error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

pub async fn push_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let relay = state.services.relay.clone();
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        serve_connection(relay, stream, sink).await;
    })
}

/// Registers a connection, forwards its pushes to `sink` and handles client frames from `stream`
/// until the client closes. The connection is removed from the relay afterwards.
async fn serve_connection<St, Si>(relay: Arc<NotificationRelay>, stream: St, sink: Si)
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
    Si: Sink<Message> + Send + Unpin + 'static,
{
    let (id, pushes) = relay.connect().await;
    let writer = tokio::spawn(forward_pushes(pushes, sink));

    read_frames(&relay, id, stream).await;

    relay.disconnect(id).await;
    writer.abort();
}

async fn forward_pushes<Si>(mut pushes: UnboundedReceiver<PushMessage>, mut sink: Si)
where
    Si: Sink<Message> + Unpin,
{
    while let Some(message) = pushes.recv().await {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Push frame error: {:?}", e);
                continue;
            }
        };
        if sink.send(Message::Text(frame)).await.is_err() {
            break;
        }
    }
}

async fn read_frames<St>(relay: &NotificationRelay, id: ConnectionId, mut stream: St)
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => handle_frame(relay, id, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }
}

async fn handle_frame(relay: &NotificationRelay, id: ConnectionId, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("connection {id} sent an unreadable frame: {e}");
            return;
        }
    };
    match frame {
        ClientFrame::Subscribe { patient_id } => {
            if let Err(e) = relay.subscribe(id, &patient_id).await {
                tracing::warn!("connection {id} could not watch patient {patient_id}: {e}");
            }
        }
        ClientFrame::Get { topic } => match topic.parse::<Topic>() {
            Ok(topic) => {
                relay.reply_with_last(id, topic).await;
            }
            Err(e) => tracing::warn!("connection {id}: {e}"),
        },
    }
}
