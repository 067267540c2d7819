use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use pinrelay_core::types::JobId;

use crate::error::AppResult;
use crate::handlers::prompts::find_job;
use crate::state::AppState;
use crate::ws::manager::FanoutManager;

/// GET /api/v1/ws/{job_id} -- upgrade and stream the job's progress events.
///
/// Unknown jobs are rejected with 404 before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Response> {
    find_job(&state, job_id).await?;

    let fanout = Arc::clone(&state.fanout);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, job_id, fanout)))
}

/// Serve one subscribed connection until either side goes away.
///
/// Outbound frames come from the fan-out manager's channel through a
/// sender task. Inbound frames only signal liveness; a Close or a read
/// error ends the connection.
async fn handle_socket(mut socket: WebSocket, job_id: JobId, fanout: Arc<FanoutManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();

    let mut rx = match fanout.connect(job_id, &conn_id).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!(%job_id, error = %e, "Could not subscribe connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::info!(%job_id, conn_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let receive = async {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = &mut send_task => {}
        () = receive => {}
    }

    fanout.disconnect(job_id, &conn_id).await;
    send_task.abort();
    tracing::info!(%job_id, conn_id = %conn_id, "WebSocket disconnected");
}
