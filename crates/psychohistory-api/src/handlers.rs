use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::sse::{Event, Sse},
    response::IntoResponse,
    Json,
};
use futures::{Stream, StreamExt};
use psychohistory_core::{SeedInput, TreeStreamEvent};
use psychohistory_engine::{ChannelEventSink, TreeBuilder, TreeBuilderConfig};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Buffered events between the scheduler and the response writer. A slow
/// client fills the buffer and backpressures the scheduler.
const EVENT_BUFFER: usize = 256;

/// `POST /generate-tree/stream` — run a tree build, streaming each
/// lifecycle event as a `data: <json>\n\n` record.
pub async fn generate_tree_stream(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let seed: SeedInput = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid seed input: {e}")))?;
    if seed.event.trim().is_empty() {
        return Err(ApiError::Validation("event must not be empty".to_string()));
    }

    info!(
        seed = %seed.event,
        max_depth = seed.effective_depth(),
        "starting tree stream"
    );

    let (tx, rx) = mpsc::channel::<TreeStreamEvent>(EVENT_BUFFER);
    let builder = TreeBuilder::new(
        TreeBuilderConfig {
            max_depth: seed.effective_depth(),
            max_concurrent: state.max_concurrent,
            node_timeout: state.node_timeout,
        },
        state.pipeline.clone(),
    );

    let cancel = builder.cancellation_token();

    tokio::spawn(async move {
        let sink = ChannelEventSink::new(tx.clone());
        match builder.build(&seed, &sink).await {
            Ok(root) => {
                debug!(total_nodes = root.subtree_size(), "tree stream finished");
            }
            Err(e) => {
                // Client disconnects surface here as a closed sink; the
                // terminal error event only reaches clients still listening.
                error!(error = %e, "tree build failed");
                let _ = tx
                    .send(TreeStreamEvent::Error {
                        message: e.to_string(),
                        node_id: None,
                    })
                    .await;
            }
        }
    });

    let stream = event_stream(rx, cancel);
    let sse = Sse::new(stream);

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        sse,
    ))
}

/// Cancels the build when the response stream is dropped, which is how a
/// client disconnect surfaces here. Cancelling after a normal completion is
/// a no-op.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn event_stream(
    rx: mpsc::Receiver<TreeStreamEvent>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    let guard = CancelOnDrop(cancel);
    ReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Event::default().json_data(&event)
    })
}

/// `GET /health` — liveness probe.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "psychohistory-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
