//! Webhook listener for the player's push feed.
//!
//! The player POSTs every event it produces; only the kinds the surface draws
//! are forwarded to the core.  Anything else is acknowledged and dropped so
//! the player does not retry.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use deck_proto::player::{PushEvent, PushEventError};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::core::DeckEvent;

#[derive(Clone)]
struct PushState {
    event_tx: mpsc::Sender<DeckEvent>,
}

pub fn router(event_tx: mpsc::Sender<DeckEvent>) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/events", post(receive))
        .layer(TraceLayer::new_for_http())
        .with_state(PushState { event_tx })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    event_tx: mpsc::Sender<DeckEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind push listener to {}: {}", addr, e);
                return;
            }
        };

        info!("Push listener on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("Push listener error: {}", e);
        }
    })
}

async fn receive(State(state): State<PushState>, body: Bytes) -> StatusCode {
    match PushEvent::from_slice(&body) {
        Ok(event) => {
            if state.event_tx.send(DeckEvent::Push(event)).await.is_err() {
                return StatusCode::SERVICE_UNAVAILABLE;
            }
            StatusCode::OK
        }
        Err(PushEventError::UnknownKind(kind)) => {
            debug!("push: ignoring {} event", kind);
            StatusCode::OK
        }
        Err(e) => {
            warn!("push: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}
