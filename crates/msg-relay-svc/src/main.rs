//! Message Relay Service
//!
//! HTTP service routing MPC messages between parties.

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use msg_relay::{MessageId, MessageStore, RelayError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Level};

/// Message relay service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "msg-relay-svc")]
#[command(about = "Message relay service for MPC communication")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "RELAY_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Message TTL in seconds
    #[arg(long, env = "RELAY_TTL", default_value = "3600")]
    ttl: i64,

    /// Seconds between sweeps of expired messages
    #[arg(long, default_value = "60")]
    cleanup_interval: u64,
}

/// Application state
struct AppState {
    store: MessageStore,
}

/// Request to post a message
#[derive(Debug, Serialize, Deserialize)]
struct PostMessageRequest {
    session_id: String,
    from: usize,
    to: usize,
    seq: u64,
    payload: String, // base64 encoded
}

/// Query to collect a message
#[derive(Debug, Serialize, Deserialize)]
struct GetMessageQuery {
    session_id: String,
    from: usize,
    to: usize,
    seq: u64,
}

/// Message response
#[derive(Debug, Serialize, Deserialize)]
struct MessageResponse {
    found: bool,
    payload: Option<String>, // base64 encoded
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!(
        listen = %args.listen,
        ttl = args.ttl,
        "Starting message relay service"
    );

    let state = Arc::new(AppState {
        store: MessageStore::new(args.ttl),
    });

    // Spawn cleanup task
    let cleanup_store = state.store.clone();
    let period = std::time::Duration::from_secs(args.cleanup_interval.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            cleanup_store.cleanup();
        }
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(address = %args.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/msg", get(get_message).post(post_message))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "msg-relay-svc",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Post a message to the relay
async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PostMessageRequest>,
) -> impl IntoResponse {
    let id = MessageId::new(&req.session_id, req.from, req.to, req.seq);

    let payload = match b64::decode(&req.payload) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("Invalid base64: {}", e) })),
            );
        }
    };

    if let Err(e) = state.store.put(id.clone(), payload) {
        warn!(error = %e, "Message rejected");
        let status = match e {
            RelayError::Duplicate(_) => StatusCode::CONFLICT,
            RelayError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        return (status, Json(serde_json::json!({ "error": e.to_string() })));
    }

    debug!(
        session_id = %req.session_id,
        from = req.from,
        to = req.to,
        seq = req.seq,
        "Message stored"
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({ "hash": id.hash() })),
    )
}

/// Collect a message from the relay; a found message is removed
async fn get_message(
    State(state): State<Arc<AppState>>,
    Query(q): Query<GetMessageQuery>,
) -> impl IntoResponse {
    let id = MessageId::new(&q.session_id, q.from, q.to, q.seq);

    match state.store.take(&id) {
        Ok(msg) => Json(MessageResponse {
            found: true,
            payload: Some(b64::encode(&msg.payload)),
        }),
        Err(_) => Json(MessageResponse {
            found: false,
            payload: None,
        }),
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState {
            store: MessageStore::new(60),
        }))
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_then_collect_once() {
        let app = app();
        let post = serde_json::json!({
            "session_id": "s1", "from": 0, "to": 1, "seq": 0, "payload": "AQID"
        });
        let resp = app
            .clone()
            .oneshot(
                Request::post("/v1/msg")
                    .header("content-type", "application/json")
                    .body(Body::from(post.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let uri = "/v1/msg?session_id=s1&from=0&to=1&seq=0";
        let resp = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["found"], true);
        assert_eq!(json["payload"], "AQID");

        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["found"], false);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let app = app();
        let post = serde_json::json!({
            "session_id": "s1", "from": 1, "to": 0, "seq": 4, "payload": ""
        });
        let request = || {
            Request::post("/v1/msg")
                .header("content-type", "application/json")
                .body(Body::from(post.to_string()))
                .unwrap()
        };
        let resp = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = app.oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
