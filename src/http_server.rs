//! HTTP Adapter: a single `POST /` endpoint speaking the wire envelope
//! from spec §6.3 — `{type, graph, ...}` in, `{status, result|message}`
//! out — over any `DbInterface` (direct, remote-forwarding, or
//! federated). One route, one content type, no REST surface.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::db_interface::DbInterface;
use crate::error::XdbiError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DbInterface>,
}

pub fn router(db: Arc<dyn DbInterface>) -> Router {
    Router::new()
        .route("/", post(handle_envelope))
        .with_state(AppState { db })
        .layer(TraceLayer::new_for_http())
}

async fn handle_envelope(State(state): State<AppState>, Json(envelope): Json<Value>) -> Response {
    match dispatch(&state, &envelope).await {
        Ok(result) => Json(serde_json::json!({"status": "finished", "result": result})).into_response(),
        Err(err) => {
            warn!(error = %err, "envelope failed");
            let status = status_for(&err);
            (status, Json(serde_json::json!({"status": "error", "message": err.to_string()}))).into_response()
        }
    }
}

fn status_for(err: &XdbiError) -> StatusCode {
    match err {
        XdbiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        XdbiError::ReadOnly => StatusCode::FORBIDDEN,
        XdbiError::InvalidInput(_) | XdbiError::MalformedDocument(_) => StatusCode::BAD_REQUEST,
        XdbiError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        XdbiError::LockFailure { .. } | XdbiError::IoFailure { .. } | XdbiError::Transport(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn dispatch(state: &AppState, envelope: &Value) -> crate::error::Result<Value> {
    let kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| XdbiError::InvalidInput("envelope missing 'type'".into()))?;
    let graph = envelope.get("graph").and_then(Value::as_str).unwrap_or("");

    if kind == "ping" {
        return Ok(Value::Bool(true));
    }

    if !graph.is_empty() {
        state.db.set_working_graph(graph).await;
    }

    match kind {
        "load" => {
            let uri = required_str(envelope, "uri")?;
            let class = envelope.get("classname").and_then(Value::as_str).filter(|s| !s.is_empty());
            let doc = state.db.load(uri, class).await?;
            Ok(doc.unwrap_or(Value::Null))
        }
        "find" => {
            let class = envelope.get("classname").and_then(Value::as_str).filter(|s| !s.is_empty());
            let properties = envelope
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(Map::new);
            let docs = state.db.find(class, &properties).await?;
            Ok(Value::Array(docs))
        }
        "add" => {
            let models = required_array(envelope, "models")?;
            state.db.add(models).await?;
            Ok(Value::Null)
        }
        "update" => {
            let models = required_array(envelope, "models")?;
            state.db.update(models).await?;
            Ok(Value::Null)
        }
        "remove" => {
            let uri = required_str(envelope, "uri")?;
            state.db.remove(uri).await?;
            Ok(Value::Null)
        }
        "clear" => {
            let cleared = state.db.clear().await?;
            Ok(Value::Bool(cleared))
        }
        other => Err(XdbiError::InvalidInput(format!("unknown envelope type '{other}'"))),
    }
}

fn required_str<'a>(envelope: &'a Value, key: &str) -> crate::error::Result<&'a str> {
    envelope
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| XdbiError::InvalidInput(format!("envelope missing '{key}'")))
}

fn required_array(envelope: &Value, key: &str) -> crate::error::Result<Vec<Value>> {
    envelope
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| XdbiError::InvalidInput(format!("envelope missing '{key}'")))
}

pub async fn serve(db: Arc<dyn DbInterface>, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = router(db);
    info!(%addr, "xdbi http adapter listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_interface::DirectInterface;
    use crate::engine::StorageEngine;
    use tempfile::tempdir;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new(dir.path()));
        let db: Arc<dyn DbInterface> = Arc::new(DirectInterface::new(engine, false));
        (dir, AppState { db })
    }

    #[tokio::test]
    async fn ping_succeeds_without_graph() {
        let (_dir, state) = state();
        let result = dispatch(&state, &serde_json::json!({"type": "ping", "graph": ""})).await.unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[tokio::test]
    async fn add_then_load_round_trips_through_the_envelope() {
        let (_dir, state) = state();
        dispatch(
            &state,
            &serde_json::json!({
                "type": "add",
                "graph": "g",
                "models": [{"uri": "u1", "classname": "T", "properties": {"a": 1}}],
            }),
        )
        .await
        .unwrap();

        let loaded = dispatch(&state, &serde_json::json!({"type": "load", "graph": "g", "uri": "u1"}))
            .await
            .unwrap();
        assert_eq!(loaded["properties"]["a"], Value::from(1));
    }

    #[tokio::test]
    async fn unknown_envelope_type_is_invalid_input() {
        let (_dir, state) = state();
        let err = dispatch(&state, &serde_json::json!({"type": "bogus", "graph": "g"})).await.unwrap_err();
        assert!(matches!(err, XdbiError::InvalidInput(_)));
    }
}
