//! Echo endpoint for trying the agent against something local.
//!
//! Accepts any method on any path, logs JSON bodies pretty-printed and
//! answers with a JSON description of the request. Gzip request bodies are
//! decompressed before the handler sees them.

use axum::{
    Json, Router,
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::IntoResponse,
};
use serde_json::{Map, Value, json};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router() -> Router {
    Router::new()
        .fallback(echo)
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(address: SocketAddr) -> Result<(), AnyError> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Echo server listening");

    axum::serve(listener, router().into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let body_value = if is_json(&headers) {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => {
                let pretty = serde_json::to_string_pretty(&value).unwrap_or_default();
                info!(%method, path = %uri.path(), bytes = body.len(), "JSON body:\n{pretty}");
                value
            }
            Err(e) => {
                warn!(%method, path = %uri.path(), error = %e, "Invalid JSON body");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("invalid JSON: {e}")})),
                );
            }
        }
    } else {
        info!(%method, path = %uri.path(), bytes = body.len(), "Request received");
        Value::String(String::from_utf8_lossy(&body).into_owned())
    };

    let headers: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "headers": headers,
            "body": body_value,
        })),
    )
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|media_type| {
            media_type.type_() == mime::APPLICATION
                && (media_type.subtype() == mime::JSON || media_type.suffix() == Some(mime::JSON))
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt; // for `oneshot`

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_echo_json_post() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/client/administration/queues/plesk")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"data":[{"domain":"a.com"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["method"], "POST");
        assert_eq!(body["path"], "/client/administration/queues/plesk");
        assert_eq!(body["headers"]["content-type"], "application/json");
        assert_eq!(body["body"]["data"][0]["domain"], "a.com");
    }

    #[tokio::test]
    async fn test_echo_any_method_and_path() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/anything/else")
                    .body(Body::from("plain"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["method"], "DELETE");
        assert_eq!(body["body"], "plain");
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
                    .body(Body::from("{broken"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(header::CONTENT_TYPE, "application/problem+json".parse().unwrap());
        assert!(is_json(&headers));

        headers.insert(header::CONTENT_TYPE, "text/html".parse().unwrap());
        assert!(!is_json(&headers));
    }
}
