//! The HTTP surface: one POST route for GraphQL.

use crate::config::ServerSettings;
use crate::error::Result;
use crate::graphql::{GraphQlRequest, execute};
use async_graphql::dynamic::Schema;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tracing::Instrument;

/// Router serving `schema` at `path`.
pub fn router(schema: Schema, path: &str) -> Router {
    Router::new()
        .route(path, post(graphql_handler))
        .with_state(schema)
}

/// POST handler. Requests that fail to parse, validate or execute get a 400
/// with the GraphQL error body.
async fn graphql_handler(
    State(schema): State<Schema>,
    body: std::result::Result<Json<GraphQlRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(req) => req,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejecting request body");
            let body = serde_json::json!({
                "errors": [{ "message": rejection.body_text() }]
            });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let span = tracing::info_span!(
        "graphql.request",
        operation = req.operation_name.as_deref().unwrap_or(""),
        errors = tracing::field::Empty,
    );
    let response = execute(&schema, req).instrument(span.clone()).await;
    span.record("errors", response.errors.len());

    let status = if response.is_err() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(response)).into_response()
}

/// Serve `schema` until Ctrl+C.
pub async fn serve(schema: Schema, settings: &ServerSettings) -> Result<()> {
    let app = router(schema, &settings.graphql_path);
    let listener = tokio::net::TcpListener::bind(settings.listen).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        path = %settings.graphql_path,
        "serving GraphQL"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
