use super::types::Response;
use crate::commands::CommandEnvelope;
use crate::node::GridNode;

use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;

/// Receives a command from another node and runs it locally.
///
/// Failures are reported inside the `Response` body, so the status code is
/// always 200 once the envelope could be decoded.
pub async fn handle_command(
    Extension(node): Extension<Arc<GridNode>>,
    Json(envelope): Json<CommandEnvelope>,
) -> (StatusCode, Json<Response>) {
    tracing::debug!("Received command {}", envelope.tag);
    let response = node.commands.dispatch(envelope).await;
    (StatusCode::OK, Json(response))
}
