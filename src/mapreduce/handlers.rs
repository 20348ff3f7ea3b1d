use super::task::MapReduceTask;
use crate::node::GridNode;
use crate::wordcount::{WordCountMapper, WordCountReducer};

use axum::{Extension, Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
pub struct WordCountRequest {
    pub cache: String,
    #[serde(default)]
    pub distribute_reduce: bool,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Store counts in this cache instead of returning them.
    pub results_cache: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WordCountResponse {
    pub task_id: Option<String>,
    pub counts: BTreeMap<String, u64>,
    pub error: Option<String>,
}

impl WordCountResponse {
    fn failed(task_id: Option<String>, error: String) -> Self {
        Self {
            task_id,
            counts: BTreeMap::new(),
            error: Some(error),
        }
    }
}

pub async fn handle_word_count(
    Extension(node): Extension<Arc<GridNode>>,
    Json(req): Json<WordCountRequest>,
) -> (StatusCode, Json<WordCountResponse>) {
    let task = match MapReduceTask::<String, String, String, u64>::with_options(
        &node,
        &req.cache,
        req.distribute_reduce,
        false,
    ) {
        Ok(task) => task,
        Err(e) => {
            tracing::error!("Rejected word count over {}: {}", req.cache, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(WordCountResponse::failed(None, e.to_string())),
            );
        }
    };

    let mut task = task
        .mapped_with(WordCountMapper)
        .reduced_with(WordCountReducer)
        .combined_with(WordCountReducer)
        .on_keys(req.keys);
    if let Some(millis) = req.timeout_ms {
        task = task.timeout(std::time::Duration::from_millis(millis));
    }
    let task_id = task.task_id().to_string();

    let outcome = match &req.results_cache {
        Some(results) => task.execute_into(results).await.map(|_| BTreeMap::new()),
        None => task
            .execute()
            .await
            .map(|counts| counts.into_iter().collect::<BTreeMap<_, _>>()),
    };

    match outcome {
        Ok(counts) => (
            StatusCode::OK,
            Json(WordCountResponse {
                task_id: Some(task_id),
                counts,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WordCountResponse::failed(Some(task_id), e.to_string())),
        ),
    }
}
