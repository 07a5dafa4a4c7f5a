use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ragline_core::{IngestRequest, IngestResult, QueryAnswer, QueryRequest};
use ragline_memory::VectorStore as _;
use ragline_steps::{JobRecord, StepStore as _};
use serde::Serialize;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct IngestResponse {
    job_id: String,
    #[serde(flatten)]
    result: IngestResult,
}

#[derive(Debug, Serialize)]
pub(crate) struct QueryResponse {
    job_id: String,
    #[serde(flatten)]
    answer: QueryAnswer,
}

#[derive(Debug, Serialize)]
pub(crate) struct JobResponse {
    #[serde(flatten)]
    record: JobRecord,
    completed_steps: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<u64>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            Err(ApiError::new(status, rejection.body_text()))
        }
    }
}

pub(crate) async fn ingest_handler(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let job = body(payload)?.validate()?;
    tracing::info!(job_id = %job.job_id, pdf_path = %job.pdf_path.display(), "ingest requested");

    match state.app.ingest.ingest(&job).await {
        Ok(result) => Ok(Json(IngestResponse {
            job_id: job.job_id,
            result,
        })),
        Err(e) => Err(ApiError::from_job(&e).with_job_id(job.job_id)),
    }
}

pub(crate) async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let job = body(payload)?.validate()?;
    tracing::info!(job_id = %job.job_id, top_k = ?job.top_k, "query requested");

    match state.app.query.answer(&job).await {
        Ok(answer) => Ok(Json(QueryResponse {
            job_id: job.job_id,
            answer,
        })),
        Err(e) => Err(ApiError::from_job(&e).with_job_id(job.job_id)),
    }
}

pub(crate) async fn job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let store = &state.app.step_store;
    let Some(record) = store.job(&job_id).await? else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "unknown job").with_job_id(job_id));
    };
    let completed_steps = store.completed_steps(&job_id).await?;
    Ok(Json(JobResponse {
        record,
        completed_steps,
    }))
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let collection = state.app.config.vector_store.collection.clone();
    let records = match state.app.vector_store.count(&collection).await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::debug!(error = %e, "record count unavailable");
            None
        }
    };
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        collection,
        records,
    })
}
