use axum::{
	Json, Router,
	extract::{Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use revector_service::{
	BulkEnqueueRequest, BulkEnqueueResponse, DrainRequest, DrainResponse, EnqueueRequest,
	EnqueueResponse, Error as ServiceError, ListEmbeddingsRequest, ListEmbeddingsResponse,
	ListJobsRequest, ListJobsResponse, RetryRequest, RetryResponse, SweepResponse, bulk, drain,
	enqueue, list, retry, sweep,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/jobs/enqueue", post(enqueue_job))
		.route("/v1/jobs/bulk_enqueue", post(bulk_enqueue_jobs))
		.route("/v1/jobs/drain", post(drain_jobs))
		.route("/v1/jobs/retry", post(retry_job))
		.route("/v1/jobs", get(list_jobs))
		.route("/v1/embeddings", get(list_embeddings))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new().route("/v1/admin/sweep", post(admin_sweep)).with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn enqueue_job(
	State(state): State<AppState>,
	Json(payload): Json<EnqueueRequest>,
) -> Result<Json<Envelope<EnqueueResponse>>, ApiError> {
	let response = enqueue::enqueue(&state.service, payload).await?;
	Ok(envelope(response))
}

async fn bulk_enqueue_jobs(
	State(state): State<AppState>,
	Json(payload): Json<BulkEnqueueRequest>,
) -> Result<Json<Envelope<BulkEnqueueResponse>>, ApiError> {
	let response = bulk::bulk_enqueue(&state.service, payload).await?;
	Ok(envelope(response))
}

async fn drain_jobs(
	State(state): State<AppState>,
	Json(payload): Json<DrainRequest>,
) -> Result<Json<Envelope<DrainResponse>>, ApiError> {
	let response = drain::drain(&state.service, payload).await?;
	Ok(envelope(response))
}

async fn retry_job(
	State(state): State<AppState>,
	Json(payload): Json<RetryRequest>,
) -> Result<Json<Envelope<RetryResponse>>, ApiError> {
	let response = retry::retry(&state.service, payload).await?;
	Ok(envelope(response))
}

async fn list_jobs(
	State(state): State<AppState>,
	Query(params): Query<ListJobsRequest>,
) -> Result<Json<Envelope<ListJobsResponse>>, ApiError> {
	let response = list::list_jobs(&state.service, params).await?;
	Ok(envelope(response))
}

async fn list_embeddings(
	State(state): State<AppState>,
	Query(params): Query<ListEmbeddingsRequest>,
) -> Result<Json<Envelope<ListEmbeddingsResponse>>, ApiError> {
	let response = list::list_embeddings(&state.service, params).await?;
	Ok(envelope(response))
}

async fn admin_sweep(
	State(state): State<AppState>,
) -> Result<Json<Envelope<SweepResponse>>, ApiError> {
	let response = sweep::sweep(&state.service).await?;
	Ok(envelope(response))
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
	success: bool,
	#[serde(flatten)]
	data: T,
}

fn envelope<T>(data: T) -> Json<Envelope<T>>
where
	T: Serialize,
{
	Json(Envelope { success: true, data })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	success: bool,
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let message = err.to_string();

		match err {
			ServiceError::InvalidRequest { .. } =>
				ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", message),
			ServiceError::NotFound { .. } =>
				ApiError::new(StatusCode::NOT_FOUND, "not_found", message),
			ServiceError::Conflict { .. } => ApiError::new(StatusCode::CONFLICT, "conflict", message),
			ServiceError::Provider { .. } =>
				ApiError::new(StatusCode::BAD_GATEWAY, "provider_error", message),
			ServiceError::Storage { .. } =>
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { success: false, error_code: self.error_code, message: self.message };
		(self.status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn envelope_flattens_payload() {
		let json = serde_json::to_value(Envelope {
			success: true,
			data: SweepResponse { reclaimed_count: 3 },
		})
		.expect("envelope must serialize");

		assert_eq!(json["success"], true);
		assert_eq!(json["reclaimed_count"], 3);
	}

	#[test]
	fn service_errors_map_to_statuses() {
		let api: ApiError =
			ServiceError::NotFound { message: "missing".to_string() }.into();

		assert_eq!(api.status, StatusCode::NOT_FOUND);
		assert_eq!(api.error_code, "not_found");

		let api: ApiError =
			ServiceError::Provider { message: "down".to_string() }.into();

		assert_eq!(api.status, StatusCode::BAD_GATEWAY);
	}
}
