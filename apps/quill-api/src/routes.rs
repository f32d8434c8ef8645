use axum::{
	Json, Router,
	extract::{Request, State},
	http::{HeaderMap, HeaderValue, StatusCode, header},
	middleware::{self, Next},
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{get, post},
};
use futures::StreamExt;
use serde::Serialize;

use crate::state::AppState;
use quill_service::{
	ChatRequest, CreateNoteRequest, DeleteNoteRequest, Error as ServiceError, UpdateNoteRequest,
};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/notes", get(list_notes).post(create_note).options(preflight))
		.route("/api/notes/update", post(update_note).options(preflight))
		.route("/api/notes/delete", post(delete_note).options(preflight))
		.route("/api/chat", post(chat).options(preflight))
		.layer(middleware::from_fn_with_state(state.clone(), with_cors))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn list_notes(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Response, ApiError> {
	let user_id = caller(&state, &headers)?;
	let response = state.service.list_notes(user_id.as_deref()).await?;

	Ok(Json(response).into_response())
}

async fn create_note(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<CreateNoteRequest>,
) -> Result<Response, ApiError> {
	let user_id = caller(&state, &headers)?;
	let response = state.service.create_note(user_id.as_deref(), payload).await?;

	Ok(Json(response).into_response())
}

async fn update_note(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<UpdateNoteRequest>,
) -> Result<Response, ApiError> {
	let user_id = caller(&state, &headers)?;
	let response = state.service.update_note(user_id.as_deref(), payload).await?;

	Ok(Json(response).into_response())
}

async fn delete_note(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<DeleteNoteRequest>,
) -> Result<Response, ApiError> {
	let user_id = caller(&state, &headers)?;
	let response = state.service.delete_note(user_id.as_deref(), payload).await?;

	Ok(Json(response).into_response())
}

/// Opens a chat turn as a server-sent event stream. Unlike the read routes,
/// chat requires an identified caller before any work starts.
async fn chat(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
	let Some(user_id) = caller(&state, &headers)? else {
		return Err(ApiError::from(ServiceError::Unauthenticated {
			message: "Chat requires an identified caller.".to_string(),
		}));
	};
	let events = state.service.clone().chat(user_id, payload);
	let sse = Sse::new(
		events.map(|event| Event::default().event(event.kind()).json_data(&event)),
	)
	.keep_alive(KeepAlive::default());

	Ok(sse.into_response())
}

/// CORS preflight. A bare OPTIONS probe gets an empty 200; a real preflight
/// (origin plus requested method and headers) gets the allow set.
async fn preflight(headers: HeaderMap) -> Response {
	let is_preflight = headers.contains_key(header::ORIGIN)
		&& headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
		&& headers.contains_key(header::ACCESS_CONTROL_REQUEST_HEADERS);

	if !is_preflight {
		return StatusCode::OK.into_response();
	}

	(StatusCode::OK, [
		(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
		(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Digest, Authorization"),
		(header::ACCESS_CONTROL_MAX_AGE, "86400"),
	])
		.into_response()
}

async fn with_cors(State(state): State<AppState>, req: Request, next: Next) -> Response {
	let mut response = next.run(req).await;

	if let Ok(origin) = HeaderValue::from_str(&state.service.cfg.service.cors_origin) {
		let headers = response.headers_mut();

		headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
		headers.insert(header::VARY, HeaderValue::from_static("origin"));
	}

	response
}

/// Resolves the calling user from the request headers.
///
/// When an API token is configured, every request must carry it as a bearer
/// credential. The user identity itself comes from the configured identity
/// header, stamped by the auth proxy in front of this service.
fn caller(state: &AppState, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
	let security = &state.service.cfg.security;

	if let Some(expected) = security.api_auth_token.as_deref() {
		let bearer = headers
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "));

		if bearer != Some(expected) {
			return Err(ApiError::from(ServiceError::Unauthenticated {
				message: "A valid bearer token is required.".to_string(),
			}));
		}
	}

	let user_id = headers
		.get(security.user_id_header.as_str())
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.map(str::to_string);

	Ok(user_id)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
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
			ServiceError::Unauthenticated { .. } =>
				Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message),
			ServiceError::Forbidden { .. } =>
				Self::new(StatusCode::FORBIDDEN, "forbidden", message),
			ServiceError::NotFound { .. } =>
				Self::new(StatusCode::NOT_FOUND, "not_found", message),
			ServiceError::InvalidRequest { .. } =>
				Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_request", message),
			ServiceError::Embedding { .. } =>
				Self::new(StatusCode::BAD_GATEWAY, "embedding_provider", message),
			ServiceError::Model { .. } =>
				Self::new(StatusCode::BAD_GATEWAY, "model_provider", message),
			ServiceError::Storage { .. } =>
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", message),
			ServiceError::Cancelled =>
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message),
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
