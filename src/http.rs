use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderName, StatusCode, header},
    response::IntoResponse,
    routing,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    allocator::LinkCreationStatus,
    api::{self, ShortenedLink},
    link_service::{LinkService, ResolveError, RevokeError, ShortenError, ShortenRequest},
};

type ErrorResponse = (StatusCode, Json<api::Error>);

/// `POST /` shortens, `GET /{key}` redirects, `DELETE /{key}` revokes.
///
/// `GET /` and `DELETE /` reach the service with an empty key and are
/// rejected as bad requests.
pub fn router(link_service: Arc<dyn LinkService>) -> Router {
    Router::new()
        .route(
            "/",
            routing::post(shorten)
                .get(resolve_missing_key)
                .delete(revoke_missing_key),
        )
        .route("/{key}", routing::get(resolve).delete(revoke))
        .with_state(link_service)
}

#[instrument(skip(link_service))]
async fn shorten(
    State(link_service): State<Arc<dyn LinkService>>,
    body: String,
) -> impl IntoResponse {
    let result = match ShortenRequest::from_json(&body) {
        Ok(ShortenRequest { url }) => link_service.shorten(&url).await,
        Err(validation_error) => Err(validation_error.into()),
    };

    result
        .map(|(link, creation_status)| {
            (
                match creation_status {
                    LinkCreationStatus::NewlyCreated => StatusCode::CREATED,
                    LinkCreationStatus::AlreadyExists => StatusCode::OK,
                },
                Json(ShortenedLink::from(link)),
            )
        })
        .map_err(|error: ShortenError| match error {
            ShortenError::Validation(_) => client_error(StatusCode::BAD_REQUEST, &error),
            ShortenError::AllocationExhausted { .. } => {
                internal_error(StatusCode::SERVICE_UNAVAILABLE, &error)
            }
            ShortenError::Store(_) => internal_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
        })
}

#[instrument(skip(link_service))]
async fn resolve(
    State(link_service): State<Arc<dyn LinkService>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    resolve_key(link_service.as_ref(), &key).await
}

#[instrument(skip(link_service))]
async fn resolve_missing_key(
    State(link_service): State<Arc<dyn LinkService>>,
) -> impl IntoResponse {
    resolve_key(link_service.as_ref(), "").await
}

async fn resolve_key(
    link_service: &dyn LinkService,
    key: &str,
) -> Result<(StatusCode, [(HeaderName, String); 1]), ErrorResponse> {
    link_service
        .resolve(key)
        .await
        .map(|resolved| (StatusCode::FOUND, [(header::LOCATION, resolved.long_url)]))
        .map_err(|error: ResolveError| match error {
            ResolveError::Validation(_) => client_error(StatusCode::BAD_REQUEST, &error),
            ResolveError::NotFound => client_error(StatusCode::NOT_FOUND, &error),
            ResolveError::Store(_) => internal_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
        })
}

#[instrument(skip(link_service))]
async fn revoke(
    State(link_service): State<Arc<dyn LinkService>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    revoke_key(link_service.as_ref(), &key).await
}

#[instrument(skip(link_service))]
async fn revoke_missing_key(
    State(link_service): State<Arc<dyn LinkService>>,
) -> impl IntoResponse {
    revoke_key(link_service.as_ref(), "").await
}

async fn revoke_key(
    link_service: &dyn LinkService,
    key: &str,
) -> Result<StatusCode, ErrorResponse> {
    link_service
        .revoke(key)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error: RevokeError| match error {
            RevokeError::Validation(_) => client_error(StatusCode::BAD_REQUEST, &error),
            RevokeError::NotFound => client_error(StatusCode::NOT_FOUND, &error),
            RevokeError::Store(_) => internal_error(StatusCode::INTERNAL_SERVER_ERROR, &error),
        })
}

fn client_error(status: StatusCode, error: &impl std::error::Error) -> ErrorResponse {
    let err_uuid = Uuid::new_v4();
    info!(?err_uuid, ?error, "User submitted a bad request");
    (
        status,
        Json(api::Error {
            error: client_message(error),
            error_id: err_uuid.to_string(),
        }),
    )
}

fn internal_error(status: StatusCode, error: &impl std::error::Error) -> ErrorResponse {
    let err_uuid = Uuid::new_v4();
    error!(?err_uuid, ?error, "Encountered an error during a request");
    (
        status,
        Json(api::Error {
            error: if status == StatusCode::SERVICE_UNAVAILABLE {
                error.to_string()
            } else {
                "Internal server error".to_owned()
            },
            error_id: err_uuid.to_string(),
        }),
    )
}

/// Validation failures surface their bare reason, e.g. `url_missing`.
fn client_message(error: &impl std::error::Error) -> String {
    error
        .source()
        .map_or_else(|| error.to_string(), ToString::to_string)
}
