use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::PostingService;
use crate::orchestrator::{Orchestrator, SubmitError};
use crate::submission::{
    CONFIG_ERROR, ErrorBody, POST_ERROR, SUCCESS_MESSAGE, SubmissionRequest, SuccessBody,
};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    configured: bool,
}

pub fn router<S: PostingService + 'static>(orchestrator: Arc<Orchestrator<S>>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/api/tweet", post(submit::<S>))
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
}

async fn health<S: PostingService + 'static>(
    State(orchestrator): State<Arc<Orchestrator<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        configured: orchestrator.service().is_ok(),
    })
}

async fn submit<S: PostingService + 'static>(
    State(orchestrator): State<Arc<Orchestrator<S>>>,
    payload: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Result<Json<SuccessBody>, SubmitError> {
    // A missing credential outranks a malformed body.
    orchestrator.service()?;
    let Json(request) = payload.map_err(|rejection| SubmitError::Post(rejection.body_text()))?;

    let result = orchestrator.submit(request).await?;
    Ok(Json(SuccessBody {
        success: true,
        tweet_id: result.primary_post_id.0,
        message: SUCCESS_MESSAGE.to_string(),
    }))
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let error = match &self {
            SubmitError::Configuration(e) => {
                tracing::error!(error = %e, "submission rejected: server misconfigured");
                CONFIG_ERROR
            }
            SubmitError::Post(detail) => {
                tracing::error!(error = %detail, "submission failed");
                POST_ERROR
            }
        };

        let body = ErrorBody {
            error: error.to_string(),
            details: self.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
