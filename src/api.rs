use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ShortLinkResponse {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

#[derive(Debug, Serialize)]
pub struct Error {
    pub error: String,
    pub error_id: String,
}

/// JSON error body tagged with a fresh id that is also logged server-side.
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub error_id: Uuid,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            error_id: Uuid::new_v4(),
        }
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(Error {
                error: self.error,
                error_id: self.error_id.to_string(),
            }),
        )
            .into_response()
    }
}
