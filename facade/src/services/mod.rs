pub mod redirect;
pub mod resolution;

pub use redirect::UriRewriter;
pub use resolution::{ResolutionEngine, ResolutionOutcome, SearchOutcome, UpstreamFailure};

use crate::api::models::ApiResponse;
use axum::{Json, http::StatusCode, response::IntoResponse};
use tracing::error;

pub struct AppError(pub common::Error);

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError(common::Error::InvalidInput(message.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status_code = match self.0 {
            common::Error::InvalidInput(_) | common::Error::InvalidUri(_) => {
                StatusCode::BAD_REQUEST
            }
            common::Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            common::Error::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status_code.is_server_error() {
            error!(status = %status_code, error = %self.0, "Request failed");
        }

        let body = Json(ApiResponse::<()>::error(self.0.to_string()));
        (status_code, body).into_response()
    }
}

impl From<common::Error> for AppError {
    fn from(err: common::Error) -> Self {
        AppError(err)
    }
}
