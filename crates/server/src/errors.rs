use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use comanda_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;

/// JSON error response for the API routes. Only the user-safe message and the
/// correlation id leave the process; the detail goes to the logs.
#[derive(Debug)]
pub struct HttpError(pub InterfaceError);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
}

impl HttpError {
    pub fn new(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    pub fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use comanda_core::errors::ApplicationError;

    use super::HttpError;

    #[test]
    fn application_errors_map_to_http_statuses() {
        let cases = [
            (ApplicationError::Validation("unknown tenant".to_string()), StatusCode::BAD_REQUEST),
            (ApplicationError::NotFound("order".to_string()), StatusCode::NOT_FOUND),
            (ApplicationError::Gateway("whatsapp 500".to_string()), StatusCode::SERVICE_UNAVAILABLE),
            (
                ApplicationError::Configuration("bad key".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = HttpError::new(error, "req-1").into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
