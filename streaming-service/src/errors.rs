use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamingError>;

#[derive(Error, Debug)]
pub enum StreamingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: String, available: String },

    #[error("Duplicate playback session: {0}")]
    DuplicateSession(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] exchange_gateway::GatewayError),

    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<royalty_core::Error> for StreamingError {
    fn from(err: royalty_core::Error) -> Self {
        use royalty_core::Error;
        match err {
            Error::InvalidInput(msg) => StreamingError::Validation(msg),
            Error::InsufficientBalance { requested, available } => {
                StreamingError::InsufficientBalance { requested, available }
            }
            Error::DuplicateSession(id) => StreamingError::DuplicateSession(id),
            Error::TrackNotFound(id) => StreamingError::NotFound(format!("Track {}", id)),
            Error::ArtistNotFound(wallet) => {
                StreamingError::NotFound(format!("Artist {}", wallet))
            }
            Error::EntryNotFound(id) => StreamingError::NotFound(format!("Entry {}", id)),
            other => StreamingError::Internal(other.to_string()),
        }
    }
}

impl ResponseError for StreamingError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            StreamingError::Validation(_) => StatusCode::BAD_REQUEST,
            StreamingError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            StreamingError::DuplicateSession(_) => StatusCode::CONFLICT,
            StreamingError::NotFound(_) => StatusCode::NOT_FOUND,
            StreamingError::Exchange(_) => StatusCode::BAD_GATEWAY,
            StreamingError::ConsistencyFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StreamingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl StreamingError {
    fn error_type(&self) -> &str {
        match self {
            StreamingError::Validation(_) => "validation_error",
            StreamingError::InsufficientBalance { .. } => "insufficient_balance",
            StreamingError::DuplicateSession(_) => "duplicate_session",
            StreamingError::NotFound(_) => "not_found",
            StreamingError::Exchange(_) => "exchange_error",
            StreamingError::ConsistencyFault(_) => "consistency_fault",
            StreamingError::Internal(_) => "internal_error",
        }
    }
}
