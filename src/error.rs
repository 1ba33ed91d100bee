use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("message store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("unknown user id {0}")]
    UnknownUser(i64),
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    message: String,
}

impl ResponseError for FeedError {
    fn status_code(&self) -> StatusCode {
        match self {
            FeedError::Validation(_) => StatusCode::BAD_REQUEST,
            FeedError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FeedError::UnknownUser(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            ok: false,
            message: self.to_string(),
        })
    }
}
