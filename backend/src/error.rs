use rocket::http::Status;
use rocket::response::Responder;
use shared::validation::ValidationError;
use thiserror::Error;
use tracing::error;

use crate::{queue::QueueError, store::StoreError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid vote: {0}")]
    InvalidVote(#[from] ValidationError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let (status, body) = match self {
            ApiError::InvalidVote(_) => (Status::BadRequest, self.to_string()),
            ApiError::Queue(_) | ApiError::Store(_) => {
                error!(path = %req.uri(), "Request failed: {}", self);
                (Status::InternalServerError, "Internal server error".to_string())
            }
        };

        rocket::Response::build_from(body.respond_to(req)?)
            .status(status)
            .ok()
    }
}
