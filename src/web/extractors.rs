//! Request extractors
//!
//! [`ValidatedJson`] is `Json` with rejections rendered through the shared
//! error envelope, so a malformed or over-specified body is a plain 400.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    response::Response,
};
use serde::de::DeserializeOwned;

use super::responses::bad_request;

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request(&rejection_message(&rejection))),
        }
    }
}

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected request with `Content-Type: application/json`".to_string()
        }
        other => other.body_text(),
    }
}
