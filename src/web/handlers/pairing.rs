//! Pairing code issuance and exchange

use axum::{Json, extract::State, response::Response};

use crate::errors::AppError;
use crate::models::{PairRequest, PairingCodeResponse, TokenResponse};
use crate::web::{AppState, ValidatedJson, handle_result};

/// Current pairing code; a new one is issued if the old one expired
#[utoipa::path(
    get,
    path = "/pairing-code",
    tag = "auth",
    responses((status = 200, description = "Live pairing code", body = PairingCodeResponse))
)]
pub async fn pairing_code(State(state): State<AppState>) -> Json<PairingCodeResponse> {
    Json(state.auth.pairing_code())
}

/// Exchange the pairing code for a bearer token
#[utoipa::path(
    post,
    path = "/pair",
    tag = "auth",
    request_body = PairRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Pairing code mismatch or expired")
    )
)]
pub async fn pair(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<PairRequest>,
) -> Response {
    handle_result(state.auth.exchange(&request.code).map_err(AppError::from))
}
