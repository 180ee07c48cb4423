//! OpenAPI document generated from the handler annotations

use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Camera Bridge API",
        description = "Control plane for per-camera transcoding sessions. Pair with `/pairing-code` and `/pair`, then send the token as `Authorization: Bearer <token>` (or `?access_token=` for media players)."
    ),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Pairing code and token issuance"),
        (name = "streams", description = "Session control, status and HLS artifacts"),
    ),
    paths(
        crate::web::handlers::health::health_check,
        crate::web::handlers::pairing::pairing_code,
        crate::web::handlers::pairing::pair,
        crate::web::handlers::streams::start_stream,
        crate::web::handlers::streams::stop_stream,
        crate::web::handlers::streams::device_status,
        crate::web::handlers::streams::list_sessions,
        crate::web::handlers::events::stream_events,
        crate::web::handlers::artifacts::serve_artifact,
    ),
    components(schemas(
        crate::models::HealthResponse,
        crate::models::PairRequest,
        crate::models::PairingCodeResponse,
        crate::models::TokenResponse,
        crate::models::StartStreamRequest,
        crate::models::StartStreamResponse,
        crate::models::StopStreamResponse,
        crate::models::SessionStatus,
        crate::models::SessionEvent,
        crate::web::responses::ApiResponse,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    let mut openapi = ApiDoc::openapi();
    openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
    openapi
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(get_openapi_spec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let spec = get_openapi_spec();
        for path in [
            "/health",
            "/pairing-code",
            "/pair",
            "/devices/{device_id}/streams",
            "/devices/{device_id}/status",
            "/devices",
            "/events",
            "/stream/{device_id}/{artifact}",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
