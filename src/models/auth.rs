use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PairRequest {
    #[serde(alias = "pair_code")]
    #[schema(example = "K7M2QX")]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeResponse {
    #[schema(example = "K7M2QX")]
    pub code: String,
    /// Seconds until the code rotates
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    /// Seconds until the token stops being accepted
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_request_accepts_legacy_field_name() {
        let request: PairRequest = serde_json::from_str(r#"{"pair_code":"ABC123"}"#).unwrap();
        assert_eq!(request.code, "ABC123");
    }
}
