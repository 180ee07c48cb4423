use url::Url;

const SENSITIVE_PARAMS: [&str; 6] = ["username", "password", "user", "pass", "pwd", "passwd"];

/// URL helpers used when logging or echoing source descriptors
pub struct UrlUtils;

impl UrlUtils {
    /// Mask `user:pass@` and credential-looking query parameters.
    ///
    /// Strings that do not parse as URLs are returned unchanged.
    pub fn obfuscate_credentials(url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };

        if !parsed.username().is_empty() || parsed.password().is_some() {
            let _ = parsed.set_username("****");
            let _ = parsed.set_password(Some("****"));
        }

        if parsed.query().is_some() {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(key, value)| {
                    let masked = SENSITIVE_PARAMS
                        .iter()
                        .any(|param| key.eq_ignore_ascii_case(param));
                    let value = if masked { "****".to_string() } else { value.into_owned() };
                    (key.into_owned(), value)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
        }

        parsed.to_string()
    }
}
