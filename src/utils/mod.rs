pub mod url;
pub mod validation;

pub use url::UrlUtils;
pub use validation::{ValidationError, validate_artifact_name, validate_device_id};
