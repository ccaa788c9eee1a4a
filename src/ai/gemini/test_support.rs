use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockBuilder};

pub const GENERATE_CONTENT_PATH_REGEX: &str = r"^/v1beta/models/[^/:]+:generateContent$";
pub const PREDICT_PATH_REGEX: &str = r"^/v1beta/models/[^/:]+:predict$";
pub const PREDICT_LONG_RUNNING_PATH_REGEX: &str = r"^/v1beta/models/[^/:]+:predictLongRunning$";

pub fn post_path_regex(regex: &str) -> MockBuilder {
    Mock::given(method("POST")).and(path_regex(regex))
}

pub fn inline_response(mime_type: &str, data: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "inlineData": { "mimeType": mime_type, "data": data }
                }]
            }
        }]
    })
}
