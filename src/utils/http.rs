use serde::{Deserialize, Serialize};

/// Response envelope shared by every endpoint: `{status, message, ...body}`.
#[derive(Debug, Deserialize, Serialize)]
pub struct HttpResponse<T> {
    pub status: String,
    pub message: String,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Empty {}

impl<T> HttpResponse<T> {
    pub fn success(message: impl Into<String>, body: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            body,
        }
    }
}

impl HttpResponse<Empty> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            body: Empty {},
        }
    }
}
