use serde::Serialize;

/// Success envelope shared by every handler: `{"status":"success","data":...}`.
/// Errors go through `ApiError`, which serializes to the same shape with a
/// `message` field instead of `data`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success { data: T },
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse::Success { data }
    }
}
