//! Application error types with MCP protocol conversion.

use rmcp::model::ErrorCode;
use serde_json::json;
use thiserror::Error;

/// Application-level errors for the OData-to-MCP bridge.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {message}")]
    Auth { message: String, status: Option<u16> },

    #[error("failed to parse $metadata: {0}")]
    MetadataParse(String),

    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("operation refused: {0}")]
    PermissionDenied(String),

    #[error("OData error ({status}): {message}")]
    OData {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("value normalization error: {0}")]
    Normalization(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<AppError> for rmcp::model::ErrorData {
    fn from(err: AppError) -> Self {
        let (code, app_code) = match &err {
            AppError::ToolNotFound(_) => (ErrorCode::METHOD_NOT_FOUND, "TOOL_NOT_FOUND"),
            AppError::InvalidParams(_) => (ErrorCode::INVALID_PARAMS, "INVALID_PARAMS"),
            AppError::PermissionDenied(_) => (ErrorCode::INTERNAL_ERROR, "PERMISSION_DENIED"),
            AppError::Auth { .. } => (ErrorCode::INTERNAL_ERROR, "AUTH_ERROR"),
            AppError::OData { .. } => (ErrorCode::INTERNAL_ERROR, "ODATA_ERROR"),
            AppError::Network(_) => (ErrorCode::INTERNAL_ERROR, "NETWORK_ERROR"),
            AppError::MetadataParse(_) => (ErrorCode::INTERNAL_ERROR, "METADATA_PARSE_ERROR"),
            AppError::Normalization(_) => (ErrorCode::INTERNAL_ERROR, "NORMALIZATION_ERROR"),
            AppError::Cancelled => (ErrorCode::INTERNAL_ERROR, "CANCELLED"),
            AppError::Config(_) => (ErrorCode::INTERNAL_ERROR, "CONFIG_ERROR"),
        };

        let data = match &err {
            AppError::PermissionDenied(reason) => Some(json!({ "kind": "PermissionDenied", "reason": reason })),
            AppError::Auth { status, .. } => Some(json!({ "kind": "AuthError", "statusCode": status })),
            AppError::OData { status, code, .. } => {
                Some(json!({ "kind": "ODataError", "statusCode": status, "odataCode": code }))
            }
            AppError::Network(_) => Some(json!({ "kind": "NetworkError" })),
            _ => None,
        };

        rmcp::model::ErrorData::new(code, format!("[{}] {}", app_code, err), data)
    }
}
