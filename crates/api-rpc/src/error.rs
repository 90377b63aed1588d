//! RPC Error Types
//!
//! Maps application errors to stable JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use ticketline_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const INVALID_INPUT: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const QUEUE_PAUSED: i32 = 4003;
    pub const INVALID_STATE: i32 = 4004;
    pub const UNAUTHORIZED: i32 = 4005;
    pub const MALFORMED_RECORD: i32 = 4006;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = match &err {
        AppError::InvalidInput(_) | AppError::Serialization(_) => code::INVALID_INPUT,
        AppError::NotFound(_) => code::NOT_FOUND,
        AppError::Conflict(_) => code::CONFLICT,
        AppError::QueuePaused(_) => code::QUEUE_PAUSED,
        AppError::InvalidState(_) => code::INVALID_STATE,
        AppError::Unauthorized(_) => code::UNAUTHORIZED,
        AppError::MalformedRecord(_) => code::MALFORMED_RECORD,
        AppError::Database(_) => code::DB_ERROR,
        AppError::Config(_) | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    ErrorObjectOwned::owned(code, err.to_string(), Some(err.kind()))
}

/// Failure to bring the RPC server up
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind JSON-RPC server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register method {method}: {reason}")]
    Register { method: &'static str, reason: String },
}
