// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Parley
//!
//! Every fallible operation in the crate returns [`ParleyError`]. The variants
//! follow the session's failure taxonomy: configuration problems are fatal at
//! startup, while connectivity, lookup, and provider failures leave the session
//! alive so the user can retry or switch models.

use thiserror::Error;

/// Main error type for Parley operations
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Unknown provider, missing credential, or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local runtime or cloud API unreachable
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Thread lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected user-supplied value (empty thread name and the like)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The user interrupted a running turn
    #[error("Turn cancelled")]
    Cancelled,

    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    Tool(String),

    /// Checkpoint store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Tool-server (MCP) errors
    #[error("MCP error: {0}")]
    Mcp(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Context window exceeded
    #[error("Context too long: {current} tokens exceeds limit of {limit}")]
    ContextTooLong { current: u32, limit: u32 },

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;

impl From<reqwest::Error> for ParleyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ParleyError::Connectivity(err.to_string())
        } else {
            ParleyError::Http(err)
        }
    }
}

impl From<rusqlite::Error> for ParleyError {
    fn from(err: rusqlite::Error) -> Self {
        ParleyError::Store(err.to_string())
    }
}

impl ParleyError {
    /// Whether the chat session can keep running after this error.
    ///
    /// Configuration errors are the only ones that end a session, and only
    /// when raised at startup.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ParleyError::Config(_) | ParleyError::Io(_))
    }
}
