// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io;
use parley::error::{ApiError, ParleyError};

#[test]
fn test_io_error_conversion() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
    let error: ParleyError = io_error.into();

    match error {
        ParleyError::Io(_) => {} // Expected
        _ => panic!("Expected Io error, got different error type"),
    }
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: ParleyError = json_error.into();
    assert!(matches!(error, ParleyError::Json(_)));
}

#[test]
fn test_config_error_display() {
    let error = ParleyError::Config("Missing API key".to_string());
    assert_eq!(error.to_string(), "Configuration error: Missing API key");
}

#[test]
fn test_not_found_error_display() {
    let error = ParleyError::NotFound("thread 1234".to_string());
    assert_eq!(error.to_string(), "Not found: thread 1234");
}

#[test]
fn test_cancelled_display() {
    assert_eq!(ParleyError::Cancelled.to_string(), "Turn cancelled");
}

#[test]
fn test_api_rate_limited_error() {
    let error = ApiError::RateLimited(30);
    assert_eq!(error.to_string(), "Rate limited: retry after 30 seconds");
}

#[test]
fn test_api_context_too_long_error() {
    let error = ApiError::ContextTooLong {
        current: 150000,
        limit: 100000,
    };
    assert_eq!(
        error.to_string(),
        "Context too long: 150000 tokens exceeds limit of 100000"
    );
}

#[test]
fn test_api_error_wraps_into_parley_error() {
    let error: ParleyError = ApiError::ServerError {
        status: 503,
        message: "overloaded".to_string(),
    }
    .into();
    assert_eq!(error.to_string(), "API error: API error (503): overloaded");
}

#[test]
fn test_recoverable_errors_keep_session_alive() {
    assert!(ParleyError::Connectivity("refused".to_string()).is_recoverable());
    assert!(ParleyError::NotFound("thread".to_string()).is_recoverable());
    assert!(ParleyError::Cancelled.is_recoverable());
    assert!(ParleyError::Api(ApiError::AuthenticationFailed).is_recoverable());
    assert!(ParleyError::Mcp("server exited".to_string()).is_recoverable());
}

#[test]
fn test_config_errors_are_fatal() {
    assert!(!ParleyError::Config("bad".to_string()).is_recoverable());
}
