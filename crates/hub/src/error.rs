// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request failures and the introspection envelope.
//!
//! Failures render as a short plain-text body under the matching status code;
//! the transcoders and scripts driving the hub key on the status line, not on
//! a structured body. The JSON listing endpoints wrap their payload in an
//! `{errno, error, data}` envelope so the admin pages can tell "empty" from
//! "failed".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// A failure surfaced on the HTTP boundary. None of these mutate state.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The remote address matched none of the trusted-IP patterns.
    #[error("forbidden")]
    Untrusted,
    /// The request is malformed (bad path, missing query parameter).
    #[error("{0}")]
    BadRequest(String),
    /// The hub could not hold up its side of the contract (template missing,
    /// sentinel not creatable).
    #[error("{0}")]
    Internal(String),
}

impl HubError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Untrusted => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// `errno` value for a successful listing.
const ERRNO_OK: u8 = 0;

/// `errno` value when the addressed directory does not exist.
const ERRNO_NOT_FOUND: u8 = 1;

/// Envelope for the JSON introspection endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: u8,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { errno: ERRNO_OK, error: "ok".to_owned(), data: Some(data) }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self { errno: ERRNO_NOT_FOUND, error: error.into(), data: None }
    }
}
