//! Shared request/response handling for the collaborator services.

use pinrelay_core::collaborators::CollaboratorError;
use serde::de::DeserializeOwned;

/// Errors from a single HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },
}

impl ApiError {
    /// Classify for the stage-tasks, tagging the service name.
    pub fn into_collaborator(self, service: &'static str) -> CollaboratorError {
        match self {
            ApiError::Request(e) if e.is_decode() => CollaboratorError::InvalidResponse {
                service,
                message: e.to_string(),
            },
            ApiError::Request(e) => CollaboratorError::Unavailable {
                service,
                message: e.to_string(),
            },
            ApiError::Status { status, body } => CollaboratorError::Rejected {
                service,
                status,
                message: body,
            },
        }
    }
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or [`ApiError::Status`] with the body text.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

/// Assert the response has a success status code, discarding the body.
pub async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
    ensure_success(response).await?;
    Ok(())
}
