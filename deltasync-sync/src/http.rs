//! Shared blocking HTTP plumbing.

use std::time::Duration;

use crate::error::SyncError;

/// Longest slice of an error body carried into a [`SyncError::Transfer`].
const MAX_ERROR_BODY: usize = 256;

/// Build an agent; without a timeout every call blocks until it completes.
pub fn agent(timeout: Option<Duration>) -> ureq::Agent {
    let mut builder = ureq::AgentBuilder::new();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Send `request`, turning any non-success status into a transfer error.
pub(crate) fn call(request: ureq::Request, url: &str) -> Result<ureq::Response, SyncError> {
    match request.call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            let body: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
            Err(SyncError::Transfer {
                url: url.to_string(),
                reason: format!("HTTP {code}: {body}"),
            })
        }
        Err(ureq::Error::Transport(transport)) => Err(SyncError::Transfer {
            url: url.to_string(),
            reason: transport.to_string(),
        }),
    }
}
