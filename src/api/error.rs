//! Failure types for resource fetches and the normalizer that splits them.
//!
//! A fetch fails in one of two ways:
//! - [`FetchError::Fault`]: the backend answered with a problem-details
//!   envelope (bad request, validation conflict, stale etag). These are
//!   expected; they are stored on the view-model and never retried.
//! - [`FetchError::Unexpected`]: anything else (transport failure, malformed
//!   body, programming error). These propagate to the caller.

use std::fmt;

use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP status as reported inside a problem-details body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseStatus {
  Code(u16),
  Text(String),
}

impl fmt::Display for ResponseStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Code(code) => write!(f, "{}", code),
      Self::Text(text) => f.write_str(text),
    }
  }
}

/// Normalized backend fault, ready to be shown in a fault banner.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} (status {response_status}, trace {trace_id})")]
#[serde(rename_all = "camelCase")]
pub struct ApiFault {
  pub message: String,
  pub response_status: ResponseStatus,
  pub trace_id: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
  #[error(transparent)]
  Fault(#[from] ApiFault),
  #[error("{0:#}")]
  Unexpected(Report),
}

// Report is not a std Error, so thiserror's #[from] can't be used here
impl From<Report> for FetchError {
  fn from(report: Report) -> Self {
    Self::Unexpected(report)
  }
}

/// Turn a fetch failure into a storable fault, or hand back the unexpected
/// error for the caller to propagate.
pub fn normalize(error: FetchError) -> Result<ApiFault, Report> {
  match error {
    FetchError::Fault(fault) => Ok(fault),
    FetchError::Unexpected(report) => Err(report),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  fn fault() -> ApiFault {
    ApiFault {
      message: "Conflict".to_string(),
      response_status: ResponseStatus::Code(409),
      trace_id: "00-abc-01".to_string(),
    }
  }

  #[test]
  fn test_normalize_fault() {
    let normalized = normalize(FetchError::Fault(fault()));
    assert_eq!(normalized.ok(), Some(fault()));
  }

  #[test]
  fn test_normalize_unexpected_is_propagated() {
    let normalized = normalize(FetchError::Unexpected(eyre!("connection reset")));
    let report = normalized.expect_err("unexpected errors are not normalized");
    assert_eq!(report.to_string(), "connection reset");
  }

  #[test]
  fn test_status_accepts_number_or_text() {
    let numeric: ApiFault =
      serde_json::from_str(r#"{"message":"x","responseStatus":400,"traceId":"t"}"#).unwrap();
    assert_eq!(numeric.response_status, ResponseStatus::Code(400));

    let text: ApiFault =
      serde_json::from_str(r#"{"message":"x","responseStatus":"Bad Request","traceId":"t"}"#)
        .unwrap();
    assert_eq!(text.response_status.to_string(), "Bad Request");
  }

  #[test]
  fn test_fault_display() {
    assert_eq!(fault().to_string(), "Conflict (status 409, trace 00-abc-01)");
  }
}
