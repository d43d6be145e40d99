//! Serde-deserializable types matching the REST backend's wire format.
//!
//! These are kept apart from [`super::types`] so the envelope quirks (the
//! collection is keyed by the resource name, problem details use `title`)
//! stay at the transport boundary.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::error::{ApiFault, ResponseStatus};
use super::types::PagedResult;

/// Re-serialize a value through JSON to convert between compatible types.
/// Used to lift loosely typed records into the few typed ones the loader inspects.
pub fn reserialize<T: DeserializeOwned>(value: impl Serialize) -> serde_json::Result<T> {
  serde_json::from_value(serde_json::to_value(value)?)
}

// ============================================================================
// Collection endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPaginationMetadata {
  #[serde(rename = "currentPage")]
  pub current_page: u32,
  #[serde(rename = "totalPageCount")]
  pub total_page_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiListResponse {
  #[serde(rename = "paginationMetadata")]
  pub pagination_metadata: ApiPaginationMetadata,
  // The item array sits under a key named after the resource
  #[serde(flatten)]
  pub rest: serde_json::Map<String, Value>,
}

impl ApiListResponse {
  pub fn into_page(mut self, resource: &str) -> Result<PagedResult<Value>> {
    let items = match self.rest.remove(resource) {
      Some(Value::Array(items)) => items,
      Some(other) => {
        return Err(eyre!(
          "Expected '{}' to be an array, got {}",
          resource,
          other
        ))
      }
      None => Vec::new(),
    };

    Ok(PagedResult {
      items,
      current_page: self.pagination_metadata.current_page,
      total_page_count: self.pagination_metadata.total_page_count,
    })
  }
}

// ============================================================================
// Problem details (error envelope)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProblemDetails {
  pub status: ResponseStatus,
  pub title: String,
  #[serde(rename = "traceId")]
  pub trace_id: String,
}

impl From<ApiProblemDetails> for ApiFault {
  fn from(details: ApiProblemDetails) -> Self {
    ApiFault {
      message: details.title,
      response_status: details.status,
      trace_id: details.trace_id,
    }
  }
}

/// Recognize a problem-details body. Anything else yields `None`.
pub fn parse_fault(body: &str) -> Option<ApiFault> {
  serde_json::from_str::<ApiProblemDetails>(body)
    .ok()
    .map(ApiFault::from)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_list_response_items_keyed_by_resource() {
    let body = json!({
      "paginationMetadata": { "currentPage": 1, "totalPageCount": 3 },
      "countries": [{ "id": 1, "name": "Norway" }, { "id": 2, "name": "Chile" }]
    });
    let response: ApiListResponse = serde_json::from_value(body).unwrap();
    let page = response.into_page("countries").unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.current_page, 1);
    assert_eq!(page.total_page_count, 3);
  }

  #[test]
  fn test_list_response_missing_collection_is_empty() {
    let body = json!({ "paginationMetadata": { "currentPage": 1, "totalPageCount": 1 } });
    let response: ApiListResponse = serde_json::from_value(body).unwrap();
    assert!(response.into_page("attachments").unwrap().items.is_empty());
  }

  #[test]
  fn test_list_response_non_array_is_error() {
    let body = json!({
      "paginationMetadata": { "currentPage": 1, "totalPageCount": 1 },
      "attachments": "nope"
    });
    let response: ApiListResponse = serde_json::from_value(body).unwrap();
    assert!(response.into_page("attachments").is_err());
  }

  #[test]
  fn test_parse_fault() {
    let fault = parse_fault(r#"{"status":412,"title":"Precondition Failed","traceId":"abc"}"#)
      .expect("problem details");
    assert_eq!(fault.message, "Precondition Failed");
    assert_eq!(fault.response_status, ResponseStatus::Code(412));
    assert_eq!(fault.trace_id, "abc");
  }

  #[test]
  fn test_parse_fault_rejects_other_shapes() {
    assert!(parse_fault("<html>Bad Gateway</html>").is_none());
    assert!(parse_fault(r#"{"error":"boom"}"#).is_none());
  }
}
