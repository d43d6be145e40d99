use async_trait::async_trait;
use color_eyre::eyre::eyre;
use reqwest::header::{ETAG, IF_MATCH};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::api::api_types::{parse_fault, ApiListResponse};
use crate::api::error::FetchError;
use crate::api::types::{Etagged, PagedResult, ResourceQuery};
use crate::config::Config;

/// Primitive operations over a named REST resource.
///
/// Expected backend faults come back as [`FetchError::Fault`]; callers never
/// need to inspect error shapes.
#[async_trait]
pub trait ResourceClient: Send + Sync {
  /// Fetch one page of a collection.
  async fn get(&self, resource: &str, query: &ResourceQuery)
    -> Result<PagedResult<Value>, FetchError>;

  /// Fetch a single item, optionally restricted to `fields`.
  async fn get_one(
    &self,
    resource: &str,
    id: &str,
    fields: &[&str],
  ) -> Result<Etagged<Value>, FetchError>;

  /// Patch an item; returns the new etag.
  async fn patch(
    &self,
    resource: &str,
    id: &str,
    body: &Value,
    etag: Option<&str>,
  ) -> Result<Option<String>, FetchError>;
}

/// REST client wrapper
#[derive(Clone)]
pub struct HttpResourceClient {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpResourceClient {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let token = Config::get_api_token().ok();

    // Url::join drops the last path segment unless it ends with '/'
    let mut base = config.api.base_url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid api.base_url '{}': {}", base, e))?;

    let client = reqwest::Client::builder()
      .user_agent(concat!("engage/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  fn url(&self, segments: &[&str]) -> Result<Url, FetchError> {
    let path = segments.join("/");
    self
      .base_url
      .join(&path)
      .map_err(|e| FetchError::Unexpected(eyre!("Invalid resource path '{}': {}", path, e)))
  }

  fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, FetchError> {
    let response = self
      .authorize(request)
      .send()
      .await
      .map_err(|e| eyre!("Failed to {}: {}", what, e))?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body, what))
  }
}

/// Error for a non-2xx response: a problem-details body is an expected
/// fault, anything else is unexpected.
fn classify_failure(status: StatusCode, body: &str, what: &str) -> FetchError {
  match parse_fault(body) {
    Some(fault) => FetchError::Fault(fault),
    None => FetchError::Unexpected(eyre!("Failed to {}: HTTP {}: {}", what, status, body)),
  }
}

fn etag_of(response: &Response) -> Option<String> {
  response
    .headers()
    .get(ETAG)
    .and_then(|v| v.to_str().ok())
    .map(String::from)
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
  async fn get(
    &self,
    resource: &str,
    query: &ResourceQuery,
  ) -> Result<PagedResult<Value>, FetchError> {
    let mut url = self.url(&[resource])?;
    url.query_pairs_mut().extend_pairs(query.to_pairs());
    debug!(%url, "GET page");

    let what = format!("get {}", resource);
    let response = self.send(self.client.get(url), &what).await?;
    let body: ApiListResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {} page: {}", resource, e))?;

    Ok(body.into_page(resource)?)
  }

  async fn get_one(
    &self,
    resource: &str,
    id: &str,
    fields: &[&str],
  ) -> Result<Etagged<Value>, FetchError> {
    let mut url = self.url(&[resource, id])?;
    if !fields.is_empty() {
      url.query_pairs_mut().append_pair("fields", &fields.join(","));
    }
    debug!(%url, "GET one");

    let what = format!("get {} {}", resource, id);
    let response = self.send(self.client.get(url), &what).await?;
    let etag = etag_of(&response);
    let item: Value = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {} {}: {}", resource, id, e))?;

    Ok(Etagged { item, etag })
  }

  async fn patch(
    &self,
    resource: &str,
    id: &str,
    body: &Value,
    etag: Option<&str>,
  ) -> Result<Option<String>, FetchError> {
    let url = self.url(&[resource, id])?;
    let mut request = self.client.patch(url).json(body);
    if let Some(etag) = etag {
      request = request.header(IF_MATCH, etag);
    }

    let what = format!("update {} {}", resource, id);
    let response = self.send(request, &what).await?;
    Ok(etag_of(&response))
  }
}
