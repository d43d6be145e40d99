//! Per-resource fetch definitions for everything the wizard loads.

use async_trait::async_trait;
use color_eyre::eyre::eyre;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::api::api_types::reserialize;
use crate::api::client::ResourceClient;
use crate::api::error::FetchError;
use crate::api::types::{Etagged, ResourceQuery};
use crate::cache::TtlCache;
use crate::pager::fetch_all_pages;

use super::lookups::LookupResource;
use super::types::{JobInfoResponse, SaveTarget, UserTask};

/// Fields requested when listing user tasks; the heavy ones are left out.
pub const USER_TASK_LIST_FIELDS: [&str; 5] =
  ["id", "userObjectId", "taskName", "status", "assignedAt"];

/// Named fetch operations the load pipeline is built from.
///
/// Tests substitute their own implementation to observe call order.
#[async_trait]
pub trait EngagementSource: Send + Sync {
  async fn fetch_lookup(&self, lookup: LookupResource) -> Result<Vec<Value>, FetchError>;

  async fn fetch_engagement(&self, engagement_id: i64) -> Result<Etagged<Value>, FetchError>;

  async fn fetch_initial_setup(&self, engagement_id: i64) -> Result<Etagged<Value>, FetchError>;

  async fn fetch_job_info_responses(
    &self,
    engagement_id: i64,
  ) -> Result<Vec<JobInfoResponse>, FetchError>;

  async fn fetch_job_roles(&self, job_info_response_id: i64) -> Result<Vec<Value>, FetchError>;

  async fn fetch_attachments(&self, engagement_id: i64) -> Result<Vec<Value>, FetchError>;

  async fn fetch_risk_assessment(&self, engagement_id: i64)
    -> Result<Etagged<Value>, FetchError>;

  /// Trimmed task records for the engagement.
  async fn fetch_user_tasks(&self, engagement_id: i64) -> Result<Vec<UserTask>, FetchError>;

  /// One task with every field.
  async fn fetch_user_task(&self, task_id: i64) -> Result<UserTask, FetchError>;

  async fn fetch_workflow_logs(&self, engagement_id: i64) -> Result<Vec<Value>, FetchError>;

  async fn fetch_client_entities(&self, client_id: &str) -> Result<Vec<Value>, FetchError>;

  /// Patch a record; returns its new etag.
  async fn save(
    &self,
    target: SaveTarget,
    engagement_id: i64,
    body: &Value,
    etag: Option<&str>,
  ) -> Result<Option<String>, FetchError>;
}

/// [`EngagementSource`] over a [`ResourceClient`], with TTL caching for lookups.
pub struct ResourceSource<C: ResourceClient> {
  client: Arc<C>,
  cache: TtlCache,
  page_size: u32,
  expire_overrides: HashMap<String, i64>,
}

impl<C: ResourceClient> ResourceSource<C> {
  pub fn new(client: Arc<C>, cache: TtlCache, page_size: u32) -> Self {
    Self {
      client,
      cache,
      page_size,
      expire_overrides: HashMap::new(),
    }
  }

  /// Override expiry windows, keyed by lookup resource name.
  pub fn with_expire_overrides(mut self, overrides: HashMap<String, i64>) -> Self {
    self.expire_overrides = overrides;
    self
  }

  fn expire_days(&self, lookup: LookupResource) -> Option<i64> {
    let default = lookup.default_expire_days()?;
    Some(
      self
        .expire_overrides
        .get(lookup.resource_name())
        .copied()
        .unwrap_or(default),
    )
  }

  /// Every item of a collection, across all pages.
  async fn fetch_all(
    &self,
    resource: &str,
    query: ResourceQuery,
  ) -> Result<Vec<Value>, FetchError> {
    let client = self.client.as_ref();
    let query = &query;
    fetch_all_pages(move |page_number| {
      let page_query = query.page(page_number);
      async move { client.get(resource, &page_query).await }
    })
    .await
  }

  fn query(&self) -> ResourceQuery {
    ResourceQuery::new(self.page_size)
  }
}

fn typed<T: DeserializeOwned>(resource: &str, items: Vec<Value>) -> Result<Vec<T>, FetchError> {
  items
    .into_iter()
    .map(|item| {
      reserialize(item).map_err(|e| FetchError::from(eyre!("Failed to parse {}: {}", resource, e)))
    })
    .collect()
}

#[async_trait]
impl<C: ResourceClient + 'static> EngagementSource for ResourceSource<C> {
  async fn fetch_lookup(&self, lookup: LookupResource) -> Result<Vec<Value>, FetchError> {
    let resource = lookup.resource_name();
    let query = self.query();

    match self.expire_days(lookup) {
      Some(days) => {
        self
          .cache
          .get_or_refresh(&lookup.cache_key(), days, || self.fetch_all(resource, query))
          .await
      }
      None => {
        debug!(lookup = resource, "Uncached lookup");
        self.fetch_all(resource, query).await
      }
    }
  }

  async fn fetch_engagement(&self, engagement_id: i64) -> Result<Etagged<Value>, FetchError> {
    self
      .client
      .get_one("engagements", &engagement_id.to_string(), &[])
      .await
  }

  async fn fetch_initial_setup(&self, engagement_id: i64) -> Result<Etagged<Value>, FetchError> {
    self
      .client
      .get_one(
        SaveTarget::InitialSetup.resource_name(),
        &engagement_id.to_string(),
        &[],
      )
      .await
  }

  async fn fetch_job_info_responses(
    &self,
    engagement_id: i64,
  ) -> Result<Vec<JobInfoResponse>, FetchError> {
    let query = self.query().filter("engagementId", engagement_id);
    let items = self.fetch_all("jobInfoResponses", query).await?;
    typed("jobInfoResponses", items)
  }

  async fn fetch_job_roles(&self, job_info_response_id: i64) -> Result<Vec<Value>, FetchError> {
    let query = self
      .query()
      .filter("jobInfoResponseId", job_info_response_id);
    self.fetch_all("jobRoles", query).await
  }

  async fn fetch_attachments(&self, engagement_id: i64) -> Result<Vec<Value>, FetchError> {
    let query = self
      .query()
      .filter("engagementId", engagement_id)
      .order_by("uploadedAt");
    self.fetch_all("attachments", query).await
  }

  async fn fetch_risk_assessment(
    &self,
    engagement_id: i64,
  ) -> Result<Etagged<Value>, FetchError> {
    self
      .client
      .get_one(
        SaveTarget::RiskAssessment.resource_name(),
        &engagement_id.to_string(),
        &[],
      )
      .await
  }

  async fn fetch_user_tasks(&self, engagement_id: i64) -> Result<Vec<UserTask>, FetchError> {
    let query = self
      .query()
      .filter("engagementId", engagement_id)
      .fields(&USER_TASK_LIST_FIELDS);
    let items = self.fetch_all("userTasks", query).await?;
    typed("userTasks", items)
  }

  async fn fetch_user_task(&self, task_id: i64) -> Result<UserTask, FetchError> {
    let task = self
      .client
      .get_one("userTasks", &task_id.to_string(), &[])
      .await?;
    reserialize(task.item)
      .map_err(|e| FetchError::from(eyre!("Failed to parse user task {}: {}", task_id, e)))
  }

  async fn fetch_workflow_logs(&self, engagement_id: i64) -> Result<Vec<Value>, FetchError> {
    let query = self
      .query()
      .filter("engagementId", engagement_id)
      .order_by("createdAt");
    self.fetch_all("workflowLogs", query).await
  }

  async fn fetch_client_entities(&self, client_id: &str) -> Result<Vec<Value>, FetchError> {
    let query = self.query().filter("clientId", client_id);
    self.fetch_all("clientEntities", query).await
  }

  async fn save(
    &self,
    target: SaveTarget,
    engagement_id: i64,
    body: &Value,
    etag: Option<&str>,
  ) -> Result<Option<String>, FetchError> {
    self
      .client
      .patch(
        target.resource_name(),
        &engagement_id.to_string(),
        body,
        etag,
      )
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::{ApiFault, ResponseStatus};
  use crate::api::types::PagedResult;
  use crate::cache::{KeyValueStore, MemoryStore};
  use serde_json::json;
  use std::sync::Mutex;

  /// Scripted client: each resource has a list of pages.
  #[derive(Default)]
  struct FakeClient {
    pages: HashMap<String, Vec<Vec<Value>>>,
    faults: Vec<String>,
    calls: Mutex<Vec<(String, ResourceQuery)>>,
    patches: Mutex<Vec<(String, String, Value, Option<String>)>>,
  }

  impl FakeClient {
    fn with_pages(mut self, resource: &str, pages: Vec<Vec<Value>>) -> Self {
      self.pages.insert(resource.to_string(), pages);
      self
    }

    fn calls_for(&self, resource: &str) -> Vec<ResourceQuery> {
      self
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(r, _)| r == resource)
        .map(|(_, q)| q.clone())
        .collect()
    }
  }

  fn fault() -> ApiFault {
    ApiFault {
      message: "Bad Request".to_string(),
      response_status: ResponseStatus::Code(400),
      trace_id: "trace".to_string(),
    }
  }

  #[async_trait]
  impl ResourceClient for FakeClient {
    async fn get(
      &self,
      resource: &str,
      query: &ResourceQuery,
    ) -> Result<PagedResult<Value>, FetchError> {
      self
        .calls
        .lock()
        .unwrap()
        .push((resource.to_string(), query.clone()));
      if self.faults.iter().any(|f| f == resource) {
        return Err(fault().into());
      }
      let pages = self.pages.get(resource).cloned().unwrap_or_default();
      let total = pages.len().max(1) as u32;
      let items = pages
        .get(query.page_number as usize - 1)
        .cloned()
        .unwrap_or_default();
      Ok(PagedResult {
        items,
        current_page: query.page_number,
        total_page_count: total,
      })
    }

    async fn get_one(
      &self,
      resource: &str,
      id: &str,
      _fields: &[&str],
    ) -> Result<Etagged<Value>, FetchError> {
      self
        .calls
        .lock()
        .unwrap()
        .push((format!("{}/{}", resource, id), ResourceQuery::default()));
      Ok(Etagged {
        item: json!({ "id": id.parse::<i64>().unwrap_or(0), "resource": resource, "full": true }),
        etag: Some("\"1\"".to_string()),
      })
    }

    async fn patch(
      &self,
      resource: &str,
      id: &str,
      body: &Value,
      etag: Option<&str>,
    ) -> Result<Option<String>, FetchError> {
      self.patches.lock().unwrap().push((
        resource.to_string(),
        id.to_string(),
        body.clone(),
        etag.map(String::from),
      ));
      Ok(Some("\"2\"".to_string()))
    }
  }

  fn source(client: FakeClient) -> (Arc<FakeClient>, Arc<MemoryStore>, ResourceSource<FakeClient>) {
    let client = Arc::new(client);
    let store = Arc::new(MemoryStore::new());
    let source = ResourceSource::new(client.clone(), TtlCache::new(store.clone()), 2);
    (client, store, source)
  }

  #[tokio::test]
  async fn test_cached_lookup_hits_network_once() {
    let (client, store, source) = source(FakeClient::default().with_pages(
      "countries",
      vec![vec![json!({"id": 1})], vec![json!({"id": 2})]],
    ));

    let first = source.fetch_lookup(LookupResource::Countries).await.unwrap();
    let second = source.fetch_lookup(LookupResource::Countries).await.unwrap();

    assert_eq!(first, vec![json!({"id": 1}), json!({"id": 2})]);
    assert_eq!(first, second);
    // Two pages on the first call, none on the second
    assert_eq!(client.calls_for("countries").len(), 2);
    assert!(store.get_item("lookups.countries").unwrap().is_some());
  }

  #[tokio::test]
  async fn test_uncached_lookup_always_fetches() {
    let (client, store, source) =
      source(FakeClient::default().with_pages("employees", vec![vec![json!({"id": 5})]]));

    source.fetch_lookup(LookupResource::Employees).await.unwrap();
    source.fetch_lookup(LookupResource::Employees).await.unwrap();

    assert_eq!(client.calls_for("employees").len(), 2);
    assert!(store.get_item("lookups.employees").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_expire_override() {
    let (_, _, source) = source(FakeClient::default());
    let source =
      source.with_expire_overrides(HashMap::from([("countries".to_string(), 7)]));

    assert_eq!(source.expire_days(LookupResource::Countries), Some(7));
    assert_eq!(source.expire_days(LookupResource::Regions), Some(45));
    assert_eq!(source.expire_days(LookupResource::Clients), None);
  }

  #[tokio::test]
  async fn test_lookup_fault_is_not_cached() {
    let mut client = FakeClient::default();
    client.faults.push("currencies".to_string());
    let (_, store, source) = source(client);

    let result = source.fetch_lookup(LookupResource::Currencies).await;

    assert!(matches!(result, Err(FetchError::Fault(_))));
    assert!(store.get_item("lookups.currencies").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_job_info_responses_filtered_by_engagement() {
    let (client, _, source) = source(FakeClient::default().with_pages(
      "jobInfoResponses",
      vec![vec![json!({"id": 11, "jobName": "Audit"}), json!({"id": 12})]],
    ));

    let responses = source.fetch_job_info_responses(42).await.unwrap();

    assert_eq!(responses.iter().map(|r| r.id).collect::<Vec<_>>(), vec![11, 12]);
    assert_eq!(responses[0].fields.get("jobName"), Some(&json!("Audit")));
    let calls = client.calls_for("jobInfoResponses");
    assert_eq!(calls[0].filters[0].field, "engagementId");
    assert_eq!(calls[0].filters[0].value, "42");
  }

  #[tokio::test]
  async fn test_user_task_list_requests_trimmed_fields() {
    let (client, _, source) = source(FakeClient::default().with_pages(
      "userTasks",
      vec![vec![json!({"id": 1, "userObjectId": "a"})]],
    ));

    let tasks = source.fetch_user_tasks(42).await.unwrap();

    assert_eq!(tasks.len(), 1);
    let calls = client.calls_for("userTasks");
    assert_eq!(
      calls[0].fields,
      USER_TASK_LIST_FIELDS.iter().map(|f| f.to_string()).collect::<Vec<_>>()
    );
  }

  #[tokio::test]
  async fn test_full_user_task_by_id() {
    let (client, _, source) = source(FakeClient::default());

    let task = source.fetch_user_task(9).await.unwrap();

    assert_eq!(task.id, 9);
    assert_eq!(task.fields.get("full"), Some(&json!(true)));
    assert_eq!(client.calls_for("userTasks/9").len(), 1);
  }

  #[tokio::test]
  async fn test_save_sends_etag() {
    let (client, _, source) = source(FakeClient::default());

    let etag = source
      .save(SaveTarget::RiskAssessment, 42, &json!({"score": 3}), Some("\"1\""))
      .await
      .unwrap();

    assert_eq!(etag.as_deref(), Some("\"2\""));
    let patches = client.patches.lock().unwrap();
    assert_eq!(patches[0].0, "riskAssessments");
    assert_eq!(patches[0].1, "42");
    assert_eq!(patches[0].3.as_deref(), Some("\"1\""));
  }
}
