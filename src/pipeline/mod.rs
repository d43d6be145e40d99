//! Staged load pipeline that assembles the wizard's view-model.
//!
//! 1. Lookups: every reference dataset, skipped once loaded.
//! 2. Engagement: the record and its sections, only with a route id.
//! 3. Workflow: task assignments and step history.
//!
//! Fetches within a stage run concurrently and settle independently. A stage
//! is a strict barrier: the next one starts only after every fetch of the
//! previous one has settled. Backend faults are stored and the pipeline moves
//! on; unexpected errors are propagated once the stage has settled.

mod tasks;

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::error::{normalize, FetchError};
use crate::engagement::types::{SaveTarget, UserTask, CLIENT_ID_FIELD, SELECT_CLIENT_VIEW};
use crate::engagement::{EngagementSource, LookupResource};
use crate::store::{ToastKind, ViewModelStore};

pub use tasks::DetachedTasks;

/// Counted fetches in the engagement stage.
pub const ENGAGEMENT_STAGE_FETCHES: u32 = 5;
/// Counted fetches in the workflow stage.
pub const WORKFLOW_STAGE_FETCHES: u32 = 2;

pub struct Pipeline<S: EngagementSource + 'static> {
  source: Arc<S>,
  store: Arc<ViewModelStore>,
  /// Object id of the signed-in user
  current_user: Option<String>,
  detached: DetachedTasks,
}

impl<S: EngagementSource + 'static> Pipeline<S> {
  pub fn new(source: Arc<S>, store: Arc<ViewModelStore>) -> Self {
    Self {
      source,
      store,
      current_user: None,
      detached: DetachedTasks::new(),
    }
  }

  pub fn with_current_user(mut self, user_object_id: Option<String>) -> Self {
    self.current_user = user_object_id;
    self
  }

  pub fn store(&self) -> &Arc<ViewModelStore> {
    &self.store
  }

  pub fn detached(&self) -> &DetachedTasks {
    &self.detached
  }

  /// Run every stage that applies at screen mount.
  ///
  /// Without a usable route id only the lookups are loaded.
  pub async fn mount(&self, route_id: Option<&str>) -> Result<()> {
    let engagement_id = route_id.and_then(parse_route_id);
    if let Some(id) = engagement_id {
      self.store.set_engagement_id(id);
      self.store.set_loading(true);
    }

    let result = self.run_stages(engagement_id).await;
    self.store.set_loading(false);
    result
  }

  async fn run_stages(&self, engagement_id: Option<i64>) -> Result<()> {
    self.load_lookups().await?;

    let Some(engagement_id) = engagement_id else {
      debug!("No engagement id, nothing to load after lookups");
      return Ok(());
    };
    self.load_engagement(engagement_id).await
  }

  /// Stage 1.
  pub async fn load_lookups(&self) -> Result<()> {
    if self.store.lookups_loaded() {
      debug!("Lookups already loaded");
      return Ok(());
    }

    let lookups = LookupResource::ALL;
    self.store.add_loading_tasks(lookups.len() as u32);
    info!(count = lookups.len(), "Loading lookups");

    let results = join_all(
      lookups
        .into_iter()
        .map(|lookup| self.settle(lookup.resource_name(), self.load_lookup(lookup))),
    )
    .await;

    self.store.set_lookups_loaded();
    first_error(results)
  }

  /// Stages 2 and 3 for one engagement.
  pub async fn load_engagement(&self, engagement_id: i64) -> Result<()> {
    self
      .store
      .add_loading_tasks(ENGAGEMENT_STAGE_FETCHES + WORKFLOW_STAGE_FETCHES);

    info!(engagement_id, "Loading engagement");
    let (engagement, initial_setup, job_info, attachments, risk_assessment) = futures::join!(
      self.settle(
        "engagement",
        self.load_record(SaveTarget::Engagement, engagement_id)
      ),
      self.settle(
        "initialSetup",
        self.load_record(SaveTarget::InitialSetup, engagement_id)
      ),
      self.settle(
        "jobInfoResponses",
        self.load_job_info_responses(engagement_id)
      ),
      self.settle("attachments", self.load_attachments(engagement_id)),
      self.settle(
        "riskAssessment",
        self.load_record(SaveTarget::RiskAssessment, engagement_id)
      ),
    );
    first_error([
      engagement,
      initial_setup,
      job_info,
      attachments,
      risk_assessment,
    ])?;

    info!(engagement_id, "Loading workflow status");
    let (user_tasks, workflow_logs) = futures::join!(
      self.settle("userTasks", self.load_user_tasks(engagement_id)),
      self.settle("workflowLogs", self.load_workflow_logs(engagement_id)),
    );
    first_error([user_tasks, workflow_logs])
  }

  /// Await one counted fetch and fold its outcome into the store.
  async fn settle<F>(&self, operation: &'static str, fetch: F) -> Result<()>
  where
    F: Future<Output = Result<(), FetchError>>,
  {
    let result = fetch.await;
    self.store.complete_loading_task();

    match result {
      Ok(()) => {
        debug!(operation, "Fetch settled");
        Ok(())
      }
      Err(e) => absorb_fault(&self.store, operation, e),
    }
  }

  async fn load_lookup(&self, lookup: LookupResource) -> Result<(), FetchError> {
    let items = self.source.fetch_lookup(lookup).await?;
    self.store.set_lookup(lookup, items);
    Ok(())
  }

  async fn load_record(&self, target: SaveTarget, engagement_id: i64) -> Result<(), FetchError> {
    let record = match target {
      SaveTarget::Engagement => self.source.fetch_engagement(engagement_id).await?,
      SaveTarget::InitialSetup => self.source.fetch_initial_setup(engagement_id).await?,
      SaveTarget::RiskAssessment => self.source.fetch_risk_assessment(engagement_id).await?,
    };
    self.store.set_record(target, record);
    Ok(())
  }

  async fn load_job_info_responses(&self, engagement_id: i64) -> Result<(), FetchError> {
    let responses = self.source.fetch_job_info_responses(engagement_id).await?;
    let ids: Vec<i64> = responses.iter().map(|r| r.id).collect();
    self.store.set_job_info_responses(responses);

    // Role assignments load in the background; this stage does not wait for them
    for id in ids {
      self.spawn_job_roles(id);
    }
    Ok(())
  }

  fn spawn_job_roles(&self, job_info_response_id: i64) -> JoinHandle<()> {
    let source = Arc::clone(&self.source);
    let store = Arc::clone(&self.store);

    self.detached.spawn("jobRoles", async move {
      match source.fetch_job_roles(job_info_response_id).await {
        Ok(roles) => {
          store.set_job_roles(job_info_response_id, roles);
          Ok(())
        }
        Err(e) => absorb_fault(&store, "jobRoles", e),
      }
    })
  }

  async fn load_attachments(&self, engagement_id: i64) -> Result<(), FetchError> {
    let attachments = self.source.fetch_attachments(engagement_id).await?;
    self.store.set_attachments(attachments);
    Ok(())
  }

  async fn load_user_tasks(&self, engagement_id: i64) -> Result<(), FetchError> {
    let tasks = self.source.fetch_user_tasks(engagement_id).await?;
    let current = self.resolve_current_user_task(&tasks).await?;
    self.store.set_user_tasks(tasks, current);
    Ok(())
  }

  /// Full record of the first task assigned to the current user, if any.
  pub async fn resolve_current_user_task(
    &self,
    tasks: &[UserTask],
  ) -> Result<Option<UserTask>, FetchError> {
    let Some(user) = self.current_user.as_deref() else {
      return Ok(None);
    };

    let assigned = tasks.iter().find(|task| {
      task
        .user_object_id
        .as_deref()
        .is_some_and(|oid| oid.eq_ignore_ascii_case(user))
    });

    match assigned {
      Some(task) => {
        debug!(task_id = task.id, "Fetching full task for current user");
        Ok(Some(self.source.fetch_user_task(task.id).await?))
      }
      None => Ok(None),
    }
  }

  async fn load_workflow_logs(&self, engagement_id: i64) -> Result<(), FetchError> {
    let logs = self.source.fetch_workflow_logs(engagement_id).await?;
    self.store.set_workflow_logs(logs);
    Ok(())
  }

  /// Write a form field. Changing the selected client starts a background
  /// fetch of that client's entities, whose handle is returned.
  pub fn set_form_value(
    &self,
    view_id: &str,
    key: &str,
    value: Value,
  ) -> Option<JoinHandle<()>> {
    let previous = self.store.set_form_value(view_id, key, value.clone());
    let selects_client = view_id == SELECT_CLIENT_VIEW && key == CLIENT_ID_FIELD;
    if !selects_client || previous.as_ref() == Some(&value) {
      return None;
    }

    let client_id = self.store.selected_client_id()?;
    Some(self.spawn_client_entities(client_id))
  }

  fn spawn_client_entities(&self, client_id: String) -> JoinHandle<()> {
    let source = Arc::clone(&self.source);
    let store = Arc::clone(&self.store);

    self.detached.spawn("clientEntities", async move {
      match source.fetch_client_entities(&client_id).await {
        Ok(entities) => {
          if !store.set_client_entities(&client_id, entities) {
            debug!(client_id = %client_id, "Client selection changed, dropping entities");
          }
          Ok(())
        }
        Err(e) => absorb_fault(&store, "clientEntities", e),
      }
    })
  }

  /// Save a section's form data back to its record.
  ///
  /// Returns `Ok(false)` when the backend rejected the save; the fault is on
  /// the store and an error toast is queued.
  pub async fn save(&self, target: SaveTarget) -> Result<bool> {
    let (engagement_id, etag) = self.store.read(|state| {
      let etag = state.record(target).and_then(|record| record.etag.clone());
      (state.engagement_id, etag)
    });
    let body = Value::Object(self.store.form_data(target.view_id()).unwrap_or_default());
    let engagement_id = engagement_id
      .ok_or_else(|| eyre!("Cannot save {}: no engagement loaded", target.label()))?;

    self
      .store
      .begin_saving(format!("Saving {}...", target.label()));
    let result = self
      .source
      .save(target, engagement_id, &body, etag.as_deref())
      .await;
    self.store.finish_saving();

    match result {
      Ok(etag) => {
        info!(engagement_id, target = target.label(), "Saved");
        self.store.set_etag(target, etag);
        self
          .store
          .push_toast(format!("Saved {}", target.label()), ToastKind::Success);
        Ok(true)
      }
      Err(e) => match normalize(e) {
        Ok(fault) => {
          warn!(engagement_id, target = target.label(), %fault, "Save rejected");
          self
            .store
            .push_toast(fault.message.clone(), ToastKind::Error);
          self.store.record_fault(fault);
          Ok(false)
        }
        Err(report) => {
          error!(engagement_id, target = target.label(), error = %report, "Save failed");
          Err(report.wrap_err(format!("Failed to save {}", target.label())))
        }
      },
    }
  }
}

/// Store a backend fault, or pass an unexpected error on.
fn absorb_fault(store: &ViewModelStore, operation: &'static str, error: FetchError) -> Result<()> {
  match normalize(error) {
    Ok(fault) => {
      warn!(operation, %fault, "Fetch failed");
      store.record_fault(fault);
      Ok(())
    }
    Err(report) => {
      error!(operation, error = %report, "Unexpected fetch error");
      Err(report.wrap_err(format!("Failed to load {}", operation)))
    }
  }
}

fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
  results.into_iter().collect()
}

/// Route ids are positive integers; anything else means "new engagement".
pub fn parse_route_id(route_id: &str) -> Option<i64> {
  match route_id.trim().parse::<i64>() {
    Ok(id) if id > 0 => Some(id),
    _ => {
      warn!(route_id, "Ignoring non-numeric route id");
      None
    }
  }
}
