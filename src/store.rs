//! View-model store shared by every fetch in the load pipeline.
//!
//! Each fetch owns its slice of the state and writes it when it settles, so
//! concurrent writers never touch the same field. Failures only flip
//! `has_error` and record the fault; data loaded by siblings is kept.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::api::error::ApiFault;
use crate::api::types::Etagged;
use crate::engagement::types::{
  job_info_view_id, JobInfoResponse, SaveTarget, UserTask, CLIENT_ID_FIELD, SELECT_CLIENT_VIEW,
};
use crate::engagement::LookupResource;

/// Per-view lookup key for role assignments of a job info response.
pub const JOB_ROLES_LOOKUP: &str = "jobRoles";
/// Per-view lookup key for the entities of the selected client.
pub const CLIENT_ENTITIES_LOOKUP: &str = "clientEntities";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToastKind {
  Success,
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToastInfo {
  pub message: Option<String>,
  pub kind: Option<ToastKind>,
}

/// A toast ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Toast {
  pub message: String,
  pub kind: ToastKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadMetadata {
  pub has_error: bool,
  /// Only set while an existing engagement is being reconstructed
  pub is_loading: bool,
  pub is_saving: bool,
  pub loading_tasks_completed: u32,
  pub loading_tasks_total: u32,
  pub saving_message: Option<String>,
  pub toast_info: ToastInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupsMetadata {
  pub lookups_are_loaded: bool,
}

/// One wizard section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
  pub view_id: String,
  pub form_data: Map<String, Value>,
  pub lookups: BTreeMap<String, Vec<Value>>,
}

impl View {
  fn new(view_id: &str) -> Self {
    Self {
      view_id: view_id.to_string(),
      ..Self::default()
    }
  }
}

/// Everything the wizard renders from.
#[derive(Debug, Clone, Default)]
pub struct ViewModel {
  pub load: LoadMetadata,
  pub lookups_meta: LookupsMetadata,
  pub lookups: BTreeMap<LookupResource, Vec<Value>>,
  pub fault: Option<ApiFault>,
  /// Route-supplied id of the engagement being edited
  pub engagement_id: Option<i64>,
  pub engagement: Option<Etagged<Value>>,
  pub initial_setup: Option<Etagged<Value>>,
  pub risk_assessment: Option<Etagged<Value>>,
  pub job_info_responses: Vec<JobInfoResponse>,
  pub attachments: Vec<Value>,
  pub user_tasks: Vec<UserTask>,
  pub current_user_task: Option<UserTask>,
  pub workflow_logs: Vec<Value>,
  pub views: BTreeMap<String, View>,
}

impl ViewModel {
  /// Section for `view_id`, created on first use.
  pub fn view_mut(&mut self, view_id: &str) -> &mut View {
    self
      .views
      .entry(view_id.to_string())
      .or_insert_with(|| View::new(view_id))
  }

  fn record_slot(&mut self, target: SaveTarget) -> &mut Option<Etagged<Value>> {
    match target {
      SaveTarget::Engagement => &mut self.engagement,
      SaveTarget::InitialSetup => &mut self.initial_setup,
      SaveTarget::RiskAssessment => &mut self.risk_assessment,
    }
  }

  pub fn record(&self, target: SaveTarget) -> Option<&Etagged<Value>> {
    match target {
      SaveTarget::Engagement => self.engagement.as_ref(),
      SaveTarget::InitialSetup => self.initial_setup.as_ref(),
      SaveTarget::RiskAssessment => self.risk_assessment.as_ref(),
    }
  }
}

/// Toast FIFO that yields each message/type pair once.
#[derive(Debug, Default)]
struct ToastQueue {
  pending: VecDeque<Toast>,
  shown: HashSet<Toast>,
}

/// Shared, mutex-guarded view-model.
#[derive(Debug, Default)]
pub struct ViewModelStore {
  state: Mutex<ViewModel>,
  toasts: Mutex<ToastQueue>,
}

impl ViewModelStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, ViewModel> {
    // Every writer leaves the state consistent, so a poisoned lock is still usable
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn toasts(&self) -> MutexGuard<'_, ToastQueue> {
    self.toasts.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Drop all state, as at screen unmount.
  pub fn clear(&self) {
    *self.state() = ViewModel::default();
    *self.toasts() = ToastQueue::default();
  }

  /// Copy of the current state.
  pub fn snapshot(&self) -> ViewModel {
    self.state().clone()
  }

  /// Read from the state without cloning it.
  pub fn read<R>(&self, f: impl FnOnce(&ViewModel) -> R) -> R {
    f(&self.state())
  }

  // ==========================================================================
  // Progress and flags
  // ==========================================================================

  pub fn add_loading_tasks(&self, count: u32) {
    self.state().load.loading_tasks_total += count;
  }

  pub fn complete_loading_task(&self) {
    let mut state = self.state();
    let load = &mut state.load;
    load.loading_tasks_completed = (load.loading_tasks_completed + 1).min(load.loading_tasks_total);
  }

  pub fn set_loading(&self, is_loading: bool) {
    self.state().load.is_loading = is_loading;
  }

  pub fn set_engagement_id(&self, engagement_id: i64) {
    self.state().engagement_id = Some(engagement_id);
  }

  pub fn set_lookups_loaded(&self) {
    self.state().lookups_meta.lookups_are_loaded = true;
  }

  pub fn record_fault(&self, fault: ApiFault) {
    let mut state = self.state();
    state.load.has_error = true;
    state.fault = Some(fault);
  }

  pub fn begin_saving(&self, message: impl Into<String>) {
    let mut state = self.state();
    state.load.is_saving = true;
    state.load.saving_message = Some(message.into());
  }

  pub fn finish_saving(&self) {
    let mut state = self.state();
    state.load.is_saving = false;
    state.load.saving_message = None;
  }

  // ==========================================================================
  // Fetched data
  // ==========================================================================

  pub fn set_lookup(&self, lookup: LookupResource, items: Vec<Value>) {
    self.state().lookups.insert(lookup, items);
  }

  /// Store a record and seed its section's form data from it.
  pub fn set_record(&self, target: SaveTarget, record: Etagged<Value>) {
    let mut state = self.state();
    if let Value::Object(fields) = &record.item {
      state.view_mut(target.view_id()).form_data = fields.clone();
    }
    *state.record_slot(target) = Some(record);
  }

  /// Replace the etag after a successful save.
  pub fn set_etag(&self, target: SaveTarget, etag: Option<String>) {
    if let Some(record) = self.state().record_slot(target) {
      record.etag = etag;
    }
  }

  /// Store job info responses, creating one section per response.
  pub fn set_job_info_responses(&self, responses: Vec<JobInfoResponse>) {
    let mut state = self.state();
    for response in &responses {
      state.view_mut(&job_info_view_id(response.id)).form_data = response.fields.clone();
    }
    state.job_info_responses = responses;
  }

  pub fn set_job_roles(&self, job_info_response_id: i64, roles: Vec<Value>) {
    self
      .state()
      .view_mut(&job_info_view_id(job_info_response_id))
      .lookups
      .insert(JOB_ROLES_LOOKUP.to_string(), roles);
  }

  pub fn set_attachments(&self, attachments: Vec<Value>) {
    self.state().attachments = attachments;
  }

  pub fn set_user_tasks(&self, tasks: Vec<UserTask>, current_user_task: Option<UserTask>) {
    let mut state = self.state();
    state.user_tasks = tasks;
    state.current_user_task = current_user_task;
  }

  pub fn set_workflow_logs(&self, logs: Vec<Value>) {
    self.state().workflow_logs = logs;
  }

  /// Store client entities, unless the selection moved on while they loaded.
  pub fn set_client_entities(&self, client_id: &str, entities: Vec<Value>) -> bool {
    let mut state = self.state();
    let view = state.view_mut(SELECT_CLIENT_VIEW);
    if selected_client(view).as_deref() != Some(client_id) {
      return false;
    }
    view
      .lookups
      .insert(CLIENT_ENTITIES_LOOKUP.to_string(), entities);
    true
  }

  // ==========================================================================
  // Form data
  // ==========================================================================

  /// Write one form field; returns the previous value.
  pub fn set_form_value(&self, view_id: &str, key: &str, value: Value) -> Option<Value> {
    self
      .state()
      .view_mut(view_id)
      .form_data
      .insert(key.to_string(), value)
  }

  pub fn form_data(&self, view_id: &str) -> Option<Map<String, Value>> {
    self.read(|s| s.views.get(view_id).map(|v| v.form_data.clone()))
  }

  // ==========================================================================
  // Toasts
  // ==========================================================================

  pub fn push_toast(&self, message: impl Into<String>, kind: ToastKind) {
    let message = message.into();
    self.state().load.toast_info = ToastInfo {
      message: Some(message.clone()),
      kind: Some(kind),
    };
    self.toasts().pending.push_back(Toast { message, kind });
  }

  /// Next toast to display; pairs that were already displayed are skipped.
  pub fn next_toast(&self) -> Option<Toast> {
    let mut queue = self.toasts();
    while let Some(toast) = queue.pending.pop_front() {
      if queue.shown.insert(toast.clone()) {
        return Some(toast);
      }
    }
    None
  }

  // ==========================================================================
  // Selectors
  // ==========================================================================

  pub fn load_metadata(&self) -> LoadMetadata {
    self.read(|s| s.load.clone())
  }

  pub fn lookups_loaded(&self) -> bool {
    self.read(|s| s.lookups_meta.lookups_are_loaded)
  }

  pub fn has_error(&self) -> bool {
    self.read(|s| s.load.has_error)
  }

  /// All counted fetches have settled.
  pub fn is_ready(&self) -> bool {
    self.read(|s| s.load.loading_tasks_completed == s.load.loading_tasks_total)
  }

  /// Progress in percent; 100 when nothing was scheduled.
  pub fn progress_percent(&self) -> u8 {
    self.read(|s| {
      let load = &s.load;
      if load.loading_tasks_total == 0 {
        return 100;
      }
      (u64::from(load.loading_tasks_completed) * 100 / u64::from(load.loading_tasks_total)) as u8
    })
  }

  #[cfg(test)]
  pub fn lookup(&self, lookup: LookupResource) -> Option<Vec<Value>> {
    self.read(|s| s.lookups.get(&lookup).cloned())
  }

  /// Client id currently chosen on the select-client view.
  pub fn selected_client_id(&self) -> Option<String> {
    self.read(|s| s.views.get(SELECT_CLIENT_VIEW).and_then(selected_client))
  }
}

fn selected_client(view: &View) -> Option<String> {
  match view.form_data.get(CLIENT_ID_FIELD)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::ResponseStatus;
  use serde_json::json;

  fn fault() -> ApiFault {
    ApiFault {
      message: "Not Found".to_string(),
      response_status: ResponseStatus::Code(404),
      trace_id: "t-1".to_string(),
    }
  }

  #[test]
  fn test_progress_accounting() {
    let store = ViewModelStore::new();
    assert!(store.is_ready());
    assert_eq!(store.progress_percent(), 100);

    store.add_loading_tasks(4);
    assert!(!store.is_ready());
    store.complete_loading_task();
    assert_eq!(store.progress_percent(), 25);

    for _ in 0..10 {
      store.complete_loading_task();
    }
    // Never exceeds the total
    assert_eq!(store.load_metadata().loading_tasks_completed, 4);
    assert!(store.is_ready());
  }

  #[test]
  fn test_fault_keeps_loaded_data() {
    let store = ViewModelStore::new();
    store.set_lookup(LookupResource::Countries, vec![json!({"id": 1})]);
    store.record_fault(fault());

    assert!(store.has_error());
    assert_eq!(store.snapshot().fault, Some(fault()));
    assert_eq!(
      store.lookup(LookupResource::Countries),
      Some(vec![json!({"id": 1})])
    );
  }

  #[test]
  fn test_record_seeds_form_data() {
    let store = ViewModelStore::new();
    store.set_record(
      SaveTarget::InitialSetup,
      Etagged {
        item: json!({"id": 42, "currency": "EUR"}),
        etag: Some("\"1\"".to_string()),
      },
    );

    let form = store.form_data("initialSetup").unwrap();
    assert_eq!(form.get("currency"), Some(&json!("EUR")));

    store.set_etag(SaveTarget::InitialSetup, Some("\"2\"".to_string()));
    let etag = store.read(|s| s.initial_setup.as_ref().and_then(|r| r.etag.clone()));
    assert_eq!(etag.as_deref(), Some("\"2\""));
  }

  #[test]
  fn test_job_info_responses_create_views() {
    let store = ViewModelStore::new();
    store.set_job_info_responses(vec![
      JobInfoResponse {
        id: 1,
        fields: Map::new(),
      },
      JobInfoResponse {
        id: 2,
        fields: Map::new(),
      },
    ]);
    store.set_job_roles(2, vec![json!({"role": "Partner"})]);

    let snapshot = store.snapshot();
    assert!(snapshot.views.contains_key("jobInfo:1"));
    assert_eq!(
      snapshot.views["jobInfo:2"].lookups[JOB_ROLES_LOOKUP],
      vec![json!({"role": "Partner"})]
    );
  }

  #[test]
  fn test_client_entities_dropped_when_selection_changed() {
    let store = ViewModelStore::new();
    store.set_form_value(SELECT_CLIENT_VIEW, CLIENT_ID_FIELD, json!("c-2"));

    assert!(!store.set_client_entities("c-1", vec![json!({"id": 1})]));
    assert!(store.set_client_entities("c-2", vec![json!({"id": 2})]));

    let view = store.read(|s| s.views[SELECT_CLIENT_VIEW].clone());
    assert_eq!(view.lookups[CLIENT_ENTITIES_LOOKUP], vec![json!({"id": 2})]);
  }

  #[test]
  fn test_selected_client_id_accepts_numbers() {
    let store = ViewModelStore::new();
    assert_eq!(store.selected_client_id(), None);

    store.set_form_value(SELECT_CLIENT_VIEW, CLIENT_ID_FIELD, json!(77));
    assert_eq!(store.selected_client_id().as_deref(), Some("77"));

    store.set_form_value(SELECT_CLIENT_VIEW, CLIENT_ID_FIELD, json!(""));
    assert_eq!(store.selected_client_id(), None);
  }

  #[test]
  fn test_toast_shown_once_per_pair() {
    let store = ViewModelStore::new();
    store.push_toast("Saved", ToastKind::Success);
    store.push_toast("Saved", ToastKind::Success);
    store.push_toast("Saved", ToastKind::Error);

    assert_eq!(store.next_toast().map(|t| t.kind), Some(ToastKind::Success));
    assert_eq!(store.next_toast().map(|t| t.kind), Some(ToastKind::Error));
    assert_eq!(store.next_toast(), None);

    store.push_toast("Saved", ToastKind::Success);
    assert_eq!(store.next_toast(), None);
    assert_eq!(
      store.load_metadata().toast_info.message.as_deref(),
      Some("Saved")
    );
  }

  #[test]
  fn test_saving_flags() {
    let store = ViewModelStore::new();
    store.begin_saving("Saving risk assessment");
    let load = store.load_metadata();
    assert!(load.is_saving);
    assert_eq!(load.saving_message.as_deref(), Some("Saving risk assessment"));

    store.finish_saving();
    assert!(!store.load_metadata().is_saving);
  }

  #[test]
  fn test_clear() {
    let store = ViewModelStore::new();
    store.add_loading_tasks(3);
    store.set_lookups_loaded();
    store.clear();

    assert!(!store.lookups_loaded());
    assert_eq!(store.load_metadata(), LoadMetadata::default());
  }
}
