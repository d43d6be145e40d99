//! Plain-text summary of a loaded view-model.

use std::fmt::Write;

use crate::engagement::types::{job_info_view_id, SELECT_CLIENT_VIEW};
use crate::engagement::LookupResource;
use crate::store::{ViewModel, CLIENT_ENTITIES_LOOKUP, JOB_ROLES_LOOKUP};

pub fn render_summary(vm: &ViewModel) -> String {
  let mut out = String::new();
  let load = &vm.load;

  let _ = writeln!(
    out,
    "Progress: {}/{} fetches settled{}",
    load.loading_tasks_completed,
    load.loading_tasks_total,
    if load.has_error { " (with errors)" } else { "" }
  );
  if let Some(fault) = &vm.fault {
    let _ = writeln!(out, "Last fault: {}", fault);
  }

  let _ = writeln!(
    out,
    "Lookups: {} of {} loaded",
    vm.lookups.len(),
    LookupResource::ALL.len()
  );
  for (lookup, items) in &vm.lookups {
    let _ = writeln!(out, "  {:<20} {:>6}", lookup.resource_name(), items.len());
  }

  let Some(engagement_id) = vm.engagement_id else {
    return out;
  };

  let _ = writeln!(out, "Engagement {}:", engagement_id);
  for (label, record) in [
    ("engagement", &vm.engagement),
    ("initial setup", &vm.initial_setup),
    ("risk assessment", &vm.risk_assessment),
  ] {
    let state = match record {
      Some(r) => format!("loaded (etag {})", r.etag.as_deref().unwrap_or("none")),
      None => "missing".to_string(),
    };
    let _ = writeln!(out, "  {:<16} {}", label, state);
  }
  let _ = writeln!(out, "  attachments      {}", vm.attachments.len());
  let _ = writeln!(out, "  workflow logs    {}", vm.workflow_logs.len());
  let _ = writeln!(out, "  user tasks       {}", vm.user_tasks.len());
  if let Some(task) = &vm.current_user_task {
    let _ = writeln!(out, "  your task        #{}", task.id);
  }

  let _ = writeln!(out, "  job info responses {}", vm.job_info_responses.len());
  for response in &vm.job_info_responses {
    let roles = vm
      .views
      .get(&job_info_view_id(response.id))
      .and_then(|v| v.lookups.get(JOB_ROLES_LOOKUP))
      .map(|r| r.len().to_string())
      .unwrap_or_else(|| "pending".to_string());
    let _ = writeln!(out, "    #{} roles: {}", response.id, roles);
  }

  if let Some(entities) = vm
    .views
    .get(SELECT_CLIENT_VIEW)
    .and_then(|v| v.lookups.get(CLIENT_ENTITIES_LOOKUP))
  {
    let _ = writeln!(out, "  client entities  {}", entities.len());
  }

  out
}
