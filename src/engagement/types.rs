use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// View ids for the fixed wizard sections.
pub const SELECT_CLIENT_VIEW: &str = "selectClient";
pub const ENGAGEMENT_VIEW: &str = "engagement";
pub const INITIAL_SETUP_VIEW: &str = "initialSetup";
pub const RISK_ASSESSMENT_VIEW: &str = "riskAssessment";

/// Form field on the select-client view that drives the client-entities fetch.
pub const CLIENT_ID_FIELD: &str = "clientId";

/// View id for the section backing one job info response.
pub fn job_info_view_id(job_info_response_id: i64) -> String {
  format!("jobInfo:{}", job_info_response_id)
}

/// One job on the engagement; each one owns a set of role assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfoResponse {
  pub id: i64,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

/// Workflow task assigned to a user.
///
/// List fetches return a trimmed record; the full one is fetched by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTask {
  pub id: i64,
  #[serde(default)]
  pub user_object_id: Option<String>,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

/// Records that can be saved back from their wizard section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
  Engagement,
  InitialSetup,
  RiskAssessment,
}

impl SaveTarget {
  pub fn resource_name(self) -> &'static str {
    match self {
      Self::Engagement => "engagements",
      Self::InitialSetup => "initialSetups",
      Self::RiskAssessment => "riskAssessments",
    }
  }

  pub fn view_id(self) -> &'static str {
    match self {
      Self::Engagement => ENGAGEMENT_VIEW,
      Self::InitialSetup => INITIAL_SETUP_VIEW,
      Self::RiskAssessment => RISK_ASSESSMENT_VIEW,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Engagement => "engagement",
      Self::InitialSetup => "initial setup",
      Self::RiskAssessment => "risk assessment",
    }
  }
}
