//! The fixed set of reference lookups loaded before anything else.

use std::fmt;

/// Reference datasets the wizard needs before it can render any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LookupResource {
  AttachmentTypes,
  BillingFrequencies,
  BusinessUnits,
  ContractTypes,
  Countries,
  Currencies,
  EngagementTypes,
  Industries,
  JobHierarchies,
  MarketSectors,
  Offices,
  Regions,
  RiskCategories,
  RoleTypes,
  ServiceLines,
  ServiceOfferings,
  // Not cached: large or user-sensitive
  Clients,
  Employees,
  UserRoles,
  WorkflowSteps,
}

impl LookupResource {
  pub const ALL: [LookupResource; 20] = [
    Self::AttachmentTypes,
    Self::BillingFrequencies,
    Self::BusinessUnits,
    Self::ContractTypes,
    Self::Countries,
    Self::Currencies,
    Self::EngagementTypes,
    Self::Industries,
    Self::JobHierarchies,
    Self::MarketSectors,
    Self::Offices,
    Self::Regions,
    Self::RiskCategories,
    Self::RoleTypes,
    Self::ServiceLines,
    Self::ServiceOfferings,
    Self::Clients,
    Self::Employees,
    Self::UserRoles,
    Self::WorkflowSteps,
  ];

  /// Backend resource name, also the key of the item array in list responses.
  pub fn resource_name(self) -> &'static str {
    match self {
      Self::AttachmentTypes => "attachmentTypes",
      Self::BillingFrequencies => "billingFrequencies",
      Self::BusinessUnits => "businessUnits",
      Self::ContractTypes => "contractTypes",
      Self::Countries => "countries",
      Self::Currencies => "currencies",
      Self::EngagementTypes => "engagementTypes",
      Self::Industries => "industries",
      Self::JobHierarchies => "jobHierarchies",
      Self::MarketSectors => "marketSectors",
      Self::Offices => "offices",
      Self::Regions => "regions",
      Self::RiskCategories => "riskCategories",
      Self::RoleTypes => "roleTypes",
      Self::ServiceLines => "serviceLines",
      Self::ServiceOfferings => "serviceOfferings",
      Self::Clients => "clients",
      Self::Employees => "employees",
      Self::UserRoles => "userRoles",
      Self::WorkflowSteps => "workflowSteps",
    }
  }

  /// Default expiry window in days, or `None` for lookups fetched fresh every time.
  pub fn default_expire_days(self) -> Option<i64> {
    match self {
      Self::AttachmentTypes
      | Self::BillingFrequencies
      | Self::Countries
      | Self::Currencies
      | Self::Industries
      | Self::Offices
      | Self::Regions => Some(45),
      Self::ContractTypes | Self::EngagementTypes => Some(40),
      Self::RiskCategories | Self::RoleTypes => Some(35),
      Self::BusinessUnits
      | Self::JobHierarchies
      | Self::MarketSectors
      | Self::ServiceLines
      | Self::ServiceOfferings => Some(30),
      Self::Clients | Self::Employees | Self::UserRoles | Self::WorkflowSteps => None,
    }
  }

  /// Persisted storage key for cached lookups.
  pub fn cache_key(self) -> String {
    format!("lookups.{}", self.resource_name())
  }

  /// Look a lookup up by its resource name.
  pub fn from_resource_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|l| l.resource_name() == name)
  }
}

impl fmt::Display for LookupResource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.resource_name())
  }
}
