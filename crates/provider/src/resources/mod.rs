//! Resource Implementations
//!
//! Implements the lifecycle operations for each resource type.

pub mod wo_data;

use crate::error::Result;
use crate::state::DynamicValue;
use crate::tfplugin6::{Diagnostic, Schema};

/// Outcome of planning a change to one resource instance
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    /// State the provider expects after apply; unknown where only apply can tell
    pub planned_state: DynamicValue,
    /// Top-level attributes whose change forces replacement
    pub requires_replace: Vec<&'static str>,
}

impl PlannedChange {
    pub fn in_place(planned_state: DynamicValue) -> Self {
        Self {
            planned_state,
            requires_replace: vec![],
        }
    }

    pub fn destroy() -> Self {
        Self::in_place(DynamicValue::Null)
    }
}

/// Trait for resource operations
///
/// Handlers are stateless: every call receives the snapshots Terraform sent
/// and returns the resulting snapshot.
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &'static str;

    /// Schema advertised to Terraform
    fn schema(&self) -> Schema;

    /// Validate configuration before planning
    fn validate(&self, _config: &DynamicValue, _write_only_allowed: bool) -> Vec<Diagnostic> {
        vec![]
    }

    /// Compute the planned state for a create, update or destroy
    fn plan(
        &self,
        prior: &DynamicValue,
        proposed: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<PlannedChange>;

    /// Create a new resource
    fn create(&self, planned: &DynamicValue, config: &DynamicValue) -> Result<DynamicValue>;

    /// Read an existing resource
    fn read(&self, state: &DynamicValue) -> Result<DynamicValue>;

    /// Update an existing resource
    fn update(
        &self,
        prior: &DynamicValue,
        planned: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<DynamicValue>;

    /// Delete a resource
    fn delete(&self, state: &DynamicValue) -> Result<()>;

    /// Build the state for `terraform import` from a user-supplied id
    fn import(&self, id: &str) -> Result<DynamicValue>;

    /// Migrate stored state written under schema `version`
    fn upgrade(&self, version: i64, raw: &DynamicValue) -> Result<DynamicValue>;
}

/// Every resource type the provider serves
pub fn all() -> Vec<Box<dyn Resource>> {
    vec![Box::new(wo_data::WoDataResource)]
}
