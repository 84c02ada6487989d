//! Testing utilities for resource handlers and the orchestrator.
//!
//! [`ProviderTester`] wraps a [`CrudOrchestrator`] and provides simplified
//! methods for exercising resource lifecycles without spinning up the
//! protocol server. Point it at a mock HTTP server to drive full CRUD
//! flows.
//!
//! # Example
//!
//! ```ignore
//! use sendgrid_provider::testing::ProviderTester;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_api_key() {
//!     let tester = ProviderTester::builtin();
//!     tester.configure_for("SG.test-key", mock_server.url());
//!
//!     let state = tester
//!         .create("api_key", "myKey", json!({"name": "ci key"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state.properties["name"], json!("ci key"));
//! }
//! ```

use serde_json::Value;

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::orchestrator::CrudOrchestrator;
use crate::registry::SchemaRegistry;
use crate::retry::RetryPolicy;
use crate::schema::{Diagnostic, DiagnosticSeverity};
use crate::types::{ChangeSet, PlanAction, PropertyBag, ResourceSpec, ResourceState};

/// A test harness over the orchestrator.
pub struct ProviderTester {
    orchestrator: CrudOrchestrator,
}

impl ProviderTester {
    /// Create a tester over a custom registry.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            orchestrator: CrudOrchestrator::new(registry),
        }
    }

    /// Create a tester over the built-in resource catalog, with retries
    /// disabled so mock expectations stay exact.
    pub fn builtin() -> Self {
        Self {
            orchestrator: CrudOrchestrator::new(crate::resources::builtin_registry())
                .with_retry_policy(RetryPolicy::no_retries()),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.orchestrator = self.orchestrator.with_retry_policy(retry);
        self
    }

    /// The orchestrator under test.
    pub fn orchestrator(&self) -> &CrudOrchestrator {
        &self.orchestrator
    }

    /// Point the tester at an API endpoint (usually a mock server).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be constructed; harness setup
    /// failures should abort the test.
    pub fn configure_for(&self, api_key: &str, base_url: &str) {
        let client = SendGridClient::new(api_key, base_url).expect("failed to build test client");
        self.orchestrator.configure_with_client(client);
    }

    fn spec(type_name: &str, name: &str, properties: Value) -> ResourceSpec {
        let bag = properties
            .as_object()
            .cloned()
            .unwrap_or_else(PropertyBag::new);
        ResourceSpec {
            type_name: type_name.to_string(),
            name: name.to_string(),
            properties: bag,
            identity: None,
        }
    }

    /// Validate a spec, returning all diagnostics.
    pub fn validate(
        &self,
        type_name: &str,
        properties: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.orchestrator
            .validate(&Self::spec(type_name, "under-test", properties))
    }

    /// Plan a create for a resource that does not exist yet.
    pub fn plan_create(&self, type_name: &str, properties: Value) -> Result<ChangeSet, ProviderError> {
        self.orchestrator
            .plan(None, &Self::spec(type_name, "under-test", properties))
    }

    /// Plan against an existing observed state.
    pub fn plan_update(
        &self,
        state: &ResourceState,
        properties: Value,
    ) -> Result<ChangeSet, ProviderError> {
        self.orchestrator
            .plan(Some(state), &Self::spec(&state.type_name, "under-test", properties))
    }

    /// Create a resource.
    pub async fn create(
        &self,
        type_name: &str,
        name: &str,
        properties: Value,
    ) -> Result<ResourceState, ProviderError> {
        self.orchestrator
            .create(&Self::spec(type_name, name, properties))
            .await
    }

    /// Create with an explicit identity override.
    pub async fn create_with_identity(
        &self,
        type_name: &str,
        name: &str,
        identity: &str,
        properties: Value,
    ) -> Result<ResourceState, ProviderError> {
        let spec = Self::spec(type_name, name, properties).with_identity(identity);
        self.orchestrator.create(&spec).await
    }

    /// Refresh observed state.
    pub async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, ProviderError> {
        self.orchestrator.read(state).await
    }

    /// Update a resource in place.
    pub async fn update(
        &self,
        state: &ResourceState,
        properties: Value,
    ) -> Result<ResourceState, ProviderError> {
        self.orchestrator
            .update(state, &Self::spec(&state.type_name, "under-test", properties))
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, state: &ResourceState) -> Result<(), ProviderError> {
        self.orchestrator.delete(state).await
    }

    /// Plan and apply in one step, returning the resulting state.
    pub async fn apply(
        &self,
        old: Option<&ResourceState>,
        type_name: &str,
        name: &str,
        properties: Value,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let spec = Self::spec(type_name, name, properties);
        let plan = self.orchestrator.plan(old, &spec)?;
        self.orchestrator.apply(&plan, old, Some(&spec)).await
    }
}

/// Assert that a plan creates a new resource.
///
/// # Panics
///
/// Panics if the plan's action is not `Create`.
pub fn assert_plan_creates(plan: &ChangeSet) {
    assert_eq!(
        plan.action,
        PlanAction::Create,
        "expected a create plan, got {:?}",
        plan.action
    );
}

/// Assert that a plan has no changes at all.
pub fn assert_plan_no_changes(plan: &ChangeSet) {
    assert!(
        !plan.has_changes(),
        "expected no changes, got {:?}",
        plan.changes
    );
    assert_eq!(plan.action, PlanAction::NoOp);
}

/// Assert that a plan changes something.
pub fn assert_plan_has_changes(plan: &ChangeSet) {
    assert!(plan.has_changes(), "expected changes, plan is a no-op");
}

/// Assert that a plan requires replacing the resource.
pub fn assert_plan_replaces(plan: &ChangeSet) {
    assert!(
        plan.requires_replace(),
        "expected a replace plan, got {:?}",
        plan.action
    );
}

/// Assert that a plan updates in place (changes without replacement).
pub fn assert_plan_updates_in_place(plan: &ChangeSet) {
    assert_eq!(
        plan.action,
        PlanAction::Update,
        "expected an in-place update, got {:?}",
        plan.action
    );
}

/// Assert that a plan changes the given attribute.
pub fn assert_plan_changes_attribute(plan: &ChangeSet, name: &str) {
    assert!(
        plan.changes.contains_key(name),
        "expected attribute '{}' to change; changed: {:?}",
        name,
        plan.changes.keys().collect::<Vec<_>>()
    );
}

/// Assert that a plan does not change the given attribute.
pub fn assert_plan_does_not_change_attribute(plan: &ChangeSet, name: &str) {
    assert!(
        !plan.changes.contains_key(name),
        "expected attribute '{}' to be unchanged",
        name
    );
}

/// Assert that no error diagnostics are present (warnings are allowed).
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == DiagnosticSeverity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

/// Assert that at least one error diagnostic is present.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error),
        "expected at least one error diagnostic"
    );
}

/// Assert that some error diagnostic mentions the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics.iter().any(|d| {
            d.severity == DiagnosticSeverity::Error
                && (d.summary.contains(substring)
                    || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
        }),
        "no error diagnostic mentions '{}': {:?}",
        substring,
        diagnostics
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_create_through_harness() {
        let tester = ProviderTester::builtin();
        let plan = tester
            .plan_create("api_key", json!({"name": "ci key"}))
            .unwrap();
        assert_plan_creates(&plan);
        assert_plan_changes_attribute(&plan, "name");
    }

    #[test]
    fn test_validate_through_harness() {
        let tester = ProviderTester::builtin();
        let diags = tester
            .validate("alert", json!({"type": "usage_limit", "email_to": "a@b.c"}))
            .unwrap();
        assert_has_errors(&diags);
        assert_error_contains(&diags, "percentage");

        let diags = tester
            .validate(
                "alert",
                json!({"type": "usage_limit", "email_to": "a@b.c", "percentage": 90}),
            )
            .unwrap();
        assert_no_errors(&diags);
    }

    #[test]
    fn test_plan_update_classifies_replace() {
        let tester = ProviderTester::builtin();
        let mut bag = PropertyBag::new();
        bag.insert("name".to_string(), json!("welcome"));
        bag.insert("generation".to_string(), json!("legacy"));
        let state = ResourceState::new("template", "t-1", bag);

        let plan = tester
            .plan_update(&state, json!({"name": "welcome", "generation": "dynamic"}))
            .unwrap();
        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&plan, "generation");

        let plan = tester
            .plan_update(&state, json!({"name": "welcome", "generation": "legacy"}))
            .unwrap();
        assert_plan_no_changes(&plan);
    }
}
