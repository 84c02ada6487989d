//! Core data model: resource specifications, observed state and change sets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A property bag: attribute name to JSON value.
///
/// Property bags are immutable snapshots. Operations never mutate a bag in
/// place; each successful create/read/update replaces it wholesale.
pub type PropertyBag = serde_json::Map<String, Value>;

/// A desired resource declaration sent by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// The resource type name (e.g. `api_key`).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Caller-assigned logical name, stable across updates.
    pub name: String,
    /// Desired attribute values.
    pub properties: PropertyBag,
    /// Explicit remote identity override (used for adoption/idempotent
    /// creates). Usually absent; the remote API assigns identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl ResourceSpec {
    /// Create a spec with an empty property bag.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            properties: PropertyBag::new(),
            identity: None,
        }
    }

    /// Set an attribute on the spec.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Set an explicit identity override.
    pub fn with_identity(mut self, id: impl Into<String>) -> Self {
        self.identity = Some(id.into());
        self
    }

    /// The identity the orchestrator serializes concurrent operations on:
    /// the explicit override if present, otherwise `type/name`.
    pub fn logical_identity(&self) -> String {
        match &self.identity {
            Some(id) => format!("{}/{}", self.type_name, id),
            None => format!("{}/{}", self.type_name, self.name),
        }
    }
}

/// Provider-internal metadata carried alongside observed state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMeta {
    /// Entity tag from the last remote response, when the API returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// The last-observed state of a remote entity.
///
/// Every `ResourceState` maps to exactly one remote entity, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Remote identity assigned by SendGrid.
    pub id: String,
    /// The resource type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Last-observed attribute values.
    pub properties: PropertyBag,
    /// Provider-internal metadata.
    #[serde(default)]
    pub meta: StateMeta,
}

impl ResourceState {
    /// Build a state snapshot for a remote entity.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>, properties: PropertyBag) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            properties,
            meta: StateMeta::default(),
        }
    }

    /// The lock key for this state, matching [`ResourceSpec::logical_identity`]
    /// for specs that carry an identity override.
    pub fn logical_identity(&self) -> String {
        format!("{}/{}", self.type_name, self.id)
    }

    /// Get a string property, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// Classification of a single property difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Desired equals observed.
    Unchanged,
    /// Can be applied in place via the update endpoint.
    Update,
    /// Changing this property forces replacement of the entity.
    Replace,
}

/// The diff of one property between observed and desired state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Observed value (None when the property was absent).
    pub before: Option<Value>,
    /// Desired value (None when the property is being removed).
    pub after: Option<Value>,
    /// How the change must be applied.
    pub kind: ChangeKind,
}

/// Ordering for a replacement plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceOrder {
    /// Delete the old entity, then create the new one (default; safe for
    /// resources with uniqueness constraints on their inputs).
    #[default]
    DeleteThenCreate,
    /// Create the new entity first, then delete the old one.
    CreateThenDelete,
}

/// The overall action a change set requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum PlanAction {
    /// No remote call needed.
    NoOp,
    /// Create a new remote entity.
    Create,
    /// Update in place via the resource's update endpoint.
    Update,
    /// Delete-and-recreate (or the reverse) per the resource's ordering rule.
    Replace {
        /// Which side of the replacement happens first.
        order: ReplaceOrder,
    },
    /// Delete the remote entity.
    Delete,
}

/// The computed diff between observed and desired state.
///
/// Deterministic: the same `(old, new)` pair always yields the same change
/// set (changes are keyed in a `BTreeMap`, so iteration order is stable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Per-property classification, keyed by attribute name.
    pub changes: BTreeMap<String, PropertyChange>,
    /// The action the orchestrator must take.
    pub action: PlanAction,
}

impl ChangeSet {
    /// A change set with no differences.
    pub fn no_op() -> Self {
        Self {
            changes: BTreeMap::new(),
            action: PlanAction::NoOp,
        }
    }

    /// Whether any property actually differs.
    pub fn has_changes(&self) -> bool {
        self.changes
            .values()
            .any(|c| c.kind != ChangeKind::Unchanged)
    }

    /// Whether the change set forces replacement.
    pub fn requires_replace(&self) -> bool {
        matches!(self.action, PlanAction::Replace { .. })
    }

    /// Attribute names whose change kind is `Replace`.
    pub fn replace_triggers(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|(_, c)| c.kind == ChangeKind::Replace)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// Lifecycle states of a single server-side operation.
///
/// Every operation moves `Received -> Validated -> Executing` and then to
/// exactly one terminal state; nothing leaves `Executing` without reaching
/// `Succeeded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Request received, not yet validated.
    Received,
    /// Schema validation passed.
    Validated,
    /// Remote calls in flight.
    Executing,
    /// Terminal: the operation completed.
    Succeeded,
    /// Terminal: the operation failed.
    Failed,
}

impl OperationStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
