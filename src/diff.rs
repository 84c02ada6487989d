//! The diff engine: computes the minimal change set between observed and
//! desired state.
//!
//! Classification is schema-driven and pure: computed attributes never
//! produce changes, `force_new` attributes classify as `Replace`, everything
//! else as `Update`. The same `(old, new)` pair always yields the same
//! [`ChangeSet`].

use std::collections::BTreeMap;

use serde_json::Value;

use crate::schema::Schema;
use crate::types::{
    ChangeKind, ChangeSet, PlanAction, PropertyBag, PropertyChange, ReplaceOrder, ResourceSpec,
    ResourceState,
};
use crate::validation::apply_defaults;

/// Compute the change set between an observed state and a desired spec.
///
/// Schema defaults are folded into the desired bag first, so omitting a
/// defaulted attribute never registers as drift. Any `force_new` attribute
/// difference escalates the whole plan to `Replace` with the given order;
/// a replace plan is never expressed as an in-place update.
pub fn diff(
    schema: &Schema,
    old: &ResourceState,
    new: &ResourceSpec,
    replace_order: ReplaceOrder,
) -> ChangeSet {
    let desired = apply_defaults(schema, &new.properties);
    let mut changes = BTreeMap::new();
    let mut requires_replace = false;

    for (name, attr) in &schema.attributes {
        // Computed attributes are provider outputs; the caller cannot drive
        // them, so they never count as drift.
        if attr.flags.computed && !attr.flags.required && !attr.flags.optional {
            continue;
        }

        let before = old.properties.get(name);
        let after = desired.get(name);

        if values_equal(before, after) {
            continue;
        }

        let kind = if attr.force_new {
            requires_replace = true;
            ChangeKind::Replace
        } else {
            ChangeKind::Update
        };

        changes.insert(
            name.clone(),
            PropertyChange {
                before: before.cloned(),
                after: after.cloned(),
                kind,
            },
        );
    }

    let action = if changes.is_empty() {
        PlanAction::NoOp
    } else if requires_replace {
        PlanAction::Replace {
            order: replace_order,
        }
    } else {
        PlanAction::Update
    };

    ChangeSet { changes, action }
}

/// Build the change set for creating a resource that has no prior state.
pub fn plan_create(schema: &Schema, new: &ResourceSpec) -> ChangeSet {
    let desired = apply_defaults(schema, &new.properties);
    let mut changes = BTreeMap::new();

    for name in schema.attributes.keys() {
        if let Some(after) = desired.get(name) {
            if after.is_null() {
                continue;
            }
            changes.insert(
                name.clone(),
                PropertyChange {
                    before: None,
                    after: Some(after.clone()),
                    kind: ChangeKind::Update,
                },
            );
        }
    }

    ChangeSet {
        changes,
        action: PlanAction::Create,
    }
}

/// Build the change set for deleting a resource.
pub fn plan_delete(old: &ResourceState) -> ChangeSet {
    let mut changes = BTreeMap::new();
    for (name, before) in &old.properties {
        changes.insert(
            name.clone(),
            PropertyChange {
                before: Some(before.clone()),
                after: None,
                kind: ChangeKind::Update,
            },
        );
    }

    ChangeSet {
        changes,
        action: PlanAction::Delete,
    }
}

/// The bag the replacement create should use: the desired properties with
/// defaults folded in.
pub fn replacement_bag(schema: &Schema, new: &ResourceSpec) -> PropertyBag {
    apply_defaults(schema, &new.properties)
}

fn values_equal(before: Option<&Value>, after: Option<&Value>) -> bool {
    match (before, after) {
        (None, None) => true,
        // An absent attribute and an explicit null are the same thing on
        // the wire.
        (None, Some(Value::Null)) | (Some(Value::Null), None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
