//! Assembly diff
//!
//! Compares a previously written assembly with a fresh synthesis and reports
//! what the provisioning engine would reconcile, resource by resource.

use crate::assembly::{Assembly, SynthesizedUnit};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Planned change for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub unit: String,
    pub logical_id: String,
    pub change_type: ChangeType,
    pub resource_type: String,
    /// Top-level keys that differ (properties, `DependsOn`, `Type`)
    pub changed: Vec<String>,
}

impl Change {
    /// `unit/logical-id`
    pub fn id(&self) -> String {
        format!("{}/{}", self.unit, self.logical_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    NoOp,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Create => write!(f, "create"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
            ChangeType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Every change between two assemblies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub changes: Vec<Change>,
    pub has_changes: bool,
}

impl Plan {
    pub fn new(changes: Vec<Change>) -> Self {
        let has_changes = changes.iter().any(|c| c.change_type != ChangeType::NoOp);
        Self {
            changes,
            has_changes,
        }
    }

    pub fn changes_by_type(&self, change_type: ChangeType) -> Vec<&Change> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.changes_by_type(ChangeType::Create).len(),
            update: self.changes_by_type(ChangeType::Update).len(),
            delete: self.changes_by_type(ChangeType::Delete).len(),
            no_change: self.changes_by_type(ChangeType::NoOp).len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// Diff two assemblies; with no previous assembly everything is a create
pub fn diff_assemblies(previous: Option<&Assembly>, current: &Assembly) -> Plan {
    let empty = Assembly::default();
    let previous = previous.unwrap_or(&empty);
    let mut changes = Vec::new();

    for unit in &current.units {
        changes.extend(diff_unit(&unit.id, previous.get(&unit.id), Some(unit)));
    }
    for unit in &previous.units {
        if current.get(&unit.id).is_none() {
            changes.extend(diff_unit(&unit.id, Some(unit), None));
        }
    }

    Plan::new(changes)
}

fn resources(unit: Option<&SynthesizedUnit>) -> Option<&Map<String, Value>> {
    unit.and_then(|u| u.template.get("Resources"))
        .and_then(Value::as_object)
}

fn diff_unit(
    unit_id: &str,
    before: Option<&SynthesizedUnit>,
    after: Option<&SynthesizedUnit>,
) -> Vec<Change> {
    let empty = Map::new();
    let before = resources(before).unwrap_or(&empty);
    let after = resources(after).unwrap_or(&empty);

    let ids: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    ids.into_iter()
        .map(|id| {
            let old = before.get(id);
            let new = after.get(id);
            let (change_type, changed) = match (old, new) {
                (None, Some(_)) => (ChangeType::Create, Vec::new()),
                (Some(_), None) => (ChangeType::Delete, Vec::new()),
                (Some(old), Some(new)) => {
                    let changed = changed_keys(old, new);
                    if changed.is_empty() {
                        (ChangeType::NoOp, changed)
                    } else {
                        (ChangeType::Update, changed)
                    }
                }
                (None, None) => (ChangeType::NoOp, Vec::new()),
            };
            let resource_type = new
                .or(old)
                .and_then(|r| r.get("Type"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            Change {
                unit: unit_id.to_string(),
                logical_id: id.clone(),
                change_type,
                resource_type,
                changed,
            }
        })
        .collect()
}

fn changed_keys(old: &Value, new: &Value) -> Vec<String> {
    let mut changed = Vec::new();
    for key in ["Type", "DependsOn"] {
        if old.get(key) != new.get(key) {
            changed.push(key.to_string());
        }
    }

    let empty = Map::new();
    let old_props = old.get("Properties").and_then(Value::as_object).unwrap_or(&empty);
    let new_props = new.get("Properties").and_then(Value::as_object).unwrap_or(&empty);
    let keys: BTreeSet<&String> = old_props.keys().chain(new_props.keys()).collect();
    for key in keys {
        if old_props.get(key) != new_props.get(key) {
            changed.push(key.clone());
        }
    }
    changed
}
