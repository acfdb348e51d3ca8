//! Invariant checks between a branch's current state and a proposed one.
//!
//! Rules run in a fixed order and stop at the first violation:
//! theme immutability, required fields, entity id preservation, then
//! referential integrity of documented foreign-reference fields.

use crate::error::ValidationError;
use crate::types::TransitionType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Top-level keys every campaign state must carry (value may be empty, not null).
pub const REQUIRED_FIELDS: [&str; 6] = [
    "name",
    "description",
    "theme",
    "chapters",
    "npcs",
    "locations",
];

/// Collections whose entities carry a stable `id`.
pub const ENTITY_COLLECTIONS: [&str; 3] = ["chapters", "npcs", "locations"];

/// A field on entities of `collection` whose value (an id or list of ids)
/// must resolve to an entity in `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceRule {
    pub collection: String,
    pub field: String,
    pub target: String,
}

impl ReferenceRule {
    pub fn new(collection: &str, field: &str, target: &str) -> Self {
        Self {
            collection: collection.to_string(),
            field: field.to_string(),
            target: target.to_string(),
        }
    }
}

/// Foreign-reference fields understood out of the box.
pub fn builtin_reference_rules() -> Vec<ReferenceRule> {
    vec![
        ReferenceRule::new("chapters", "location_id", "locations"),
        ReferenceRule::new("chapters", "location_ids", "locations"),
        ReferenceRule::new("chapters", "npc_ids", "npcs"),
        ReferenceRule::new("npcs", "location_id", "locations"),
        ReferenceRule::new("locations", "parent_id", "locations"),
    ]
}

/// Stateless validator. Pure: safe to call any number of times in any order.
#[derive(Debug, Clone)]
pub struct StateValidator {
    rules: Vec<ReferenceRule>,
}

impl Default for StateValidator {
    fn default() -> Self {
        Self {
            rules: builtin_reference_rules(),
        }
    }
}

impl StateValidator {
    /// Built-in reference rules plus `extra` (duplicates ignored).
    pub fn with_rules(extra: &[ReferenceRule]) -> Self {
        let mut rules = builtin_reference_rules();
        for rule in extra {
            if !rules.contains(rule) {
                rules.push(rule.clone());
            }
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[ReferenceRule] {
        &self.rules
    }

    /// Check `new_state` against `current_state`.
    ///
    /// `current_state` is `None` for a campaign's root version, in which case
    /// only the shape rules (required fields, references) apply.
    pub fn validate_state_change(
        &self,
        current_state: Option<&Value>,
        new_state: &Value,
        transition_type: TransitionType,
    ) -> Result<(), ValidationError> {
        if let Some(current) = current_state {
            check_theme(current, new_state)?;
        }
        check_required(new_state)?;
        if let Some(current) = current_state {
            if !transition_type.permits_removal() {
                check_ids_preserved(current, new_state)?;
            }
        }
        self.check_references(new_state)
    }

    fn check_references(&self, state: &Value) -> Result<(), ValidationError> {
        for rule in &self.rules {
            let targets: HashSet<String> = entity_ids(state.get(&rule.target))
                .into_iter()
                .collect();
            for (entity_id, entity) in entities(state.get(&rule.collection)) {
                for target_id in reference_values(entity.get(&rule.field)) {
                    if !targets.contains(&target_id) {
                        return Err(ValidationError::DanglingReference {
                            field: format!("{}[{}].{}", rule.collection, entity_id, rule.field),
                            target_id,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_theme(current: &Value, new_state: &Value) -> Result<(), ValidationError> {
    let from = current.get("theme").cloned().unwrap_or(Value::Null);
    let to = new_state.get("theme").cloned().unwrap_or(Value::Null);
    if from != to {
        return Err(ValidationError::ThemeChanged { from, to });
    }
    Ok(())
}

fn check_required(new_state: &Value) -> Result<(), ValidationError> {
    for field in REQUIRED_FIELDS {
        match new_state.get(field) {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingField {
                    field: field.to_string(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_ids_preserved(current: &Value, new_state: &Value) -> Result<(), ValidationError> {
    for collection in ENTITY_COLLECTIONS {
        let kept: HashSet<String> = entity_ids(new_state.get(collection)).into_iter().collect();
        for id in entity_ids(current.get(collection)) {
            if !kept.contains(&id) {
                return Err(ValidationError::EntityRemoved {
                    collection: collection.to_string(),
                    entity_id: id,
                });
            }
        }
    }
    Ok(())
}

/// Render an entity id as a string. String and integer ids are accepted.
pub fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `(id, entity)` pairs of a collection.
///
/// Collections are arrays of objects carrying `id`, or objects keyed by id.
/// Array elements without an id are skipped.
pub fn entities(collection: Option<&Value>) -> Vec<(String, &Value)> {
    match collection {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("id").and_then(id_string).map(|id| (id, item)))
            .collect(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        _ => Vec::new(),
    }
}

/// Ids of a collection, in document order.
pub fn entity_ids(collection: Option<&Value>) -> Vec<String> {
    entities(collection).into_iter().map(|(id, _)| id).collect()
}

fn reference_values(field: Option<&Value>) -> Vec<String> {
    match field {
        Some(Value::Array(items)) => items.iter().filter_map(id_string).collect(),
        Some(v) => id_string(v).into_iter().collect(),
        None => Vec::new(),
    }
}
