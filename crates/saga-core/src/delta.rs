//! Field-level deltas between campaign states.
//!
//! A delta is a list of `(path, change)` pairs. Objects are diffed key by
//! key; entity collections (arrays whose elements all carry a unique `id`)
//! are diffed entity by entity, so `chapters[ch1].title` names the same
//! field no matter where `ch1` sits in the array. Anything else is a leaf.

use crate::error::Conflict;
use crate::validate::id_string;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// One step into a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Object key.
    Key(String),
    /// Element of an entity collection, addressed by its `id`.
    Entity(String),
}

/// Location of a field inside campaign content. Empty = the whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(pub Vec<Segment>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    fn child(&self, seg: Segment) -> Self {
        let mut segs = self.0.clone();
        segs.push(seg);
        Self(segs)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// True when `self` equals `other` or is an ancestor of it.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// True when either path contains the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Entity(id) => write!(f, "[{id}]")?,
            }
        }
        Ok(())
    }
}

/// What happened at a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Change {
    Set(Value),
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: Path,
    #[serde(flatten)]
    pub change: Change,
}

impl FieldChange {
    fn set(path: Path, value: &Value) -> Self {
        Self {
            path,
            change: Change::Set(value.clone()),
        }
    }

    fn remove(path: Path) -> Self {
        Self {
            path,
            change: Change::Remove,
        }
    }
}

/// Compute the changes that turn `from` into `to`.
pub fn delta(from: &Value, to: &Value) -> Vec<FieldChange> {
    let mut out = Vec::new();
    diff_into(from, to, &Path::root(), &mut out);
    out
}

fn diff_into(from: &Value, to: &Value, path: &Path, out: &mut Vec<FieldChange>) {
    if from == to {
        return;
    }
    match (from, to) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, av) in a {
                let p = path.child(Segment::Key(key.clone()));
                match b.get(key) {
                    Some(bv) => diff_into(av, bv, &p, out),
                    None => out.push(FieldChange::remove(p)),
                }
            }
            for (key, bv) in b {
                if !a.contains_key(key) {
                    out.push(FieldChange::set(path.child(Segment::Key(key.clone())), bv));
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => match (entity_index(a), entity_index(b)) {
            (Some(ai), Some(bi)) if same_relative_order(&ai, &bi) => {
                for (id, av) in &ai {
                    let p = path.child(Segment::Entity(id.clone()));
                    match bi.iter().find(|(bid, _)| bid == id) {
                        Some((_, bv)) => diff_into(av, bv, &p, out),
                        None => out.push(FieldChange::remove(p)),
                    }
                }
                for (id, bv) in &bi {
                    if !ai.iter().any(|(aid, _)| aid == id) {
                        out.push(FieldChange::set(path.child(Segment::Entity(id.clone())), bv));
                    }
                }
            }
            _ => out.push(FieldChange::set(path.clone(), to)),
        },
        _ => out.push(FieldChange::set(path.clone(), to)),
    }
}

/// `(id, element)` pairs when every element is an object with a unique id.
fn entity_index(items: &[Value]) -> Option<Vec<(String, &Value)>> {
    let mut seen = HashSet::new();
    let mut index = Vec::with_capacity(items.len());
    for item in items {
        if !item.is_object() {
            return None;
        }
        let id = item.get("id").and_then(id_string)?;
        if !seen.insert(id.clone()) {
            return None;
        }
        index.push((id, item));
    }
    Some(index)
}

// Ids present on both sides must appear in the same order, otherwise the
// reorder itself is a change and the whole array is treated as a leaf.
fn same_relative_order(a: &[(String, &Value)], b: &[(String, &Value)]) -> bool {
    let b_ids: HashSet<&str> = b.iter().map(|(id, _)| id.as_str()).collect();
    let a_ids: HashSet<&str> = a.iter().map(|(id, _)| id.as_str()).collect();
    let common_a = a.iter().map(|(id, _)| id.as_str()).filter(|id| b_ids.contains(id));
    let common_b = b.iter().map(|(id, _)| id.as_str()).filter(|id| a_ids.contains(id));
    common_a.eq(common_b)
}

/// Resolve a path inside a document.
pub fn value_at<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut cur = root;
    for seg in &path.0 {
        cur = match (seg, cur) {
            (Segment::Key(k), Value::Object(map)) => map.get(k)?,
            (Segment::Entity(id), Value::Array(items)) => items
                .iter()
                .find(|item| item.get("id").and_then(id_string).as_deref() == Some(id))?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Apply changes on top of `target` in order.
///
/// Missing intermediate containers are created; a `Set` on an entity that
/// is absent appends it to the collection.
pub fn apply(target: &mut Value, changes: &[FieldChange]) {
    for fc in changes {
        apply_one(target, &fc.path.0, &fc.change);
    }
}

fn apply_one(node: &mut Value, path: &[Segment], change: &Change) {
    let Some((seg, rest)) = path.split_first() else {
        if let Change::Set(v) = change {
            *node = v.clone();
        }
        return;
    };

    match seg {
        Segment::Key(key) => {
            if !node.is_object() {
                if matches!(change, Change::Remove) {
                    return;
                }
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else { return };
            if rest.is_empty() {
                match change {
                    Change::Set(v) => {
                        map.insert(key.clone(), v.clone());
                    }
                    Change::Remove => {
                        map.remove(key);
                    }
                }
                return;
            }
            match map.get_mut(key) {
                Some(child) => apply_one(child, rest, change),
                None if matches!(change, Change::Remove) => {}
                None => {
                    let mut child = Value::Null;
                    apply_one(&mut child, rest, change);
                    map.insert(key.clone(), child);
                }
            }
        }
        Segment::Entity(id) => {
            if !node.is_array() {
                if matches!(change, Change::Remove) {
                    return;
                }
                *node = Value::Array(Vec::new());
            }
            let Value::Array(items) = node else { return };
            let pos = items
                .iter()
                .position(|item| item.get("id").and_then(id_string).as_deref() == Some(id));
            if rest.is_empty() {
                match (change, pos) {
                    (Change::Set(v), Some(i)) => items[i] = v.clone(),
                    (Change::Set(v), None) => items.push(v.clone()),
                    (Change::Remove, Some(i)) => {
                        items.remove(i);
                    }
                    (Change::Remove, None) => {}
                }
                return;
            }
            match pos {
                Some(i) => apply_one(&mut items[i], rest, change),
                None if matches!(change, Change::Remove) => {}
                None => {
                    let mut entity = serde_json::json!({ "id": id });
                    apply_one(&mut entity, rest, change);
                    items.push(entity);
                }
            }
        }
    }
}

/// Paths changed on both sides of a merge whose results disagree.
///
/// Two changes collide when one path contains the other; they conflict when
/// the two resulting documents differ at the shorter of the two paths.
/// Identical edits on both sides are not conflicts.
pub fn find_conflicts(
    source_changes: &[FieldChange],
    source: &Value,
    target_changes: &[FieldChange],
    target: &Value,
) -> Vec<Conflict> {
    let mut seen: HashSet<Path> = HashSet::new();
    let mut conflicts = Vec::new();
    for s in source_changes {
        for t in target_changes {
            if !s.path.overlaps(&t.path) {
                continue;
            }
            let at = if s.path.0.len() <= t.path.0.len() {
                &s.path
            } else {
                &t.path
            };
            let sv = value_at(source, at);
            let tv = value_at(target, at);
            if sv != tv && seen.insert(at.clone()) {
                conflicts.push(Conflict {
                    path: at.to_string(),
                    source_value: sv.cloned(),
                    target_value: tv.cloned(),
                });
            }
        }
    }
    conflicts
}
