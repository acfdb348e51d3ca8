//! Merge Engine planning: three-way field-level merge of two heads.
//!
//! Merged content is the target head with every source-side change since
//! the common ancestor applied on top. Any path both sides changed to
//! different values is a conflict, and conflicts are never auto-resolved.

use saga_core::delta::{self, FieldChange};
use saga_core::{Conflict, Version};
use serde_json::Value;

/// A conflict-free merge ready to be committed.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub ancestor_id: String,
    pub source_changes: Vec<FieldChange>,
    pub target_changes: Vec<FieldChange>,
    pub content: Value,
}

impl MergePlan {
    /// Nothing on the source side to carry over.
    pub fn is_empty(&self) -> bool {
        self.source_changes.is_empty()
    }
}

pub fn plan_merge(
    ancestor: &Version,
    source_head: &Version,
    target_head: &Version,
) -> Result<MergePlan, Vec<Conflict>> {
    let source_changes = delta::delta(&ancestor.content, &source_head.content);
    let target_changes = delta::delta(&ancestor.content, &target_head.content);

    let conflicts = delta::find_conflicts(
        &source_changes,
        &source_head.content,
        &target_changes,
        &target_head.content,
    );
    if !conflicts.is_empty() {
        return Err(conflicts);
    }

    let mut content = target_head.content.clone();
    delta::apply(&mut content, &source_changes);
    Ok(MergePlan {
        ancestor_id: ancestor.id.clone(),
        source_changes,
        target_changes,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_core::{hash::content_hash, VersionType};
    use serde_json::json;

    fn v(id: &str, content: Value) -> Version {
        Version {
            id: id.into(),
            campaign_id: "c1".into(),
            branch_id: "br".into(),
            parent_id: None,
            version_hash: content_hash(&content),
            version_type: VersionType::Snapshot,
            title: String::new(),
            message: String::new(),
            author: String::new(),
            content,
            metadata: Default::default(),
            created_at: String::new(),
            is_deleted: false,
        }
    }

    fn base() -> Value {
        json!({
            "name": "C1",
            "description": "",
            "theme": "fantasy",
            "chapters": [{"id": "ch1", "title": "Intro"}],
            "npcs": [],
            "locations": [{"id": "loc1", "name": "Cave"}]
        })
    }

    #[test]
    fn disjoint_changes_combine() {
        let ancestor = v("a", base());
        let mut src = base();
        src["npcs"] = json!([{"id": "n1", "name": "Mira"}]);
        let mut dst = base();
        dst["locations"][0]["name"] = json!("Grotto");

        let plan = plan_merge(&ancestor, &v("s", src), &v("t", dst)).unwrap();
        assert_eq!(plan.ancestor_id, "a");
        assert!(!plan.is_empty());
        assert_eq!(plan.content["npcs"][0]["name"], "Mira");
        assert_eq!(plan.content["locations"][0]["name"], "Grotto");
    }

    #[test]
    fn same_field_different_values_conflicts() {
        let ancestor = v("a", base());
        let mut src = base();
        src["chapters"][0]["title"] = json!("Prologue");
        let mut dst = base();
        dst["chapters"][0]["title"] = json!("Opening");

        let conflicts = plan_merge(&ancestor, &v("s", src), &v("t", dst)).unwrap_err();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "chapters[ch1].title");
        assert_eq!(conflicts[0].source_value, Some(json!("Prologue")));
        assert_eq!(conflicts[0].target_value, Some(json!("Opening")));
    }

    #[test]
    fn identical_edits_do_not_conflict() {
        let ancestor = v("a", base());
        let mut both = base();
        both["description"] = json!("A grim tale");
        let plan = plan_merge(&ancestor, &v("s", both.clone()), &v("t", both)).unwrap();
        assert_eq!(plan.content["description"], "A grim tale");
    }

    #[test]
    fn source_unchanged_is_empty_plan() {
        let ancestor = v("a", base());
        let mut dst = base();
        dst["name"] = json!("C1 revised");
        let plan = plan_merge(&ancestor, &v("s", base()), &v("t", dst)).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.content["name"], "C1 revised");
    }
}
