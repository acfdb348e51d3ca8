mod common;

use common::{memory, rich_content, with, CAMPAIGN};
use saga_core::{BranchType, Error, VersionType};
use saga_engine::{CommitRequest, MergeRequest};
use serde_json::json;

#[test]
fn disjoint_changes_merge_cleanly() {
    let h = memory(rich_content());
    let root = h.engine.get_head(&h.main.id).unwrap();
    let b = h
        .engine
        .create_branch(CAMPAIGN, "recruit", BranchType::PlayerChoice, "", &root.version_hash)
        .unwrap();

    // B only adds an NPC.
    let b_head = h
        .engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &b.id,
            with(rich_content(), |c| {
                c["npcs"]
                    .as_array_mut()
                    .unwrap()
                    .push(json!({"id": "n2", "name": "Tobin"}));
            }),
        ))
        .unwrap();
    // A (main) only renames a location.
    h.engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &h.main.id,
            with(rich_content(), |c| c["locations"][0]["name"] = json!("Grotto")),
        ))
        .unwrap();
    h.events.clear();

    let merged = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id).author("gm"))
        .unwrap();
    let content = &merged.version.content;
    assert_eq!(content["locations"][0]["name"], "Grotto");
    assert_eq!(content["npcs"].as_array().unwrap().len(), 2);
    assert_eq!(content["npcs"][1]["name"], "Tobin");

    assert_eq!(merged.version.version_type, VersionType::Merge);
    assert_eq!(merged.version.metadata["source_branch_id"], json!(b.id));
    assert_eq!(
        merged.version.metadata["source_head_hash"],
        json!(b_head.version.version_hash)
    );
    assert_eq!(merged.version.branch_id, h.main.id);

    // Target advanced, source untouched.
    assert_eq!(h.engine.get_head(&h.main.id).unwrap(), merged.version.head());
    assert_eq!(h.engine.get_head(&b.id).unwrap(), b_head.version.head());
    assert_eq!(h.events.names(), vec!["branches_merged", "state_transition"]);
}

#[test]
fn same_title_changed_twice_is_one_conflict() {
    let h = memory(rich_content());
    let root = h.engine.get_head(&h.main.id).unwrap();
    let b = h
        .engine
        .create_branch(CAMPAIGN, "rewrite", BranchType::Alternate, "", &root.version_hash)
        .unwrap();
    let b_head = h
        .engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &b.id,
            with(rich_content(), |c| c["chapters"][0]["title"] = json!("Prologue")),
        ))
        .unwrap();
    let a_head = h
        .engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &h.main.id,
            with(rich_content(), |c| c["chapters"][0]["title"] = json!("Opening")),
        ))
        .unwrap();

    let err = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id))
        .unwrap_err();
    match err {
        Error::MergeConflict(conflicts) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].path, "chapters[ch1].title");
            assert_eq!(conflicts[0].source_value, Some(json!("Prologue")));
            assert_eq!(conflicts[0].target_value, Some(json!("Opening")));
        }
        other => panic!("expected merge conflict, got {other:?}"),
    }
    assert_eq!(h.engine.get_head(&h.main.id).unwrap(), a_head.version.head());
    assert_eq!(h.engine.get_head(&b.id).unwrap(), b_head.version.head());
}

#[test]
fn branch_without_new_work_still_records_a_merge() {
    let h = memory(rich_content());
    let root = h.engine.get_head(&h.main.id).unwrap();
    let b = h
        .engine
        .create_branch(CAMPAIGN, "idle", BranchType::Experimental, "", &root.version_hash)
        .unwrap();
    let advanced = h
        .engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &h.main.id,
            with(rich_content(), |c| c["description"] = json!("Main moved on")),
        ))
        .unwrap();

    let merged = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id))
        .unwrap();
    assert_eq!(merged.version.version_type, VersionType::Merge);
    assert_eq!(merged.version.parent_id.as_deref(), Some(advanced.version.id.as_str()));
    assert_eq!(merged.version.content, advanced.version.content);
    assert_eq!(merged.version.version_hash, advanced.version.version_hash);
    assert_eq!(h.engine.get_head(&h.main.id).unwrap(), merged.version.head());

    let err = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &h.main.id, &h.main.id))
        .unwrap_err();
    assert_eq!(err.rule(), "self_merge");
}

#[test]
fn branch_can_be_merged_again_after_more_commits() {
    let h = memory(rich_content());
    let root = h.engine.get_head(&h.main.id).unwrap();
    let b = h
        .engine
        .create_branch(CAMPAIGN, "recruit", BranchType::PlayerChoice, "", &root.version_hash)
        .unwrap();
    let recruited = with(rich_content(), |c| {
        c["npcs"]
            .as_array_mut()
            .unwrap()
            .push(json!({"id": "n2", "name": "Tobin"}));
    });
    let first = h
        .engine
        .create_version(CommitRequest::new(CAMPAIGN, &b.id, recruited.clone()))
        .unwrap();
    h.engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id))
        .unwrap();

    // Main keeps going on its own, then the branch renames the recruit.
    h.engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &h.main.id,
            with(recruited.clone(), |c| c["locations"][0]["name"] = json!("Grotto")),
        ))
        .unwrap();
    h.engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &b.id,
            with(recruited, |c| c["npcs"][1]["name"] = json!("Tobin the Bold")),
        ))
        .unwrap();

    let again = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id))
        .unwrap();
    let content = &again.version.content;
    assert_eq!(content["npcs"][1]["name"], "Tobin the Bold");
    assert_eq!(content["locations"][0]["name"], "Grotto");
    assert_eq!(content["npcs"].as_array().unwrap().len(), 2);
    assert_eq!(again.version.metadata["ancestor_id"], json!(first.version.id));
}

#[test]
fn fast_forward_style_merge_takes_source_content() {
    let h = memory(rich_content());
    let root = h.engine.get_head(&h.main.id).unwrap();
    let b = h
        .engine
        .create_branch(CAMPAIGN, "ahead", BranchType::Alternate, "", &root.version_hash)
        .unwrap();
    let b_head = h
        .engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &b.id,
            with(rich_content(), |c| c["description"] = json!("the tide turns")),
        ))
        .unwrap();
    let merged = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id))
        .unwrap();
    assert_eq!(merged.version.version_hash, b_head.version.version_hash);
    assert_eq!(merged.version.parent_id.as_deref(), Some(root.version_id.as_str()));
}

#[test]
fn merge_carries_removals_from_the_source() {
    let h = memory(rich_content());
    let root = h.engine.get_head(&h.main.id).unwrap();
    let b = h
        .engine
        .create_branch(CAMPAIGN, "cull", BranchType::PlayerChoice, "", &root.version_hash)
        .unwrap();
    h.engine
        .create_version(
            CommitRequest::new(
                CAMPAIGN,
                &b.id,
                with(rich_content(), |c| c["npcs"] = json!([])),
            )
            .transition(saga_core::TransitionType::Delete),
        )
        .unwrap();
    let merged = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id))
        .unwrap();
    assert!(merged.version.content["npcs"].as_array().unwrap().is_empty());
}

#[test]
fn merged_result_is_validated() {
    let h = memory(rich_content());
    let root = h.engine.get_head(&h.main.id).unwrap();
    let b = h
        .engine
        .create_branch(CAMPAIGN, "sequel", BranchType::Alternate, "", &root.version_hash)
        .unwrap();
    // B adds a chapter set in the cave.
    h.engine
        .create_version(CommitRequest::new(
            CAMPAIGN,
            &b.id,
            with(rich_content(), |c| {
                c["chapters"]
                    .as_array_mut()
                    .unwrap()
                    .push(json!({"id": "ch2", "title": "Return", "location_id": "loc1"}));
            }),
        ))
        .unwrap();
    // Main floods the cave and drops every reference to it.
    let main_head = h
        .engine
        .create_version(
            CommitRequest::new(
                CAMPAIGN,
                &h.main.id,
                with(rich_content(), |c| {
                    c["chapters"][0].as_object_mut().unwrap().remove("location_id");
                    c["npcs"][0].as_object_mut().unwrap().remove("location_id");
                    c["locations"] = json!([]);
                }),
            )
            .transition(saga_core::TransitionType::Delete),
        )
        .unwrap();
    h.events.clear();

    let err = h
        .engine
        .merge_branches(MergeRequest::new(CAMPAIGN, &b.id, &h.main.id))
        .unwrap_err();
    assert_eq!(err.rule(), "dangling_reference");
    assert_eq!(h.engine.get_head(&h.main.id).unwrap(), main_head.version.head());

    let events = h.events.events();
    assert_eq!(events.len(), 1);
    let json = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(json["type"], "state_validation_failed");
    assert_eq!(json["operation"], "merge_branches");
}
