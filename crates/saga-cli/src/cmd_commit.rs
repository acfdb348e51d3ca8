use crate::output::print_committed;
use crate::workspace::{ctrlc_cancel, read_content};
use crate::Ctx;
use saga_core::TransitionType;
use saga_engine::{CommitRequest, RevertRequest};
use std::path::Path;

pub struct CommitParams<'a> {
    pub file: &'a Path,
    pub branch: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub author: &'a str,
    pub transition: &'a str,
    pub reason: &'a str,
}

/// `saga commit <file>`
pub fn commit(ctx: &Ctx, params: &CommitParams<'_>) -> anyhow::Result<()> {
    let transition: TransitionType = params.transition.parse()?;
    if !matches!(
        transition,
        TransitionType::Create | TransitionType::Update | TransitionType::Delete
    ) {
        anyhow::bail!(
            "--type must be create, update or delete (got {transition}); use `saga merge` or `saga revert`"
        );
    }
    let content = read_content(params.file)?;

    let ws = ctx.workspace()?;
    let _lock = ws.lock()?;
    let branch = ws.branch(params.branch)?;
    let req = CommitRequest::new(ws.campaign()?, &branch.id, content)
        .title(params.title)
        .message(params.message)
        .author(params.author)
        .transition(transition)
        .reason(params.reason)
        .cancel_token(ctrlc_cancel());

    let committed = ws.engine.create_version(req)?;
    print_committed(&committed, ctx.json)
}

/// `saga revert <target>`
pub fn revert(
    ctx: &Ctx,
    target: &str,
    branch: &str,
    author: &str,
    message: &str,
) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let _lock = ws.lock()?;
    let branch = ws.branch(branch)?;
    let req = RevertRequest::new(ws.campaign()?, &branch.id, target)
        .author(author)
        .message(message)
        .cancel_token(ctrlc_cancel());

    let committed = ws.engine.revert(req)?;
    print_committed(&committed, ctx.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::tests::{content, initialized};
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: serde_json::Value) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn params<'a>(file: &'a Path, transition: &'a str) -> CommitParams<'a> {
        CommitParams {
            file,
            branch: "main",
            title: "t",
            message: "",
            author: "gm",
            transition,
            reason: "",
        }
    }

    #[test]
    fn commit_then_revert() {
        let (tmp, ws) = initialized();
        let ctx = Ctx {
            repo_root: tmp.path().to_path_buf(),
            campaign: None,
            json: true,
        };
        let root = ws.version("main").unwrap();

        let mut next = content();
        next["description"] = json!("A storm gathers");
        let file = write(tmp.path(), "next.json", next);
        commit(&ctx, &params(&file, "update")).unwrap();
        assert_eq!(ws.version("main").unwrap().content["description"], "A storm gathers");

        revert(&ctx, &root.version_hash, "main", "gm", "undo").unwrap();
        let head = ws.version("main").unwrap();
        assert_eq!(head.content, root.content);
        assert_eq!(head.version_type, saga_core::VersionType::Revert);
    }

    #[test]
    fn merge_transition_is_not_a_commit_type() {
        let (tmp, _ws) = initialized();
        let ctx = Ctx {
            repo_root: tmp.path().to_path_buf(),
            campaign: None,
            json: true,
        };
        let file = write(tmp.path(), "same.json", content());
        assert!(commit(&ctx, &params(&file, "merge")).is_err());
        assert!(commit(&ctx, &params(&file, "sideways")).is_err());
    }

    #[test]
    fn rejected_commit_surfaces_rule() {
        let (tmp, ws) = initialized();
        let ctx = Ctx {
            repo_root: tmp.path().to_path_buf(),
            campaign: None,
            json: true,
        };
        let mut next = content();
        next["theme"] = json!("noir");
        let file = write(tmp.path(), "noir.json", next);
        let err = commit(&ctx, &params(&file, "update")).unwrap_err();
        assert_eq!(err.downcast_ref::<saga_core::Error>().unwrap().rule(), "theme_changed");
        assert_eq!(ws.engine.list_versions("c1").unwrap().len(), 1);
    }
}
