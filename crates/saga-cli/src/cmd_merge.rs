use crate::output::print_committed;
use crate::workspace::ctrlc_cancel;
use crate::Ctx;
use saga_engine::MergeRequest;

/// `saga merge <src> <dst>`
pub fn execute(ctx: &Ctx, src: &str, dst: &str, author: &str, message: &str) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let _lock = ws.lock()?;
    let source = ws.branch(src)?;
    let target = ws.branch(dst)?;

    let req = MergeRequest::new(ws.campaign()?, &source.id, &target.id)
        .author(author)
        .message(message)
        .cancel_token(ctrlc_cancel());
    let committed = ws.engine.merge_branches(req)?;

    if !ctx.json {
        println!("Merged {src} into {dst}");
    }
    print_committed(&committed, ctx.json)
}
