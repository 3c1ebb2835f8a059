use crate::cli::GlobalFlags;
use crate::commands::shared::SessionView;
use crate::context::AppContext;
use crate::output::output;

pub fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let state = ctx.controller.snapshot();
    if !state.is_authenticated() {
        anyhow::bail!("clinic current: not signed in (run `odo auth login`)");
    }
    output(&SessionView::from_state(&state), flags.format)
}
