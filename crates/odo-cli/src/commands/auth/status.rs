use crate::cli::GlobalFlags;
use crate::commands::shared::SessionView;
use crate::context::AppContext;
use crate::output::output;

/// Report the session as reconciled by the startup restore check.
pub async fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let view = SessionView::from_state(&ctx.controller.snapshot())
        .with_stored_credentials(ctx.backend.has_credentials().await);
    output(&view, flags.format)
}
