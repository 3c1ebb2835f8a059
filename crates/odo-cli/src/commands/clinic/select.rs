use anyhow::Context;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::clinic::ClinicSelectArgs;
use crate::commands::shared::SessionView;
use crate::context::AppContext;
use crate::output::output;

pub async fn handle(args: &ClinicSelectArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let clinic_id = args.clinic_id.trim();
    if clinic_id.is_empty() {
        anyhow::bail!("clinic select: clinic id must not be empty");
    }

    ctx.controller
        .select_clinic(clinic_id)
        .await
        .with_context(|| format!("clinic select: could not activate clinic '{clinic_id}'"))?;

    output(&SessionView::from_state(&ctx.controller.snapshot()), flags.format)
}
