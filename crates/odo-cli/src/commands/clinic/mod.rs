mod current;
mod list;
mod select;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::ClinicCommands;
use crate::context::AppContext;

/// Handle `odo clinic <subcommand>`.
pub async fn handle(action: &ClinicCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        ClinicCommands::List => list::handle(ctx, flags),
        ClinicCommands::Select(args) => select::handle(args, ctx, flags).await,
        ClinicCommands::Current => current::handle(ctx, flags),
    }
}
