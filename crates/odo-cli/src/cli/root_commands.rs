use clap::Subcommand;

use crate::cli::subcommands::{AuthCommands, ClinicCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Sign in, sign out, session status.
    Auth {
        #[command(subcommand)]
        action: AuthCommands,
    },
    /// Clinic memberships and the active clinic.
    Clinic {
        #[command(subcommand)]
        action: ClinicCommands,
    },
}
