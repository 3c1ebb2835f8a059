use clap::{Args, Subcommand};

/// Clinic commands.
#[derive(Clone, Debug, Subcommand)]
pub enum ClinicCommands {
    /// List clinics the signed-in user belongs to.
    List,
    /// Make a clinic the active one for this session.
    Select(ClinicSelectArgs),
    /// Show the active clinic.
    Current,
}

#[derive(Clone, Debug, Args)]
pub struct ClinicSelectArgs {
    /// Clinic ID (see `odo clinic list`).
    pub clinic_id: String,
}
