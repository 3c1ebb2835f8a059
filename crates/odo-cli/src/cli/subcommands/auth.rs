use clap::{Args, Subcommand};

/// Authentication commands.
#[derive(Clone, Debug, Subcommand)]
pub enum AuthCommands {
    /// Sign in with email and password.
    Login(AuthLoginArgs),
    /// Sign out and clear the stored session.
    Logout,
    /// Show who is signed in and the active clinic.
    Status,
}

#[derive(Clone, Debug, Args)]
pub struct AuthLoginArgs {
    /// Account email.
    #[arg(long)]
    pub email: String,
    /// Password. Read from stdin when omitted.
    #[arg(long)]
    pub password: Option<String>,
}
