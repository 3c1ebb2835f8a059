pub mod auth;
pub mod clinic;

pub use auth::AuthCommands;
pub use clinic::ClinicCommands;
