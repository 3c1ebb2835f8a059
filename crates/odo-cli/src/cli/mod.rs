use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `odo` binary.
#[derive(Debug, Parser)]
#[command(name = "odo", version, about = "Odonto - clinic session tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, table, raw (defaults to general.default_format)
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Quiet mode (errors only in logs)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Extract global flags for command handlers, falling back to the
    /// configured format when `--format` is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if `default_format` is not a known format.
    pub fn global_flags(&self, default_format: &str) -> anyhow::Result<GlobalFlags> {
        let format = match self.format {
            Some(format) => format,
            None => OutputFormat::from_config(default_format)?,
        };
        Ok(GlobalFlags {
            format,
            quiet: self.quiet,
        })
    }
}
