use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};

use postviz_server::provider::RegenerationMode;

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "postviz",
    version,
    author,
    about = "Visual summary generation for published content"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            command: None,
            verbose: 0,
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the postviz HTTP server.
    Serve(ServeArgs),
    /// Generate visualizations for a single content item.
    Generate(GenerateArgs),
    /// Scan the CMS and process every item still missing artifacts.
    Scan(ScanArgs),
    /// Show the stored generation record for a slug.
    Status(StatusArgs),
    /// Delete a record and its stored artifacts.
    Cleanup(CleanupArgs),
    /// Fail records stuck in `generating` past an age threshold.
    Reap(ReapArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs;

/// How a run treats previously recorded artifacts.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GenerateMode {
    Regenerate,
    FillMissing,
}

impl GenerateMode {
    pub fn to_mode(self) -> RegenerationMode {
        match self {
            GenerateMode::Regenerate => RegenerationMode::Regenerate,
            GenerateMode::FillMissing => RegenerationMode::FillMissing,
        }
    }
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Slug of the content item to process.
    pub slug: String,
    /// Rebuild everything or only fill absent kinds.
    #[arg(long, value_enum, default_value_t = GenerateMode::Regenerate)]
    pub mode: GenerateMode,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Rebuild everything or only fill absent kinds.
    #[arg(long, value_enum, default_value_t = GenerateMode::FillMissing)]
    pub mode: GenerateMode,
    /// Cap on the number of items processed in one scan.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Slug of the content item to look up.
    pub slug: String,
    /// Emit the raw record as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Slug of the record to delete.
    pub slug: String,
    /// Confirm the permanent deletion.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ReapArgs {
    /// Age threshold in minutes before a generating record is failed.
    #[arg(long, default_value_t = 120)]
    pub max_age_mins: u64,
}
