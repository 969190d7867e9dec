use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use spirits_core::models::DrinkStyle;

#[derive(Parser)]
#[command(name = "spirits")]
#[command(about = "Log drink check-ins and merge them across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a check-in
    #[command(alias = "new")]
    Add {
        #[command(flatten)]
        drink: DrinkArgs,
    },
    /// List check-ins in a date range
    List {
        /// Number of days back from today to show
        #[arg(short, long, default_value = "7", conflicts_with = "from")]
        days: u32,
        /// First day to show (YYYY-MM-DD, inclusive)
        #[arg(long, value_name = "DATE")]
        from: Option<String>,
        /// Day to stop at (YYYY-MM-DD, exclusive; defaults to tomorrow)
        #[arg(long, value_name = "DATE")]
        to: Option<String>,
        /// Include deleted check-ins
        #[arg(long)]
        deleted: bool,
        /// Include imports awaiting approval
        #[arg(long)]
        pending: bool,
        /// Only show changes after this token (JSON from a previous `list --json`)
        #[arg(long, value_name = "TOKEN")]
        since: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an existing check-in
    Edit {
        /// Check-in ID (`<site>:<index>`, or just the index for this device)
        id: String,
        #[command(flatten)]
        drink: DrinkArgs,
    },
    /// Delete a check-in
    Delete {
        /// Check-in ID (`<site>:<index>`, or just the index for this device)
        id: String,
    },
    /// Stage a check-in from the external service for approval
    Import {
        /// Identifier assigned by the external service
        #[arg(long, value_name = "ID")]
        external_id: u64,
        #[command(flatten)]
        drink: DrinkArgs,
    },
    /// Approve an imported check-in
    Approve {
        /// Check-in ID (`<site>:<index>`, or just the index for this device)
        id: String,
        /// Withdraw a previous approval instead
        #[arg(long)]
        revoke: bool,
    },
    /// Merge check-ins exported by another device
    Merge {
        /// JSON file written by `spirits export --format json`
        file: PathBuf,
    },
    /// Export check-ins
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Include deleted check-ins
        #[arg(long)]
        deleted: bool,
    },
    /// Show the operation log
    Log {
        /// Only show operations after this token
        #[arg(long, value_name = "TOKEN")]
        since: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print this device's site ID
    Site,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Drink fields shared by `add`, `edit`, and `import`
#[derive(Args, Debug, Default, Clone)]
pub struct DrinkArgs {
    /// Drink style
    #[arg(short, long, value_enum)]
    pub style: Option<StyleArg>,
    /// Drink name
    #[arg(short, long)]
    pub name: Option<String>,
    /// Alcohol by volume, in percent (defaults to the style's typical ABV)
    #[arg(long)]
    pub abv: Option<f64>,
    /// Volume, e.g. `330ml`, `0.5l`, `12oz`
    #[arg(short, long)]
    pub volume: Option<String>,
    /// Price paid
    #[arg(short, long)]
    pub price: Option<f64>,
    /// When it was drunk (RFC 3339, `YYYY-MM-DD HH:MM`, or `YYYY-MM-DD`; defaults to now)
    #[arg(long, value_name = "TIME")]
    pub at: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StyleArg {
    Beer,
    Wine,
    Sake,
}

impl From<StyleArg> for DrinkStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Beer => Self::Beer,
            StyleArg::Wine => Self::Wine,
            StyleArg::Sake => Self::Sake,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl From<ExportFormat> for spirits_core::export::ExportFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => Self::Json,
            ExportFormat::Markdown => Self::Markdown,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
