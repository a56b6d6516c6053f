use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use lib_collar::vectronics::{DataTypeSelector, DateField};

/// CLI arguments for collar-fetch.
#[derive(Parser, Debug)]
#[clap(
    name = "collar-fetch",
    version,
    author = "ckir",
    about = "Fetches animal-tracking telemetry and prints it as one table.",
    long_about = "Retrieves collar data from the Vectronics API, the ATS web portal or local CSV exports, \
                  merges the per-device or per-file tables and writes the result to stdout."
)]
pub struct Cli {
    #[clap(flatten)]
    pub global: GlobalArgs,

    #[clap(subcommand)]
    pub command: Command,
}

/// Settings shared by every source. Each one overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    #[clap(long, env = "COLLAR_CONFIG", value_hint = ValueHint::FilePath, help = "Path to the JSON configuration file.")]
    pub config: Option<PathBuf>,

    #[clap(long, env = "COLLAR_LOG_DIR", help = "Directory for JSON log files (console only when unset).")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "COLLAR_LOG_LEVEL", help = "Log filter when RUST_LOG is unset (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "VECTRONICS_URL", help = "Base URL of the Vectronics API.")]
    pub vectronics_url: Option<String>,

    #[clap(long, env = "ATS_URL", help = "Base URL of the ATS portal.")]
    pub ats_url: Option<String>,

    #[clap(long, env = "COLLAR_TIMEOUT_SECS", help = "Request timeout in seconds for both remote sources.")]
    pub timeout_secs: Option<u64>,

    #[clap(long, env = "COLLAR_CSV_DELIMITER", help = "Delimiter of CSV input (sniffed when unset).")]
    pub delimiter: Option<char>,

    #[clap(long, value_enum, default_value_t = OutputFormat::Json, help = "Output format.")]
    pub format: OutputFormat,

    #[clap(long, action = ArgAction::SetTrue, help = "Keep column names as the source sent them.")]
    pub keep_names: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Header line plus comma-separated rows.
    Csv,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch from the Vectronics API, one key file per collar.
    Vectronics(VectronicsArgs),
    /// Run an export on the ATS portal.
    Ats(AtsArgs),
    /// Read local CSV exports.
    Csv(CsvArgs),
}

#[derive(Args, Debug)]
pub struct VectronicsArgs {
    /// Collar key files.
    #[clap(long = "key", required = true, value_hint = ValueHint::FilePath, action = ArgAction::Append)]
    pub keys: Vec<PathBuf>,

    /// Record family, e.g. position, activity, mortality (or gps, act, mor).
    #[clap(long = "type", default_value = "position")]
    pub data_type: DataTypeSelector,

    /// Ask for record counts instead of records.
    #[clap(long, action = ArgAction::SetTrue)]
    pub count: bool,

    /// Resume after this record id. Give once for all collars or once per key.
    #[clap(long, action = ArgAction::Append, conflicts_with = "after")]
    pub after_id: Vec<i64>,

    /// Resume after this ISO-8601 timestamp.
    #[clap(long)]
    pub after: Option<String>,

    /// Which timestamp `--after` compares against.
    #[clap(long, value_enum, default_value_t = DateFieldArg::Acquisition, requires = "after")]
    pub date_field: DateFieldArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFieldArg {
    /// When the collar took the fix.
    Acquisition,
    /// When the vendor server received it.
    Scts,
}

impl From<DateFieldArg> for DateField {
    fn from(arg: DateFieldArg) -> Self {
        match arg {
            DateFieldArg::Acquisition => DateField::Acquisition,
            DateFieldArg::Scts => DateField::ServerReceived,
        }
    }
}

#[derive(Args, Debug)]
pub struct AtsArgs {
    #[clap(long, env = "ATS_USR", help = "Portal user name.")]
    pub usr: String,

    #[clap(long, env = "ATS_PWD", hide_env_values = true, help = "Portal password.")]
    pub pwd: String,

    /// Export name from the action table, or a raw control id.
    #[clap(long, default_value = "download_new")]
    pub action: String,
}

#[derive(Args, Debug)]
pub struct CsvArgs {
    /// Files to read.
    #[clap(required = true, value_hint = ValueHint::FilePath)]
    pub files: Vec<PathBuf>,

    /// Known header column; rows above the first row containing it are dropped.
    #[clap(long)]
    pub header_column: Option<String>,

    /// Identifier value per file, in file order.
    #[clap(long, action = ArgAction::Append)]
    pub identifier: Vec<String>,
}
