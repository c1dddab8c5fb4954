use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ovr_core::{Issue, OverrideType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{other}', expected one of: table, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Args)]
pub struct UpstreamArgs {
    #[arg(
        long,
        help = "Upstream version to compare against. Defaults to the config pin, then the installed package.json"
    )]
    pub version: Option<String>,

    #[arg(
        long,
        help = "Git checkout of the upstream project. Defaults to OVR_UPSTREAM_REPO, then [upstream].repo_path"
    )]
    pub upstream_repo: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct GenerateArgs {
    #[arg(help = "Directory containing the override files")]
    pub override_dir: PathBuf,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[arg(
        long,
        help = "Classification worker threads. Defaults to [classify].concurrency"
    )]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ValidateArgs {
    #[arg(help = "Directory containing the override files")]
    pub override_dir: PathBuf,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[arg(
        long,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Report format: table or json"
    )]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RefreshArgs {
    #[arg(help = "Directory containing the override files")]
    pub override_dir: PathBuf,

    #[arg(help = "Override path relative to the override directory")]
    pub file: String,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct AddArgs {
    #[arg(help = "Directory containing the override files")]
    pub override_dir: PathBuf,

    #[arg(help = "Override path relative to the override directory")]
    pub file: String,

    #[arg(
        long = "type",
        value_parser = parse_override_type,
        help = "Override type: copy, patch, derived or unknown"
    )]
    pub override_type: OverrideType,

    #[arg(
        long,
        help = "Upstream file the override is based on. Defaults to the override path for copies"
    )]
    pub base_file: Option<String>,

    #[arg(
        long,
        value_parser = parse_issue,
        help = "Tracking issue number, or LEGACY_FIXME. Required for patches"
    )]
    pub issue: Option<Issue>,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RemoveArgs {
    #[arg(help = "Directory containing the override files")]
    pub override_dir: PathBuf,

    #[arg(help = "Override path relative to the override directory")]
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Classify every override against upstream and write the manifest
    Generate(GenerateArgs),
    /// Report drift and manifest inconsistencies
    Validate(ValidateArgs),
    /// Re-baseline one override to the current upstream version
    Refresh(RefreshArgs),
    /// Record one hand-classified override in the manifest
    Add(AddArgs),
    /// Drop one override from the manifest
    Remove(RemoveArgs),
}

#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "Track override files against the upstream tree they were forked from"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse()
}

fn parse_override_type(value: &str) -> Result<OverrideType, String> {
    value.parse()
}

fn parse_issue(value: &str) -> Result<Issue, String> {
    value.parse()
}
