use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::CommandSource;

#[derive(Debug, Parser)]
#[command(name = "deskpilot", version, about = "Natural-language desktop command core")]
pub struct Cli {
    /// Path to a YAML config file; built-in defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process a single command through the pipeline.
    Run(RunArgs),

    /// Report provider and connectivity availability.
    Doctor,

    /// Inspect or override persisted per-target permissions.
    Permissions(PermissionsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    LocalDevice,
    RemoteApi,
    Socket,
}

impl From<SourceArg> for CommandSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::LocalDevice => CommandSource::LocalDevice,
            SourceArg::RemoteApi => CommandSource::RemoteApi,
            SourceArg::Socket => CommandSource::Socket,
        }
    }
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// The command text, e.g. `deskpilot run -- open chrome`.
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,

    #[arg(long, value_enum, default_value_t = SourceArg::Socket)]
    pub source: SourceArg,
}

#[derive(Debug, Parser)]
pub struct PermissionsArgs {
    #[command(subcommand)]
    pub action: PermissionsAction,
}

#[derive(Debug, Subcommand)]
pub enum PermissionsAction {
    /// List every persisted decision.
    List,
    /// Persist an allow for a target.
    Grant { target: String },
    /// Persist a deny for a target.
    Deny { target: String },
    /// Drop a target's record so consent runs again next time.
    Revoke { target: String },
}
