use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use opsctx_aggregator::{AggregateOptions, DEFAULT_MAX_PAGES, DEFAULT_WINDOW_DAYS};

use crate::context_config::ContextConfig;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "opsctx",
    about = "Assemble the operational context of a managed cluster",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    #[arg(
        long,
        global = true,
        env = "OPSCTX_CONFIG",
        help = "Path to the TOML config file. Defaults to $HOME/.config/opsctx/config.toml."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Log source progress to stderr (same as RUST_LOG=info) and print full service logs."
    )]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Shows the context of a cluster: support status, service logs, tickets,
    /// incidents and optionally audit events.
    Context(ContextArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliOutputFormat {
    Long,
    Short,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct ContextArgs {
    #[arg(help = "Cluster id, external id or name.")]
    pub cluster: String,

    #[arg(short = 'o', long, value_enum, default_value_t = CliOutputFormat::Long)]
    pub output: CliOutputFormat,

    #[arg(
        short = 'd',
        long,
        default_value_t = DEFAULT_WINDOW_DAYS,
        allow_negative_numbers = true,
        help = "Look-back window in days for service logs and incident history."
    )]
    pub days: i64,

    #[arg(
        long,
        default_value_t = DEFAULT_MAX_PAGES,
        value_parser = parse_positive_usize,
        help = "Maximum pages requested from any single source."
    )]
    pub pages: usize,

    #[arg(
        long,
        help = "Also collect incident history and audit events. These queries are slow."
    )]
    pub full: bool,

    #[arg(
        short = 't',
        long = "team-ids",
        value_delimiter = ',',
        help = "Incident tracker team ids used to narrow service discovery."
    )]
    pub team_ids: Vec<String>,

    #[arg(long, env = "OPSCTX_REGISTRY_TOKEN", hide_env_values = true)]
    pub registry_token: Option<String>,

    #[arg(long, env = "OPSCTX_JIRA_TOKEN", hide_env_values = true)]
    pub jira_token: Option<String>,

    #[arg(long, env = "OPSCTX_PD_USER_TOKEN", hide_env_values = true)]
    pub pd_user_token: Option<String>,

    #[arg(long, env = "OPSCTX_PD_OAUTH_TOKEN", hide_env_values = true)]
    pub pd_oauth_token: Option<String>,

    #[arg(
        long,
        help = "Also write the report as JSON to this file (atomic replace)."
    )]
    pub output_file: Option<PathBuf>,
}

impl ContextArgs {
    pub fn aggregate_options(&self, config: &ContextConfig) -> AggregateOptions {
        let team_ids = if self.team_ids.is_empty() {
            config.team_ids.clone()
        } else {
            self.team_ids.clone()
        };
        AggregateOptions {
            window_days: self.days,
            max_pages: self.pages,
            team_ids,
            include_expensive: self.full,
        }
    }

    /// Flag and environment credentials win over file values.
    pub fn apply_overrides(&self, config: &mut ContextConfig) {
        let overrides = [
            (&self.registry_token, &mut config.registry_token),
            (&self.jira_token, &mut config.jira_token),
            (&self.pd_user_token, &mut config.pd_user_token),
            (&self.pd_oauth_token, &mut config.pd_oauth_token),
        ];
        for (flag, slot) in overrides {
            if let Some(value) = flag.as_ref().filter(|value| !value.trim().is_empty()) {
                *slot = Some(value.clone());
            }
        }
    }
}
