//! Command-line front end for opsctx.
//!
//! Parses arguments, loads the TOML config, wires one HTTP adapter per
//! external system and renders the aggregated cluster context.

pub mod bootstrap_helpers;
pub mod cli_args;
pub mod context_command;
pub mod context_config;
pub mod report_render;
pub mod source_wiring;

pub use bootstrap_helpers::init_tracing;
pub use cli_args::{Cli, CliCommand, CliOutputFormat, ContextArgs};
pub use context_command::{collect_context, run_context_command, ContextOutput};
pub use context_config::{
    default_config_path, load_context_config, parse_context_config, ContextConfig,
    SourceSettings,
};
pub use report_render::{
    render_failures, render_json, render_long, render_report, render_short, RenderSettings,
};
pub use source_wiring::build_source_set;
