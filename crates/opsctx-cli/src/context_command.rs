use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use opsctx_aggregator::{ContextAggregator, ContextReport};
use opsctx_core::{write_text_atomic, Clock, SystemClock};

use crate::cli_args::ContextArgs;
use crate::context_config::{load_context_config, ContextConfig};
use crate::report_render::{render_failures, render_json, render_report, RenderSettings};
use crate::source_wiring::build_source_set;

/// Rendered output of one `context` invocation.
#[derive(Debug)]
pub struct ContextOutput {
    pub report: ContextReport,
    pub stdout: String,
    pub stderr: Option<String>,
}

/// Loads config from `config_path` and runs the context command.
pub async fn run_context_command(
    config_path: Option<&Path>,
    verbose: bool,
    args: &ContextArgs,
) -> Result<()> {
    let mut config = load_context_config(config_path)?;
    args.apply_overrides(&mut config);
    let settings = config.render_settings(verbose);
    let output = collect_context(&config, &settings, args, Arc::new(SystemClock)).await?;
    if let Some(notice) = &output.stderr {
        eprint!("{notice}");
    }
    println!("{}", output.stdout.trim_end());
    Ok(())
}

/// Aggregates, renders and optionally exports the report.
pub async fn collect_context(
    config: &ContextConfig,
    settings: &RenderSettings,
    args: &ContextArgs,
    clock: Arc<dyn Clock>,
) -> Result<ContextOutput> {
    let sources = build_source_set(&config.source_settings())
        .context("invalid source configuration")?;
    let aggregator = ContextAggregator::new(sources, clock);
    let report = aggregator
        .aggregate(&args.cluster, &args.aggregate_options(config))
        .await
        .context("failed to query cluster info")?;

    if let Some(path) = &args.output_file {
        write_text_atomic(path, &render_json(&report)?)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "report exported");
    }

    let stdout = render_report(&report, args.output, settings)?;
    let stderr = render_failures(&report.failures);
    Ok(ContextOutput {
        report,
        stdout,
        stderr,
    })
}
