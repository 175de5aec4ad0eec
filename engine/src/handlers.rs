//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - sync: Reconcile a source document onto a board
//! - fingerprint: Show the run identifier of a source document
//! - capabilities: Show stdio capability resolution

use anyhow::{Context, Result};
use sdk::errors::BoardErrorExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, Credentials, RunConfig, RunMode, TransportKind};
use crate::extract::OpenAIExtractor;
use crate::fingerprint::RunId;
use crate::reconcile::{Reconciler, RunReport};
use crate::secrets::{
    CredentialStore, BOARD_TOKEN_ENV, BOARD_TOKEN_KEY, EXTRACTION_KEY_ENV, EXTRACTION_KEY_KEY,
};
use crate::transport;
use crate::transport::stdio::capabilities::{default_catalog, CapabilityTable};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Arguments of the `sync` command
#[derive(Debug, Clone)]
pub struct SyncArgs {
    pub board: String,
    pub source: PathBuf,
    pub transport: TransportKind,
    pub model: Option<String>,
    pub execute: bool,
}

/// Reconcile a source document onto a board
///
/// Everything that can be checked locally (source file, credentials,
/// configuration) is checked before the first network call. Item write
/// failures are reported and do not fail the command.
pub async fn handle_sync(args: SyncArgs, mut settings: Config, format: OutputFormat) -> Result<()> {
    if let Some(model) = args.model {
        settings.extraction.model = model;
    }

    let source = read_source(&args.source)?;

    let store = CredentialStore::default();
    let board_token = store.require(BOARD_TOKEN_ENV, BOARD_TOKEN_KEY)?;
    let extraction_key = store.require(EXTRACTION_KEY_ENV, EXTRACTION_KEY_KEY)?;

    let mode = if args.execute {
        RunMode::Execute
    } else {
        RunMode::Preview
    };
    let config = Arc::new(RunConfig::new(
        args.board,
        args.source,
        args.transport,
        mode,
        Credentials {
            board_token,
            extraction_key: Some(extraction_key.clone()),
        },
        settings,
    )?);

    let extractor = Arc::new(OpenAIExtractor::new(
        config.settings.extraction.clone(),
        extraction_key,
        config.settings.retry.policy(),
    )?);

    let board = transport::connect(Arc::clone(&config))
        .await
        .with_context(|| format!("Failed to open {} transport", config.transport))?;

    let reconciler = Reconciler::new(Arc::clone(&config), Arc::clone(&board), extractor);
    let outcome = reconciler.run(&source).await;

    if let Err(e) = board.disconnect().await {
        tracing::warn!(error = %e, "Transport disconnect failed");
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            let hint = e.user_hint().to_string();
            return Err(anyhow::Error::new(e).context(format!("Reconciliation failed. {}", hint)));
        }
    };

    print_report(&report, format)
}

/// Print the run identifier of a source document
pub fn handle_fingerprint(path: &Path, format: OutputFormat) -> Result<()> {
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let run_id = RunId::compute(&content);

    match format {
        OutputFormat::Text => {
            println!("Run id: {}", run_id);
            println!("Marker: {}", run_id.marker());
        }
        OutputFormat::Json => {
            let output = json!({
                "path": path.display().to_string(),
                "run_id": run_id,
                "marker": run_id.marker(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show how each stdio capability resolves against the tool catalog
///
/// Fails when a required capability has no tool.
pub fn handle_capabilities(config: &Config, format: OutputFormat) -> Result<()> {
    let catalog = config.stdio.catalog.clone().unwrap_or_else(default_catalog);
    let table = CapabilityTable::resolve_all(&catalog);
    let entries = table.entries();

    match format {
        OutputFormat::Text => {
            println!("Tool catalog:");
            for tool in &catalog {
                println!("  {:<24} {}", tool.name, tool.description);
            }
            println!();
            println!("Capabilities:");
            for (capability, tool) in &entries {
                let kind = if capability.is_required() {
                    "required"
                } else {
                    "optional"
                };
                println!(
                    "  {:<20} {:<9} {}",
                    capability.label(),
                    kind,
                    tool.unwrap_or("-")
                );
            }
        }
        OutputFormat::Json => {
            let capabilities: Vec<_> = entries
                .iter()
                .map(|(capability, tool)| {
                    json!({
                        "capability": capability.label(),
                        "required": capability.is_required(),
                        "tool": tool,
                    })
                })
                .collect();
            let output = json!({
                "catalog": catalog,
                "capabilities": capabilities,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    CapabilityTable::resolve(&catalog)?;
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source {}", path.display()))?;
    if source.trim().is_empty() {
        anyhow::bail!("Source {} is empty", path.display());
    }
    Ok(source)
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mode = match report.mode {
        RunMode::Preview => "preview",
        RunMode::Execute => "execute",
    };
    println!(
        "Run {} on board {} ({}, {})",
        report.run_id, report.board_id, report.transport, mode
    );
    for container in &report.containers {
        println!(
            "  {:<12} {:<20} extracted {}, present {}, planned {}, created {}, failed {}",
            container.title,
            container.id,
            container.extracted,
            container.skipped,
            container.planned,
            container.created,
            container.failed
        );
        for item in &container.items {
            let first_line = item.content.lines().next().unwrap_or_default();
            println!("      ({:>7.1}, {:>7.1})  {}", item.x, item.y, first_line);
        }
    }

    if report.mode == RunMode::Preview {
        println!();
        if report.planned() == 0 {
            println!("Nothing to write.");
        } else {
            println!(
                "Preview only. Re-run with --execute to write {} items.",
                report.planned()
            );
        }
        return Ok(());
    }

    if report.failures_total > 0 {
        println!();
        println!(
            "Failures (showing {} of {}):",
            report.failures.len(),
            report.failures_total
        );
        for failure in &report.failures {
            println!("  {} #{}: {}", failure.container, failure.index, failure.error);
        }
    }

    if let Some(verification) = &report.verification {
        println!();
        if verification.is_consistent() {
            println!("✓ Verified: every written item carries the run marker");
        } else {
            for check in &verification.containers {
                println!(
                    "  {}: expected {} marked items, found {}",
                    check.title, check.expected, check.observed
                );
            }
        }
    }

    println!();
    println!(
        "✓ Created {} items ({} already present, {} failed) in {}ms",
        report.created(),
        report.skipped(),
        report.failures_total,
        report.duration_ms
    );
    Ok(())
}
