//! Reconciliation
//!
//! One run moves through a fixed sequence of steps:
//!
//! 1. Fingerprint the source and extract items (validation failures stop here,
//!    before anything is written)
//! 2. Ensure both containers exist
//! 3. List existing items of both containers concurrently
//! 4. Drop items this run already wrote
//! 5. Lay out the rest
//! 6. Stop here in preview mode
//! 7. Create the items, one container at a time
//! 8. Re-list both containers and count this run's markers
//! 9. Report
//!
//! Preview mode never writes: containers are looked up, not created, and a
//! missing container is reported as planned.

use regex::Regex;
use serde::Serialize;
use sdk::errors::BoardError;
use sdk::transport::{BoardTransport, ContainerSpec};
use sdk::types::{BatchResult, Container, ExistingItem, PlacedItem};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Point, RunConfig, RunMode};
use crate::extract::Extractor;
use crate::fingerprint::RunId;
use crate::layout::layout;

/// Failures kept in a report
pub const MAX_REPORTED_FAILURES: usize = 10;

/// Characters kept from each failure message
pub const MAX_ERROR_CHARS: usize = 200;

/// Id reported for a container that preview would create
pub const PLANNED_CONTAINER_ID: &str = "(planned)";

/// Outcome for one container
#[derive(Debug, Clone, Serialize)]
pub struct ContainerReport {
    pub title: String,
    pub id: String,
    /// Items extracted for this container
    pub extracted: usize,
    /// Items already present from an earlier run of the same source
    pub skipped: usize,
    /// Items laid out for creation
    pub planned: usize,
    pub created: usize,
    pub failed: usize,
    /// Laid-out items, filled in preview mode only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<PlacedItem>,
}

/// One item that could not be created
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub container: String,
    pub index: usize,
    pub error: String,
}

/// Marker count for one container after writing
#[derive(Debug, Clone, Serialize)]
pub struct ContainerCheck {
    pub title: String,
    pub expected: usize,
    pub observed: usize,
}

/// Post-write marker counts
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub containers: Vec<ContainerCheck>,
}

impl Verification {
    pub fn is_consistent(&self) -> bool {
        self.containers.iter().all(|c| c.expected == c.observed)
    }
}

/// Summary of one reconciliation run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub board_id: String,
    pub transport: String,
    pub mode: RunMode,
    pub containers: Vec<ContainerReport>,
    /// The first few failures, messages truncated
    pub failures: Vec<FailureReport>,
    pub failures_total: usize,
    /// Absent in preview mode or when the re-listing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn created(&self) -> usize {
        self.containers.iter().map(|c| c.created).sum()
    }

    pub fn planned(&self) -> usize {
        self.containers.iter().map(|c| c.planned).sum()
    }

    pub fn skipped(&self) -> usize {
        self.containers.iter().map(|c| c.skipped).sum()
    }
}

/// Per-container state carried between steps
struct Target<'a> {
    title: &'a str,
    center: Point,
    texts: Vec<String>,
    container: Container,
    existing: Vec<ExistingItem>,
}

/// Drives one run against a board through an abstract transport
pub struct Reconciler {
    config: Arc<RunConfig>,
    transport: Arc<dyn BoardTransport>,
    extractor: Arc<dyn Extractor>,
}

impl Reconciler {
    pub fn new(
        config: Arc<RunConfig>,
        transport: Arc<dyn BoardTransport>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            config,
            transport,
            extractor,
        }
    }

    /// Reconcile `source` onto the configured board.
    ///
    /// # Errors
    ///
    /// Extraction, container and listing failures end the run. Failed item
    /// writes do not; they are listed in the report.
    pub async fn run(&self, source: &str) -> Result<RunReport, BoardError> {
        let started = Instant::now();
        let board_id = self.config.board_id.as_str();
        let run_id = RunId::compute(source.as_bytes());
        info!(board_id, run_id = %run_id, mode = ?self.config.mode, "Starting reconciliation");

        let extraction = self.extractor.extract(source).await?;
        info!(
            insights = extraction.insights.len(),
            risks = extraction.risks.len(),
            "Extraction validated"
        );

        let containers = &self.config.settings.containers;
        let mut targets = Vec::with_capacity(2);
        for (title, center, texts) in [
            (
                containers.insights_title.as_str(),
                containers.insights_center,
                extraction.insights,
            ),
            (
                containers.risks_title.as_str(),
                containers.risks_center,
                extraction.risks,
            ),
        ] {
            let container = self.resolve_container(title, center).await?;
            targets.push(Target {
                title,
                center,
                texts,
                container,
                existing: Vec::new(),
            });
        }

        let (first, second) = tokio::try_join!(
            self.existing_items(&targets[0].container),
            self.existing_items(&targets[1].container)
        )?;
        targets[0].existing = first;
        targets[1].existing = second;

        let layout_config = &self.config.settings.layout;
        let mut reports = Vec::with_capacity(targets.len());
        let mut planned = Vec::with_capacity(targets.len());
        for target in &targets {
            let fresh = pending_items(&target.texts, &target.existing, &run_id);
            let skipped = target.texts.len() - fresh.len();
            let placed = layout(&target.container, &fresh, layout_config);
            debug!(
                container = target.title,
                center_x = target.center.x,
                center_y = target.center.y,
                skipped,
                planned = placed.len(),
                "Delta computed"
            );

            reports.push(ContainerReport {
                title: target.title.to_string(),
                id: target.container.id.clone(),
                extracted: target.texts.len(),
                skipped,
                planned: placed.len(),
                created: 0,
                failed: 0,
                items: Vec::new(),
            });
            planned.push(placed);
        }

        if self.config.is_preview() {
            for (report, placed) in reports.iter_mut().zip(planned) {
                report.items = placed;
            }
            info!(
                planned = reports.iter().map(|r| r.planned).sum::<usize>(),
                "Preview complete, nothing written"
            );
            return Ok(RunReport {
                run_id,
                board_id: board_id.to_string(),
                transport: self.transport.name().to_string(),
                mode: self.config.mode,
                containers: reports,
                failures: Vec::new(),
                failures_total: 0,
                verification: None,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let chunk_size = self.config.settings.batch.chunk_size;
        let mut failures = Vec::new();
        for (report, placed) in reports.iter_mut().zip(&planned) {
            if placed.is_empty() {
                continue;
            }
            let batch = self
                .transport
                .batch_create(board_id, placed, chunk_size)
                .await;
            record_batch(report, &batch, &mut failures);
        }
        let failures_total = failures.len();
        failures.truncate(MAX_REPORTED_FAILURES);

        let verification = self.verify(&targets, &reports, &run_id).await;

        info!(
            created = reports.iter().map(|r| r.created).sum::<usize>(),
            failed = failures_total,
            "Reconciliation complete"
        );

        Ok(RunReport {
            run_id,
            board_id: board_id.to_string(),
            transport: self.transport.name().to_string(),
            mode: self.config.mode,
            containers: reports,
            failures,
            failures_total,
            verification,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn resolve_container(&self, title: &str, center: Point) -> Result<Container, BoardError> {
        let containers = &self.config.settings.containers;
        let spec = ContainerSpec {
            title,
            x: center.x,
            y: center.y,
            width: containers.width,
            height: containers.height,
        };
        let board_id = self.config.board_id.as_str();

        if !self.config.is_preview() {
            return self.transport.ensure_container(board_id, spec).await;
        }

        Ok(self
            .transport
            .find_container(board_id, title)
            .await?
            .unwrap_or_else(|| Container {
                id: PLANNED_CONTAINER_ID.to_string(),
                title: title.trim().to_string(),
                x: spec.x,
                y: spec.y,
                width: spec.width,
                height: spec.height,
            }))
    }

    async fn existing_items(&self, container: &Container) -> Result<Vec<ExistingItem>, BoardError> {
        if container.id == PLANNED_CONTAINER_ID {
            return Ok(Vec::new());
        }
        self.transport
            .list_items_in_container(&self.config.board_id, &container.id)
            .await
    }

    async fn verify(
        &self,
        targets: &[Target<'_>],
        reports: &[ContainerReport],
        run_id: &RunId,
    ) -> Option<Verification> {
        let listed = tokio::try_join!(
            self.existing_items(&targets[0].container),
            self.existing_items(&targets[1].container)
        );
        let (first, second) = match listed {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Verification listing failed");
                return None;
            }
        };

        let containers = [first, second]
            .iter()
            .zip(reports)
            .map(|(items, report)| ContainerCheck {
                title: report.title.clone(),
                expected: report.skipped + report.created,
                observed: items.iter().filter(|i| run_id.is_marked(&i.content)).count(),
            })
            .collect::<Vec<_>>();

        for check in containers.iter().filter(|c| c.expected != c.observed) {
            warn!(
                container = %check.title,
                expected = check.expected,
                observed = check.observed,
                "Marker count differs after writing"
            );
        }

        Some(Verification { containers })
    }
}

/// Decorated texts that this run has not written to the container yet.
///
/// An item counts as written when an existing item carries this run's marker
/// and its body, with the marker removed, equals the item's text. Each
/// existing item accounts for at most one text. Markers of other runs never
/// match.
pub fn pending_items(texts: &[String], existing: &[ExistingItem], run_id: &RunId) -> Vec<String> {
    let marker = run_id.marker();
    let mut written: Vec<String> = existing
        .iter()
        .map(|item| normalize(&item.content))
        .filter(|content| content.contains(&marker))
        .map(|content| collapse_whitespace(&content.replace(&marker, " ")))
        .collect();

    texts
        .iter()
        .filter(|text| {
            let body = collapse_whitespace(text);
            match written.iter().position(|w| *w == body) {
                Some(found) => {
                    written.swap_remove(found);
                    false
                }
                None => true,
            }
        })
        .map(|text| run_id.decorate(text))
        .collect()
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[A-Za-z/!][^>]*>").expect("Invalid tag pattern"))
}

/// Plain text of item content: markup removed, common entities decoded and
/// whitespace collapsed.
///
/// A `<` that does not open a tag is kept as text.
fn normalize(content: &str) -> String {
    let text = tag_pattern()
        .replace_all(content, " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn record_batch(report: &mut ContainerReport, batch: &BatchResult, failures: &mut Vec<FailureReport>) {
    report.created += batch.ok;
    report.failed += batch.failed.len();
    failures.extend(batch.failed.iter().map(|f| FailureReport {
        container: report.title.clone(),
        index: f.index,
        error: f.error.chars().take(MAX_ERROR_CHARS).collect(),
    }));
}
