use std::fs;

use camino::Utf8PathBuf;
use serde::Serialize;
use tempfile::Builder;
use tracing::{info, warn};

use crate::classify::RowStream;
use crate::config::ParserConfig;
use crate::domain::{Forest, MaterializationOutcome, NameResolution, SlotStatus, is_safe_segment};
use crate::error::SortlyError;
use crate::fetch::MediaFetcher;
use crate::grid::{SpreadsheetSink, SpreadsheetSource, Workbook};
use crate::materialize::Materializer;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::rewrite::rewrite;
use crate::tree::TreeBuilder;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub folders: usize,
    pub items: usize,
    pub total_images: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
    pub dangling_ancestors: usize,
    pub issues: Vec<RowIssue>,
    pub failures: Vec<SlotFailure>,
    pub output_path: Option<String>,
}

/// A row that was skipped during ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct RowIssue {
    pub row: u32,
    pub kind: RowIssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssueKind {
    DanglingAncestor,
    TopLevelItem,
    DuplicateFolderName,
    UnsafeName,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotFailure {
    pub row: u32,
    pub column: u32,
    pub url: String,
    pub reason: String,
}

/// Result of the ingestion pass: the rebuilt tree and the rows it had to skip.
#[derive(Debug, Default)]
pub struct Ingestion {
    pub forest: Forest,
    pub issues: Vec<RowIssue>,
}

impl Ingestion {
    /// Streams rows from the grid into a forest. Only a malformed row is fatal.
    pub fn run<G: SpreadsheetSource + ?Sized>(
        grid: &G,
        resolution: NameResolution,
    ) -> Result<Self, SortlyError> {
        let builder = TreeBuilder::new(resolution);
        let mut ingestion = Ingestion::default();
        for row in RowStream::new(grid) {
            let row = row?;
            if let Err(err) = builder.attach(&mut ingestion.forest, &row) {
                let Some(kind) = issue_kind(&err) else {
                    return Err(err);
                };
                warn!(row = row.row_index, "row skipped: {err}");
                ingestion.issues.push(RowIssue {
                    row: row.row_index,
                    kind,
                    message: err.to_string(),
                });
            }
        }
        Ok(ingestion)
    }
}

fn issue_kind(err: &SortlyError) -> Option<RowIssueKind> {
    match err {
        SortlyError::DanglingAncestor { .. } => Some(RowIssueKind::DanglingAncestor),
        SortlyError::TopLevelItem { .. } => Some(RowIssueKind::TopLevelItem),
        SortlyError::DuplicateFolderName { .. } => Some(RowIssueKind::DuplicateFolderName),
        SortlyError::UnsafeName { .. } => Some(RowIssueKind::UnsafeName),
        _ => None,
    }
}

#[derive(Clone)]
pub struct App<F: MediaFetcher> {
    fetcher: F,
}

impl<F: MediaFetcher> App<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Opens `config.file_path`, processes it and persists the rewritten workbook under
    /// `<root_folder>/excel/<first root folder>.xlsx`.
    pub fn run(
        &self,
        config: &ParserConfig,
        sink: &dyn ProgressSink,
    ) -> Result<Report, SortlyError> {
        let input = config
            .file_path
            .as_ref()
            .ok_or_else(|| SortlyError::InvalidConfig("no input file given".to_string()))?;
        info!(%input, "reading workbook");
        let mut workbook = Workbook::open(input)?;

        let (mut report, first_root) = self.process_inner(&mut workbook, config, sink)?;

        match first_root {
            Some(name) => {
                let output = persist(&workbook, config, &name)?;
                sink.event(ProgressEvent::Phase(format!("workbook written to {output}")));
                info!(%output, "output workbook written");
                report.output_path = Some(output.to_string());
            }
            None => info!("catalog is empty, no output workbook written"),
        }
        Ok(report)
    }

    /// Runs ingestion, materialization and link rewriting over an already open grid.
    pub fn process<G: SpreadsheetSource + SpreadsheetSink>(
        &self,
        grid: &mut G,
        config: &ParserConfig,
        sink: &dyn ProgressSink,
    ) -> Result<Report, SortlyError> {
        self.process_inner(grid, config, sink)
            .map(|(report, _)| report)
    }

    fn process_inner<G: SpreadsheetSource + SpreadsheetSink>(
        &self,
        grid: &mut G,
        config: &ParserConfig,
        sink: &dyn ProgressSink,
    ) -> Result<(Report, Option<String>), SortlyError> {
        sink.event(ProgressEvent::Phase("parsing catalog".to_string()));
        let Ingestion { forest, issues } = Ingestion::run(&*grid, config.resolution)?;
        info!(
            folders = forest.folder_count(),
            items = forest.item_count(),
            images = forest.image_count(),
            skipped = issues.len(),
            "catalog parsed"
        );

        sink.event(ProgressEvent::Phase(format!(
            "materializing {} photos",
            forest.image_count()
        )));
        let outcomes = Materializer::new(&self.fetcher, config).materialize(&forest, sink);
        info!(slots = outcomes.len(), "photos materialized");

        let written = rewrite(grid, &outcomes);
        info!(cells = written, "links rewritten");

        let report = build_report(&forest, issues, &outcomes);
        let first_root = forest.first_root().map(|folder| folder.name.clone());
        Ok((report, first_root))
    }
}

fn build_report(
    forest: &Forest,
    issues: Vec<RowIssue>,
    outcomes: &[MaterializationOutcome],
) -> Report {
    let count = |status: SlotStatus| {
        outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    };
    let failures = outcomes
        .iter()
        .filter(|outcome| outcome.status == SlotStatus::Failed)
        .map(|outcome| SlotFailure {
            row: outcome.cell.row,
            column: outcome.cell.column,
            url: outcome.url.clone(),
            reason: outcome.failure.clone().unwrap_or_default(),
        })
        .collect();

    Report {
        folders: forest.folder_count(),
        items: forest.item_count(),
        total_images: forest.image_count(),
        downloaded: count(SlotStatus::Downloaded),
        already_present: count(SlotStatus::AlreadyPresent),
        failed: count(SlotStatus::Failed),
        dangling_ancestors: issues
            .iter()
            .filter(|issue| issue.kind == RowIssueKind::DanglingAncestor)
            .count(),
        issues,
        failures,
        output_path: None,
    }
}

// Written to a temp file next to the target first so a failed save leaves nothing behind.
fn persist(
    workbook: &Workbook,
    config: &ParserConfig,
    root_name: &str,
) -> Result<Utf8PathBuf, SortlyError> {
    let excel_dir = config.excel_dir();
    let output = excel_dir.join(format!("{root_name}.xlsx"));
    let fail = |reason: String| SortlyError::PersistFailure {
        path: output.to_string(),
        reason,
    };
    if !is_safe_segment(root_name) {
        return Err(fail("root folder name is not a plain file name".to_string()));
    }

    fs::create_dir_all(excel_dir.as_std_path()).map_err(|err| fail(err.to_string()))?;
    let temp = Builder::new()
        .prefix(".sortly-out")
        .suffix(".xlsx")
        .tempfile_in(excel_dir.as_std_path())
        .map_err(|err| fail(err.to_string()))?;
    let temp_path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
        .map_err(|_| fail("invalid temp path".to_string()))?;
    workbook.save(&temp_path)?;
    temp.persist(output.as_std_path())
        .map_err(|err| fail(err.to_string()))?;
    Ok(output)
}
