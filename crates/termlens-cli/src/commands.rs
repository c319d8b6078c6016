//! Subcommand implementations.
//!
//! Each command builds a [`LineBuffer`] host, wires up the core components
//! it needs and prints the result. The logic lives in small functions that
//! return data so tests can call them without a terminal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use termlens_core::ansi::AnsiParser;
use termlens_core::attributes::DescribeMode;
use termlens_core::config::Settings;
use termlens_core::engine::{CoordinateEngine, StatsSnapshot};
use termlens_core::error::ApiError;
use termlens_core::extract::RegionExtractor;
use termlens_core::grid::{GridCoord, GridRect};
use termlens_core::monitor::{RegionChange, WindowRegionMonitor};
use termlens_core::region::{RegionProfile, RegionRegistry, WindowRegion};
use termlens_core::source::{BufferToken, LineBuffer, TextSource};
use termlens_core::worker::{Extraction, ExtractionEvent, ExtractionWorker};
use termlens_core::{ansi, width};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::args::{
    AttrsArgs, Commands, LinearArgs, OutputFormat, PositionArgs, RectArgs, StripArgs, WatchArgs,
    WidthArgs,
};
use crate::host::file::{read_input, FileHost};
use crate::host::pty::{PtyHost, TermSize};
use crate::host::LiveHost;

pub async fn run(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Position(args) => position(args, &settings),
        Commands::Rect(args) => rect(args, &settings).await,
        Commands::Linear(args) => linear(args, &settings),
        Commands::Attrs(args) => attrs(args),
        Commands::Strip(args) => strip(args),
        Commands::Width(args) => print_json(&measure(&args.text)),
        Commands::Watch(args) => watch(args, settings).await,
    }
}

/// Everything the extraction commands need, over one buffer.
struct Pipeline {
    buffer: Arc<LineBuffer>,
    engine: Arc<CoordinateEngine<LineBuffer>>,
    extractor: Arc<RegionExtractor<LineBuffer>>,
}

impl Pipeline {
    fn new(buffer: Arc<LineBuffer>, settings: &Settings) -> Self {
        let engine = Arc::new(CoordinateEngine::new(Arc::clone(&buffer), settings));
        let extractor = Arc::new(RegionExtractor::new(
            Arc::clone(&engine),
            &settings.extraction,
        ));
        Self {
            buffer,
            engine,
            extractor,
        }
    }

    fn from_input(input: &Path, settings: &Settings) -> Result<Self> {
        let text = read_input(input)?;
        Ok(Self::new(Arc::new(LineBuffer::from_text(&text)), settings))
    }

    /// Token `offset` characters after the start of the buffer.
    fn token_at_offset(&self, offset: u64) -> Result<BufferToken> {
        let wanted = i64::try_from(offset).context("Offset too large")?;
        let first = self.buffer.first_position()?;
        let (token, moved) = self.buffer.move_by_char(&first, wanted)?;
        if moved < wanted {
            return Err(ApiError::invalid_input_with_suggestion(
                format!("Offset {} is past the end of the buffer", offset),
                format!("The buffer holds {} positions; use a smaller offset", moved + 1),
            )
            .into());
        }
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// position
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PositionReport {
    offset: u64,
    row: u32,
    col: u32,
    stats: StatsSnapshot,
}

fn position_of(pipeline: &Pipeline, offset: u64) -> Result<PositionReport> {
    let token = pipeline.token_at_offset(offset)?;
    let coord = pipeline.engine.position(&token);
    if !coord.is_known() {
        return Err(ApiError::position_unavailable().into());
    }
    Ok(PositionReport {
        offset,
        row: coord.row,
        col: coord.col,
        stats: pipeline.engine.stats(),
    })
}

fn position(args: PositionArgs, settings: &Settings) -> Result<()> {
    let pipeline = Pipeline::from_input(&args.input, settings)?;
    print_json(&position_of(&pipeline, args.offset)?)
}

// ---------------------------------------------------------------------------
// rect
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RowsReport {
    rect: GridRect,
    rows: Vec<String>,
}

/// Extract a rectangle, on the background worker when it is large.
///
/// Progress goes to stderr; Ctrl-C cancels a background job.
async fn extract_with_worker(
    extractor: Arc<RegionExtractor<LineBuffer>>,
    rect: GridRect,
    show_progress: bool,
) -> Result<Vec<String>> {
    let (worker, mut events) = ExtractionWorker::spawn(extractor);
    let job = match worker.extract_rect(rect) {
        Ok(Extraction::Immediate(rows)) => {
            worker.shutdown().await;
            return Ok(rows);
        }
        Ok(Extraction::Deferred(job)) => job,
        Err(e) => {
            worker.shutdown().await;
            return Err(e.into());
        }
    };
    info!("Extracting {} rows in the background", rect.row_count());

    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break Err(ApiError::internal("Extraction worker stopped").into());
                };
                if event.job() != job {
                    continue;
                }
                match event {
                    ExtractionEvent::Progress { done, total, .. } => {
                        if show_progress {
                            eprint!("\rExtracting rows: {}/{}", done, total);
                        }
                    }
                    ExtractionEvent::Finished { rows, .. } => break Ok(rows),
                    ExtractionEvent::Cancelled { rows_done, rows_total, .. } => {
                        break Err(ApiError::operation_cancelled(rows_done, rows_total).into());
                    }
                    ExtractionEvent::Failed { error, .. } => break Err(error.into()),
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("Cancelling extraction");
                interrupted = true;
                worker.cancel();
            }
        }
    };

    if show_progress {
        eprintln!();
    }
    worker.shutdown().await;
    outcome
}

async fn rect(args: RectArgs, settings: &Settings) -> Result<()> {
    let pipeline = Pipeline::from_input(&args.input, settings)?;
    let rect = GridRect::from_corners(
        GridCoord::new(args.top, args.left),
        GridCoord::new(args.bottom, args.right),
    );
    let rows = extract_with_worker(Arc::clone(&pipeline.extractor), rect, true).await?;

    match args.format {
        OutputFormat::Json => print_json(&RowsReport { rect, rows }),
        OutputFormat::Text => {
            for row in rows {
                println!("{}", row);
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// linear
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LinearReport {
    start: GridCoord,
    end: GridCoord,
    text: String,
}

fn linear_between(pipeline: &Pipeline, start: u64, end: u64) -> Result<LinearReport> {
    let start_token = pipeline.token_at_offset(start)?;
    let end_token = pipeline.token_at_offset(end)?;
    let text = pipeline
        .extractor
        .extract_linear(&start_token, &end_token)?;
    Ok(LinearReport {
        start: pipeline.engine.position(&start_token),
        end: pipeline.engine.position(&end_token),
        text,
    })
}

fn linear(args: LinearArgs, settings: &Settings) -> Result<()> {
    let pipeline = Pipeline::from_input(&args.input, settings)?;
    let report = linear_between(&pipeline, args.start, args.end)?;
    match args.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!("{}", report.text);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// attrs / strip / width
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, PartialEq, Eq)]
struct SpanReport {
    start: usize,
    end: usize,
    text: String,
    description: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct LineAttributes {
    line: u32,
    text: String,
    spans: Vec<SpanReport>,
}

/// Describe attributes line by line. State carries across lines the way a
/// terminal stream does.
fn describe_lines(text: &str, only: Option<u32>, mode: DescribeMode) -> Vec<LineAttributes> {
    let mut parser = AnsiParser::new();
    let mut report = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        if only.is_some_and(|n| line_no > n) {
            break;
        }
        let parsed = parser.parse(line);
        if only.is_some_and(|n| line_no != n) {
            continue;
        }
        let spans = parsed
            .spans
            .iter()
            .map(|span| SpanReport {
                start: span.range.start,
                end: span.range.end,
                text: parsed.text[span.range.clone()].to_string(),
                description: span.state.describe(mode),
            })
            .collect();
        report.push(LineAttributes {
            line: line_no,
            text: parsed.text,
            spans,
        });
    }
    report
}

fn attrs(args: AttrsArgs) -> Result<()> {
    let text = read_input(&args.input)?;
    let mode = if args.brief {
        DescribeMode::Brief
    } else {
        DescribeMode::Detailed
    };
    let report = describe_lines(&text, args.line, mode);
    if let Some(line) = args.line {
        if report.is_empty() {
            return Err(ApiError::invalid_input(format!("Line {} does not exist", line)).into());
        }
    }

    match args.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            for line in report {
                let parts: Vec<String> = line
                    .spans
                    .iter()
                    .map(|s| format!("'{}' {}", s.text, s.description))
                    .collect();
                println!("line {}: {}", line.line, parts.join("; "));
            }
            Ok(())
        }
    }
}

fn strip(args: StripArgs) -> Result<()> {
    let text = read_input(&args.input)?;
    print!("{}", ansi::strip_only(&text));
    Ok(())
}

#[derive(Debug, Serialize)]
struct WidthReport {
    text: String,
    string_width: usize,
    display_width: usize,
    rtl: bool,
    visual: String,
}

fn measure(text: &str) -> WidthReport {
    let stripped = ansi::strip_only(text);
    WidthReport {
        text: stripped.to_string(),
        string_width: width::string_width(&stripped),
        display_width: width::display_width(&stripped),
        rtl: width::is_rtl(&stripped),
        visual: width::reorder_for_display(&stripped).into_owned(),
    }
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

/// Merge regions from a profile file and the command line.
fn collect_regions(
    profile_path: Option<&Path>,
    extra: &[WindowRegion],
) -> Result<RegionRegistry> {
    let mut registry = match profile_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile {}", path.display()))?;
            RegionRegistry::from_profile(&RegionProfile::from_json(&json)?)?
        }
        None => RegionRegistry::new(),
    };
    for region in extra {
        registry.add(region.clone())?;
    }
    if registry.is_empty() {
        return Err(ApiError::invalid_input_with_suggestion(
            "No regions to watch",
            "Pass --region NAME=TOP,LEFT,BOTTOM,RIGHT or --profile PATH",
        )
        .into());
    }
    Ok(registry)
}

fn profile_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("default")
        .to_string()
}

fn print_change(change: &RegionChange, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "at": chrono::Utc::now().to_rfc3339(),
            "summary": change.summary(),
            "change": change,
        });
        println!("{}", serde_json::to_string(&line)?);
    } else {
        println!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            change.summary()
        );
        for row in change.content.lines() {
            println!("  {}", row);
        }
    }
    Ok(())
}

async fn watch(args: WatchArgs, settings: Settings) -> Result<()> {
    let registry = collect_regions(args.profile.as_deref(), &args.regions)?;

    if let Some(path) = &args.save_profile {
        let json = registry.to_profile(profile_name(path)).to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write profile {}", path.display()))?;
        info!("Saved {} regions to {}", registry.len(), path.display());
    }

    let interval = args
        .interval
        .map(Duration::from_millis)
        .unwrap_or_else(|| settings.monitor.default_poll_interval());

    let mut host = match (&args.file, args.command.is_empty()) {
        (Some(path), _) => LiveHost::file(FileHost::new(path), interval),
        (None, false) => {
            let size = TermSize {
                cols: args.cols,
                rows: args.rows,
            };
            LiveHost::command(PtyHost::spawn(&args.command, size)?)
        }
        (None, true) => anyhow::bail!("Nothing to watch: pass --file FILE or a command after --"),
    };

    let pipeline = Pipeline::new(Arc::new(LineBuffer::default()), &settings);
    let (monitor, mut changes) =
        WindowRegionMonitor::new(Arc::clone(&pipeline.extractor), &settings.monitor);
    let monitor = Arc::new(monitor);
    monitor.apply_profile(&registry.to_profile("cli"), Some(interval))?;
    monitor.start();

    loop {
        tokio::select! {
            alive = host.next_update(&pipeline.buffer) => {
                if !alive {
                    info!("Watched command exited");
                    break;
                }
                pipeline.engine.invalidate(None);
                debug!("Buffer now {} lines", pipeline.buffer.line_count());
            }
            Some(change) = changes.recv() => print_change(&change, args.json)?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, stopping");
                break;
            }
            _ = crate::sigterm() => {
                info!("Received SIGTERM, stopping");
                break;
            }
        }
    }

    monitor.stop().await;
    // Report whatever the final screen changed.
    monitor.poll(Instant::now() + interval);
    while let Ok(change) = changes.try_recv() {
        print_change(&change, args.json)?;
    }
    host.shutdown();

    for status in monitor.status() {
        if status.pending {
            warn!("Region {} had an unreported change", status.name);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
