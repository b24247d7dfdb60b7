//! Handlers for the analysis verbs: scan, recommend, chunk, extract.

use std::path::{Path, PathBuf};

use crate::chunk::{self, recommend, ChunkParams, ChunkStrategy};
use crate::models::SessionId;
use crate::output::{bound_output, MAX_OUTPUT};
use crate::session::SessionStore;
use crate::{extract, scan, Error, Result};

/// Scan a path and print its bounded metadata summary.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing path.
pub fn cmd_scan(path: &Path, depth: usize) -> Result<()> {
    let report = scan::scan_path(path, depth)?;
    println!("{}", scan::format_report(&report, MAX_OUTPUT));
    Ok(())
}

/// Print ranked strategy recommendations for a path.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing path.
pub fn cmd_recommend(path: &Path) -> Result<()> {
    let recommendations = recommend::recommend_strategies(path)?;
    let text = recommend::format_recommendations(path, &recommendations);
    println!("{}", bound_output("recommend", &text));
    Ok(())
}

/// Arguments for the chunk command.
#[derive(Debug, Clone)]
pub struct ChunkArgs {
    /// File or directory to chunk.
    pub path: PathBuf,
    /// Strategy name.
    pub strategy: String,
    /// Session to attach the manifest to.
    pub session: Option<String>,
    /// Tunables.
    pub params: ChunkParams,
}

/// Chunk a path, optionally persisting the manifest into a session.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for an unknown strategy or bad
/// parameters.
pub fn cmd_chunk(store: &SessionStore, args: &ChunkArgs) -> Result<()> {
    let strategy: ChunkStrategy = args.strategy.parse()?;
    let manifest = chunk::chunk_path(&args.path, strategy, &args.params)?;

    let mut text = chunk::format_manifest(&manifest);
    if let Some(session) = &args.session {
        let session_id = SessionId::new(session.as_str());
        let manifest_path = store.store_manifest(&session_id, &manifest)?;
        text.push_str(&format!("\n\nManifest saved: {}", manifest_path.display()));
    }
    println!("{}", bound_output("chunk", &text));
    Ok(())
}

/// The three mutually exclusive extract modes.
#[derive(Debug, Clone)]
pub enum ExtractMode {
    /// `--lines A:B`
    Lines(String),
    /// `--chunk-id X --manifest P`
    ChunkId {
        /// The chunk id to look up.
        chunk_id: String,
        /// The manifest file to resolve it through.
        manifest: PathBuf,
    },
    /// `--grep P [--context N]`
    Grep {
        /// The regex pattern.
        pattern: String,
        /// Context lines around each match.
        context: usize,
    },
}

/// Extract content from a file.
///
/// Line and chunk extractions are subagent-destined and print unbounded;
/// grep output is orchestrator-facing and passes the gate.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for bad ranges or patterns,
/// [`Error::NotFound`] for missing files.
pub fn cmd_extract(path: &Path, mode: &ExtractMode) -> Result<()> {
    match mode {
        ExtractMode::Lines(range) => {
            let (start, end) = parse_line_range(range)?;
            println!("{}", extract::extract_lines(path, start, end)?);
        },
        ExtractMode::ChunkId { chunk_id, manifest } => {
            println!("{}", extract::extract_chunk(manifest, chunk_id)?);
        },
        ExtractMode::Grep { pattern, context } => {
            let text = extract::extract_grep(path, pattern, *context)?;
            println!("{}", bound_output("extract", &text));
        },
    }
    Ok(())
}

fn parse_line_range(range: &str) -> Result<(usize, usize)> {
    let parts: Vec<&str> = range.split(':').collect();
    if parts.len() != 2 {
        return Err(Error::InvalidArgument(format!(
            "--lines format is START:END (e.g. 1:50), got '{range}'"
        )));
    }
    let start = parts[0]
        .parse::<usize>()
        .map_err(|_| Error::InvalidArgument(format!("bad start line '{}'", parts[0])))?;
    let end = parts[1]
        .parse::<usize>()
        .map_err(|_| Error::InvalidArgument(format!("bad end line '{}'", parts[1])))?;
    Ok((start, end))
}
