//! Binary entry point for mnemo.
//!
//! Every invocation is a short-lived synchronous process: parse, load
//! config, run one operation, exit 0 or 1. Errors surface as a single
//! human-readable line on stderr.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output goes to stdout/stderr by design
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use mnemo::chunk::ChunkParams;
use mnemo::commands::{self, ChunkArgs, ExtractMode, RememberInput, ResultAction, StrategyAction};
use mnemo::services::{MemoryService, PerformanceRecord, StrategyStore};
use mnemo::session::SessionStore;
use mnemo::storage::MemoryDb;
use mnemo::{config, llm, observability};

/// Mnemo -- external memory and recursive analysis for LLM orchestrators.
#[derive(Parser)]
#[command(name = "mnemo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Scan a path and print metadata (no content).
    Scan {
        /// File or directory to scan.
        path: PathBuf,

        /// Maximum directory depth.
        #[arg(long, default_value = "3")]
        depth: usize,
    },

    /// Suggest chunking strategies for a path.
    Recommend {
        /// File or directory.
        path: PathBuf,
    },

    /// Chunk content into a content-free manifest.
    Chunk {
        /// File or directory to chunk.
        path: PathBuf,

        /// Chunking strategy.
        #[arg(long)]
        strategy: String,

        /// Session id to attach the manifest to.
        #[arg(long)]
        session: Option<String>,

        /// Lines per chunk (lines strategy).
        #[arg(long, default_value = "500")]
        chunk_size: usize,

        /// Overlap lines (lines strategy).
        #[arg(long, default_value = "50")]
        overlap: usize,

        /// Heading level (headings strategy).
        #[arg(long, default_value = "2")]
        heading_level: usize,

        /// Target chars (semantic and files_balanced strategies).
        #[arg(long, default_value = "50000")]
        target_size: usize,
    },

    /// Extract content by line range, chunk id, or grep.
    Extract {
        /// File path.
        path: PathBuf,

        /// Line range START:END (1-indexed, inclusive).
        #[arg(long)]
        lines: Option<String>,

        /// Chunk id to extract (requires --manifest).
        #[arg(long)]
        chunk_id: Option<String>,

        /// Manifest file path.
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Regex pattern to search for.
        #[arg(long)]
        grep: Option<String>,

        /// Context lines around grep matches.
        #[arg(long, default_value = "5")]
        context: usize,
    },

    /// Create a new analysis session.
    Init {
        /// The analysis query.
        query: String,

        /// Target path.
        path: PathBuf,
    },

    /// Show session status.
    Status {
        /// Session id.
        session_id: String,
    },

    /// Store or retrieve session results.
    Result {
        /// Session id.
        session_id: String,

        /// Result key.
        #[arg(long)]
        key: Option<String>,

        /// Result value to store.
        #[arg(long)]
        value: Option<String>,

        /// Show the full results summary.
        #[arg(long)]
        all: bool,
    },

    /// Mark a session finalized.
    Finalize {
        /// Session id.
        session_id: String,

        /// Final answer text.
        #[arg(long)]
        answer: Option<String>,
    },

    /// Store a memory entry.
    Remember {
        /// Text content to remember.
        content: Option<String>,

        /// File to store as memory (.jsonl logs are exported first).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Read content from stdin.
        #[arg(long)]
        stdin: bool,

        /// Comma-separated tags.
        #[arg(long)]
        tags: Option<String>,

        /// Short description (auto-generated if omitted).
        #[arg(long)]
        summary: Option<String>,
    },

    /// Search memory.
    Recall {
        /// Search query.
        query: String,

        /// Filter by comma-separated tags.
        #[arg(long)]
        tags: Option<String>,

        /// Maximum results.
        #[arg(long, default_value = "20")]
        max: usize,
    },

    /// Extract memory entry content.
    MemoryExtract {
        /// Memory entry id.
        entry_id: String,

        /// Specific content chunk id.
        #[arg(long)]
        chunk_id: Option<String>,

        /// Regex pattern to search within the entry.
        #[arg(long)]
        grep: Option<String>,

        /// Context lines for grep.
        #[arg(long, default_value = "3")]
        context: usize,
    },

    /// List memory entries.
    MemoryList {
        /// Filter by comma-separated tags.
        #[arg(long)]
        tags: Option<String>,

        /// Skip the first N entries.
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum entries to show.
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// List all tags with counts.
    MemoryTags,

    /// Delete a memory entry.
    Forget {
        /// Memory entry id.
        entry_id: String,
    },

    /// Export a session log to a readable transcript.
    ExportSession {
        /// Path to the .jsonl session log.
        session_file: PathBuf,

        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Manage recall strategies.
    Strategy {
        #[command(subcommand)]
        action: StrategyCommand,
    },

    /// Show memory store statistics.
    Stats,

    /// Start the stdio tool server.
    Serve,
}

/// Strategy subcommands.
#[derive(Subcommand)]
enum StrategyCommand {
    /// Show the learned-patterns document.
    Show,

    /// Show recent performance records.
    Log {
        /// Maximum records to show.
        #[arg(long, default_value = "20")]
        max: usize,
    },

    /// Log a recall performance record.
    Perf {
        /// The query that was run.
        #[arg(long)]
        query: Option<String>,

        /// Comma-separated search terms used.
        #[arg(long)]
        search_terms: Option<String>,

        /// Total entries found.
        #[arg(long)]
        entries_found: Option<u32>,

        /// Entries that were relevant.
        #[arg(long)]
        entries_relevant: Option<u32>,

        /// Subagents dispatched.
        #[arg(long)]
        subagents: Option<u32>,

        /// Free-text strategy notes.
        #[arg(long)]
        notes: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        },
    };

    observability::init(&config.logging, cli.verbose);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli, config: &mnemo::MnemoConfig) -> mnemo::Result<()> {
    let sessions = SessionStore::new(&config.sessions_dir);

    match cli.command {
        Commands::Scan { path, depth } => commands::cmd_scan(&path, depth),
        Commands::Recommend { path } => commands::cmd_recommend(&path),
        Commands::Chunk {
            path,
            strategy,
            session,
            chunk_size,
            overlap,
            heading_level,
            target_size,
        } => commands::cmd_chunk(
            &sessions,
            &ChunkArgs {
                path,
                strategy,
                session,
                params: ChunkParams {
                    chunk_size,
                    overlap,
                    heading_level,
                    target_size,
                },
            },
        ),
        Commands::Extract {
            path,
            lines,
            chunk_id,
            manifest,
            grep,
            context,
        } => {
            let mode = match (lines, chunk_id, grep) {
                (Some(range), None, None) => ExtractMode::Lines(range),
                (None, Some(chunk_id), None) => {
                    let manifest = manifest.ok_or_else(|| {
                        mnemo::Error::InvalidArgument(
                            "--chunk-id requires --manifest PATH".to_string(),
                        )
                    })?;
                    ExtractMode::ChunkId { chunk_id, manifest }
                },
                (None, None, Some(pattern)) => ExtractMode::Grep { pattern, context },
                _ => {
                    return Err(mnemo::Error::InvalidArgument(
                        "specify exactly one of --lines START:END, --chunk-id ID --manifest PATH, or --grep PATTERN"
                            .to_string(),
                    ));
                },
            };
            commands::cmd_extract(&path, &mode)
        },
        Commands::Init { query, path } => commands::cmd_init(&sessions, &query, &path),
        Commands::Status { session_id } => commands::cmd_status(&sessions, &session_id),
        Commands::Result {
            session_id,
            key,
            value,
            all,
        } => {
            let action = match (key, value, all) {
                (_, _, true) => ResultAction::All,
                (Some(key), Some(value), false) => ResultAction::Store { key, value },
                (Some(key), None, false) => ResultAction::Get { key },
                _ => {
                    return Err(mnemo::Error::InvalidArgument(
                        "specify --key K --value V to store, --key K to retrieve, or --all"
                            .to_string(),
                    ));
                },
            };
            commands::cmd_result(&sessions, &session_id, &action)
        },
        Commands::Finalize { session_id, answer } => {
            commands::cmd_finalize(&sessions, &session_id, answer.as_deref())
        },
        Commands::Remember {
            content,
            file,
            stdin,
            tags,
            summary,
        } => {
            let input = match (content, file, stdin) {
                (Some(text), None, false) => RememberInput::Text(text),
                (None, Some(path), false) => RememberInput::File(path),
                (None, None, true) => RememberInput::Stdin,
                _ => {
                    return Err(mnemo::Error::InvalidArgument(
                        "provide content, --file PATH, or --stdin".to_string(),
                    ));
                },
            };
            let service = memory_service(config)?;
            let provider = llm::provider_from_env();
            commands::cmd_remember(
                &service,
                provider.as_deref(),
                &input,
                tags.as_deref(),
                summary.as_deref(),
            )
        },
        Commands::Recall { query, tags, max } => {
            let service = memory_service(config)?;
            commands::cmd_recall(&service, &query, tags.as_deref(), max)
        },
        Commands::MemoryExtract {
            entry_id,
            chunk_id,
            grep,
            context,
        } => {
            let service = memory_service(config)?;
            commands::cmd_memory_extract(
                &service,
                &entry_id,
                chunk_id.as_deref(),
                grep.as_deref(),
                context,
            )
        },
        Commands::MemoryList {
            tags,
            offset,
            limit,
        } => {
            let service = memory_service(config)?;
            commands::cmd_memory_list(&service, tags.as_deref(), offset, limit)
        },
        Commands::MemoryTags => {
            let service = memory_service(config)?;
            commands::cmd_memory_tags(&service)
        },
        Commands::Forget { entry_id } => {
            let service = memory_service(config)?;
            commands::cmd_forget(&service, &entry_id)
        },
        Commands::ExportSession {
            session_file,
            output,
        } => commands::cmd_export_session(&session_file, output.as_deref()),
        Commands::Strategy { action } => {
            let store = StrategyStore::new(config.strategies_dir());
            let action = match action {
                StrategyCommand::Show => StrategyAction::Show,
                StrategyCommand::Log { max } => StrategyAction::Log { max },
                StrategyCommand::Perf {
                    query,
                    search_terms,
                    entries_found,
                    entries_relevant,
                    subagents,
                    notes,
                } => StrategyAction::Perf(Box::new(PerformanceRecord {
                    query,
                    search_terms: search_terms
                        .map(|raw| {
                            raw.split(',')
                                .map(|t| t.trim().to_string())
                                .filter(|t| !t.is_empty())
                                .collect()
                        })
                        .unwrap_or_default(),
                    entries_found,
                    entries_relevant,
                    subagents_dispatched: subagents,
                    notes,
                    ..Default::default()
                })),
            };
            commands::cmd_strategy(&store, action)
        },
        Commands::Stats => {
            let service = memory_service(config)?;
            commands::cmd_stats(&service)
        },
        Commands::Serve => {
            let service = memory_service(config)?;
            mnemo::mcp::run_server(&service)
        },
    }
}

fn memory_service(config: &mnemo::MnemoConfig) -> mnemo::Result<MemoryService> {
    Ok(MemoryService::new(MemoryDb::open(config.memory_dir())?))
}
