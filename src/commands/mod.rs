//! CLI command handlers.
//!
//! Thin glue between parsed arguments and the core services. Every
//! orchestrator-facing print goes through the bounded-output gate;
//! subagent-destined extraction prints raw.

mod analysis;
mod memory;
mod session;
mod strategy;

pub use analysis::{cmd_chunk, cmd_extract, cmd_recommend, cmd_scan, ChunkArgs, ExtractMode};
pub use memory::{
    cmd_export_session, cmd_forget, cmd_memory_extract, cmd_memory_list, cmd_memory_tags,
    cmd_recall, cmd_remember, cmd_stats, RememberInput,
};
pub use session::{cmd_finalize, cmd_init, cmd_result, cmd_status, ResultAction};
pub use strategy::{cmd_strategy, StrategyAction};
