//! Handler for the strategy verbs: show, log, perf.

use crate::output::bound_output;
use crate::services::{PerformanceRecord, StrategyStore};
use crate::Result;

/// Strategy subcommand dispatch.
#[derive(Debug, Clone)]
pub enum StrategyAction {
    /// Print the learned-patterns document.
    Show,
    /// Print the last `max` performance records.
    Log {
        /// How many records to show.
        max: usize,
    },
    /// Append one performance record.
    Perf(Box<PerformanceRecord>),
}

/// Run a strategy subcommand.
///
/// # Errors
///
/// Returns store IO errors.
pub fn cmd_strategy(store: &StrategyStore, action: StrategyAction) -> Result<()> {
    match action {
        StrategyAction::Show => {
            println!("{}", bound_output("strategy", &store.show()?));
        },
        StrategyAction::Log { max } => {
            println!("{}", bound_output("strategy", &store.log(max)?));
        },
        StrategyAction::Perf(record) => {
            store.perf(*record)?;
            println!("Performance logged.");
        },
    }
    Ok(())
}
