//! Handlers for the analysis-session verbs: init, status, result,
//! finalize.

use std::path::Path;

use crate::models::SessionId;
use crate::output::{bound_output, MAX_OUTPUT};
use crate::session::{format_status, format_summary, SessionStore};
use crate::{Error, Result};

/// Create a new analysis session and print its id.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for an empty query.
pub fn cmd_init(store: &SessionStore, query: &str, path: &Path) -> Result<()> {
    let state = store.init(query, path)?;
    let text = format!(
        "Session created: {}\nSession dir: {}\nQuery: {}\nTarget: {}",
        state.session_id,
        store.session_dir(&state.session_id).display(),
        state.query,
        state.target_path.display()
    );
    println!("{}", bound_output("init", &text));
    Ok(())
}

/// Print the session status record.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown session.
pub fn cmd_status(store: &SessionStore, session_id: &str) -> Result<()> {
    let state = store.load(&SessionId::new(session_id))?;
    println!("{}", bound_output("status", &format_status(&state)));
    Ok(())
}

/// What the result command should do.
#[derive(Debug, Clone)]
pub enum ResultAction {
    /// Store `key = value`.
    Store {
        /// The result key.
        key: String,
        /// The result value.
        value: String,
    },
    /// Print one stored value.
    Get {
        /// The result key.
        key: String,
    },
    /// Print the full bounded summary.
    All,
}

/// Store or retrieve session results.
///
/// # Errors
///
/// Returns [`Error::Conflict`] for writes to a finalized session and
/// [`Error::NotFound`] for unknown ids or keys.
pub fn cmd_result(store: &SessionStore, session_id: &str, action: &ResultAction) -> Result<()> {
    let id = SessionId::new(session_id);
    match action {
        ResultAction::Store { key, value } => {
            store.add_result(&id, key, value)?;
            println!("Result stored: {key}");
        },
        ResultAction::Get { key } => {
            let state = store.load(&id)?;
            let record = state
                .results
                .get(key)
                .ok_or_else(|| Error::not_found(format!("result '{key}' in session {id}")))?;
            println!("{}", bound_output("result", &record.value));
        },
        ResultAction::All => {
            let state = store.load(&id)?;
            println!("{}", format_summary(&state, MAX_OUTPUT));
        },
    }
    Ok(())
}

/// Finalize a session with an optional answer.
///
/// # Errors
///
/// Returns [`Error::Conflict`] when the session is already finalized.
pub fn cmd_finalize(store: &SessionStore, session_id: &str, answer: Option<&str>) -> Result<()> {
    let id = SessionId::new(session_id);
    store.finalize(&id, answer)?;
    println!("Session {id} finalized");
    Ok(())
}
