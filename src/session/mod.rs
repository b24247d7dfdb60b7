//! Session persistence across CLI invocations.

mod store;

pub use store::{format_status, format_summary, SessionStore};
