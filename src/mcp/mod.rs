//! The remote tool surface: a JSON-RPC tool server over stdio.

mod server;
mod tools;

pub use server::run_server;
pub use tools::{dispatch_tool, tool_definitions};
