//! Core data types: memory entries, chunk descriptors, analysis sessions.

mod chunk;
mod entry;
mod session;

pub use chunk::{group_chunk_id, line_chunk_id, Chunk, ChunkSpan, ContentChunk, Manifest};
pub use entry::{Entry, EntryId, EntryMeta, SizeCategory};
pub use session::{IterationRecord, ResultRecord, SessionId, SessionState, SessionStatus};
