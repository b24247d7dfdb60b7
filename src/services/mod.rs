//! High-level services over the storage layer.

pub mod archive;
pub mod memory;
pub mod strategy;
pub mod summarize;
pub mod tagging;

pub use archive::{archive_session, smart_remember, DedupDecision, SmartRememberRequest};
pub use memory::{MemoryService, RememberRequest, RememberResult};
pub use strategy::{PerformanceRecord, StrategyStore};
