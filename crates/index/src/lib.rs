//! Dedupe index coordination.
//!
//! [`DedupeIndex`] mediates between a block pipeline and an external
//! chunk-index engine. It drives the engine session through its open and
//! close states on a serial worker, hands per-I/O [`DedupeContext`]s to the
//! engine, times out requests the engine is slow to answer, and reports
//! status and statistics.
//!
//! The engine itself is abstracted behind [`IndexEngine`] and
//! [`IndexSession`]; [`memory::MemoryEngine`] is an in-process
//! implementation.

pub mod advice;
mod config;
mod coordinator;
pub mod engine;
mod error;
pub mod memory;
mod pending;
mod reporter;
mod request;
mod state;

pub use advice::{DataLocation, decode_advice, decode_response, encode_advice};
pub use config::{IndexConfig, IndexSettings, index_name};
pub use coordinator::{DedupeIndex, IndexDump, IndexStatistics};
pub use engine::{ChunkCallback, ChunkData, ChunkName, ChunkOperation, ChunkRequest, IndexEngine, IndexSession, IndexStats, SessionConfig, SessionStats};
pub use error::{EngineError, IndexError, Result};
pub use reporter::TimeoutReporter;
pub use request::{DedupeCallback, DedupeContext, DedupeOutcome, DedupeStatus, RequestState};
pub use state::{IndexCommand, IndexState, StateChange, StateName, SuspendMode};
