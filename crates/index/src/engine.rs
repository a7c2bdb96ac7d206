//! Contract with the external index-session engine.
//!
//! The coordinator treats the engine as an opaque service: it creates or
//! opens sessions on the serial worker, hands chunk requests to a session
//! asynchronously, and reads statistics. Implementations must tolerate
//! completion callbacks running on any thread.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Size of the opaque metadata payload stored with each index entry.
pub const CHUNK_DATA_SIZE: usize = 16;

/// Opaque metadata payload stored with each index entry.
pub type ChunkData = [u8; CHUNK_DATA_SIZE];

/// Content fingerprint used as the index key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChunkName(pub [u8; 16]);

impl fmt::Debug for ChunkName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in &self.0 {
			write!(f, "{byte:02x}")?;
		}
		Ok(())
	}
}

/// Kind of chunk request handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkOperation {
	/// Look up existing advice without recording anything.
	Lookup,
	/// Look up existing advice, recording the new advice if none exists.
	Post,
	/// Record the new advice, replacing any existing entry.
	Update,
}

impl ChunkOperation {
	/// True when the engine answers with existing advice.
	pub const fn returns_advice(self) -> bool {
		matches!(self, Self::Lookup | Self::Post)
	}

	/// True when the request carries advice to record.
	pub const fn records_advice(self) -> bool {
		matches!(self, Self::Post | Self::Update)
	}
}

/// One chunk request and, once finished, its result.
///
/// The engine fills `status`, `found` and `old_metadata` before invoking
/// the completion callback.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
	pub name: ChunkName,
	pub operation: ChunkOperation,
	/// Advice to record, for `Post` and `Update`.
	pub new_metadata: Option<ChunkData>,
	pub status: Result<(), EngineError>,
	/// Whether an entry for `name` already existed.
	pub found: bool,
	/// Metadata of the existing entry, when `found`.
	pub old_metadata: Option<ChunkData>,
}

impl ChunkRequest {
	/// Creates an unanswered request.
	pub fn new(name: ChunkName, operation: ChunkOperation, new_metadata: Option<ChunkData>) -> Self {
		Self {
			name,
			operation,
			new_metadata,
			status: Ok(()),
			found: false,
			old_metadata: None,
		}
	}
}

/// Completion callback handed to [`IndexSession::submit`].
pub type ChunkCallback = Box<dyn FnOnce(ChunkRequest) + Send + 'static>;

/// Configuration blob used to create an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Binds an index to one storage volume.
	pub nonce: u64,
	/// Memory budget for the index, in megabytes.
	pub memory_mb: u32,
	/// Whether the index uses the sparse layout.
	pub sparse: bool,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			nonce: 0,
			memory_mb: 256,
			sparse: false,
		}
	}
}

/// Whole-index statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IndexStats {
	pub entries_indexed: u64,
}

/// Per-session request statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStats {
	pub posts_found: u64,
	pub posts_not_found: u64,
	pub queries_found: u64,
	pub queries_not_found: u64,
	pub updates_found: u64,
	pub updates_not_found: u64,
}

/// Factory for index sessions.
pub trait IndexEngine: Send + Sync + 'static {
	/// Creates a new, empty index named `name`, replacing any existing one.
	fn create(&self, name: &str, config: &SessionConfig) -> Result<Arc<dyn IndexSession>, EngineError>;

	/// Opens (rebuilding if needed) the existing index named `name`.
	fn open(&self, name: &str) -> Result<Arc<dyn IndexSession>, EngineError>;
}

/// An open index session.
pub trait IndexSession: Send + Sync + 'static {
	/// Closes the session. Outstanding requests are completed first.
	fn close(&self) -> Result<(), EngineError>;

	/// Saves the index so it can be reopened without a rebuild.
	fn save(&self) -> Result<(), EngineError>;

	/// Waits for outstanding requests to finish.
	fn flush(&self) -> Result<(), EngineError>;

	/// Returns the configuration the index was created with.
	fn read_config(&self) -> Result<SessionConfig, EngineError>;

	/// Starts `request` asynchronously; `done` is invoked exactly once when
	/// it finishes.
	///
	/// An `Err` return means the request was not started and `done` was
	/// dropped without being called.
	fn submit(&self, request: ChunkRequest, done: ChunkCallback) -> Result<(), EngineError>;

	fn index_stats(&self) -> Result<IndexStats, EngineError>;

	fn session_stats(&self) -> Result<SessionStats, EngineError>;
}
