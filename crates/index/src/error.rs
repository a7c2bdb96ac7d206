//! Error types for the dedupe index coordinator.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by an index-session engine.
///
/// These never reach the I/O path as `Err`: the coordinator folds them into
/// its state flags or carries them verbatim as a request status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
	/// No index exists at the requested location.
	#[error("no index found")]
	NoIndex,

	/// An index exists but one of its components cannot be loaded.
	#[error("index component is corrupt")]
	CorruptComponent,

	/// The session has been closed.
	#[error("index session is closed")]
	SessionClosed,

	/// Any other engine failure.
	#[error("{0}")]
	Failed(String),
}

impl EngineError {
	/// True for failures that are repaired by creating a fresh index.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Self::NoIndex | Self::CorruptComponent)
	}
}

/// Errors returned by the coordinator's public API.
#[derive(Debug, Error)]
pub enum IndexError {
	/// An operator command name was not recognized.
	#[error("invalid index command: {0:?}")]
	InvalidCommand(String),

	/// The serial worker has been shut down.
	#[error("index worker is not running")]
	WorkerUnavailable,

	/// The serial worker thread could not be started.
	#[error("failed to start index worker: {0}")]
	Spawn(#[from] std::io::Error),

	/// The configuration text is not valid TOML for [`crate::IndexConfig`].
	#[error("invalid index configuration: {0}")]
	ConfigParse(#[from] toml::de::Error),

	/// The configuration file could not be read.
	#[error("I/O error reading {path}: {error}")]
	ConfigIo {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, IndexError>;
