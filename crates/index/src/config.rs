//! Coordinator configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::SessionConfig;
use crate::error::{IndexError, Result};

const MAX_TIMEOUT_MS: u64 = 120_000;
const MAX_MIN_TIMER_MS: u64 = 1_000;
const MIN_INTERVAL_MS: u64 = 2;

/// Timing and worker settings for one coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
	/// How long a request may stay unanswered before it is timed out.
	pub timeout_ms: u64,
	/// Shortest delay the expiry timer is armed for.
	pub min_timer_ms: u64,
	/// Interval between timeout reports.
	pub report_interval_ms: u64,
	/// Name of the serial worker thread.
	pub worker_name: String,
}

impl Default for IndexConfig {
	fn default() -> Self {
		Self {
			timeout_ms: 5_000,
			min_timer_ms: 100,
			report_interval_ms: 1_000,
			worker_name: "dedupeQ".to_string(),
		}
	}
}

impl IndexConfig {
	/// Parses a TOML document.
	pub fn from_toml_str(text: &str) -> Result<Self> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|error| IndexError::ConfigIo {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	/// Returns a copy with every interval clamped to its supported range.
	#[must_use]
	pub fn normalized(&self) -> Self {
		Self {
			timeout_ms: self.timeout_ms.clamp(MIN_INTERVAL_MS, MAX_TIMEOUT_MS),
			min_timer_ms: self.min_timer_ms.clamp(MIN_INTERVAL_MS, MAX_MIN_TIMER_MS),
			report_interval_ms: self.report_interval_ms.max(MIN_INTERVAL_MS),
			worker_name: self.worker_name.clone(),
		}
	}

	pub fn timeout_interval(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn min_timer_interval(&self) -> Duration {
		Duration::from_millis(self.min_timer_ms)
	}

	pub fn report_interval(&self) -> Duration {
		Duration::from_millis(self.report_interval_ms)
	}
}

/// Everything needed to construct a coordinator for one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
	/// Engine-level index name.
	pub name: String,
	/// Configuration used when the index has to be created.
	#[serde(default)]
	pub session: SessionConfig,
	#[serde(default)]
	pub config: IndexConfig,
}

impl IndexSettings {
	pub fn new(name: impl Into<String>, session: SessionConfig) -> Self {
		Self {
			name: name.into(),
			session,
			config: IndexConfig::default(),
		}
	}

	#[must_use]
	pub fn with_config(mut self, config: IndexConfig) -> Self {
		self.config = config;
		self
	}
}

/// Canonical index name for an index region on `device`.
pub fn index_name(device: &str, region_bytes: u64) -> String {
	format!("dev={device} offset=4096 size={region_bytes}")
}
