//! In-memory index engine.
//!
//! Keeps every named index in process memory. Besides serving as a small
//! embedded engine it exposes knobs to hold completions, inject failures and
//! plant foreign or corrupt indexes, and it counts every session call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::engine::{ChunkCallback, ChunkData, ChunkName, ChunkOperation, ChunkRequest, IndexEngine, IndexSession, IndexStats, SessionConfig, SessionStats};
use crate::error::EngineError;

type Entries = Arc<Mutex<HashMap<ChunkName, ChunkData>>>;
type ReadConfigHook = Arc<dyn Fn(&str) + Send + Sync + 'static>;

#[derive(Clone)]
struct StoredIndex {
	config: SessionConfig,
	entries: Entries,
	corrupt: bool,
}

#[derive(Default)]
struct Faults {
	create: Option<EngineError>,
	open: Option<EngineError>,
	read_config: Option<EngineError>,
	close: Option<EngineError>,
	submit: Option<EngineError>,
	stats: bool,
}

struct HeldRequest {
	index: String,
	request: ChunkRequest,
	done: ChunkCallback,
}

/// Snapshot of how often each engine entry point was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineCalls {
	pub creates: usize,
	pub opens: usize,
	pub closes: usize,
	pub saves: usize,
	pub flushes: usize,
	pub submissions: usize,
}

#[derive(Default)]
struct CallCounters {
	creates: AtomicUsize,
	opens: AtomicUsize,
	closes: AtomicUsize,
	saves: AtomicUsize,
	flushes: AtomicUsize,
	submissions: AtomicUsize,
}

#[derive(Default)]
struct EngineShared {
	indexes: Mutex<HashMap<String, StoredIndex>>,
	faults: Mutex<Faults>,
	hold: AtomicBool,
	held: Mutex<Vec<HeldRequest>>,
	read_config_hook: Mutex<Option<ReadConfigHook>>,
	calls: CallCounters,
}

impl EngineShared {
	/// Completes held requests for `index` (or all of them) outside the lock.
	fn release(&self, index: Option<&str>) -> usize {
		let released: Vec<HeldRequest> = {
			let mut held = self.held.lock();
			let (matching, kept): (Vec<_>, Vec<_>) = held.drain(..).partition(|h| index.is_none_or(|name| h.index == name));
			*held = kept;
			matching
		};
		let count = released.len();
		for held in released {
			(held.done)(held.request);
		}
		count
	}
}

/// Process-local index engine.
#[derive(Clone, Default)]
pub struct MemoryEngine {
	shared: Arc<EngineShared>,
}

impl MemoryEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores an existing index, as if left behind by an earlier run.
	pub fn plant_index(&self, name: &str, config: SessionConfig) {
		self.shared.indexes.lock().insert(
			name.to_string(),
			StoredIndex {
				config,
				entries: Entries::default(),
				corrupt: false,
			},
		);
	}

	/// Marks a stored index as unloadable.
	pub fn corrupt_index(&self, name: &str) {
		if let Some(index) = self.shared.indexes.lock().get_mut(name) {
			index.corrupt = true;
		}
	}

	/// Configuration of the stored index `name`, if any.
	pub fn stored_config(&self, name: &str) -> Option<SessionConfig> {
		self.shared.indexes.lock().get(name).map(|index| index.config)
	}

	/// When set, completions are kept until [`Self::release_held`].
	pub fn hold_completions(&self, hold: bool) {
		self.shared.hold.store(hold, Ordering::Release);
	}

	/// Completes every held request; returns how many there were.
	pub fn release_held(&self) -> usize {
		self.shared.release(None)
	}

	pub fn held(&self) -> usize {
		self.shared.held.lock().len()
	}

	/// Fails the next `create` call.
	pub fn fail_next_create(&self, err: EngineError) {
		self.shared.faults.lock().create = Some(err);
	}

	/// Fails the next `open` call.
	pub fn fail_next_open(&self, err: EngineError) {
		self.shared.faults.lock().open = Some(err);
	}

	/// Fails the next `read_config` call.
	pub fn fail_next_read_config(&self, err: EngineError) {
		self.shared.faults.lock().read_config = Some(err);
	}

	/// Fails the next `close` call.
	pub fn fail_next_close(&self, err: EngineError) {
		self.shared.faults.lock().close = Some(err);
	}

	/// Rejects submissions synchronously until cleared with `None`.
	pub fn fail_submissions(&self, err: Option<EngineError>) {
		self.shared.faults.lock().submit = err;
	}

	/// Runs `hook` with the index name at the start of every `read_config`.
	pub fn on_read_config(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
		*self.shared.read_config_hook.lock() = Some(Arc::new(hook));
	}

	/// Fails statistics queries while set.
	pub fn fail_stats(&self, fail: bool) {
		self.shared.faults.lock().stats = fail;
	}

	pub fn calls(&self) -> EngineCalls {
		let calls = &self.shared.calls;
		EngineCalls {
			creates: calls.creates.load(Ordering::Acquire),
			opens: calls.opens.load(Ordering::Acquire),
			closes: calls.closes.load(Ordering::Acquire),
			saves: calls.saves.load(Ordering::Acquire),
			flushes: calls.flushes.load(Ordering::Acquire),
			submissions: calls.submissions.load(Ordering::Acquire),
		}
	}

	fn session(&self, name: &str, index: StoredIndex) -> Arc<dyn IndexSession> {
		Arc::new(MemorySession {
			name: name.to_string(),
			config: index.config,
			entries: index.entries,
			stats: Mutex::new(SessionStats::default()),
			closed: AtomicBool::new(false),
			shared: Arc::clone(&self.shared),
		})
	}
}

impl IndexEngine for MemoryEngine {
	fn create(&self, name: &str, config: &SessionConfig) -> Result<Arc<dyn IndexSession>, EngineError> {
		self.shared.calls.creates.fetch_add(1, Ordering::AcqRel);
		if let Some(err) = self.shared.faults.lock().create.take() {
			return Err(err);
		}
		let index = StoredIndex {
			config: *config,
			entries: Entries::default(),
			corrupt: false,
		};
		self.shared.indexes.lock().insert(name.to_string(), index.clone());
		Ok(self.session(name, index))
	}

	fn open(&self, name: &str) -> Result<Arc<dyn IndexSession>, EngineError> {
		self.shared.calls.opens.fetch_add(1, Ordering::AcqRel);
		if let Some(err) = self.shared.faults.lock().open.take() {
			return Err(err);
		}
		let index = self.shared.indexes.lock().get(name).cloned().ok_or(EngineError::NoIndex)?;
		if index.corrupt {
			return Err(EngineError::CorruptComponent);
		}
		Ok(self.session(name, index))
	}
}

struct MemorySession {
	name: String,
	config: SessionConfig,
	entries: Entries,
	stats: Mutex<SessionStats>,
	closed: AtomicBool,
	shared: Arc<EngineShared>,
}

impl MemorySession {
	fn check_open(&self) -> Result<(), EngineError> {
		if self.closed.load(Ordering::Acquire) { Err(EngineError::SessionClosed) } else { Ok(()) }
	}

	fn apply(&self, request: &mut ChunkRequest) {
		let mut entries = self.entries.lock();
		let existing = entries.get(&request.name).copied();
		request.found = existing.is_some();
		request.old_metadata = existing;
		let record = match request.operation {
			ChunkOperation::Lookup => None,
			ChunkOperation::Post if existing.is_some() => None,
			ChunkOperation::Post | ChunkOperation::Update => request.new_metadata,
		};
		if let Some(data) = record {
			entries.insert(request.name, data);
		}
		drop(entries);

		let mut stats = self.stats.lock();
		let counter = match (request.operation, request.found) {
			(ChunkOperation::Lookup, true) => &mut stats.queries_found,
			(ChunkOperation::Lookup, false) => &mut stats.queries_not_found,
			(ChunkOperation::Post, true) => &mut stats.posts_found,
			(ChunkOperation::Post, false) => &mut stats.posts_not_found,
			(ChunkOperation::Update, true) => &mut stats.updates_found,
			(ChunkOperation::Update, false) => &mut stats.updates_not_found,
		};
		*counter += 1;
	}

	fn stats_fault(&self) -> Result<(), EngineError> {
		if self.shared.faults.lock().stats {
			return Err(EngineError::Failed("statistics unavailable".to_string()));
		}
		Ok(())
	}
}

impl IndexSession for MemorySession {
	fn close(&self) -> Result<(), EngineError> {
		self.shared.calls.closes.fetch_add(1, Ordering::AcqRel);
		self.closed.store(true, Ordering::Release);
		self.shared.release(Some(&self.name));
		match self.shared.faults.lock().close.take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	fn save(&self) -> Result<(), EngineError> {
		self.shared.calls.saves.fetch_add(1, Ordering::AcqRel);
		self.check_open()
	}

	fn flush(&self) -> Result<(), EngineError> {
		self.shared.calls.flushes.fetch_add(1, Ordering::AcqRel);
		self.check_open()
	}

	fn read_config(&self) -> Result<SessionConfig, EngineError> {
		let hook = self.shared.read_config_hook.lock().clone();
		if let Some(hook) = hook {
			hook(&self.name);
		}
		if let Some(err) = self.shared.faults.lock().read_config.take() {
			return Err(err);
		}
		Ok(self.config)
	}

	fn submit(&self, mut request: ChunkRequest, done: ChunkCallback) -> Result<(), EngineError> {
		self.check_open()?;
		if let Some(err) = self.shared.faults.lock().submit.clone() {
			return Err(err);
		}
		self.shared.calls.submissions.fetch_add(1, Ordering::AcqRel);
		self.apply(&mut request);
		if self.shared.hold.load(Ordering::Acquire) {
			self.shared.held.lock().push(HeldRequest {
				index: self.name.clone(),
				request,
				done,
			});
		} else {
			done(request);
		}
		Ok(())
	}

	fn index_stats(&self) -> Result<IndexStats, EngineError> {
		self.stats_fault()?;
		Ok(IndexStats {
			entries_indexed: self.entries.lock().len() as u64,
		})
	}

	fn session_stats(&self) -> Result<SessionStats, EngineError> {
		self.stats_fault()?;
		Ok(*self.stats.lock())
	}
}

#[cfg(test)]
mod tests;
