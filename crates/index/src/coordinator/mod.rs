//! The dedupe index coordinator.
//!
//! One [`DedupeIndex`] exists per storage volume. Every call that touches the
//! engine session (open, create, close, save, flush, submit) runs on a single
//! serial worker thread. Everything else runs on the caller's thread under
//! one of two short locks: the state lock (`IndexInner::state`) and the
//! pending lock inside [`PendingTracker`]. The two are never nested.

mod lifecycle;
mod status;
mod transition;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use vdx_worker::{DeadlineTimer, SerialQueue, TaskClass};

pub use self::status::{IndexDump, IndexStatistics};
use crate::config::{IndexConfig, IndexSettings};
use crate::engine::{ChunkOperation, IndexEngine, IndexSession, SessionConfig};
use crate::error::{IndexError, Result};
use crate::pending::PendingTracker;
use crate::reporter::TimeoutReporter;
use crate::request::DedupeContext;
use crate::state::{IndexCommand, IndexState, StateChange, StateName, StateView, SuspendMode, state_name};

/// State guarded by the state lock.
struct StateData {
	state: IndexState,
	target: IndexState,
	/// A state-change job is queued or running.
	changing: bool,
	/// The next open must create a fresh index.
	create: bool,
	/// Deduplication is enabled by the operator.
	dedupe: bool,
	/// Requests may be handed to the engine: `dedupe && state == Opened`.
	deduping: bool,
	/// The index was last closed because of a failure.
	error: bool,
	/// How the session is made durable before it is closed.
	close_mode: SuspendMode,
	/// Replaced only by the serial worker.
	session: Option<Arc<dyn IndexSession>>,
}

impl StateData {
	fn new() -> Self {
		Self {
			state: IndexState::Closed,
			target: IndexState::Closed,
			changing: false,
			create: false,
			dedupe: false,
			deduping: false,
			error: false,
			close_mode: SuspendMode::Save,
			session: None,
		}
	}

	fn name_of(&self, state: IndexState) -> StateName {
		state_name(
			state,
			StateView {
				target: self.target,
				error: self.error,
				dedupe: self.dedupe,
			},
		)
	}

	fn refresh_deduping(&mut self) {
		self.deduping = self.dedupe && self.state == IndexState::Opened;
	}
}

pub(crate) struct IndexInner {
	name: String,
	session_config: SessionConfig,
	config: IndexConfig,
	engine: Arc<dyn IndexEngine>,
	state: Mutex<StateData>,
	active: AtomicU32,
	maximum: AtomicU32,
	busy_conflicts: AtomicU64,
	pending: PendingTracker,
	expiry: DeadlineTimer,
	reporter: Arc<TimeoutReporter>,
	queue: SerialQueue,
	engine_stats: Mutex<status::EngineCounters>,
	finished: AtomicBool,
}

/// Coordinates one volume's dedupe index session and its requests.
pub struct DedupeIndex {
	inner: Arc<IndexInner>,
}

impl DedupeIndex {
	/// Creates a closed coordinator and starts its serial worker.
	///
	/// Timers run on the tokio runtime current at construction, or on a
	/// shared fallback runtime when there is none.
	pub fn new(settings: IndexSettings, engine: Arc<dyn IndexEngine>) -> Result<Self> {
		let config = settings.config.normalized();
		let queue = SerialQueue::start(config.worker_name.clone())?;
		let reporter = TimeoutReporter::new(settings.name.clone(), config.report_interval());
		let inner = Arc::new(IndexInner {
			pending: PendingTracker::new(config.timeout_interval(), config.min_timer_interval()),
			name: settings.name,
			session_config: settings.session,
			config,
			engine,
			state: Mutex::new(StateData::new()),
			active: AtomicU32::new(0),
			maximum: AtomicU32::new(0),
			busy_conflicts: AtomicU64::new(0),
			expiry: DeadlineTimer::new(TaskClass::Deadline),
			reporter,
			queue,
			engine_stats: Mutex::new(status::EngineCounters::default()),
			finished: AtomicBool::new(false),
		});
		tracing::debug!(index = %inner.name, worker = %inner.queue.name(), "dedupe index created");
		Ok(Self { inner })
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Effective (clamped) configuration.
	pub fn config(&self) -> &IndexConfig {
		&self.inner.config
	}

	/// Requests a new target state; the serial worker converges on it.
	pub fn request_state_change(&self, change: StateChange) {
		self.inner.request_state_change(change);
	}

	/// Opens the index with deduplication enabled, creating it if asked.
	pub fn start(&self, create: bool) {
		let change = StateChange::open().dedupe(true);
		self.request_state_change(if create { change.create() } else { change });
	}

	/// Closes the index, saving it first.
	pub fn stop(&self) {
		self.stop_with(SuspendMode::Save);
	}

	/// Closes the index, saving or flushing it first.
	pub fn stop_with(&self, mode: SuspendMode) {
		self.inner.state.lock().close_mode = mode;
		self.request_state_change(StateChange::close());
	}

	/// Applies an operator command: `close`, `create`, `disable` or `enable`.
	pub fn message(&self, command: &str) -> Result<()> {
		let parsed: IndexCommand = command
			.parse()
			.map_err(|_: strum::ParseError| IndexError::InvalidCommand(command.to_string()))?;
		tracing::debug!(index = %self.inner.name, command = %parsed, "dedupe index command");
		self.request_state_change(parsed.state_change());
		Ok(())
	}

	/// Saves or flushes an open index, blocking until the worker is done.
	///
	/// # Panics
	///
	/// Panics if called from within an async runtime context.
	pub fn suspend(&self, mode: SuspendMode) -> Result<()> {
		let inner = Arc::clone(&self.inner);
		self.inner
			.queue
			.run_and_wait(move || inner.suspend_session(mode))
			.map_err(|_| IndexError::WorkerUnavailable)
	}

	/// Blocks until every job queued on the serial worker before this call
	/// has finished, including pending state changes.
	///
	/// # Panics
	///
	/// Panics if called from within an async runtime context.
	pub fn quiesce(&self) -> Result<()> {
		self.inner.queue.run_and_wait(|| ()).map_err(|_| IndexError::WorkerUnavailable)
	}

	/// Submits a dedupe request for `context`.
	///
	/// The context's callback fires exactly once for this submission: with
	/// the engine's answer, a timeout, or immediately when the index is not
	/// deduplicating or the context is still busy.
	pub fn submit(&self, context: &Arc<DedupeContext>, operation: ChunkOperation) {
		self.inner.submit(context, operation);
	}

	/// Looks up existing advice for the context's chunk.
	pub fn query(&self, context: &Arc<DedupeContext>) {
		self.submit(context, ChunkOperation::Lookup);
	}

	/// Looks up existing advice, recording the context's advice if none.
	pub fn post(&self, context: &Arc<DedupeContext>) {
		self.submit(context, ChunkOperation::Post);
	}

	/// Records the context's advice, replacing any existing entry.
	pub fn update(&self, context: &Arc<DedupeContext>) {
		self.submit(context, ChunkOperation::Update);
	}

	pub fn state_name(&self) -> StateName {
		let data = self.inner.state.lock();
		data.name_of(data.state)
	}

	/// True when requests are currently handed to the engine.
	pub fn is_deduping(&self) -> bool {
		self.inner.state.lock().deduping
	}

	pub fn statistics(&self) -> IndexStatistics {
		self.inner.statistics()
	}

	pub fn dump(&self, verbose: bool) -> IndexDump {
		self.inner.dump(verbose)
	}

	/// Requests timed out so far.
	pub fn timeout_count(&self) -> u64 {
		self.inner.reporter.total()
	}

	/// Submissions rejected because the context was still busy.
	pub fn busy_conflicts(&self) -> u64 {
		self.inner.busy_conflicts.load(Ordering::Acquire)
	}

	pub fn active_requests(&self) -> u32 {
		self.inner.active.load(Ordering::Acquire)
	}

	pub fn pending_requests(&self) -> usize {
		self.inner.pending.len()
	}

	/// Closes the index and shuts down the worker and timers.
	///
	/// Idempotent; also run on drop.
	pub fn finish(&self) {
		self.inner.finish();
	}
}

impl Drop for DedupeIndex {
	fn drop(&mut self) {
		self.inner.finish();
	}
}

impl IndexInner {
	fn request_state_change(self: &Arc<Self>, change: StateChange) {
		let (old, new) = {
			let mut data = self.state.lock();
			let old = data.name_of(data.target);
			if let Some(enabled) = change.dedupe {
				data.dedupe = enabled;
			}
			if change.create {
				data.create = true;
			}
			if data.changing {
				data.target = change.target;
			} else if change.target != data.target || change.create {
				data.target = change.target;
				data.changing = true;
				data.deduping = false;
				let inner = Arc::clone(self);
				if let Err(err) = self.queue.enqueue(move || inner.change_state()) {
					tracing::error!(index = %self.name, error = %err, "cannot schedule dedupe index state change");
					data.changing = false;
				}
			} else {
				data.refresh_deduping();
			}
			(old, data.name_of(data.target))
		};
		if old != new {
			tracing::info!(index = %self.name, target = %new, "setting dedupe index target state to {new}");
		}
	}

	fn finish(self: &Arc<Self>) {
		if self.finished.swap(true, Ordering::AcqRel) {
			return;
		}
		self.state.lock().close_mode = SuspendMode::Save;
		self.request_state_change(StateChange::close());
		self.queue.finish();
		self.reporter.stop();
		self.expiry.cancel();
		tracing::debug!(index = %self.name, "dedupe index finished");
	}
}
