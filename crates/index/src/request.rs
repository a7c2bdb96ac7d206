//! Per-I/O dedupe request contexts and their lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::advice::DataLocation;
use crate::engine::ChunkName;
use crate::error::EngineError;

/// Lifecycle of one dedupe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
	/// Not in use; may be submitted.
	Idle = 0,
	/// Submitted and waiting for the engine.
	Busy = 1,
	/// Answered by the expiry sweep; the engine has not finished yet.
	TimedOut = 2,
}

impl RequestState {
	const fn from_bits(bits: u64) -> Self {
		match bits & STATE_MASK {
			1 => Self::Busy,
			2 => Self::TimedOut,
			_ => Self::Idle,
		}
	}
}

const STATE_BITS: u32 = 2;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

const fn pack(generation: u64, state: RequestState) -> u64 {
	(generation << STATE_BITS) | state as u64
}

/// Atomic lifecycle cell.
///
/// The word packs the submission generation above the three-valued state, so
/// a transition made on behalf of one submission can never apply to a later
/// submission of the same context.
#[derive(Debug, Default)]
pub(crate) struct RequestStateCell(AtomicU64);

impl RequestStateCell {
	pub(crate) fn load(&self) -> (u64, RequestState) {
		let bits = self.0.load(Ordering::Acquire);
		(bits >> STATE_BITS, RequestState::from_bits(bits))
	}

	/// Moves `Idle` to `Busy`, starting a new generation.
	///
	/// Returns the new generation, or `None` if the context was not idle.
	pub(crate) fn begin(&self) -> Option<u64> {
		let mut current = self.0.load(Ordering::Acquire);
		loop {
			if RequestState::from_bits(current) != RequestState::Idle {
				return None;
			}
			let generation = (current >> STATE_BITS).wrapping_add(1);
			match self
				.0
				.compare_exchange_weak(current, pack(generation, RequestState::Busy), Ordering::AcqRel, Ordering::Acquire)
			{
				Ok(_) => return Some(generation),
				Err(actual) => current = actual,
			}
		}
	}

	/// Compare-and-swap within one generation.
	pub(crate) fn transition(&self, generation: u64, from: RequestState, to: RequestState) -> bool {
		self.0
			.compare_exchange(pack(generation, from), pack(generation, to), Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}
}

/// Result status of one dedupe request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DedupeStatus {
	#[default]
	Success,
	/// The engine did not answer within the timeout interval.
	TimedOut,
	/// The engine answered with an error.
	IndexError(EngineError),
}

/// What the pipeline callback receives for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupeOutcome {
	pub status: DedupeStatus,
	/// Advice found by a lookup or post, if any.
	pub advice: Option<DataLocation>,
}

/// Pipeline callback invoked once per submission.
pub type DedupeCallback = Arc<dyn Fn(DedupeOutcome) + Send + Sync + 'static>;

#[derive(Debug, Default)]
struct ContextData {
	chunk_name: ChunkName,
	advice: Option<DataLocation>,
	submitted_at: Option<Instant>,
	status: DedupeStatus,
}

/// Dedupe state embedded in one pipeline I/O.
///
/// A context may be resubmitted once its callback has fired and the engine
/// has released it; resubmitting earlier is rejected as a busy conflict.
pub struct DedupeContext {
	state: RequestStateCell,
	/// Pending-queue key; zero when not pending. Written under the pending lock.
	pending_key: AtomicU64,
	data: Mutex<ContextData>,
	callback: DedupeCallback,
}

impl std::fmt::Debug for DedupeContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DedupeContext")
			.field("state", &self.state())
			.field("pending", &self.is_pending())
			.field("data", &*self.data.lock())
			.finish_non_exhaustive()
	}
}

impl DedupeContext {
	/// Creates an idle context that reports completions to `callback`.
	pub fn new(callback: impl Fn(DedupeOutcome) + Send + Sync + 'static) -> Arc<Self> {
		Arc::new(Self {
			state: RequestStateCell::default(),
			pending_key: AtomicU64::new(0),
			data: Mutex::new(ContextData::default()),
			callback: Arc::new(callback),
		})
	}

	/// Sets the fingerprint and the advice to record for the next submission.
	pub fn prepare(&self, chunk_name: ChunkName, advice: Option<DataLocation>) {
		let mut data = self.data.lock();
		data.chunk_name = chunk_name;
		data.advice = advice;
	}

	pub fn chunk_name(&self) -> ChunkName {
		self.data.lock().chunk_name
	}

	/// Advice to record before submission; advice found after completion.
	pub fn advice(&self) -> Option<DataLocation> {
		self.data.lock().advice
	}

	pub fn status(&self) -> DedupeStatus {
		self.data.lock().status.clone()
	}

	pub fn submitted_at(&self) -> Option<Instant> {
		self.data.lock().submitted_at
	}

	pub fn state(&self) -> RequestState {
		self.state.load().1
	}

	pub fn is_pending(&self) -> bool {
		self.pending_key.load(Ordering::Acquire) != 0
	}

	pub(crate) fn lifecycle(&self) -> &RequestStateCell {
		&self.state
	}

	pub(crate) fn pending_key(&self) -> &AtomicU64 {
		&self.pending_key
	}

	/// Resets the result fields for a new submission; returns the name and
	/// advice to send.
	pub(crate) fn start(&self, now: Instant) -> (ChunkName, Option<DataLocation>) {
		let mut data = self.data.lock();
		data.submitted_at = Some(now);
		data.status = DedupeStatus::Success;
		(data.chunk_name, data.advice)
	}

	/// Stores the result and invokes the pipeline callback.
	///
	/// `advice` of `Some(..)` replaces the stored advice; the stored advice is
	/// left alone for operations that do not return any.
	pub(crate) fn deliver(&self, status: DedupeStatus, advice: Option<Option<DataLocation>>) {
		let outcome = {
			let mut data = self.data.lock();
			data.status = status.clone();
			if let Some(advice) = advice {
				data.advice = advice;
			}
			DedupeOutcome {
				status,
				advice: advice.flatten(),
			}
		};
		(self.callback)(outcome);
	}

	/// Invokes the callback with whatever status the context still carries.
	pub(crate) fn reject(&self) {
		let status = self.data.lock().status.clone();
		(self.callback)(DedupeOutcome { status, advice: None });
	}
}

#[cfg(test)]
mod tests;
