//! Read-only status and statistics.

use std::sync::atomic::Ordering;

use serde::Serialize;

use super::IndexInner;
use crate::engine::{IndexStats, SessionStats};
use crate::state::{IndexState, StateName};

/// Last engine counters read successfully.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct EngineCounters {
	index: IndexStats,
	session: SessionStats,
}

/// Snapshot of the coordinator and, when open, the engine's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IndexStatistics {
	pub state: StateName,
	/// Highest number of requests ever in flight at once.
	pub max_dedupe_queries: u32,
	/// Requests currently in flight.
	pub curr_dedupe_queries: u32,
	pub timeouts: u64,
	pub busy_conflicts: u64,
	pub entries_indexed: u64,
	#[serde(flatten)]
	pub session: SessionStats,
}

/// Result of [`crate::DedupeIndex::dump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDump {
	pub state: StateName,
	/// Target state while a change is in progress.
	pub changing_to: Option<StateName>,
	/// Pending-queue length, verbose dumps only.
	pub pending: Option<usize>,
	/// Serial worker backlog, verbose dumps only.
	pub queued: Option<usize>,
	/// Whether the expiry timer is armed, verbose dumps only.
	pub expiry_armed: Option<bool>,
}

impl IndexInner {
	pub(super) fn statistics(&self) -> IndexStatistics {
		let (state, session) = {
			let data = self.state.lock();
			let session = if data.state == IndexState::Opened { data.session.clone() } else { None };
			(data.name_of(data.state), session)
		};

		let mut counters = *self.engine_stats.lock();
		if let Some(session) = session {
			match session.index_stats() {
				Ok(stats) => counters.index = stats,
				Err(err) => tracing::error!(index = %self.name, error = %err, "error reading dedupe index stats"),
			}
			match session.session_stats() {
				Ok(stats) => counters.session = stats,
				Err(err) => tracing::error!(index = %self.name, error = %err, "error reading dedupe session stats"),
			}
			*self.engine_stats.lock() = counters;
		}

		IndexStatistics {
			state,
			max_dedupe_queries: self.maximum.load(Ordering::Acquire),
			curr_dedupe_queries: self.active.load(Ordering::Acquire),
			timeouts: self.reporter.total(),
			busy_conflicts: self.busy_conflicts.load(Ordering::Acquire),
			entries_indexed: counters.index.entries_indexed,
			session: counters.session,
		}
	}

	pub(super) fn dump(&self, verbose: bool) -> IndexDump {
		let (state, changing_to) = {
			let data = self.state.lock();
			(data.name_of(data.state), data.changing.then(|| data.name_of(data.target)))
		};
		tracing::info!(index = %self.name, "dedupe index: state: {state}");
		if let Some(target) = changing_to {
			tracing::info!(index = %self.name, "dedupe index: changing to state: {target}");
		}

		let (pending, queued, expiry_armed) = if verbose {
			let pending = self.pending.len();
			let queued = self.queue.depth();
			let armed = self.pending.timer_armed();
			tracing::info!(index = %self.name, worker = %self.queue.name(), pending, queued, armed, "dedupe index: queues");
			(Some(pending), Some(queued), Some(armed))
		} else {
			(None, None, None)
		};

		IndexDump {
			state,
			changing_to,
			pending,
			queued,
			expiry_armed,
		}
	}
}
