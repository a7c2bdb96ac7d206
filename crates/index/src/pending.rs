//! Pending-request tracking and expiry.
//!
//! Requests are queued in submission order. Timeout eligibility is monotonic
//! in submission time, so a sweep only ever has to look at the front.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::request::DedupeContext;

/// One queued request.
#[derive(Debug, Clone)]
pub(crate) struct PendingEntry {
	pub context: Arc<DedupeContext>,
	pub generation: u64,
	pub submitted_at: Instant,
}

#[derive(Debug, Default)]
struct PendingQueue {
	entries: BTreeMap<u64, PendingEntry>,
	next_key: u64,
	timer_armed: bool,
}

/// Result of one expiry sweep.
#[derive(Debug, Default)]
pub(crate) struct Sweep {
	/// Entries removed because they outlived the timeout, oldest first.
	pub expired: Vec<PendingEntry>,
	/// Deadline the timer must be re-armed for.
	pub rearm_at: Option<Instant>,
}

/// Submission-ordered queue of requests the engine has not answered.
#[derive(Debug)]
pub(crate) struct PendingTracker {
	queue: Mutex<PendingQueue>,
	timeout: Duration,
	min_timer: Duration,
}

impl PendingTracker {
	pub fn new(timeout: Duration, min_timer: Duration) -> Self {
		Self {
			queue: Mutex::new(PendingQueue::default()),
			timeout,
			min_timer,
		}
	}

	/// Expiry deadline for a request submitted at `submitted_at`, never
	/// closer than the minimum timer interval.
	pub fn deadline(&self, submitted_at: Instant, now: Instant) -> Instant {
		(submitted_at + self.timeout).max(now + self.min_timer)
	}

	/// Queues `entry`. Returns the deadline to arm the timer for when no
	/// timer is armed yet.
	pub fn register(&self, entry: PendingEntry, now: Instant) -> Option<Instant> {
		let mut queue = self.queue.lock();
		queue.next_key += 1;
		let key = queue.next_key;
		entry.context.pending_key().store(key, Ordering::Release);
		let submitted_at = entry.submitted_at;
		queue.entries.insert(key, entry);
		if queue.timer_armed {
			return None;
		}
		queue.timer_armed = true;
		Some(self.deadline(submitted_at, now))
	}

	/// Removes the entry queued for `generation` of `context`, if it is still
	/// there. An entry belonging to a later submission is left alone.
	pub fn deregister(&self, context: &DedupeContext, generation: u64) -> bool {
		let mut queue = self.queue.lock();
		let key = context.pending_key().load(Ordering::Acquire);
		if key == 0 || queue.entries.get(&key).is_none_or(|entry| entry.generation != generation) {
			return false;
		}
		queue.entries.remove(&key);
		context.pending_key().store(0, Ordering::Release);
		true
	}

	/// Removes every entry submitted more than the timeout interval before
	/// `now`, and reports when the next sweep is due.
	pub fn sweep(&self, now: Instant) -> Sweep {
		let mut sweep = Sweep::default();
		let mut queue = self.queue.lock();
		queue.timer_armed = false;
		let earliest_allowed = now.checked_sub(self.timeout);

		while let Some(entry) = queue.entries.first_entry() {
			let submitted_at = entry.get().submitted_at;
			let expired = earliest_allowed.is_some_and(|earliest| submitted_at < earliest);
			if !expired {
				queue.timer_armed = true;
				sweep.rearm_at = Some(self.deadline(submitted_at, now));
				break;
			}
			let entry = entry.remove();
			entry.context.pending_key().store(0, Ordering::Release);
			sweep.expired.push(entry);
		}
		sweep
	}

	pub fn len(&self) -> usize {
		self.queue.lock().entries.len()
	}

	pub fn timer_armed(&self) -> bool {
		self.queue.lock().timer_armed
	}
}
