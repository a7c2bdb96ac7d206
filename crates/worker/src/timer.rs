//! One-shot deadline timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::{TaskClass, runtime_handle, spawn_on};

/// Schedules one-shot callbacks at absolute deadlines.
///
/// Callbacks run on a tokio worker thread of the runtime that was current
/// when the timer was created (or the shared fallback runtime). Re-arming is
/// done by scheduling again from inside the callback. Cancelling the timer
/// drops every callback that has not fired yet and rejects new ones.
#[derive(Debug)]
pub struct DeadlineTimer {
	class: TaskClass,
	handle: tokio::runtime::Handle,
	cancel: CancellationToken,
	armed: Arc<AtomicUsize>,
}

impl DeadlineTimer {
	/// Creates a timer whose callbacks are tagged with `class`.
	pub fn new(class: TaskClass) -> Self {
		Self {
			class,
			handle: runtime_handle(),
			cancel: CancellationToken::new(),
			armed: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Runs `task` once `deadline` has passed.
	///
	/// Returns `false` without scheduling if the timer was cancelled.
	pub fn schedule_at(&self, deadline: Instant, task: impl FnOnce() + Send + 'static) -> bool {
		if self.cancel.is_cancelled() {
			return false;
		}
		let cancel = self.cancel.clone();
		let armed = Arc::clone(&self.armed);
		armed.fetch_add(1, Ordering::AcqRel);
		spawn_on(&self.handle, self.class, async move {
			let fire = tokio::select! {
				_ = cancel.cancelled() => false,
				_ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => true,
			};
			armed.fetch_sub(1, Ordering::AcqRel);
			if fire {
				task();
			}
		});
		true
	}

	/// Runs `task` once `delay` has elapsed from now.
	pub fn schedule_after(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> bool {
		self.schedule_at(Instant::now() + delay, task)
	}

	/// Number of callbacks scheduled but not yet fired or dropped.
	pub fn armed(&self) -> usize {
		self.armed.load(Ordering::Acquire)
	}

	/// Drops every outstanding callback and refuses new ones.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Returns true once [`Self::cancel`] has been called.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

impl Drop for DeadlineTimer {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

#[cfg(test)]
mod tests;
