//! Coalesced reporting of request timeouts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use vdx_worker::{DeadlineTimer, TaskClass};

/// Counts events and reports the delta at most once per interval.
///
/// Notifications are cheap (one atomic increment and one atomic swap); the
/// first notification after a report schedules the next one.
#[derive(Debug)]
pub struct TimeoutReporter {
	index: String,
	interval: Duration,
	value: AtomicU64,
	last_reported: Mutex<u64>,
	scheduled: AtomicBool,
	reports: AtomicU64,
	timer: DeadlineTimer,
}

impl TimeoutReporter {
	pub fn new(index: impl Into<String>, interval: Duration) -> Arc<Self> {
		Arc::new(Self {
			index: index.into(),
			interval,
			value: AtomicU64::new(0),
			last_reported: Mutex::new(0),
			scheduled: AtomicBool::new(false),
			reports: AtomicU64::new(0),
			timer: DeadlineTimer::new(TaskClass::Reporting),
		})
	}

	/// Records one timeout.
	pub fn notify(self: &Arc<Self>) {
		self.value.fetch_add(1, Ordering::AcqRel);
		if self.scheduled.swap(true, Ordering::AcqRel) {
			return;
		}
		let reporter = Arc::downgrade(self);
		let scheduled = self.timer.schedule_after(self.interval, move || {
			if let Some(reporter) = reporter.upgrade() {
				reporter.report();
			}
		});
		if !scheduled {
			self.scheduled.store(false, Ordering::Release);
		}
	}

	/// Emits the delta since the previous report, if any, and returns it.
	pub fn report(&self) -> u64 {
		self.scheduled.store(false, Ordering::Release);
		let mut last = self.last_reported.lock();
		let current = self.value.load(Ordering::Acquire);
		let delta = current.saturating_sub(*last);
		if delta != 0 {
			tracing::info!(index = %self.index, timeouts = delta, "dedupe index timeout on {delta} requests");
			*last = current;
			self.reports.fetch_add(1, Ordering::AcqRel);
		}
		delta
	}

	/// Stops scheduling and flushes any unreported delta.
	pub fn stop(&self) -> u64 {
		self.timer.cancel();
		self.report()
	}

	/// Total timeouts recorded.
	pub fn total(&self) -> u64 {
		self.value.load(Ordering::Acquire)
	}

	/// Value covered by the latest report.
	pub fn last_reported(&self) -> u64 {
		*self.last_reported.lock()
	}

	/// Number of reports emitted.
	pub fn reports(&self) -> u64 {
		self.reports.load(Ordering::Acquire)
	}
}

#[cfg(test)]
mod tests;
