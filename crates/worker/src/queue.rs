//! Single-thread serial work queue.
//!
//! Every job enqueued on a [`SerialQueue`] runs on the same dedicated OS
//! thread, in enqueue order. Code that must never touch a resource from two
//! threads at once funnels through one queue instead of locking the resource.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{TaskClass, panic_message, spawn_named_thread};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error returned when a job cannot be handed to the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
	/// The queue was finished; no further jobs are accepted.
	Closed,
}

impl std::fmt::Display for QueueError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Closed => f.write_str("serial queue is closed"),
		}
	}
}

impl std::error::Error for QueueError {}

struct QueueShared {
	name: String,
	depth: AtomicUsize,
	completed: AtomicUsize,
}

/// Serial work queue backed by one named OS thread.
pub struct SerialQueue {
	shared: Arc<QueueShared>,
	tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
	thread: Mutex<Option<JoinHandle<()>>>,
	thread_id: ThreadId,
}

impl SerialQueue {
	/// Starts the worker thread.
	pub fn start(name: impl Into<String>) -> std::io::Result<Self> {
		let name = name.into();
		let shared = Arc::new(QueueShared {
			name: name.clone(),
			depth: AtomicUsize::new(0),
			completed: AtomicUsize::new(0),
		});
		let (tx, rx) = mpsc::unbounded_channel::<Job>();
		let worker_shared = Arc::clone(&shared);
		let thread = spawn_named_thread(TaskClass::Serial, name, move || run_worker(worker_shared, rx))?;
		let thread_id = thread.thread().id();

		Ok(Self {
			shared,
			tx: Mutex::new(Some(tx)),
			thread: Mutex::new(Some(thread)),
			thread_id,
		})
	}

	/// Returns the queue (and worker thread) name.
	pub fn name(&self) -> &str {
		&self.shared.name
	}

	/// Number of jobs enqueued but not yet finished.
	pub fn depth(&self) -> usize {
		self.shared.depth.load(Ordering::Acquire)
	}

	/// Number of jobs the worker has finished, including panicked ones.
	pub fn completed(&self) -> usize {
		self.shared.completed.load(Ordering::Acquire)
	}

	/// Returns true when called from this queue's worker thread.
	pub fn is_worker_thread(&self) -> bool {
		std::thread::current().id() == self.thread_id
	}

	/// Hands one job to the worker without waiting for it.
	pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
		let guard = self.tx.lock();
		let Some(tx) = guard.as_ref() else {
			return Err(QueueError::Closed);
		};
		self.shared.depth.fetch_add(1, Ordering::AcqRel);
		if tx.send(Box::new(job)).is_err() {
			self.shared.depth.fetch_sub(1, Ordering::AcqRel);
			return Err(QueueError::Closed);
		}
		Ok(())
	}

	/// Runs `f` on the worker and parks the calling thread until it returns.
	///
	/// Called from the worker thread itself, `f` runs inline.
	///
	/// # Panics
	///
	/// Panics if called from within an async runtime context, since the
	/// caller blocks.
	pub fn run_and_wait<R>(&self, f: impl FnOnce() -> R + Send + 'static) -> Result<R, QueueError>
	where
		R: Send + 'static,
	{
		if self.is_worker_thread() {
			return Ok(f());
		}
		let (done_tx, done_rx) = oneshot::channel();
		self.enqueue(move || {
			let _ = done_tx.send(f());
		})?;
		// A dropped sender means the job panicked or the queue shut down.
		done_rx.blocking_recv().map_err(|_| QueueError::Closed)
	}

	/// Stops accepting jobs, lets the worker drain what is queued, and joins it.
	///
	/// Idempotent. When called from the worker thread the join is skipped.
	pub fn finish(&self) {
		drop(self.tx.lock().take());
		if self.is_worker_thread() {
			return;
		}
		let thread = self.thread.lock().take();
		if let Some(thread) = thread
			&& thread.join().is_err()
		{
			tracing::error!(queue = %self.shared.name, "serial worker thread panicked");
		}
	}

	/// Returns true once [`Self::finish`] has been called.
	pub fn is_finished(&self) -> bool {
		self.tx.lock().is_none()
	}
}

impl Drop for SerialQueue {
	fn drop(&mut self) {
		self.finish();
	}
}

fn run_worker(shared: Arc<QueueShared>, mut rx: mpsc::UnboundedReceiver<Job>) {
	tracing::debug!(queue = %shared.name, "serial worker started");
	while let Some(job) = rx.blocking_recv() {
		if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
			let message = panic_message(payload.as_ref()).unwrap_or_else(|| "opaque panic payload".to_string());
			tracing::error!(queue = %shared.name, panic = %message, "serial worker job panicked");
		}
		shared.depth.fetch_sub(1, Ordering::AcqRel);
		shared.completed.fetch_add(1, Ordering::AcqRel);
	}
	tracing::debug!(queue = %shared.name, "serial worker stopped");
}
