//! Request submission, completion and expiry.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use super::IndexInner;
use crate::advice::{decode_response, encode_advice};
use crate::engine::{ChunkOperation, ChunkRequest};
use crate::error::EngineError;
use crate::pending::PendingEntry;
use crate::request::{DedupeContext, DedupeStatus, RequestState};

impl IndexInner {
	pub(super) fn submit(self: &Arc<Self>, context: &Arc<DedupeContext>, operation: ChunkOperation) {
		let now = Instant::now();
		let Some(generation) = context.lifecycle().begin() else {
			// An earlier submission of this context timed out and the engine
			// still holds it.
			let conflicts = self.busy_conflicts.fetch_add(1, Ordering::AcqRel);
			if conflicts % 1024 == 0 {
				tracing::warn!(index = %self.name, conflicts = conflicts + 1, "dedupe context still busy from an earlier request");
			}
			context.reject();
			return;
		};

		let (name, advice) = context.start(now);
		let new_metadata = operation.records_advice().then(|| encode_advice(advice.unwrap_or_default()));
		let request = ChunkRequest::new(name, operation, new_metadata);

		let started = {
			let data = self.state.lock();
			data.deduping && self.enqueue_operation(context, generation, now, request)
		};
		if !started {
			context.lifecycle().transition(generation, RequestState::Busy, RequestState::Idle);
			context.deliver(DedupeStatus::Success, None);
		}
	}

	/// Called with the state lock held so the operation is queued ahead of
	/// any state change that stops deduplication.
	fn enqueue_operation(self: &Arc<Self>, context: &Arc<DedupeContext>, generation: u64, submitted_at: Instant, request: ChunkRequest) -> bool {
		let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
		self.maximum.fetch_max(active, Ordering::AcqRel);

		let inner = Arc::clone(self);
		let context = Arc::clone(context);
		let queued = self
			.queue
			.enqueue(move || inner.start_operation(context, generation, submitted_at, request));
		if queued.is_err() {
			self.active.fetch_sub(1, Ordering::AcqRel);
		}
		queued.is_ok()
	}

	/// Runs on the serial worker.
	fn start_operation(self: &Arc<Self>, context: Arc<DedupeContext>, generation: u64, submitted_at: Instant, request: ChunkRequest) {
		let entry = PendingEntry {
			context: Arc::clone(&context),
			generation,
			submitted_at,
		};
		if let Some(deadline) = self.pending.register(entry, Instant::now()) {
			self.arm_expiry(deadline);
		}

		let session = self.state.lock().session.clone();
		let Some(session) = session else {
			self.fail_operation(&context, generation, request, EngineError::SessionClosed);
			return;
		};

		let retry = request.clone();
		let inner = Arc::clone(self);
		let done_context = Arc::clone(&context);
		let submitted = session.submit(
			request,
			Box::new(move |finished| inner.finish_operation(&done_context, generation, finished)),
		);
		if let Err(err) = submitted {
			self.fail_operation(&context, generation, retry, err);
		}
	}

	fn fail_operation(&self, context: &DedupeContext, generation: u64, mut request: ChunkRequest, err: EngineError) {
		tracing::debug!(index = %self.name, chunk = ?request.name, error = %err, "dedupe request not started");
		request.status = Err(err);
		self.finish_operation(context, generation, request);
	}

	/// Engine completion path.
	fn finish_operation(&self, context: &DedupeContext, generation: u64, request: ChunkRequest) {
		if !context.lifecycle().transition(generation, RequestState::Busy, RequestState::Idle) {
			// The expiry sweep already answered this submission.
			context.lifecycle().transition(generation, RequestState::TimedOut, RequestState::Idle);
			return;
		}

		self.pending.deregister(context, generation);
		let advice = request.operation.returns_advice().then(|| decode_response(&request));
		let status = match request.status {
			Ok(()) => DedupeStatus::Success,
			Err(err) => DedupeStatus::IndexError(err),
		};
		self.active.fetch_sub(1, Ordering::AcqRel);
		context.deliver(status, advice);
	}

	fn arm_expiry(self: &Arc<Self>, deadline: Instant) {
		let inner = Arc::downgrade(self);
		self.expiry.schedule_at(deadline, move || {
			if let Some(inner) = inner.upgrade() {
				inner.timeout_requests();
			}
		});
	}

	/// Expiry-timer path.
	fn timeout_requests(self: &Arc<Self>) {
		let sweep = self.pending.sweep(Instant::now());
		if let Some(deadline) = sweep.rearm_at {
			self.arm_expiry(deadline);
		}
		if sweep.expired.is_empty() {
			return;
		}
		tracing::debug!(index = %self.name, expired = sweep.expired.len(), "dedupe requests expired");

		for entry in sweep.expired {
			if entry.context.lifecycle().transition(entry.generation, RequestState::Busy, RequestState::TimedOut) {
				self.active.fetch_sub(1, Ordering::AcqRel);
				self.reporter.notify();
				entry.context.deliver(DedupeStatus::TimedOut, None);
			}
		}
	}
}
