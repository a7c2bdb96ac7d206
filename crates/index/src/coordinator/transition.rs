//! Session open/close transitions. Runs only on the serial worker.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::MutexGuard;
use vdx_worker::panic_message;

use super::{IndexInner, StateData};
use crate::engine::IndexSession;
use crate::error::EngineError;
use crate::state::{IndexState, SuspendMode};

enum OpenOutcome {
	Opened(Arc<dyn IndexSession>),
	/// No usable index for this volume; create one on the next cycle.
	Recreate,
	Failed(EngineError),
}

impl IndexInner {
	/// Loops until the index reaches its target state and no create is
	/// outstanding.
	pub(super) fn change_state(&self) {
		let mut data = self.state.lock();
		// `MutexGuard::unlocked` re-locks while unwinding, so `data` is still
		// held when an engine call panics.
		let converged = catch_unwind(AssertUnwindSafe(|| {
			while data.state != data.target || data.create {
				if data.state == IndexState::Opened {
					self.close_session(&mut data);
				} else {
					self.open_session(&mut data);
				}
			}
		}));
		if let Err(payload) = converged {
			let message = panic_message(payload.as_ref()).unwrap_or_else(|| "opaque panic payload".to_string());
			tracing::error!(index = %self.name, panic = %message, "dedupe index state change panicked");
			data.session = None;
			data.state = IndexState::Closed;
			data.target = IndexState::Closed;
			data.create = false;
			data.error = true;
		}
		data.changing = false;
		data.refresh_deduping();
		tracing::debug!(index = %self.name, state = %data.name_of(data.state), "dedupe index state settled");
	}

	fn close_session(&self, data: &mut MutexGuard<'_, StateData>) {
		// Statistics readers skip a session that is not `Opened`.
		data.state = IndexState::Changing;
		let session = data.session.take();
		let mode = std::mem::take(&mut data.close_mode);
		let result = MutexGuard::unlocked(data, || match session {
			Some(session) => self.persist_and_close(session.as_ref(), mode),
			None => Ok(()),
		});
		data.state = IndexState::Closed;
		data.error |= result.is_err();
	}

	fn persist_and_close(&self, session: &dyn IndexSession, mode: SuspendMode) -> Result<(), EngineError> {
		let persisted = persist(session, mode);
		if let Err(err) = &persisted {
			tracing::error!(index = %self.name, ?mode, error = %err, "error persisting dedupe index before close");
		}
		let closed = session.close();
		if let Err(err) = &closed {
			tracing::error!(index = %self.name, error = %err, "error closing dedupe index");
		}
		persisted.and(closed)
	}

	fn open_session(&self, data: &mut MutexGuard<'_, StateData>) {
		let create = std::mem::take(&mut data.create);
		data.state = IndexState::Changing;
		data.error = false;
		let outcome = MutexGuard::unlocked(data, || self.attempt_open(create));
		match outcome {
			OpenOutcome::Opened(session) => {
				data.session = Some(session);
				data.state = IndexState::Opened;
			}
			OpenOutcome::Recreate => {
				data.state = IndexState::Closed;
				data.create = true;
			}
			OpenOutcome::Failed(err) => {
				data.state = IndexState::Closed;
				data.target = IndexState::Closed;
				data.error = true;
				MutexGuard::unlocked(data, || {
					tracing::info!(index = %self.name, error = %err, "setting dedupe index target state to error");
				});
			}
		}
	}

	fn attempt_open(&self, create: bool) -> OpenOutcome {
		if create {
			return match self.engine.create(&self.name, &self.session_config) {
				Ok(session) => {
					tracing::info!(index = %self.name, nonce = self.session_config.nonce, "created dedupe index");
					OpenOutcome::Opened(session)
				}
				Err(err) => {
					tracing::error!(index = %self.name, error = %err, "error creating dedupe index");
					OpenOutcome::Failed(err)
				}
			};
		}

		let session = match self.engine.open(&self.name) {
			Ok(session) => session,
			Err(err) => return self.open_failed(err, "error opening dedupe index"),
		};
		match session.read_config() {
			Ok(found) if found.nonce == self.session_config.nonce => {
				tracing::info!(index = %self.name, "opened dedupe index");
				OpenOutcome::Opened(session)
			}
			Ok(found) => {
				tracing::error!(
					index = %self.name,
					expected = self.session_config.nonce,
					found = found.nonce,
					"dedupe index does not belong to this volume"
				);
				self.close_quietly(session.as_ref());
				OpenOutcome::Recreate
			}
			Err(err) => {
				self.close_quietly(session.as_ref());
				self.open_failed(err, "error reading dedupe index configuration")
			}
		}
	}

	fn open_failed(&self, err: EngineError, message: &'static str) -> OpenOutcome {
		tracing::error!(index = %self.name, error = %err, "{message}");
		if err.is_recoverable() {
			tracing::info!(index = %self.name, "no usable dedupe index, creating a new one");
			OpenOutcome::Recreate
		} else {
			OpenOutcome::Failed(err)
		}
	}

	fn close_quietly(&self, session: &dyn IndexSession) {
		if let Err(err) = session.close() {
			tracing::error!(index = %self.name, error = %err, "error closing dedupe index");
		}
	}

	/// Saves or flushes the open session, if there is one.
	pub(super) fn suspend_session(&self, mode: SuspendMode) {
		let session = {
			let data = self.state.lock();
			if data.state == IndexState::Opened { data.session.clone() } else { None }
		};
		let Some(session) = session else {
			return;
		};
		if let Err(err) = persist(session.as_ref(), mode) {
			tracing::error!(index = %self.name, ?mode, error = %err, "error suspending dedupe index");
		}
	}
}

fn persist(session: &dyn IndexSession, mode: SuspendMode) -> Result<(), EngineError> {
	match mode {
		SuspendMode::Save => session.save(),
		SuspendMode::Flush => session.flush(),
	}
}
