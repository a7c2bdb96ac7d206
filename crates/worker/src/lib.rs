//! Scheduling substrate for the dedupe index coordinator.
//!
//! * [`SerialQueue`]: one named OS thread executing jobs in order, with a
//!   synchronous run-and-wait entry point.
//! * [`DeadlineTimer`]: one-shot callbacks at absolute deadlines on a shared
//!   tokio runtime.

mod class;
mod queue;
mod spawn;
mod timer;

#[cfg(test)]
mod panic_tests;

pub use class::TaskClass;
pub use queue::{QueueError, SerialQueue};
pub use spawn::{panic_message, runtime_handle, spawn_named_thread, spawn_on};
pub use timer::DeadlineTimer;
