use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use super::*;

#[test]
fn fires_after_deadline() {
	let timer = DeadlineTimer::new(TaskClass::Deadline);
	let (tx, rx) = mpsc::channel();
	let start = Instant::now();
	assert!(timer.schedule_after(Duration::from_millis(20), move || {
		let _ = tx.send(Instant::now());
	}));

	let fired_at = rx.recv_timeout(Duration::from_secs(2)).expect("timer should fire");
	assert!(fired_at.duration_since(start) >= Duration::from_millis(20));
}

#[test]
fn past_deadline_fires_promptly() {
	let timer = DeadlineTimer::new(TaskClass::Deadline);
	let (tx, rx) = mpsc::channel();
	timer.schedule_at(Instant::now() - Duration::from_millis(5), move || {
		let _ = tx.send(());
	});
	rx.recv_timeout(Duration::from_secs(2)).expect("timer should fire");
}

#[test]
fn callback_can_rearm() {
	let timer = Arc::new(DeadlineTimer::new(TaskClass::Deadline));
	let (tx, rx) = mpsc::channel();
	let again = Arc::clone(&timer);
	timer.schedule_after(Duration::from_millis(2), move || {
		again.schedule_after(Duration::from_millis(2), move || {
			let _ = tx.send(());
		});
	});
	rx.recv_timeout(Duration::from_secs(2)).expect("re-armed timer should fire");
}

#[test]
fn cancel_drops_outstanding_callbacks() {
	let timer = DeadlineTimer::new(TaskClass::Deadline);
	let fired = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&fired);
	timer.schedule_after(Duration::from_millis(30), move || {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	timer.cancel();

	assert!(!timer.schedule_after(Duration::ZERO, || {}));
	std::thread::sleep(Duration::from_millis(60));
	assert_eq!(fired.load(Ordering::SeqCst), 0);
	assert_eq!(timer.armed(), 0);
}
