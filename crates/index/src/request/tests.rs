use std::sync::atomic::AtomicUsize;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;

#[test]
fn begin_only_from_idle() {
	let cell = RequestStateCell::default();
	let generation = cell.begin().expect("idle cell should begin");
	assert_eq!(cell.load(), (generation, RequestState::Busy));
	assert_eq!(cell.begin(), None);

	assert!(cell.transition(generation, RequestState::Busy, RequestState::TimedOut));
	assert_eq!(cell.begin(), None);
	assert!(cell.transition(generation, RequestState::TimedOut, RequestState::Idle));

	let next = cell.begin().expect("released cell should begin again");
	assert_eq!(next, generation + 1);
}

#[test]
fn busy_exits_exactly_once() {
	let cell = RequestStateCell::default();
	let generation = cell.begin().unwrap();
	assert!(cell.transition(generation, RequestState::Busy, RequestState::Idle));
	assert!(!cell.transition(generation, RequestState::Busy, RequestState::TimedOut));
	assert!(!cell.transition(generation, RequestState::TimedOut, RequestState::Idle));
}

#[test]
fn stale_generation_cannot_transition() {
	let cell = RequestStateCell::default();
	let first = cell.begin().unwrap();
	assert!(cell.transition(first, RequestState::Busy, RequestState::Idle));
	let second = cell.begin().unwrap();

	assert!(!cell.transition(first, RequestState::Busy, RequestState::TimedOut));
	assert_eq!(cell.load(), (second, RequestState::Busy));
}

#[test]
fn racing_exits_deliver_once() {
	for _ in 0..64 {
		let cell = std::sync::Arc::new(RequestStateCell::default());
		let generation = cell.begin().unwrap();
		let wins = std::sync::Arc::new(AtomicUsize::new(0));
		let threads: Vec<_> = [RequestState::Idle, RequestState::TimedOut]
			.into_iter()
			.map(|to| {
				let cell = std::sync::Arc::clone(&cell);
				let wins = std::sync::Arc::clone(&wins);
				std::thread::spawn(move || {
					if cell.transition(generation, RequestState::Busy, to) {
						wins.fetch_add(1, Ordering::SeqCst);
					}
				})
			})
			.collect();
		for thread in threads {
			thread.join().unwrap();
		}
		assert_eq!(wins.load(Ordering::SeqCst), 1);
	}
}

#[test]
fn deliver_stores_status_and_advice() {
	let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
	let sink = std::sync::Arc::clone(&seen);
	let context = DedupeContext::new(move |outcome| sink.lock().push(outcome));
	let location = DataLocation { state: 1, pbn: 99 };
	context.prepare(ChunkName([1; 16]), Some(location));

	let (name, advice) = context.start(Instant::now());
	assert_eq!(name, ChunkName([1; 16]));
	assert_eq!(advice, Some(location));

	context.deliver(DedupeStatus::Success, None);
	assert_eq!(context.advice(), Some(location));

	context.deliver(DedupeStatus::TimedOut, Some(None));
	assert_eq!(context.advice(), None);
	assert_eq!(context.status(), DedupeStatus::TimedOut);

	context.reject();
	let seen = seen.lock();
	assert_eq!(seen.len(), 3);
	assert_eq!(
		seen[2],
		DedupeOutcome {
			status: DedupeStatus::TimedOut,
			advice: None
		}
	);
}
