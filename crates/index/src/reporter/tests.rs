use std::time::Instant;

use super::*;

fn wait_for(mut done: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(2);
	while !done() {
		assert!(Instant::now() < deadline, "condition not reached in time");
		std::thread::sleep(Duration::from_millis(2));
	}
}

#[test]
fn burst_is_reported_once_with_exact_delta() {
	let reporter = TimeoutReporter::new("burst", Duration::from_millis(100));
	for _ in 0..1_500 {
		reporter.notify();
	}
	assert_eq!(reporter.reports(), 0);

	wait_for(|| reporter.reports() == 1);
	assert_eq!(reporter.last_reported(), 1_500);
	std::thread::sleep(Duration::from_millis(150));
	assert_eq!(reporter.reports(), 1);
}

#[test]
fn later_events_schedule_a_new_report() {
	let reporter = TimeoutReporter::new("later", Duration::from_millis(20));
	reporter.notify();
	wait_for(|| reporter.reports() == 1);

	reporter.notify();
	reporter.notify();
	wait_for(|| reporter.reports() == 2);
	assert_eq!(reporter.last_reported(), 3);
	assert_eq!(reporter.total(), 3);
}

#[test]
fn stop_flushes_unreported_delta() {
	let reporter = TimeoutReporter::new("stop", Duration::from_secs(60));
	reporter.notify();
	reporter.notify();

	assert_eq!(reporter.stop(), 2);
	assert_eq!(reporter.reports(), 1);
	assert_eq!(reporter.stop(), 0);
	assert_eq!(reporter.reports(), 1);
}

#[test]
fn report_without_events_is_silent() {
	let reporter = TimeoutReporter::new("idle", Duration::from_millis(10));
	assert_eq!(reporter.report(), 0);
	assert_eq!(reporter.reports(), 0);
}

#[test]
fn concurrent_reports_partition_the_count() {
	const EVENTS: u64 = 20_000;
	let reporter = TimeoutReporter::new("racing", Duration::from_secs(60));

	let writer = {
		let reporter = Arc::clone(&reporter);
		std::thread::spawn(move || {
			for _ in 0..EVENTS {
				reporter.notify();
			}
		})
	};
	let readers: Vec<_> = (0..3)
		.map(|_| {
			let reporter = Arc::clone(&reporter);
			std::thread::spawn(move || (0..20_000).map(|_| reporter.report()).sum::<u64>())
		})
		.collect();

	writer.join().unwrap();
	let reported: u64 = readers.into_iter().map(|reader| reader.join().unwrap()).sum();
	let remainder = reporter.stop();

	assert_eq!(reported + remainder, EVENTS);
	assert_eq!(reporter.last_reported(), EVENTS);
}
