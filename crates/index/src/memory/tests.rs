use std::sync::mpsc;

use pretty_assertions::assert_eq;

use super::*;

fn name(byte: u8) -> ChunkName {
	ChunkName([byte; 16])
}

fn submit_sync(session: &dyn IndexSession, request: ChunkRequest) -> ChunkRequest {
	let (tx, rx) = mpsc::channel();
	session
		.submit(request, Box::new(move |done| tx.send(done).unwrap()))
		.expect("submit should start");
	rx.recv().unwrap()
}

#[test]
fn open_reports_missing_and_corrupt_indexes() {
	let engine = MemoryEngine::new();
	assert_eq!(engine.open("vol").err(), Some(EngineError::NoIndex));

	engine.plant_index("vol", SessionConfig::default());
	engine.corrupt_index("vol");
	assert_eq!(engine.open("vol").err(), Some(EngineError::CorruptComponent));
	assert_eq!(engine.calls().opens, 2);
}

#[test]
fn post_records_only_when_absent() {
	let engine = MemoryEngine::new();
	let session = engine.create("vol", &SessionConfig::default()).unwrap();

	let first = submit_sync(session.as_ref(), ChunkRequest::new(name(1), ChunkOperation::Post, Some([7; 16])));
	assert!(!first.found);

	let second = submit_sync(session.as_ref(), ChunkRequest::new(name(1), ChunkOperation::Post, Some([9; 16])));
	assert!(second.found);
	assert_eq!(second.old_metadata, Some([7; 16]));

	let update = submit_sync(session.as_ref(), ChunkRequest::new(name(1), ChunkOperation::Update, Some([9; 16])));
	assert_eq!(update.old_metadata, Some([7; 16]));

	let lookup = submit_sync(session.as_ref(), ChunkRequest::new(name(1), ChunkOperation::Lookup, None));
	assert_eq!(lookup.old_metadata, Some([9; 16]));

	let stats = session.session_stats().unwrap();
	assert_eq!(stats.posts_not_found, 1);
	assert_eq!(stats.posts_found, 1);
	assert_eq!(stats.updates_found, 1);
	assert_eq!(stats.queries_found, 1);
	assert_eq!(session.index_stats().unwrap().entries_indexed, 1);
}

#[test]
fn entries_survive_reopen_but_not_create() {
	let engine = MemoryEngine::new();
	let config = SessionConfig { nonce: 5, ..SessionConfig::default() };
	let session = engine.create("vol", &config).unwrap();
	submit_sync(session.as_ref(), ChunkRequest::new(name(2), ChunkOperation::Update, Some([1; 16])));
	session.close().unwrap();

	let reopened = engine.open("vol").unwrap();
	assert_eq!(reopened.read_config().unwrap(), config);
	assert_eq!(reopened.index_stats().unwrap().entries_indexed, 1);

	let fresh = engine.create("vol", &config).unwrap();
	assert_eq!(fresh.index_stats().unwrap().entries_indexed, 0);
}

#[test]
fn close_completes_held_requests() {
	let engine = MemoryEngine::new();
	let session = engine.create("vol", &SessionConfig::default()).unwrap();
	engine.hold_completions(true);

	let (tx, rx) = mpsc::channel();
	session
		.submit(
			ChunkRequest::new(name(3), ChunkOperation::Lookup, None),
			Box::new(move |done| tx.send(done.found).unwrap()),
		)
		.unwrap();
	assert_eq!(engine.held(), 1);
	assert!(rx.try_recv().is_err());

	session.close().unwrap();
	assert_eq!(engine.held(), 0);
	assert!(!rx.recv().unwrap());
}

#[test]
fn closed_session_rejects_work() {
	let engine = MemoryEngine::new();
	let session = engine.create("vol", &SessionConfig::default()).unwrap();
	session.close().unwrap();

	let rejected = session.submit(ChunkRequest::new(name(4), ChunkOperation::Lookup, None), Box::new(|_| panic!("dropped callback ran")));
	assert_eq!(rejected, Err(EngineError::SessionClosed));
	assert_eq!(session.save(), Err(EngineError::SessionClosed));
	assert_eq!(engine.calls().submissions, 0);
}

#[test]
fn injected_faults() {
	let engine = MemoryEngine::new();
	engine.fail_next_create(EngineError::Failed("disk full".into()));
	assert!(engine.create("vol", &SessionConfig::default()).is_err());
	let session = engine.create("vol", &SessionConfig::default()).unwrap();

	engine.fail_submissions(Some(EngineError::Failed("busy".into())));
	let rejected = session.submit(ChunkRequest::new(name(5), ChunkOperation::Lookup, None), Box::new(|_| {}));
	assert_eq!(rejected, Err(EngineError::Failed("busy".into())));
	engine.fail_submissions(None);

	engine.fail_stats(true);
	assert!(session.index_stats().is_err());
	assert!(session.session_stats().is_err());
	engine.fail_stats(false);
	assert!(session.session_stats().is_ok());
}
