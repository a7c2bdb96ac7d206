//! Dedupe index driver.
//!
//! Brings a [`DedupeIndex`] online over the in-memory engine, applies
//! operator commands, pushes a batch of post requests through it and prints
//! the resulting statistics as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use vdx_index::memory::MemoryEngine;
use vdx_index::{ChunkName, DataLocation, DedupeContext, DedupeIndex, DedupeOutcome, DedupeStatus, IndexConfig, IndexSettings, SessionConfig, SuspendMode, index_name};

/// Driver command line arguments.
#[derive(Parser, Debug)]
#[command(name = "vdx")]
#[command(about = "Run a dedupe index coordinator against the in-memory engine")]
struct Args {
	/// Coordinator configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Index name; defaults to the canonical name for `vdx0`
	#[arg(long)]
	name: Option<String>,

	/// Volume nonce the index is bound to
	#[arg(long, default_value_t = 1)]
	nonce: u64,

	/// Number of post requests to submit
	#[arg(short, long, default_value_t = 64)]
	requests: u64,

	/// Distinct chunks among the requests; repeats are duplicates
	#[arg(long, default_value_t = 48)]
	distinct: u64,

	/// Operator command to apply after start-up (repeatable)
	#[arg(long = "command", value_name = "COMMAND")]
	commands: Vec<String>,

	/// Flush instead of save when closing
	#[arg(long)]
	flush: bool,

	/// Include queue depths in the dump
	#[arg(long)]
	dump_verbose: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	let config = match &args.config {
		Some(path) => IndexConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
		None => IndexConfig::default(),
	};
	let name = args.name.clone().unwrap_or_else(|| index_name("vdx0", 1 << 30));
	let session = SessionConfig {
		nonce: args.nonce,
		..SessionConfig::default()
	};
	let settings = IndexSettings::new(name, session).with_config(config);

	let engine = MemoryEngine::new();
	let index = DedupeIndex::new(settings, Arc::new(engine)).context("starting dedupe index")?;
	info!(index = %index.name(), "starting dedupe index");

	index.start(true);
	index.quiesce()?;
	for command in &args.commands {
		index.message(command)?;
		index.quiesce()?;
	}

	let summary = run_batch(&index, args.requests, args.distinct.max(1))?;

	let stats = index.statistics();
	let dump = index.dump(args.dump_verbose);
	let report = serde_json::json!({
		"summary": summary,
		"statistics": stats,
		"dump": dump,
	});
	println!("{}", serde_json::to_string_pretty(&report)?);

	index.stop_with(if args.flush { SuspendMode::Flush } else { SuspendMode::Save });
	index.quiesce()?;
	index.finish();
	Ok(())
}

/// Submits `requests` posts over `distinct` chunks and waits for every
/// callback.
fn run_batch(index: &DedupeIndex, requests: u64, distinct: u64) -> anyhow::Result<serde_json::Value> {
	let (tx, rx) = mpsc::channel::<DedupeOutcome>();
	let contexts: Vec<Arc<DedupeContext>> = (0..requests)
		.map(|i| {
			let tx = tx.clone();
			let context = DedupeContext::new(move |outcome| {
				let _ = tx.send(outcome);
			});
			context.prepare(chunk_name(i % distinct), Some(DataLocation { state: 1, pbn: 1_000 + i }));
			context
		})
		.collect();
	drop(tx);

	for context in &contexts {
		index.post(context);
	}

	let wait = index.config().timeout_interval() * 2;
	let (mut duplicates, mut timeouts, mut errors) = (0u64, 0u64, 0u64);
	for _ in 0..requests {
		let outcome = rx.recv_timeout(wait).context("dedupe callback never arrived")?;
		match outcome.status {
			DedupeStatus::Success if outcome.advice.is_some() => duplicates += 1,
			DedupeStatus::Success => {}
			DedupeStatus::TimedOut => timeouts += 1,
			DedupeStatus::IndexError(err) => {
				tracing::warn!(error = %err, "dedupe request failed");
				errors += 1;
			}
		}
	}
	info!(requests, duplicates, timeouts, errors, "batch complete");

	Ok(serde_json::json!({
		"requests": requests,
		"duplicates": duplicates,
		"timeouts": timeouts,
		"errors": errors,
	}))
}

fn chunk_name(key: u64) -> ChunkName {
	let mut bytes = [0u8; 16];
	bytes[..8].copy_from_slice(&key.to_le_bytes());
	bytes[8..].copy_from_slice(&(!key).to_le_bytes());
	ChunkName(bytes)
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("vdx_index=debug,vdx_worker=debug,info")
		} else {
			EnvFilter::new("info")
		}
	});
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
