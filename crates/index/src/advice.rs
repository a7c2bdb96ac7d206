//! Duplicate-advice encoding inside an index request's metadata payload.
//!
//! Layout: one version byte, one mapping-state byte, then the physical block
//! number as a little-endian `u64`. The remainder of the metadata payload is
//! zero.

use crate::engine::{CHUNK_DATA_SIZE, ChunkData, ChunkRequest};

/// Advice format version written and accepted by this coordinator.
pub const ADVICE_VERSION: u8 = 2;

/// Encoded advice size: version byte + state byte + 64-bit block number.
pub const ADVICE_SIZE: usize = 1 + 1 + std::mem::size_of::<u64>();

const _: () = assert!(ADVICE_SIZE <= CHUNK_DATA_SIZE);

/// Location of previously written data, as recorded in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataLocation {
	/// Block mapping state (uncompressed, or a compressed slot).
	pub state: u8,
	/// Physical block number.
	pub pbn: u64,
}

/// Encodes `advice` into a metadata payload.
pub fn encode_advice(advice: DataLocation) -> ChunkData {
	let mut data = [0u8; CHUNK_DATA_SIZE];
	data[0] = ADVICE_VERSION;
	data[1] = advice.state;
	data[2..ADVICE_SIZE].copy_from_slice(&advice.pbn.to_le_bytes());
	data
}

/// Decodes advice from a metadata payload.
///
/// A short buffer or an unknown version byte is logged and yields `None`.
pub fn decode_advice(data: &[u8]) -> Option<DataLocation> {
	if data.len() < ADVICE_SIZE {
		tracing::error!(len = data.len(), "truncated dedupe advice");
		return None;
	}
	let version = data[0];
	if version != ADVICE_VERSION {
		tracing::error!(version, "invalid dedupe advice version code");
		return None;
	}
	let mut pbn = [0u8; 8];
	pbn.copy_from_slice(&data[2..ADVICE_SIZE]);
	Some(DataLocation {
		state: data[1],
		pbn: u64::from_le_bytes(pbn),
	})
}

/// Decodes the advice an engine returned for a finished request.
///
/// Only successful requests that found an existing entry carry advice.
pub fn decode_response(request: &ChunkRequest) -> Option<DataLocation> {
	if request.status.is_err() || !request.found {
		return None;
	}
	request.old_metadata.as_ref().and_then(|data| decode_advice(data))
}
