//! Index states and their operator-facing names.

use serde::Serialize;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Lifecycle state of the index session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexState {
	/// No session is open.
	Closed,
	/// A session is being opened or closed.
	Changing,
	/// A session is open.
	Opened,
}

/// Operator-facing status of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, IntoStaticStr, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StateName {
	Closed,
	Closing,
	Opening,
	Online,
	Offline,
	Error,
	#[default]
	Unknown,
}

impl StateName {
	pub fn as_str(self) -> &'static str {
		self.into()
	}
}

/// Flags that decide how a state is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateView {
	pub target: IndexState,
	pub error: bool,
	pub dedupe: bool,
}

/// Renders `state` for operators.
///
/// A closed index reports `error` when it was closed by a failure, a changing
/// index reports its direction, and an open index reports whether requests
/// are being deduplicated.
pub(crate) fn state_name(state: IndexState, view: StateView) -> StateName {
	match state {
		IndexState::Closed if view.error => StateName::Error,
		IndexState::Closed => StateName::Closed,
		IndexState::Changing if view.target == IndexState::Opened => StateName::Opening,
		IndexState::Changing => StateName::Closing,
		IndexState::Opened if view.dedupe => StateName::Online,
		IndexState::Opened => StateName::Offline,
	}
}

/// How an open index is made durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuspendMode {
	/// Save the whole index so it can be reopened without a rebuild.
	#[default]
	Save,
	/// Only wait for outstanding requests to finish.
	Flush,
}

/// A requested change of target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
	pub target: IndexState,
	/// New value for the dedupe-enabled flag, if it should change.
	pub dedupe: Option<bool>,
	/// Discard any existing index and create a fresh one.
	pub create: bool,
}

impl StateChange {
	pub const fn open() -> Self {
		Self {
			target: IndexState::Opened,
			dedupe: None,
			create: false,
		}
	}

	pub const fn close() -> Self {
		Self {
			target: IndexState::Closed,
			dedupe: None,
			create: false,
		}
	}

	#[must_use]
	pub const fn dedupe(mut self, enabled: bool) -> Self {
		self.dedupe = Some(enabled);
		self
	}

	#[must_use]
	pub const fn create(mut self) -> Self {
		self.create = true;
		self
	}
}

/// Operator commands accepted by [`crate::DedupeIndex::message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum IndexCommand {
	#[strum(to_string = "close", serialize = "index-close")]
	Close,
	#[strum(to_string = "create", serialize = "index-create")]
	Create,
	#[strum(to_string = "disable", serialize = "index-disable")]
	Disable,
	#[strum(to_string = "enable", serialize = "index-enable")]
	Enable,
}

impl IndexCommand {
	/// The state change this command requests.
	pub const fn state_change(self) -> StateChange {
		match self {
			Self::Close => StateChange::close(),
			Self::Create => StateChange::open().create(),
			Self::Disable => StateChange::open().dedupe(false),
			Self::Enable => StateChange::open().dedupe(true),
		}
	}
}
