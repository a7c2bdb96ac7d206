/// Execution classes used to tag worker tasks in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Session-affecting work run on a serial worker thread.
	Serial,
	/// One-shot deadline callbacks (request expiry sweeps).
	Deadline,
	/// Periodic reporting of coalesced events.
	Reporting,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Serial => "serial",
			Self::Deadline => "deadline",
			Self::Reporting => "reporting",
		}
	}
}
