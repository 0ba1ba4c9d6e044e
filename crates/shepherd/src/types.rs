use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub const UPTIME_PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessStatus {
	Running,
	Stopped,
	/// The restart policy ran out of attempts. Never reached with the default policy.
	Failed,
}

impl ProcessStatus {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessStatus::Running)
	}
}

impl fmt::Display for ProcessStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ProcessStatus::Running => "Running",
			ProcessStatus::Stopped => "Stopped",
			ProcessStatus::Failed => "Failed",
		};
		f.write_str(s)
	}
}

/// Point-in-time copy of one supervised process, as returned by `Registry::list`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
	pub id: u32,
	pub name: String,
	pub command: String,
	pub status: ProcessStatus,
	/// OS pid of the current run, 0 when no child is alive.
	pub pid: u32,
	pub restart_count: u32,
	/// Seconds since the current run started; `None` unless running.
	pub uptime_secs: Option<f64>,
	pub log_path: PathBuf,
}

impl ProcessInfo {
	/// Two-decimal seconds while running, `-` otherwise.
	pub fn uptime(&self) -> String {
		match self.uptime_secs {
			Some(secs) => format!("{:.2}", secs),
			None => UPTIME_PLACEHOLDER.to_string(),
		}
	}
}
