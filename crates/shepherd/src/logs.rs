use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use std::path::{Path, PathBuf};

const DEFAULT_NAME: &str = "unnamed";

/// `process_<name>_<id>.log`. Stable for the lifetime of a process, so every
/// run appends to the same file.
pub fn log_file_name(id: u32, name: &str) -> String {
	format!("process_{}_{}.log", sanitize_name(name), id)
}

pub fn log_path(log_dir: &Path, id: u32, name: &str) -> PathBuf {
	log_dir.join(log_file_name(id, name))
}

fn sanitize_name(name: &str) -> String {
	let name = name.trim();
	if name.is_empty() {
		return DEFAULT_NAME.to_string();
	}
	name.chars()
		.map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
		.collect()
}

pub fn format_line(line: &str) -> String {
	format_line_at(&Local::now(), line)
}

pub fn format_line_at(at: &DateTime<Local>, line: &str) -> String {
	format!("[{}] {}\n", at.to_rfc3339_opts(SecondsFormat::Secs, false), line)
}

/// Splits a log file line back into its timestamp and captured text.
pub fn parse_line(line: &str) -> Option<(DateTime<FixedOffset>, &str)> {
	let rest = line.strip_prefix('[')?;
	let end = rest.find(']')?;
	let ts = DateTime::parse_from_rfc3339(&rest[..end]).ok()?;
	let text = rest[end + 1..].strip_prefix(' ').unwrap_or(&rest[end + 1..]);
	Some((ts, text.trim_end_matches('\n')))
}
