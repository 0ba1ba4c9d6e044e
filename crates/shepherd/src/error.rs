use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("failed to create log directory {}: {source}", path.display())]
	LogDir { path: PathBuf, source: io::Error },

	#[error("failed to open log file {}: {source}", path.display())]
	LogOpen { path: PathBuf, source: io::Error },

	#[error("failed to write log file {}: {source}", path.display())]
	LogWrite { path: PathBuf, source: io::Error },

	#[error("log file {} is not open", path.display())]
	LogClosed { path: PathBuf },

	#[error("failed to spawn `{command}`: {source}")]
	Spawn { command: String, source: io::Error },

	#[error("invalid config {}: {message}", path.display())]
	Config { path: PathBuf, message: String },
}
