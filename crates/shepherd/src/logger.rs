use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::logs;

/// Append-only log file for one run of a supervised process.
///
/// Clones share the same handle; the mutex keeps lines from different
/// writers (stdout and stderr pumps) from interleaving.
#[derive(Clone)]
pub struct Logger {
	path: PathBuf,
	file: Arc<Mutex<Option<File>>>,
}

impl Logger {
	pub fn open(path: &Path) -> Result<Self> {
		if let Some(dir) = path.parent() {
			fs::create_dir_all(dir).map_err(|source| Error::LogDir {
				path: dir.to_path_buf(),
				source,
			})?;
		}

		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)
			.map_err(|source| Error::LogOpen {
				path: path.to_path_buf(),
				source,
			})?;

		Ok(Self {
			path: path.to_path_buf(),
			file: Arc::new(Mutex::new(Some(file))),
		})
	}

	/// Appends `[<rfc3339>] <line>`.
	pub async fn write(&self, line: &str) -> Result<()> {
		let mut guard = self.file.lock().await;
		let file = guard.as_mut().ok_or_else(|| Error::LogClosed {
			path: self.path.clone(),
		})?;
		file.write_all(logs::format_line(line).as_bytes())
			.map_err(|source| Error::LogWrite {
				path: self.path.clone(),
				source,
			})
	}

	/// Flushes and releases the handle. Further calls are no-ops.
	pub async fn close(&self) {
		let mut guard = self.file.lock().await;
		if let Some(mut file) = guard.take() {
			if let Err(e) = file.flush() {
				tracing::warn!("flush {} failed: {}", self.path.display(), e);
			}
		}
	}
}
