use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logs;
use crate::process::{ProcessOptions, SupervisedProcess};
use crate::types::ProcessInfo;

/// All processes added during this supervisor's lifetime, in add order.
///
/// The lock covers lookups and appends only. Waiting for a child to shut
/// down happens after it is released.
pub struct Registry {
	inner: RwLock<Inner>,
	log_dir: PathBuf,
	options: ProcessOptions,
}

#[derive(Default)]
struct Inner {
	processes: Vec<Arc<SupervisedProcess>>,
	next_id: u32,
}

impl Registry {
	pub fn new(config: &Config) -> Arc<Self> {
		Self::with_options(&config.supervisor.log_dir, ProcessOptions::from_config(config))
	}

	pub fn with_options(log_dir: &Path, options: ProcessOptions) -> Arc<Self> {
		Arc::new(Self {
			inner: RwLock::new(Inner::default()),
			log_dir: log_dir.to_path_buf(),
			options,
		})
	}

	pub fn log_dir(&self) -> &Path {
		&self.log_dir
	}

	/// Registers and launches a process, returning its id. Only failures
	/// before the launch are reported here; everything after shows up in
	/// `list()`.
	pub async fn add(&self, name: &str, command: &str) -> Result<u32> {
		std::fs::create_dir_all(&self.log_dir).map_err(|source| Error::LogDir {
			path: self.log_dir.clone(),
			source,
		})?;

		let process = {
			let mut inner = self.inner.write().await;
			let id = inner.next_id;
			inner.next_id += 1;

			let log_path = logs::log_path(&self.log_dir, id, name);
			let process = SupervisedProcess::new(id, name, command, log_path, self.options.clone());
			inner.processes.push(Arc::clone(&process));
			process
		};

		tracing::info!("added {} (id {}): {}", process.name(), process.id(), process.command());
		process.start().await;
		Ok(process.id())
	}

	/// Stops the process with `id` and waits for it to wind down. Returns
	/// `false` if no such process was ever added.
	pub async fn stop(&self, id: u32) -> bool {
		let Some(process) = self.get(id).await else {
			tracing::debug!("stop: no process with id {}", id);
			return false;
		};
		process.stop().await;
		true
	}

	/// Stops every process, one after another, in add order.
	pub async fn stop_all(&self) {
		let processes = self.inner.read().await.processes.clone();
		for process in processes {
			process.stop().await;
		}
	}

	pub async fn get(&self, id: u32) -> Option<Arc<SupervisedProcess>> {
		let inner = self.inner.read().await;
		inner.processes.iter().find(|p| p.id() == id).cloned()
	}

	pub async fn list(&self) -> Vec<ProcessInfo> {
		let processes = self.inner.read().await.processes.clone();
		let mut result = Vec::with_capacity(processes.len());
		for process in &processes {
			result.push(process.info().await);
		}
		result
	}
}
