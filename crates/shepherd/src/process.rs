use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::policy::{RestartDecision, RestartPolicy};
use crate::types::{ProcessInfo, ProcessStatus};

/// Minimum pause before retrying a run whose spawn failed outright.
const SPAWN_RETRY_FLOOR: Duration = Duration::from_millis(500);

/// Longest captured line. Longer output is logged in chunks of this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ProcessOptions {
	pub shell: String,
	pub stop_timeout: Duration,
	pub capture_stderr: bool,
	pub policy: RestartPolicy,
}

impl Default for ProcessOptions {
	fn default() -> Self {
		Self::from_config(&Config::default())
	}
}

impl ProcessOptions {
	pub fn from_config(config: &Config) -> Self {
		Self {
			shell: config.supervisor.shell.clone(),
			stop_timeout: config.supervisor.stop_timeout(),
			capture_stderr: config.supervisor.capture_stderr,
			policy: config.restart.policy(),
		}
	}
}

struct RunState {
	status: ProcessStatus,
	pid: u32,
	restart_count: u32,
	run_started_at: Instant,
}

impl RunState {
	fn uptime(&self) -> Option<Duration> {
		self.status.is_running().then(|| self.run_started_at.elapsed())
	}
}

enum RunEnd {
	Exited(io::Result<ExitStatus>),
	SpawnFailed(Error),
	Cancelled,
}

/// One child command kept alive across exits until it is stopped.
pub struct SupervisedProcess {
	id: u32,
	name: String,
	command: String,
	log_path: PathBuf,
	options: ProcessOptions,
	state: RwLock<RunState>,
	logger: Mutex<Option<Logger>>,
	cancel: watch::Sender<bool>,
	watcher: Mutex<Option<JoinHandle<()>>>,
	/// `true` while no watcher task is running.
	finished: watch::Sender<bool>,
}

impl SupervisedProcess {
	pub fn new(
		id: u32,
		name: &str,
		command: &str,
		log_path: PathBuf,
		options: ProcessOptions,
	) -> Arc<Self> {
		let (cancel, _) = watch::channel(false);
		let (finished, _) = watch::channel(true);
		Arc::new(Self {
			id,
			name: name.to_string(),
			command: command.to_string(),
			log_path,
			options,
			state: RwLock::new(RunState {
				status: ProcessStatus::Running,
				pid: 0,
				restart_count: 0,
				run_started_at: Instant::now(),
			}),
			logger: Mutex::new(None),
			cancel,
			watcher: Mutex::new(None),
			finished,
		})
	}

	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn command(&self) -> &str {
		&self.command
	}

	pub fn log_path(&self) -> &Path {
		&self.log_path
	}

	pub async fn status(&self) -> ProcessStatus {
		self.state.read().await.status
	}

	pub async fn pid(&self) -> u32 {
		self.state.read().await.pid
	}

	pub async fn restart_count(&self) -> u32 {
		self.state.read().await.restart_count
	}

	/// Time since the current run began, or `None` when not running.
	pub async fn uptime(&self) -> Option<Duration> {
		self.state.read().await.uptime()
	}

	pub async fn info(&self) -> ProcessInfo {
		let state = self.state.read().await;
		ProcessInfo {
			id: self.id,
			name: self.name.clone(),
			command: self.command.clone(),
			status: state.status,
			pid: state.pid,
			restart_count: state.restart_count,
			uptime_secs: state.uptime().map(|d| d.as_secs_f64()),
			log_path: self.log_path.clone(),
		}
	}

	/// Launches the watcher task. Only the first call has an effect, and
	/// nothing starts once a stop has been requested.
	pub async fn start(self: &Arc<Self>) {
		let mut watcher = self.watcher.lock().await;
		if watcher.is_some() || self.stop_requested() {
			return;
		}
		self.finished.send_replace(false);
		let this = Arc::clone(self);
		*watcher = Some(tokio::spawn(async move { this.supervise().await }));
	}

	/// Marks the process stopped, terminates the current child and waits for
	/// the watcher to finish. No log lines are written after this returns,
	/// including for callers that arrive while another stop is in progress.
	pub async fn stop(&self) {
		{
			let mut state = self.state.write().await;
			state.status = ProcessStatus::Stopped;
			state.pid = 0;
		}
		self.cancel.send_replace(true);

		let handle = self.watcher.lock().await.take();
		match handle {
			Some(handle) => {
				tracing::info!("stopping {} (id {})", self.name, self.id);
				if let Err(e) = handle.await {
					tracing::error!("watcher for {} (id {}) panicked: {}", self.name, self.id, e);
				}
				self.finished.send_replace(true);
			}
			None => {
				let mut finished = self.finished.subscribe();
				let _ = finished.wait_for(|done| *done).await;
			}
		}
	}

	/// Appends one captured line to the current run's log file. Failures are
	/// reported and otherwise ignored.
	pub async fn log(&self, line: &str) {
		let logger = self.logger.lock().await.clone();
		if let Some(logger) = logger {
			if let Err(e) = logger.write(line).await {
				tracing::warn!("{} (id {}): {}", self.name, self.id, e);
			}
		}
	}

	fn stop_requested(&self) -> bool {
		*self.cancel.borrow()
	}

	async fn supervise(self: Arc<Self>) {
		let mut cancel = self.cancel.subscribe();
		let mut streak: u32 = 0;

		loop {
			if self.stop_requested() {
				break;
			}

			let started = Instant::now();
			let floor = match self.run_once(&mut cancel).await {
				RunEnd::Cancelled => break,
				RunEnd::Exited(result) => {
					match result {
						Ok(status) => tracing::info!("{} (id {}) exited: {}", self.name, self.id, status),
						Err(e) => tracing::warn!("{} (id {}) wait failed: {}", self.name, self.id, e),
					}
					if self.options.policy.resets_streak(started.elapsed()) {
						streak = 0;
					}
					Duration::ZERO
				}
				RunEnd::SpawnFailed(e) => {
					tracing::warn!("{} (id {}): {}", self.name, self.id, e);
					SPAWN_RETRY_FLOOR
				}
			};

			if self.stop_requested() {
				break;
			}

			streak = streak.saturating_add(1);
			let delay = match self.options.policy.decide(streak) {
				RestartDecision::Restart { delay } => delay.max(floor),
				RestartDecision::GiveUp => {
					tracing::error!(
						"{} (id {}) gave up after {} consecutive restarts",
						self.name,
						self.id,
						streak - 1
					);
					self.mark_failed().await;
					break;
				}
			};

			let count = self.note_restart().await;
			tracing::info!(
				"restarting {} (id {}), restart #{} in {:?}",
				self.name,
				self.id,
				count,
				delay
			);

			if delay.is_zero() {
				tokio::task::yield_now().await;
			} else {
				tokio::select! {
					_ = tokio::time::sleep(delay) => {}
					_ = wait_cancelled(&mut cancel) => break,
				}
			}
		}

		tracing::debug!("watcher for {} (id {}) finished", self.name, self.id);
	}

	async fn run_once(&self, cancel: &mut watch::Receiver<bool>) -> RunEnd {
		// Output is dropped for this run if the log cannot be opened.
		let logger = match Logger::open(&self.log_path) {
			Ok(logger) => Some(logger),
			Err(e) => {
				tracing::warn!("{} (id {}): {}", self.name, self.id, e);
				None
			}
		};

		let mut child = match self.spawn() {
			Ok(child) => child,
			Err(e) => {
				if let Some(logger) = logger {
					logger.close().await;
				}
				return RunEnd::SpawnFailed(e);
			}
		};

		*self.logger.lock().await = logger.clone();

		let pid = child.id().unwrap_or(0);
		self.mark_running(pid).await;
		tracing::info!("spawned {} (id {}) pid {}", self.name, self.id, pid);

		let stdout = child.stdout.take();
		let stderr = child.stderr.take();

		let exit = {
			let run = async {
				tokio::join!(self.pump_lines(stdout), self.pump_lines(stderr));
				child.wait().await
			};
			tokio::select! {
				result = run => Some(result),
				_ = wait_cancelled(cancel) => None,
			}
		};

		let end = match exit {
			Some(result) => RunEnd::Exited(result),
			None => {
				self.terminate(&mut child, pid).await;
				RunEnd::Cancelled
			}
		};

		self.clear_pid().await;
		self.logger.lock().await.take();
		if let Some(logger) = logger {
			logger.close().await;
		}
		end
	}

	fn spawn(&self) -> Result<Child> {
		let stderr = if self.options.capture_stderr {
			Stdio::piped()
		} else {
			Stdio::null()
		};

		let mut cmd = Command::new(&self.options.shell);
		cmd.arg("-c")
			.arg(&self.command)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(stderr)
			// Own process group so the whole tree can be signalled
			.process_group(0)
			.kill_on_drop(true);

		cmd.spawn().map_err(|source| Error::Spawn {
			command: self.command.clone(),
			source,
		})
	}

	async fn pump_lines<R: AsyncRead + Unpin>(&self, reader: Option<R>) {
		let Some(reader) = reader else {
			return;
		};
		let mut reader = BufReader::new(reader);
		let mut buf = Vec::new();
		loop {
			buf.clear();
			let mut line = (&mut reader).take(MAX_LINE_BYTES as u64);
			match line.read_until(b'\n', &mut buf).await {
				Ok(0) => break,
				Ok(_) => {
					while matches!(buf.last(), Some(b'\n' | b'\r')) {
						buf.pop();
					}
					self.log(&String::from_utf8_lossy(&buf)).await;
				}
				Err(e) => {
					tracing::warn!("{} (id {}) output stream error: {}", self.name, self.id, e);
					break;
				}
			}
		}
	}

	async fn terminate(&self, child: &mut Child, pid: u32) {
		if pid != 0 {
			signal_group(pid, nix::sys::signal::Signal::SIGTERM);
		}
		if tokio::time::timeout(self.options.stop_timeout, child.wait()).await.is_ok() {
			return;
		}

		tracing::warn!(
			"{} (id {}) ignored SIGTERM for {:?}, killing",
			self.name,
			self.id,
			self.options.stop_timeout
		);
		if pid != 0 {
			signal_group(pid, nix::sys::signal::Signal::SIGKILL);
		}
		if let Err(e) = child.kill().await {
			tracing::warn!("kill {} (id {}) failed: {}", self.name, self.id, e);
		}
	}

	async fn mark_running(&self, pid: u32) {
		let mut state = self.state.write().await;
		if state.status == ProcessStatus::Stopped {
			return;
		}
		state.pid = pid;
		state.run_started_at = Instant::now();
	}

	async fn clear_pid(&self) {
		self.state.write().await.pid = 0;
	}

	async fn note_restart(&self) -> u32 {
		let mut state = self.state.write().await;
		state.restart_count += 1;
		state.run_started_at = Instant::now();
		state.restart_count
	}

	async fn mark_failed(&self) {
		let mut state = self.state.write().await;
		if state.status != ProcessStatus::Stopped {
			state.status = ProcessStatus::Failed;
		}
		state.pid = 0;
	}
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
	let _ = cancel.wait_for(|stop| *stop).await;
}

fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
	use nix::sys::signal::killpg;
	use nix::unistd::Pid;
	if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
		tracing::debug!("killpg {} {:?}: {}", pid, signal, e);
	}
}
