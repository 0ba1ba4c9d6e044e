use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::policy::RestartPolicy;

pub const APP_NAME: &str = "shepherd";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
	#[serde(default)]
	pub supervisor: SupervisorConfig,
	#[serde(default)]
	pub restart: RestartConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
	#[serde(default = "default_shell")]
	pub shell: String,
	#[serde(default = "default_log_dir")]
	pub log_dir: PathBuf,
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout_ms: u64,
	#[serde(default)]
	pub capture_stderr: bool,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			shell: default_shell(),
			log_dir: default_log_dir(),
			stop_timeout_ms: default_stop_timeout(),
			capture_stderr: false,
		}
	}
}

impl SupervisorConfig {
	pub fn stop_timeout(&self) -> Duration {
		Duration::from_millis(self.stop_timeout_ms)
	}
}

fn default_shell() -> String {
	"bash".to_string()
}
fn default_log_dir() -> PathBuf {
	PathBuf::from("logs")
}
fn default_stop_timeout() -> u64 {
	5000
}

/// Restart tuning. The defaults restart forever with no delay.
#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
	#[serde(default)]
	pub max_restarts: u32,
	#[serde(default)]
	pub delay_ms: u64,
	#[serde(default = "default_backoff_factor")]
	pub backoff_factor: f64,
	#[serde(default = "default_max_delay")]
	pub max_delay_ms: u64,
	#[serde(default)]
	pub reset_after_ms: u64,
}

impl Default for RestartConfig {
	fn default() -> Self {
		Self {
			max_restarts: 0,
			delay_ms: 0,
			backoff_factor: default_backoff_factor(),
			max_delay_ms: default_max_delay(),
			reset_after_ms: 0,
		}
	}
}

fn default_backoff_factor() -> f64 {
	1.0
}
fn default_max_delay() -> u64 {
	30_000
}

impl RestartConfig {
	pub fn policy(&self) -> RestartPolicy {
		RestartPolicy {
			max_restarts: (self.max_restarts > 0).then_some(self.max_restarts),
			delay: Duration::from_millis(self.delay_ms),
			backoff_factor: self.backoff_factor,
			max_delay: Duration::from_millis(self.max_delay_ms),
			reset_after: (self.reset_after_ms > 0).then(|| Duration::from_millis(self.reset_after_ms)),
		}
	}
}

impl Config {
	pub fn from_toml(content: &str, path: &Path) -> Result<Self> {
		toml::from_str(content).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})?;
		Self::from_toml(&content, path)
	}
}

/// Loads `path`, or the default location when `None`. A missing file gives
/// defaults; a broken one is reported and also gives defaults.
pub fn load_config(path: Option<&Path>) -> Config {
	let path = match path {
		Some(p) => p.to_path_buf(),
		None => default_config_path(),
	};
	if !path.exists() {
		return Config::default();
	}
	match Config::from_file(&path) {
		Ok(config) => config,
		Err(e) => {
			tracing::warn!("{}; using defaults", e);
			Config::default()
		}
	}
}

pub fn default_config_path() -> PathBuf {
	config_dir().join("config.toml")
}

pub fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Some(home) = home_dir() {
		home.join(".config").join(APP_NAME)
	} else {
		PathBuf::from("/tmp").join(APP_NAME).join("config")
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
