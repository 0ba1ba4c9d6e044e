//! # shepherd
//!
//! Local process supervisor.
//!
//! Runs shell commands as child processes, appends their output to one log
//! file per process, restarts them when they exit and stops them cleanly on
//! request.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shepherd::{Config, Registry};
//!
//! # #[tokio::main]
//! # async fn main() -> shepherd::Result<()> {
//! let registry = Registry::new(&Config::default());
//!
//! let id = registry.add("ticker", "while true; do date; sleep 1; done").await?;
//!
//! for p in registry.list().await {
//!     println!("{} {} {} {}", p.id, p.name, p.status, p.uptime());
//! }
//!
//! registry.stop(id).await;
//! registry.stop_all().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod logs;
pub mod policy;
pub mod process;
pub mod registry;
pub mod types;

pub use config::{load_config, Config};
pub use error::{Error, Result};
pub use logger::Logger;
pub use policy::{RestartDecision, RestartPolicy};
pub use process::{ProcessOptions, SupervisedProcess};
pub use registry::Registry;
pub use types::*;
