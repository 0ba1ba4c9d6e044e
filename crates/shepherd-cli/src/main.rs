mod render;

use owo_colors::OwoColorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::signal::unix::{signal, SignalKind};

use shepherd::Registry;

type Input = Lines<BufReader<Stdin>>;

#[derive(Debug, Default, PartialEq)]
struct Args {
	config: Option<PathBuf>,
	seed: Vec<(String, String)>,
	help: bool,
	version: bool,
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().with_writer(std::io::stderr).init();

	let raw: Vec<String> = std::env::args().skip(1).collect();
	let args = match parse_args(&raw) {
		Ok(args) => args,
		Err(msg) => {
			eprintln!("error: {}", msg);
			eprintln!("run 'shepherd --help' for usage");
			std::process::exit(2);
		}
	};
	if args.help {
		print_usage();
		return;
	}
	if args.version {
		println!("shepherd {}", env!("CARGO_PKG_VERSION"));
		return;
	}

	let config = shepherd::load_config(args.config.as_deref());
	let registry = Registry::new(&config);

	spawn_shutdown_handler(Arc::clone(&registry));

	for (name, command) in &args.seed {
		match registry.add(name, command).await {
			Ok(id) => eprintln!("started {} (id {})", name, id),
			Err(e) => eprintln!("error: {}", e),
		}
	}

	let mut input = BufReader::new(tokio::io::stdin()).lines();
	loop {
		let Some(line) = prompt(&mut input, "Enter a command: ").await else {
			break;
		};

		match line.trim() {
			"" => continue,
			"start" | "add" => cmd_start(&registry, &mut input).await,
			"stop" => cmd_stop(&registry, &mut input).await,
			"list" | "ls" => print!("{}", render::table(&registry.list().await)),
			"json" => cmd_json(&registry).await,
			"help" => print_commands(),
			"exit" | "quit" => break,
			other => {
				println!("Unknown command: {}", other);
				print_commands();
			}
		}
	}

	tracing::info!("stopping all processes");
	registry.stop_all().await;
}

fn spawn_shutdown_handler(registry: Arc<Registry>) {
	tokio::spawn(async move {
		let mut terminate = match signal(SignalKind::terminate()) {
			Ok(s) => s,
			Err(e) => {
				tracing::error!("failed to install SIGTERM handler: {}", e);
				let _ = tokio::signal::ctrl_c().await;
				registry.stop_all().await;
				std::process::exit(0);
			}
		};

		tokio::select! {
			_ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, shutting down"),
			_ = terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
		}
		registry.stop_all().await;
		std::process::exit(0);
	});
}

/// Prints `message` and reads one line. `None` on end of input.
async fn prompt(input: &mut Input, message: &str) -> Option<String> {
	print!("{}", message);
	let _ = std::io::stdout().flush();
	match input.next_line().await {
		Ok(line) => line,
		Err(e) => {
			tracing::error!("failed to read input: {}", e);
			None
		}
	}
}

async fn cmd_start(registry: &Registry, input: &mut Input) {
	let Some(name) = prompt(input, "Enter the process name: ").await else {
		return;
	};
	let Some(command) = prompt(input, "Enter the command for the new process: ").await else {
		return;
	};
	let command = command.trim();
	if command.is_empty() {
		println!("No command given.");
		return;
	}

	match registry.add(name.trim(), command).await {
		Ok(id) => println!("Started {} with id {}.", name.trim().bold(), id),
		Err(e) => println!("{} {}", "error:".red(), e),
	}
}

async fn cmd_stop(registry: &Registry, input: &mut Input) {
	let Some(raw) = prompt(input, "Enter the Process ID to stop: ").await else {
		return;
	};
	let id = match raw.trim().parse::<u32>() {
		Ok(id) => id,
		Err(_) => {
			println!("Invalid process id: {}", raw.trim());
			return;
		}
	};

	if registry.stop(id).await {
		println!("Stopped process {}.", id);
	} else {
		println!("No process with id {}.", id);
	}
}

async fn cmd_json(registry: &Registry) {
	match serde_json::to_string_pretty(&registry.list().await) {
		Ok(json) => println!("{}", json),
		Err(e) => println!("{} {}", "error:".red(), e),
	}
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
	let mut args = Args::default();
	let mut iter = raw.iter();
	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-h" | "--help" | "help" => args.help = true,
			"-V" | "--version" | "version" => args.version = true,
			"-c" | "--config" => {
				let path = iter.next().ok_or("--config needs a path")?;
				args.config = Some(PathBuf::from(path));
			}
			"-a" | "--add" => {
				let spec = iter.next().ok_or("--add needs NAME=COMMAND")?;
				args.seed.push(parse_seed(spec)?);
			}
			other => return Err(format!("unknown argument: {}", other)),
		}
	}
	Ok(args)
}

fn parse_seed(spec: &str) -> Result<(String, String), String> {
	let (name, command) = spec
		.split_once('=')
		.ok_or_else(|| format!("expected NAME=COMMAND, got {:?}", spec))?;
	if command.trim().is_empty() {
		return Err(format!("empty command for {:?}", name));
	}
	Ok((name.trim().to_string(), command.trim().to_string()))
}

fn print_usage() {
	eprintln!("{} {} — local process supervisor", "shepherd".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} [options]", "shepherd".bold());
	eprintln!();
	eprintln!("{}", "options".cyan().bold());
	eprintln!("  {} <path>           Config file (default: {})", "--config".bold(), shepherd::config::default_config_path().display());
	eprintln!("  {} <name>=<command>    Start a process before the prompt (repeatable)", "--add".bold());
	eprintln!("  {}                    Show this help", "--help".bold());
	eprintln!("  {}                 Show version", "--version".bold());
	eprintln!();
	print_commands();
}

fn print_commands() {
	eprintln!("{}", "commands".cyan().bold());
	eprintln!("  {}    Add and start a process (prompts for name and command)", "start".bold());
	eprintln!("  {}     Stop a process by id", "stop".bold());
	eprintln!("  {}     List processes", "list".bold());
	eprintln!("  {}     List processes as JSON", "json".bold());
	eprintln!("  {}     Stop everything and quit", "exit".bold());
}
