use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shepherd::logs;
use shepherd::{Config, ProcessInfo, ProcessOptions, ProcessStatus, Registry, RestartPolicy};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir(name: &str) -> PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("shepherd-test-{}-{}-{}", std::process::id(), n, name));
	let _ = std::fs::remove_dir_all(&dir);
	dir
}

fn test_registry(name: &str) -> (Arc<Registry>, PathBuf) {
	let log_dir = temp_dir(name);
	let options = ProcessOptions {
		shell: "sh".into(),
		stop_timeout: Duration::from_secs(2),
		..ProcessOptions::default()
	};
	(Registry::with_options(&log_dir, options), log_dir)
}

async fn info(registry: &Registry, id: u32) -> ProcessInfo {
	registry
		.list()
		.await
		.into_iter()
		.find(|p| p.id == id)
		.expect("process listed")
}

async fn wait_for(registry: &Registry, id: u32, cond: impl Fn(&ProcessInfo) -> bool) -> ProcessInfo {
	for _ in 0..100 {
		let p = info(registry, id).await;
		if cond(&p) {
			return p;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	panic!("condition not reached for process {}: {:?}", id, info(registry, id).await);
}

fn captured_lines(path: &Path) -> Vec<String> {
	std::fs::read_to_string(path)
		.unwrap_or_default()
		.lines()
		.map(|line| {
			let (_, text) = logs::parse_line(line).unwrap_or_else(|| panic!("unparseable line: {:?}", line));
			text.to_string()
		})
		.collect()
}

// --- Ids ---

#[tokio::test]
async fn ids_are_unique_and_increasing() {
	let (registry, log_dir) = test_registry("ids");

	let mut ids = Vec::new();
	for n in 0..5 {
		ids.push(registry.add(&format!("p{}", n), "sleep 30").await.unwrap());
	}
	assert_eq!(ids, vec![0, 1, 2, 3, 4]);

	registry.stop(2).await;
	let next = registry.add("after-stop", "sleep 30").await.unwrap();
	assert_eq!(next, 5);

	let listed: Vec<u32> = registry.list().await.iter().map(|p| p.id).collect();
	assert_eq!(listed, vec![0, 1, 2, 3, 4, 5]);

	registry.stop_all().await;
	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn concurrent_adds_get_distinct_ids() {
	let (registry, log_dir) = test_registry("concurrent-ids");

	let mut handles = Vec::new();
	for n in 0..8 {
		let registry = Arc::clone(&registry);
		handles.push(tokio::spawn(async move {
			registry.add(&format!("c{}", n), "sleep 30").await.unwrap()
		}));
	}
	let mut ids = Vec::new();
	for h in handles {
		ids.push(h.await.unwrap());
	}
	ids.sort();
	assert_eq!(ids, (0..8).collect::<Vec<u32>>());

	let listed: Vec<u32> = registry.list().await.iter().map(|p| p.id).collect();
	assert!(listed.windows(2).all(|w| w[0] < w[1]));

	registry.stop_all().await;
	let _ = std::fs::remove_dir_all(&log_dir);
}

// --- Start / stop lifecycle ---

#[tokio::test]
async fn add_then_stop() {
	let (registry, log_dir) = test_registry("add-stop");

	let id = registry.add("sleeper", "sleep 60").await.unwrap();
	let running = wait_for(&registry, id, |p| p.pid != 0).await;
	assert_eq!(running.status, ProcessStatus::Running);
	assert_eq!(running.name, "sleeper");
	assert_eq!(running.command, "sleep 60");
	assert_eq!(running.log_path, log_dir.join("process_sleeper_0.log"));

	assert!(registry.stop(id).await);

	let stopped = info(&registry, id).await;
	assert_eq!(stopped.status, ProcessStatus::Stopped);
	assert_eq!(stopped.pid, 0);
	assert_eq!(stopped.uptime(), "-");

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn stop_kills_the_child() {
	let (registry, log_dir) = test_registry("kills-child");

	let id = registry.add("sleeper", "sleep 60").await.unwrap();
	let pid = wait_for(&registry, id, |p| p.pid != 0).await.pid;

	registry.stop(id).await;

	let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
	assert!(!alive, "child {} still alive after stop", pid);

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn stop_unknown_id_is_a_no_op() {
	let (registry, log_dir) = test_registry("unknown");

	assert!(!registry.stop(42).await);
	assert!(registry.list().await.is_empty());

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn stop_all_stops_everything() {
	let (registry, log_dir) = test_registry("stop-all");

	registry.add("a", "sleep 60").await.unwrap();
	registry.add("b", "echo b").await.unwrap();
	registry.add("c", "while true; do echo c; sleep 0.1; done").await.unwrap();
	tokio::time::sleep(Duration::from_millis(300)).await;

	registry.stop_all().await;

	for p in registry.list().await {
		assert_eq!(p.status, ProcessStatus::Stopped, "{} not stopped", p.name);
		assert_eq!(p.pid, 0);
	}

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn add_and_list_stay_responsive_during_a_slow_stop() {
	let (registry, log_dir) = test_registry("slow-stop");

	let id = registry
		.add("stubborn", "trap '' TERM; while true; do sleep 0.1; done")
		.await
		.unwrap();
	wait_for(&registry, id, |p| p.pid != 0).await;

	let stopping = tokio::spawn({
		let registry = Arc::clone(&registry);
		async move { registry.stop(id).await }
	});
	tokio::time::sleep(Duration::from_millis(200)).await;
	assert!(!stopping.is_finished());

	let begun = std::time::Instant::now();
	let other = registry.add("other", "sleep 30").await.unwrap();
	let listed = registry.list().await;
	let took = begun.elapsed();
	assert!(took < Duration::from_millis(500), "add and list took {:?}", took);
	assert_eq!(listed.len(), 2);
	assert_eq!(other, 1);

	assert!(stopping.await.unwrap());
	registry.stop_all().await;
	let _ = std::fs::remove_dir_all(&log_dir);
}

// --- Restart loop ---

#[tokio::test]
async fn echo_crash_loops_until_stopped() {
	let (registry, log_dir) = test_registry("echo-test");

	let id = registry.add("echo-test", "echo hi").await.unwrap();
	let p = wait_for(&registry, id, |p| p.restart_count >= 1).await;
	assert_eq!(p.status, ProcessStatus::Running);

	let first = p.restart_count;
	let later = wait_for(&registry, id, |p| p.restart_count > first).await;
	assert_eq!(later.status, ProcessStatus::Running);

	registry.stop(id).await;
	let at_stop = info(&registry, id).await.restart_count;
	tokio::time::sleep(Duration::from_millis(300)).await;
	let after = info(&registry, id).await;
	assert_eq!(after.restart_count, at_stop);
	assert_eq!(after.status, ProcessStatus::Stopped);

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn no_log_lines_after_stop_returns() {
	let (registry, log_dir) = test_registry("quiet-after-stop");

	let id = registry
		.add("chatty", "while true; do echo tick; sleep 0.05; done")
		.await
		.unwrap();
	let path = info(&registry, id).await.log_path;
	tokio::time::sleep(Duration::from_millis(400)).await;

	registry.stop(id).await;
	let at_stop = std::fs::read_to_string(&path).unwrap();
	assert!(at_stop.contains("tick"));

	tokio::time::sleep(Duration::from_millis(300)).await;
	let later = std::fs::read_to_string(&path).unwrap();
	assert_eq!(at_stop, later);

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn log_holds_every_run_in_order() {
	let (registry, log_dir) = test_registry("ordered-log");

	let id = registry.add("pair", "echo first; echo second").await.unwrap();
	wait_for(&registry, id, |p| p.restart_count >= 3).await;
	registry.stop(id).await;

	let path = info(&registry, id).await.log_path;
	let lines = captured_lines(&path);
	assert!(lines.len() >= 6, "too few lines: {:?}", lines);

	// A run killed by stop may have written only its first line.
	let complete = lines.len() - lines.len() % 2;
	for pair in lines[..complete].chunks(2) {
		assert_eq!(pair, ["first", "second"]);
	}
	if lines.len() % 2 == 1 {
		assert_eq!(lines.last().unwrap(), "first");
	}

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn restarts_append_to_the_same_file() {
	let (registry, log_dir) = test_registry("append");

	let id = registry.add("", "echo from-run").await.unwrap();
	wait_for(&registry, id, |p| p.restart_count >= 2).await;
	registry.stop(id).await;

	let p = info(&registry, id).await;
	assert_eq!(p.log_path, log_dir.join("process_unnamed_0.log"));
	let runs = captured_lines(&p.log_path)
		.iter()
		.filter(|l| *l == "from-run")
		.count();
	assert!(runs >= 2, "expected output from several runs, got {}", runs);

	let files = std::fs::read_dir(&log_dir).unwrap().count();
	assert_eq!(files, 1);

	let _ = std::fs::remove_dir_all(&log_dir);
}

// --- Uptime ---

#[tokio::test]
async fn uptime_grows_then_resets_on_restart() {
	let (registry, log_dir) = test_registry("uptime");

	let id = registry.add("short", "sleep 1").await.unwrap();
	let a = wait_for(&registry, id, |p| p.pid != 0).await;
	tokio::time::sleep(Duration::from_millis(100)).await;
	let b = info(&registry, id).await;
	if a.restart_count == b.restart_count {
		assert!(b.uptime_secs.unwrap() >= a.uptime_secs.unwrap());
	}

	let restarted = wait_for(&registry, id, |p| p.restart_count >= 1 && p.pid != 0).await;
	assert!(restarted.uptime_secs.unwrap() < 1.0, "uptime {:?}", restarted.uptime_secs);
	assert!(restarted.uptime().contains('.'));

	registry.stop(id).await;
	let _ = std::fs::remove_dir_all(&log_dir);
}

// --- Policy and config ---

#[tokio::test]
async fn capped_policy_ends_in_failed() {
	let log_dir = temp_dir("capped");
	let options = ProcessOptions {
		shell: "sh".into(),
		policy: RestartPolicy {
			max_restarts: Some(3),
			..RestartPolicy::default()
		},
		..ProcessOptions::default()
	};
	let registry = Registry::with_options(&log_dir, options);

	let id = registry.add("crasher", "exit 3").await.unwrap();
	let p = wait_for(&registry, id, |p| p.status == ProcessStatus::Failed).await;
	assert_eq!(p.restart_count, 3);
	assert_eq!(p.pid, 0);

	registry.stop_all().await;
	assert_eq!(info(&registry, id).await.status, ProcessStatus::Stopped);

	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn registry_from_config() {
	let log_dir = temp_dir("from-config");
	let content = format!(
		"[supervisor]\nshell = \"sh\"\nlog_dir = {:?}\n\n[restart]\ndelay_ms = 200\n",
		log_dir.display().to_string()
	);
	let config = Config::from_toml(&content, Path::new("test.toml")).unwrap();
	let registry = Registry::new(&config);
	assert_eq!(registry.log_dir(), log_dir.as_path());

	let id = registry.add("slow-restart", "true").await.unwrap();
	tokio::time::sleep(Duration::from_millis(300)).await;
	let p = info(&registry, id).await;
	assert!(p.restart_count >= 1 && p.restart_count <= 3, "restarts: {}", p.restart_count);

	registry.stop_all().await;
	let _ = std::fs::remove_dir_all(&log_dir);
}

#[tokio::test]
async fn add_fails_when_log_dir_cannot_be_created() {
	let base = temp_dir("bad-log-dir");
	std::fs::create_dir_all(&base).unwrap();
	let blocker = base.join("file");
	std::fs::write(&blocker, "not a dir").unwrap();

	let registry = Registry::with_options(&blocker.join("logs"), ProcessOptions::default());
	let err = registry.add("x", "true").await.unwrap_err();
	assert!(matches!(err, shepherd::Error::LogDir { .. }));
	assert!(registry.list().await.is_empty());

	let _ = std::fs::remove_dir_all(&base);
}

#[tokio::test]
async fn child_runs_even_if_its_log_cannot_be_opened() {
	let (registry, log_dir) = test_registry("long-name");

	// Too long for a file name, so every log open fails.
	let name = "x".repeat(300);
	let id = registry.add(&name, "echo lost; sleep 30").await.unwrap();
	let p = wait_for(&registry, id, |p| p.pid != 0).await;
	assert_eq!(p.status, ProcessStatus::Running);
	assert_eq!(p.restart_count, 0);
	assert!(!p.log_path.exists());

	let pid = p.pid;
	assert!(nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok());

	registry.stop(id).await;
	assert_eq!(info(&registry, id).await.status, ProcessStatus::Stopped);
	let _ = std::fs::remove_dir_all(&log_dir);
}
