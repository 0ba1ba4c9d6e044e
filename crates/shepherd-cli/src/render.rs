use owo_colors::OwoColorize;
use shepherd::{ProcessInfo, ProcessStatus};

const HEADERS: [&str; 7] = ["Process Name", "ID", "PID", "Status", "Restart Count", "Uptime", "Log Path"];

pub fn table(processes: &[ProcessInfo]) -> String {
	if processes.is_empty() {
		return "No processes.\n".to_string();
	}

	let rows: Vec<[String; 7]> = processes
		.iter()
		.map(|p| {
			[
				p.name.clone(),
				p.id.to_string(),
				p.pid.to_string(),
				p.status.to_string(),
				p.restart_count.to_string(),
				p.uptime(),
				p.log_path.display().to_string(),
			]
		})
		.collect();

	let mut widths = HEADERS.map(|h| h.len());
	for row in &rows {
		for (w, cell) in widths.iter_mut().zip(row.iter()) {
			*w = (*w).max(cell.chars().count());
		}
	}
	let rule = "=".repeat(widths.iter().sum::<usize>() + 3 * (widths.len() - 1));

	let mut out = String::new();
	out.push_str(&rule);
	out.push('\n');
	let header: Vec<String> = HEADERS
		.iter()
		.zip(widths.iter())
		.map(|(h, w)| format!("{:<width$}", h, width = *w).bold().to_string())
		.collect();
	out.push_str(header.join(" | ").trim_end());
	out.push('\n');
	out.push_str(&rule);
	out.push('\n');

	for (row, p) in rows.iter().zip(processes) {
		let cells: Vec<String> = row
			.iter()
			.zip(widths.iter())
			.enumerate()
			.map(|(i, (cell, w))| {
				let padded = format!("{:<width$}", cell, width = *w);
				if i == 3 {
					paint_status(p.status, &padded)
				} else {
					padded
				}
			})
			.collect();
		out.push_str(cells.join(" | ").trim_end());
		out.push('\n');
	}
	out.push_str(&rule);
	out.push('\n');
	out
}

fn paint_status(status: ProcessStatus, text: &str) -> String {
	match status {
		ProcessStatus::Running => text.green().to_string(),
		ProcessStatus::Stopped => text.red().to_string(),
		ProcessStatus::Failed => text.yellow().to_string(),
	}
}
