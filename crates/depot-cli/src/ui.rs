//! Terminal output.
//!
//! Progress and status go to stderr so stdout stays clean for `--json` and
//! for scripts reading paths.

use crossterm::style::Stylize;
use depot_core::{Reporter, Store};
use depot_schema::Selections;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Prints fetch progress as one line per state change.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    started: Mutex<HashSet<String>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        eprintln!();
        eprintln!("{}", title.bold());
    }

    fn downloading(&self, id: &str, _current: u64, total: Option<u64>) {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if started.insert(id.to_string()) {
            let size = total.map(format_size).unwrap_or_default();
            eprintln!("  {} {} {}", "↓".cyan(), short_id(id), size.dark_grey());
        }
    }

    fn extracting(&self, id: &str) {
        eprintln!("  {} {}", "…".dark_grey(), short_id(id));
    }

    fn done(&self, id: &str, _detail: &str) {
        eprintln!("  {} {}", "✓".green(), short_id(id));
    }

    fn failed(&self, id: &str, reason: &str) {
        eprintln!("  {} {} {}", "✗".red(), short_id(id), reason.dark_grey());
    }

    fn info(&self, msg: &str) {
        eprintln!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "warning:".yellow());
    }

    fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "error:".red().bold());
    }
}

/// Human-readable table of selections with their store state.
pub fn print_selections(store: &Store, selections: &Selections) {
    let width = selections
        .implementations
        .iter()
        .map(|s| s.interface.len())
        .max()
        .unwrap_or(0);

    println!();
    for selection in &selections.implementations {
        let location = match store.get_path(&selection.digest) {
            Ok(path) => path.display().to_string().dark_grey(),
            Err(_) => "(not in store)".to_string().yellow(),
        };
        let interface = format!("{:<width$}", selection.interface);
        println!(
            "  {}  {:<10}  {}",
            interface.white().bold(),
            selection.version.as_str(),
            location
        );
    }
    if let Some(command) = &selections.command {
        println!();
        println!("  {:<width$}  {}", "command", command);
    }
}

/// Shorten long digest ids for progress lines.
pub fn short_id(id: &str) -> &str {
    match id.split_once('=') {
        Some((_, value)) if value.len() > 16 => id.get(..id.len() - value.len() + 16).unwrap_or(id),
        _ => id,
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
