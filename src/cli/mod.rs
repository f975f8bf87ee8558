//! CLI command definitions and terminal helpers.
//!
//! Uses clap derive macros for argument definitions.

pub mod args;

use colored::Colorize;

/// Print a one-line header for a run to stderr.
pub fn print_header(instruction: &str, dry_run: bool) {
    let mode = if dry_run { " (dry run)" } else { "" };
    eprintln!();
    eprintln!(
        "  {}{} {}",
        autopatch::constants::APP_NAME.bold(),
        mode.yellow(),
        format!("· {instruction}").dimmed()
    );
    eprintln!();
}

/// Human-readable byte count.
pub fn human_size(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}
