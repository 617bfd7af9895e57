//! Terminal output helpers shared by every command.

use owo_colors::OwoColorize;

/// Thin wrapper so commands print consistently.
#[derive(Clone, Copy, Default)]
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn section(&self, title: &str) {
        println!("\n{}", title.bold().underline());
    }

    pub fn print(&self, line: &str) {
        println!("{line}");
    }

    pub fn info(&self, label: &str, value: &str) {
        println!("{} {value}", label.bold());
    }

    pub fn status(&self, line: &str) {
        println!("{}", line.dimmed());
    }

    pub fn success(&self, line: &str) {
        println!("{} {line}", "✓".bright_green());
    }

    pub fn warning(&self, line: &str) {
        println!("{} {line}", "!".bright_yellow());
    }

    pub fn error(&self, line: &str) {
        eprintln!("{} {line}", "✗".bright_red());
    }

    pub fn list_item(&self, id: i64, name: &str) {
        println!("  {} {name}", format!("[{id}]").bright_cyan());
    }
}
