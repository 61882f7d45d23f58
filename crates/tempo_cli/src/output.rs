//! Colored terminal output helpers.

use owo_colors::OwoColorize;

/// Consistent styling for user-facing CLI messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", "!".yellow().bold(), message);
    }

    pub fn info(&self, label: &str, value: &str) {
        println!("  {} {}", label.bold(), value);
    }

    pub fn status(&self, message: &str) {
        println!("{}", message.bold());
    }

    pub fn list_item(&self, message: &str) {
        println!("  - {message}");
    }

    pub fn blank(&self) {
        println!();
    }
}
