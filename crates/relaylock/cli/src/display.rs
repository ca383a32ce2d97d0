//! Display utilities for the relaylock CLI

use colored::Colorize;

/// Format a success message
pub(crate) fn success(message: &str) -> String {
    format!("✅ {}", message.green().bold())
}

/// Format a failure message
pub(crate) fn failure(message: &str) -> String {
    format!("❌ {}", message.red().bold())
}

/// Format a warning message
pub(crate) fn warning(message: &str) -> String {
    format!("⚠️  {}", message.yellow().bold())
}

/// Format a key-value section
pub(crate) fn key_value_box(title: &str, items: Vec<(&str, String)>) -> String {
    let mut result = format!("{}", title.bold().underline());

    for (key, value) in items {
        result.push_str(&format!("\n  {}: {}", key.bold(), value));
    }

    result
}
