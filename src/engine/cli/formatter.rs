//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print a table header; each column is padded to its width
    pub fn table_header(columns: &[(&str, usize)]) {
        let header = columns
            .iter()
            .map(|(name, width)| fit(name, *width).bright_white().bold().to_string())
            .collect::<Vec<_>>()
            .join(" │ ");
        let rule_len: usize = columns.iter().map(|(_, w)| w + 3).sum::<usize>().saturating_sub(3);
        println!("  {}", header);
        println!("  {}", "─".repeat(rule_len).bright_black());
    }

    /// Print a table row using the header's widths
    pub fn table_row(values: &[(&str, usize)]) {
        let row = values
            .iter()
            .map(|(value, width)| fit(value, *width))
            .collect::<Vec<_>>()
            .join(" │ ");
        println!("  {}", row);
    }

    pub fn blank() {
        println!();
    }
}

/// Pad or cut `text` to exactly `width` characters
pub fn fit(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len <= width {
        format!("{}{}", text, " ".repeat(width - len))
    } else if width == 0 {
        String::new()
    } else {
        let mut cut: String = text.chars().take(width - 1).collect();
        cut.push('…');
        cut
    }
}
