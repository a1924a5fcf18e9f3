//! Table output formatting for CLI commands
//!
//! Renders requirements and verification issues with comfy-table. Colors
//! are disabled when `NO_COLOR` is set or the terminal is dumb.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::cli::output::truncate;
use crate::domain::models::{BusinessRequirement, ErrorType, Priority, VerificationIssue};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format requirements as a table
    pub fn format_requirements(&self, requirements: &[BusinessRequirement]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["ID", "Title", "Type", "Priority", "Citations"]));

        for requirement in requirements {
            let priority = Cell::new(requirement.priority.as_str());
            let priority = if self.use_colors {
                priority.fg(priority_color(requirement.priority))
            } else {
                priority
            };
            table.add_row(vec![
                Cell::new(&requirement.id),
                Cell::new(truncate(&requirement.title, 48)),
                Cell::new(requirement.requirement_type.as_str()),
                priority,
                Cell::new(requirement.citations.len()),
            ]);
        }

        table.to_string()
    }

    /// Format verification issues as a table
    pub fn format_issues(&self, issues: &[VerificationIssue]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Requirement", "Type", "Severity", "Description"]));

        for issue in issues {
            let kind = Cell::new(error_type_label(issue.error_type));
            let kind = if self.use_colors {
                kind.fg(error_type_color(issue.error_type))
            } else {
                kind
            };
            table.add_row(vec![
                Cell::new(&issue.requirement_id),
                kind,
                Cell::new(issue.severity.as_str()),
                Cell::new(truncate(&issue.description, 60)),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

const fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Critical => Color::Red,
        Priority::High => Color::Yellow,
        Priority::Medium => Color::Cyan,
        Priority::Low => Color::Grey,
    }
}

const fn error_type_label(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::CriticalError => "critical",
        ErrorType::JustificationGap => "gap",
    }
}

const fn error_type_color(error_type: ErrorType) -> Color {
    match error_type {
        ErrorType::CriticalError => Color::Red,
        ErrorType::JustificationGap => Color::Yellow,
    }
}
