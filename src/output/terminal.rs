//! Terminal output utilities.
//!
//! Provides formatting helpers for terminal output.

use crate::provider::Change;
use colored::{ColoredString, Colorize};

/// Format a value as a quoted, right-aligned field.
///
/// # Arguments
/// * `value` - The value to format
/// * `width` - The minimum width of the field
///
/// # Returns
/// A quoted, right-aligned string
pub fn format_field<T: ToString>(value: T, width: usize) -> String {
    let quoted = format!("\"{}\"", value.to_string());
    if quoted.len() >= width {
        quoted
    } else {
        format!("{quoted:>width$}")
    }
}

/// Fixed-width status label for an apply result.
pub fn change_label(change: Change) -> ColoredString {
    let label = format!("{:>9}", change.to_string());
    match change {
        Change::Created => label.green(),
        Change::Updated => label.yellow(),
        Change::Unchanged => label.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_field_pads_left() {
        assert_eq!(format_field("vpc", 10), "     \"vpc\"");
    }

    #[test]
    fn test_format_field_never_truncates() {
        assert_eq!(format_field("route-to-gateway", 5), "\"route-to-gateway\"");
        assert_eq!(format_field(7, 3), "\"7\"");
    }

    #[test]
    fn test_change_label_width() {
        colored::control::set_override(false);
        assert_eq!(change_label(Change::Created).to_string(), "  created");
        assert_eq!(change_label(Change::Unchanged).to_string(), "unchanged");
    }
}
