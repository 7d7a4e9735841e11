//! Apply results.

use super::terminal::{change_label, format_field};
use crate::executor::ApplyReport;
use crate::provider::Change;
use colored::Colorize;

/// Print one line per applied resource, then the exported values.
pub fn print_report(report: &ApplyReport) {
    for (i, resource) in report.applied.iter().enumerate() {
        println!(
            "{} {} {} {}",
            format_field(i + 1, 5),
            change_label(resource.change),
            format_field(resource.kind, 32),
            resource.name.bold()
        );
    }
    println!(
        "# {} created, {} updated, {} unchanged",
        report.count(Change::Created).to_string().green(),
        report.count(Change::Updated).to_string().yellow(),
        report.count(Change::Unchanged)
    );
    for (name, value) in &report.exports {
        println!("#{}# {name} = {value}", "EXPORT".on_blue());
    }
}
