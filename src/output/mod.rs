//! Operator-facing output.
//!
//! This module handles printing plans and apply results:
//! - [`plan`] - subnet partition and ordered plan listings
//! - [`report`] - apply results and exported values
//! - [`terminal`] - field formatting and coloured status labels

mod plan;
mod report;
mod terminal;

pub use plan::{plan_rows, print_plan, print_subnets, PlanRow};
pub use report::print_report;
pub use terminal::{change_label, format_field};
