pub mod formatter;

pub use formatter::{plan_lines, step_line, step_listing};
