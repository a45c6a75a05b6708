pub mod cli;
pub mod commands;
pub mod display;
pub mod signal;

// Re-export commonly used items
pub use cli::Cli;
