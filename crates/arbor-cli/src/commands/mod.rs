//! CLI command implementations

pub mod delete;
pub mod filter;
pub mod rename;
pub mod schema;
pub mod search;

use arbor_adapter::ConnectionAdapter;

use crate::OutputFormat;

/// Context passed to all commands that talk to the directory
pub struct CommandContext {
    pub adapter: ConnectionAdapter,
    pub output_format: OutputFormat,
}

impl CommandContext {
    /// Check if output should be JSON
    pub fn is_json(&self) -> bool {
        matches!(self.output_format, OutputFormat::Json)
    }

    pub fn info(&self, msg: &str) {
        println!("{}", msg);
    }
}
