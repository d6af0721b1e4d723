//! Result output.
//!
//! - Colored console output
//! - JSON report serialization

pub mod console;
pub mod json;

pub use console::ConsoleOutput;
