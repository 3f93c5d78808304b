//! CLI commands implementation

pub mod clear;
pub mod process;
pub mod stats;
pub mod status;

pub use clear::*;
pub use process::*;
pub use stats::*;
pub use status::*;
